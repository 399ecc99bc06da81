//! Boot-time loading and write-back against the storage adapters.

use crate::mock_hw::{LogSink, MockHardware, MockPower, NOW};

use sampler::adapters::fs_store::DirectoryStore;
use sampler::adapters::memory_store::MemoryStore;
use sampler::app::commands::{AppCommand, CommandReply};
use sampler::app::events::AppEvent;
use sampler::app::ports::StoragePort;
use sampler::app::service::SamplerService;
use sampler::config::{CONFIG_PATH, SystemConfig};
use sampler::store::task::TaskStatus;
use sampler::store::valve::ValveStatus;

fn seeded() -> MemoryStore {
    let mut storage = MemoryStore::new();
    let config = SystemConfig {
        maintenance_mode: true,
        task_folder: "jobs".into(),
        ..SystemConfig::default()
    };
    config.save(&mut storage).unwrap();
    for (id, status) in [(0, "available"), (1, "sampled"), (2, "unavailable")] {
        let json = format!(r#"{{"id":{id},"status":"{status}","group":"north bank"}}"#);
        storage.write(&format!("valves/{id}.json"), json.as_bytes()).unwrap();
    }
    let task = format!(
        r#"{{"id":4,"name":"dawn","status":"active","schedule":{},"valves":[0]}}"#,
        NOW + 3_600
    );
    storage.write("jobs/4.json", task.as_bytes()).unwrap();
    storage
}

#[test]
fn boot_loads_config_valves_and_tasks() {
    let storage = seeded();
    let mut sink = LogSink::new();
    let app = SamplerService::load(&storage, &mut sink).unwrap();

    assert!(app.maintenance_mode());
    assert_eq!(app.config().task_folder, "jobs");
    assert_eq!(app.valves().status(1), Some(ValveStatus::Sampled));
    assert_eq!(app.valves().get(0).unwrap().group.as_str(), "north bank");
    let task = app.tasks().find(4).unwrap();
    assert_eq!(task.status, TaskStatus::Active);
    assert_eq!(task.params.flush_secs, 150, "missing params fall back to defaults");
    assert_eq!(sink.events, vec![AppEvent::Started { tasks: 1, valves: 3 }]);
}

#[test]
fn unreadable_task_file_is_skipped() {
    let mut storage = seeded();
    storage.write("jobs/5.json", b"{ not json").unwrap();
    let app = SamplerService::load(&storage, &mut LogSink::new()).unwrap();
    assert_eq!(app.tasks().len(), 1);
}

#[test]
fn corrupt_config_falls_back_to_defaults() {
    let mut storage = seeded();
    storage.write(CONFIG_PATH, b"[]").unwrap();
    let app = SamplerService::load(&storage, &mut LogSink::new()).unwrap();
    assert_eq!(app.config(), &SystemConfig::default());
    // Tasks now come from the default folder, which is empty.
    assert!(app.tasks().is_empty());
}

#[test]
fn storage_failure_does_not_block_commands() {
    let mut storage = seeded();
    let mut app = SamplerService::load(&storage, &mut LogSink::new()).unwrap();
    storage.set_read_only(true);
    let reply = app.handle_command(
        AppCommand::CreateTask { name: "offline".into() },
        &mut MockHardware::new(),
        &mut MockPower::new(),
        &mut storage,
        &mut LogSink::new(),
        0,
    );
    assert_eq!(reply, Ok(CommandReply::Created(5)));
    assert!(!storage.contains("jobs/5.json"));
}

#[test]
fn tasks_survive_a_reboot_on_disk() {
    let root = std::env::temp_dir().join(format!("sampler-reboot-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    let mut disk = DirectoryStore::new(&root);
    SystemConfig {
        maintenance_mode: true,
        ..SystemConfig::default()
    }
    .save(&mut disk)
    .unwrap();
    disk.write("valves/0.json", br#"{"id":0,"status":"available"}"#).unwrap();

    let mut app = SamplerService::load(&disk, &mut LogSink::new()).unwrap();
    let reply = app.handle_command(
        AppCommand::CreateTask { name: "creek".into() },
        &mut MockHardware::new(),
        &mut MockPower::new(),
        &mut disk,
        &mut LogSink::new(),
        0,
    );
    assert_eq!(reply, Ok(CommandReply::Created(1)));

    let rebooted = SamplerService::load(&disk, &mut LogSink::new()).unwrap();
    assert_eq!(rebooted.tasks().find(1).unwrap().name, "creek");
    assert_eq!(rebooted.valves().status(0), Some(ValveStatus::Available));
    let _ = std::fs::remove_dir_all(&root);
}
