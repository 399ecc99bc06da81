//! Integration tests for the SamplerService → scheduler → controllers →
//! actuators pipeline.
//!
//! The rig keeps the wall clock and the monotonic clock in step:
//! `now = NOW + ms / 1000`.

use crate::mock_hw::{LogSink, MockHardware, MockPower, NOW};

use sampler::adapters::memory_store::MemoryStore;
use sampler::app::commands::{AppCommand, CommandReply};
use sampler::app::events::AppEvent;
use sampler::app::ports::PumpDirection;
use sampler::app::service::SamplerService;
use sampler::config::SystemConfig;
use sampler::error::{CommandError, ValidationError};
use sampler::fsm::{ControllerKind, StateId};
use sampler::pins::{AIR_VALVE, FLUSH_VALVE, valve_pin};
use sampler::scheduler::ScheduleOutcome;
use sampler::store::task::{Task, TaskId, TaskParams, TaskStatus, TaskStore};
use sampler::store::valve::{Valve, ValveId, ValveStatus, ValveStore};

struct Rig {
    app: SamplerService,
    hw: MockHardware,
    power: MockPower,
    storage: MemoryStore,
    sink: LogSink,
}

impl Rig {
    fn new(tasks: Vec<Task>, maintenance: bool) -> Self {
        let config = SystemConfig {
            maintenance_mode: maintenance,
            ..SystemConfig::default()
        };
        let valves = ValveStore::from_valves((0..6).map(|id| Valve::new(id, ValveStatus::Available)));
        Self {
            app: SamplerService::new(config, TaskStore::from_tasks(tasks), valves),
            hw: MockHardware::new(),
            power: MockPower::new(),
            storage: MemoryStore::new(),
            sink: LogSink::new(),
        }
    }

    fn tick(&mut self, ms: u64) -> ScheduleOutcome {
        self.power.now = NOW + (ms / 1000) as i64;
        self.app
            .tick(&mut self.hw, &mut self.power, &mut self.storage, &mut self.sink, ms)
    }

    fn cmd(&mut self, cmd: AppCommand, ms: u64) -> Result<CommandReply, CommandError> {
        self.power.now = NOW + (ms / 1000) as i64;
        self.app
            .handle_command(cmd, &mut self.hw, &mut self.power, &mut self.storage, &mut self.sink, ms)
    }

    fn valve(&self, id: ValveId) -> Option<ValveStatus> {
        self.app.valves().status(id)
    }

    fn task(&self, id: TaskId) -> &Task {
        self.app.tasks().find(id).expect("task exists")
    }
}

fn params() -> TaskParams {
    TaskParams {
        flush_secs: 10,
        sample_secs: 60,
        sample_pressure: 8.0,
        sample_volume: 500.0,
    }
}

fn active(id: TaskId, schedule: i64, valves: &[ValveId]) -> Task {
    Task {
        status: TaskStatus::Active,
        schedule,
        valves: valves.to_vec(),
        ..Task::new(id, "river", params())
    }
}

/// Drive a single-valve task from arming to the end of the argon flush.
fn start_run(rig: &mut Rig) {
    assert_eq!(rig.tick(0), ScheduleOutcome::Operating);
    rig.tick(5_000);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::ArgonFlush);
}

// ── Full sampling run ─────────────────────────────────────────

#[test]
fn imminent_task_claims_valve_and_arms_start() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[3])], false);
    assert_eq!(rig.tick(0), ScheduleOutcome::Operating);
    assert_eq!(rig.valve(3), Some(ValveStatus::Operating));
    assert_eq!(rig.app.current_task(), Some(1));
    assert_eq!(rig.app.pending_actions(), 1);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::Idle);
    assert_eq!(rig.power.power_offs, 0, "imminent task must keep the device awake");
}

#[test]
fn full_run_samples_valve_and_powers_down() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[3])], false);
    start_run(&mut rig);
    assert_eq!(rig.hw.pump(), Some(PumpDirection::Reverse));
    assert_eq!(rig.hw.latched(), vec![valve_pin(3)]);
    assert!(rig.sink.contains(&AppEvent::RunStarted {
        task: 1,
        valve: Some(3)
    }));

    rig.tick(15_000);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::Flush);
    assert_eq!(rig.hw.latched(), vec![FLUSH_VALVE]);
    assert_eq!(rig.hw.pump(), Some(PumpDirection::Normal));
    assert!(rig.hw.intake_open());

    rig.tick(25_000);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::Sample);
    assert_eq!(rig.hw.latched(), vec![valve_pin(3)]);
    assert!(rig.hw.measuring);

    rig.hw.volume = 600.0;
    assert_eq!(rig.tick(26_000), ScheduleOutcome::Operating);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::AirFlush);
    assert!(!rig.hw.measuring);
    assert_eq!(rig.valve(3), Some(ValveStatus::Sampled));
    assert_eq!(rig.hw.latched(), vec![FLUSH_VALVE, AIR_VALVE]);
    assert!(rig.sink.contains(&AppEvent::SampleTaken {
        task: 1,
        valve: 3,
        volume: 600.0
    }));

    assert_eq!(rig.tick(41_000), ScheduleOutcome::Unavailable);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::Idle);
    assert_eq!(rig.task(1).status, TaskStatus::Completed);
    assert_eq!(rig.task(1).valve_offset_start, 1);
    assert_eq!(rig.app.current_task(), None);
    assert!(rig.sink.contains(&AppEvent::RunFinished {
        task: 1,
        completed: true
    }));

    // Shutdown gate: actuators off, stores flushed, power cut.
    assert_eq!(rig.hw.pump(), None);
    assert!(!rig.hw.intake_open());
    assert!(rig.hw.latched().is_empty());
    assert_eq!(rig.power.power_offs, 1);
    assert!(rig.app.is_powered_off());
    assert_eq!(rig.sink.events.last(), Some(&AppEvent::PowerDown));
    assert_eq!(rig.storage.json("tasks/1.json").unwrap()["status"], "completed");
    assert_eq!(rig.storage.json("valves/3.json").unwrap()["status"], "sampled");
}

#[test]
#[should_panic(expected = "power module fault")]
fn tick_after_power_off_halts() {
    let mut rig = Rig::new(Vec::new(), false);
    rig.tick(0);
    assert!(rig.app.is_powered_off());
    rig.tick(100);
}

#[test]
fn pressure_target_ends_sample_early() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[2])], false);
    start_run(&mut rig);
    rig.tick(15_000);
    rig.tick(25_000);
    rig.hw.pressure = 9.0;
    rig.tick(25_500);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::AirFlush);
    assert_eq!(rig.valve(2), Some(ValveStatus::Sampled));
}

#[test]
fn multi_valve_task_reschedules_next_valve() {
    let mut task = active(1, NOW + 5, &[3, 4]);
    task.time_between_secs = 600;
    let mut rig = Rig::new(vec![task], false);
    start_run(&mut rig);
    rig.tick(15_000);
    rig.tick(25_000);
    rig.hw.volume = 500.0;
    rig.tick(26_000);
    assert_eq!(rig.tick(41_000), ScheduleOutcome::Scheduled);

    let t = rig.task(1);
    assert_eq!(t.status, TaskStatus::Active);
    assert_eq!(t.valve_offset_start, 1);
    assert_eq!(t.schedule, NOW + 41 + 600);
    assert_eq!(rig.valve(3), Some(ValveStatus::Sampled));
    assert_eq!(rig.valve(4), Some(ValveStatus::Available));
    assert_eq!(rig.power.alarms.last(), Some(&(NOW + 41 + 600 - 8)));
    assert!(rig.sink.contains(&AppEvent::RunFinished {
        task: 1,
        completed: false
    }));
}

// ── Interruption ──────────────────────────────────────────────

#[test]
fn cold_water_interrupts_run_and_frees_valve() {
    let mut task = active(1, NOW + 5, &[3, 4]);
    task.time_between_secs = 60;
    let mut rig = Rig::new(vec![task], false);
    start_run(&mut rig);

    rig.hw.temperature = 0.5;
    assert_eq!(rig.tick(6_000), ScheduleOutcome::Interrupted);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::Idle);
    assert_eq!(rig.valve(3), Some(ValveStatus::Available));
    assert!(rig.sink.contains(&AppEvent::RunInterrupted {
        task: 1,
        valve: Some(3),
        trigger: Some("temperature"),
    }));
    assert!(rig.sink.contains(&AppEvent::ScheduleChanged {
        outcome: ScheduleOutcome::Interrupted,
        task: None,
    }));

    // The next valve waits for its slot; the device sleeps until then.
    let t = rig.task(1);
    assert_eq!(t.valve_offset_start, 1);
    assert_eq!(t.schedule, NOW + 66);
    assert_eq!(rig.power.alarms.last(), Some(&(NOW + 58)));
    assert_eq!(rig.power.power_offs, 1);
}

#[test]
fn cold_water_ignored_without_barometer() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[3])], false);
    rig.hw.barometer = false;
    start_run(&mut rig);
    rig.hw.temperature = 0.5;
    assert_eq!(rig.tick(6_000), ScheduleOutcome::Operating);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::ArgonFlush);
}

#[test]
fn overpressure_interrupts_flush() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[3])], false);
    start_run(&mut rig);
    rig.tick(15_000);
    rig.hw.pressure = 20.0;
    assert_eq!(rig.tick(16_000), ScheduleOutcome::Interrupted);
    assert_eq!(rig.valve(3), Some(ValveStatus::Available));
    assert_eq!(rig.task(1).status, TaskStatus::Completed);
    assert!(rig.sink.contains(&AppEvent::RunInterrupted {
        task: 1,
        valve: Some(3),
        trigger: Some("pressure"),
    }));
}

// ── Scheduler outcomes ────────────────────────────────────────

#[test]
fn missed_task_is_completed_and_device_sleeps() {
    let mut rig = Rig::new(vec![active(1, NOW - 5, &[2])], false);
    assert_eq!(rig.tick(0), ScheduleOutcome::Unavailable);
    assert_eq!(rig.task(1).status, TaskStatus::Completed);
    assert!(rig.task(1).valves.is_empty());
    assert_eq!(rig.valve(2), Some(ValveStatus::Available));
    assert_eq!(rig.power.power_offs, 1);
}

#[test]
fn distant_task_sets_alarm_and_sleeps() {
    let mut rig = Rig::new(vec![active(1, NOW + 1_000, &[0])], false);
    assert_eq!(rig.tick(0), ScheduleOutcome::Scheduled);
    assert_eq!(rig.power.alarms, vec![NOW + 992]);
    assert_eq!(rig.valve(0), Some(ValveStatus::Available));
    assert_eq!(rig.power.power_offs, 1);
}

#[test]
fn maintenance_mode_keeps_device_awake() {
    let mut rig = Rig::new(Vec::new(), true);
    for ms in [0, 1_000, 2_000] {
        assert_eq!(rig.tick(ms), ScheduleOutcome::Unavailable);
    }
    assert_eq!(rig.power.power_offs, 0);
    assert_eq!(rig.app.tick_count(), 3);
}

#[test]
fn schedule_changes_are_reported_once() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[3])], true);
    rig.tick(0);
    rig.tick(1_000);
    rig.tick(2_000);
    let reports = rig
        .sink
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::ScheduleChanged { .. }))
        .count();
    assert_eq!(reports, 1);
}

// ── Operator commands ─────────────────────────────────────────

#[test]
fn stop_current_task_stops_procedure_and_frees_valves() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[3, 4])], false);
    start_run(&mut rig);

    assert_eq!(rig.cmd(AppCommand::StopCurrentTask, 6_000), Ok(CommandReply::Done));
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::Idle);
    assert_eq!(rig.app.current_task(), None);
    assert_eq!(rig.task(1).status, TaskStatus::Completed);
    assert!(rig.task(1).valves.is_empty());
    assert_eq!(rig.valve(3), Some(ValveStatus::Available));
    assert_eq!(rig.hw.pump(), None);
    assert!(rig.sink.contains(&AppEvent::TaskStopped(1)));

    assert_eq!(rig.cmd(AppCommand::StopCurrentTask, 7_000), Err(CommandError::NoCurrentTask));
}

#[test]
fn task_lifecycle_through_commands() {
    let mut rig = Rig::new(Vec::new(), true);
    let Ok(CommandReply::Created(id)) = rig.cmd(AppCommand::CreateTask { name: "lake".into() }, 0) else {
        panic!("task not created");
    };
    assert_eq!(rig.task(id).status, TaskStatus::Inactive);

    let mut edited = rig.task(id).clone();
    edited.schedule = NOW + 100;
    edited.valves = vec![0, 1];
    assert_eq!(rig.cmd(AppCommand::SaveTask(edited.clone()), 0), Ok(CommandReply::Done));

    assert_eq!(rig.cmd(AppCommand::ScheduleTask(id), 0), Ok(CommandReply::Done));
    assert_eq!(rig.task(id).status, TaskStatus::Active);
    assert_eq!(rig.power.alarms, vec![NOW + 92]);

    assert_eq!(
        rig.cmd(AppCommand::SaveTask(edited), 0),
        Err(CommandError::Invalid(ValidationError::TaskActive(id)))
    );

    assert_eq!(rig.cmd(AppCommand::UnscheduleTask(id), 0), Ok(CommandReply::Done));
    assert_eq!(rig.task(id).status, TaskStatus::Inactive);
    assert!(rig.storage.contains(&format!("tasks/{id}.json")));

    assert_eq!(rig.cmd(AppCommand::DeleteTask(id), 0), Ok(CommandReply::Done));
    assert!(rig.app.tasks().find(id).is_none());
    assert!(!rig.storage.contains(&format!("tasks/{id}.json")));
    assert_eq!(
        rig.cmd(AppCommand::DeleteTask(id), 0),
        Err(CommandError::Invalid(ValidationError::TaskNotFound(id)))
    );
}

#[test]
fn scheduling_validation_errors() {
    let mut no_valves = Task::new(1, "a", params());
    no_valves.schedule = NOW + 100;
    let mut too_soon = Task::new(2, "b", params());
    too_soon.schedule = NOW + 3;
    too_soon.valves = vec![0];
    let mut used = Task::new(3, "c", params());
    used.schedule = NOW + 100;
    used.valves = vec![0, 2];
    let mut rig = Rig::new(vec![no_valves, too_soon, used], true);
    assert_eq!(
        rig.cmd(AppCommand::SetValveStatus { id: 2, status: ValveStatus::Sampled }, 0),
        Ok(CommandReply::Done)
    );

    assert_eq!(
        rig.cmd(AppCommand::ScheduleTask(1), 0),
        Err(CommandError::Invalid(ValidationError::NoValves))
    );
    assert_eq!(
        rig.cmd(AppCommand::ScheduleTask(2), 0),
        Err(CommandError::Invalid(ValidationError::NotInFuture))
    );
    assert_eq!(
        rig.cmd(AppCommand::ScheduleTask(3), 0),
        Err(CommandError::Invalid(ValidationError::ValveSampled(2)))
    );
    assert_eq!(
        rig.cmd(AppCommand::ScheduleTask(9), 0),
        Err(CommandError::Invalid(ValidationError::TaskNotFound(9)))
    );
    for id in [1, 2, 3] {
        assert_eq!(rig.task(id).status, TaskStatus::Inactive);
    }
}

#[test]
fn save_task_rejects_bad_input() {
    let mut rig = Rig::new(vec![Task::new(1, "a", params())], true);

    let mut bad = rig.task(1).clone();
    bad.params.flush_secs = 0;
    assert!(matches!(
        rig.cmd(AppCommand::SaveTask(bad), 0),
        Err(CommandError::BadParams(_))
    ));

    let mut unknown = rig.task(1).clone();
    unknown.valves = vec![40];
    assert_eq!(
        rig.cmd(AppCommand::SaveTask(unknown), 0),
        Err(CommandError::Invalid(ValidationError::ValveUnknown(40)))
    );
    assert!(rig.task(1).valves.is_empty());

    let mut endless = rig.task(1).clone();
    endless.valves = vec![3, 4];
    endless.time_between_secs = i64::MAX;
    assert!(matches!(
        rig.cmd(AppCommand::SaveTask(endless), 0),
        Err(CommandError::BadParams(_))
    ));
    assert_eq!(rig.task(1).time_between_secs, 0);
}

#[test]
fn huge_gap_between_runs_saturates() {
    let mut task = active(1, NOW + 5, &[3, 4]);
    task.time_between_secs = i64::MAX;
    let mut rig = Rig::new(vec![task], false);
    start_run(&mut rig);
    rig.tick(15_000);
    rig.tick(25_000);
    rig.hw.volume = 600.0;
    rig.tick(26_000);
    assert_eq!(rig.tick(41_000), ScheduleOutcome::Scheduled);
    assert_eq!(rig.task(1).valve_offset_start, 1);
    assert_eq!(rig.task(1).schedule, i64::MAX);
    assert_eq!(rig.task(1).status, TaskStatus::Active);
}

#[test]
fn refused_delete_leaves_task_in_place() {
    let mut rig = Rig::new(vec![Task::new(1, "a", params())], true);
    rig.storage.set_read_only(true);
    assert_eq!(rig.cmd(AppCommand::DeleteTask(1), 0), Err(CommandError::StorageFailed));
    assert_eq!(rig.task(1).name, "a");
}

#[test]
fn earlier_task_waits_for_the_running_one() {
    let mut rig = Rig::new(vec![active(1, NOW + 9, &[0])], false);
    assert_eq!(rig.tick(0), ScheduleOutcome::Operating);

    let Ok(CommandReply::Created(id)) = rig.cmd(AppCommand::CreateTask { name: "cut in".into() }, 0) else {
        panic!("task not created");
    };
    let mut early = rig.task(id).clone();
    early.schedule = NOW + 5;
    early.valves = vec![1];
    assert_eq!(rig.cmd(AppCommand::SaveTask(early), 0), Ok(CommandReply::Done));
    assert_eq!(rig.cmd(AppCommand::ScheduleTask(id), 0), Ok(CommandReply::Done));

    assert_eq!(rig.app.current_task(), Some(1));
    assert_eq!(rig.valve(0), Some(ValveStatus::Operating));
    assert_eq!(rig.valve(1), Some(ValveStatus::Available));

    assert_eq!(rig.tick(5_000), ScheduleOutcome::Operating);
    assert_eq!(rig.app.current_task(), Some(1));
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::Idle);

    rig.tick(9_000);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::ArgonFlush);
    assert!(rig.sink.contains(&AppEvent::RunStarted {
        task: 1,
        valve: Some(0)
    }));
    assert_eq!(rig.app.current_task(), Some(1));
}

#[test]
fn active_task_without_valves_never_runs() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[])], true);
    assert_eq!(rig.tick(0), ScheduleOutcome::Unavailable);
    assert_eq!(rig.task(1).status, TaskStatus::Completed);
    assert_eq!(rig.app.pending_actions(), 0);
    rig.tick(5_000);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::Idle);
    assert_eq!(rig.hw.pump(), None);
}

#[test]
fn executing_task_cannot_be_edited_or_removed() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[3])], false);
    start_run(&mut rig);
    let task = rig.task(1).clone();
    assert_eq!(
        rig.cmd(AppCommand::SaveTask(task), 6_000),
        Err(CommandError::Invalid(ValidationError::TaskExecuting(1)))
    );
    assert_eq!(
        rig.cmd(AppCommand::UnscheduleTask(1), 6_000),
        Err(CommandError::Invalid(ValidationError::TaskExecuting(1)))
    );
    assert_eq!(
        rig.cmd(AppCommand::DeleteTask(1), 6_000),
        Err(CommandError::Invalid(ValidationError::TaskExecuting(1)))
    );
}

#[test]
fn operating_valve_status_is_locked() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[3])], true);
    rig.tick(0);
    assert_eq!(
        rig.cmd(AppCommand::SetValveStatus { id: 3, status: ValveStatus::Available }, 0),
        Err(CommandError::Invalid(ValidationError::ValveOperating(3)))
    );
    assert_eq!(
        rig.cmd(AppCommand::SetValveStatus { id: 1, status: ValveStatus::Operating }, 0),
        Err(CommandError::Invalid(ValidationError::ValveOperating(1)))
    );
    assert_eq!(
        rig.cmd(AppCommand::SetValveStatus { id: 1, status: ValveStatus::Unavailable }, 0),
        Ok(CommandReply::Done)
    );
    assert_eq!(rig.storage.json("valves/1.json").unwrap()["status"], "unavailable");
}

// ── Maintenance procedures ────────────────────────────────────

#[test]
fn maintenance_procedures_require_maintenance_mode() {
    let mut rig = Rig::new(Vec::new(), false);
    assert_eq!(
        rig.cmd(AppCommand::BeginHyperFlush, 0),
        Err(CommandError::MaintenanceModeRequired)
    );
    assert_eq!(rig.cmd(AppCommand::BeginPrefill, 0), Err(CommandError::MaintenanceModeRequired));
    assert_eq!(rig.app.state(ControllerKind::HyperFlush), StateId::Idle);
}

#[test]
fn hyperflush_walks_every_offshoot() {
    let mut rig = Rig::new(Vec::new(), false);
    assert_eq!(rig.cmd(AppCommand::SetMaintenanceMode(true), 0), Ok(CommandReply::Done));
    assert_eq!(rig.cmd(AppCommand::BeginHyperFlush, 0), Ok(CommandReply::Done));
    assert_eq!(rig.app.state(ControllerKind::HyperFlush), StateId::Flush);
    assert_eq!(rig.cmd(AppCommand::BeginPrefill, 0), Err(CommandError::ProcedureBusy));
    assert_eq!(
        rig.cmd(AppCommand::SetMaintenanceMode(false), 0),
        Err(CommandError::ProcedureBusy)
    );

    let mut visited = Vec::new();
    for ms in (1_000..=70_000).step_by(1_000) {
        rig.tick(ms);
        for pin in rig.hw.latched() {
            if pin >= valve_pin(0) && !visited.contains(&pin) {
                visited.push(pin);
            }
        }
    }
    assert_eq!(rig.app.state(ControllerKind::HyperFlush), StateId::Idle);
    assert_eq!(visited, (0..6).map(valve_pin).collect::<Vec<_>>());
    assert_eq!(rig.power.power_offs, 0);

    assert_eq!(rig.cmd(AppCommand::SetMaintenanceMode(false), 71_000), Ok(CommandReply::Done));
    rig.tick(72_000);
    assert_eq!(rig.power.power_offs, 1);
}

#[test]
fn due_task_preempts_prefill() {
    let mut rig = Rig::new(vec![active(1, NOW + 5, &[3])], true);
    assert_eq!(rig.cmd(AppCommand::BeginPrefill, 0), Ok(CommandReply::Done));
    assert_eq!(rig.app.state(ControllerKind::Prefill), StateId::BagPrefill);

    rig.tick(1_000);
    assert_eq!(rig.app.current_task(), Some(1));
    rig.tick(5_000);
    assert_eq!(rig.app.state(ControllerKind::Prefill), StateId::Idle);
    assert_eq!(rig.app.state(ControllerKind::Sampling), StateId::ArgonFlush);
}
