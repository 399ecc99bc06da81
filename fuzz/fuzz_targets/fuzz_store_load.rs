//! Fuzz target: task and valve files read at boot
//!
//! Plants arbitrary bytes as one task file and one valve file and loads
//! both stores, verifying:
//! - No panics on malformed, truncated or hostile JSON
//! - A decoded valve never lands outside the manifold
//! - A decoded valve group never exceeds its fixed slot
//!
//! cargo fuzz run fuzz_store_load

#![no_main]

use libfuzzer_sys::fuzz_target;
use sampler::adapters::memory_store::MemoryStore;
use sampler::app::ports::StoragePort;
use sampler::pins::MAX_VALVES;
use sampler::store::task::TaskStore;
use sampler::store::valve::{GROUP_LENGTH, ValveStore};

fuzz_target!(|data: &[u8]| {
    let mut storage = MemoryStore::new();
    let split = data.first().map_or(0, |&b| b as usize).min(data.len());
    let (task_bytes, valve_bytes) = data.split_at(split);
    let _ = storage.write("tasks/1.json", task_bytes);
    let _ = storage.write("valves/0.json", valve_bytes);

    let tasks = TaskStore::load_from_directory(&storage, "tasks").expect("listing never fails");
    assert!(tasks.len() <= 1);

    let valves = ValveStore::load_from_directory(&storage, "valves").expect("listing never fails");
    for valve in valves.iter() {
        assert!((valve.id as usize) < MAX_VALVES, "valve {} outside manifold", valve.id);
        assert!(valve.group.len() <= GROUP_LENGTH);
    }
});
