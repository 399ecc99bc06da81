//! Fuzz target: `SystemConfig` load
//!
//! Whatever is stored at the config path, `load_or_default` must return
//! a configuration that passes its own validation.
//!
//! cargo fuzz run fuzz_config_load

#![no_main]

use libfuzzer_sys::fuzz_target;
use sampler::adapters::memory_store::MemoryStore;
use sampler::app::ports::StoragePort;
use sampler::config::{CONFIG_PATH, SystemConfig};

fuzz_target!(|data: &[u8]| {
    let mut storage = MemoryStore::new();
    let _ = storage.write(CONFIG_PATH, data);
    let config = SystemConfig::load_or_default(&storage);
    assert!(config.validate().is_ok(), "loaded config fails validation");
});
