//! System configuration parameters
//!
//! All tunable parameters for the sampler.  Loaded once at boot from
//! `config.json` on the storage medium; defaults apply on first boot.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConfigError, StorageError, StoragePort};
use crate::store::task::TaskParams;

/// Path of the configuration blob on the storage medium.
pub const CONFIG_PATH: &str = "config.json";

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Persistence ---
    /// Directory holding one JSON file per valve
    pub valve_folder: String,
    /// Directory holding one JSON file per task
    pub task_folder: String,

    // --- Power ---
    /// Keep the device awake regardless of task state (bench / field service)
    pub maintenance_mode: bool,

    // --- Timing ---
    /// Control loop interval (milliseconds)
    pub control_tick_ms: u32,

    // --- Fixed procedure durations (seconds) ---
    /// Reverse-pump argon purge before each sample
    pub argon_flush_secs: u32,
    /// Air purge after each sample
    pub air_flush_secs: u32,
    /// Hyper-flush: main line flush
    pub hyperflush_flush_secs: u32,
    /// Hyper-flush: per-valve offshoot clean dwell
    pub hyperflush_clean_secs: u32,
    /// Hyper-flush: per-valve offshoot preload dwell
    pub hyperflush_preload_secs: u32,
    /// Bag prefill: per-valve dwell
    pub prefill_secs: u32,

    // --- New tasks ---
    /// Parameters given to freshly created tasks
    pub default_task_params: TaskParams,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            valve_folder: String::from("valves"),
            task_folder: String::from("tasks"),

            maintenance_mode: false,

            control_tick_ms: 100, // 10 Hz

            argon_flush_secs: 10,
            air_flush_secs: 15,
            hyperflush_flush_secs: 5,
            hyperflush_clean_secs: 5,
            hyperflush_preload_secs: 5,
            prefill_secs: 5,

            default_task_params: TaskParams::default(),
        }
    }
}

impl SystemConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.valve_folder.is_empty() || self.task_folder.is_empty() {
            return Err(ConfigError::ValidationFailed("storage folders must be non-empty"));
        }
        if self.valve_folder == self.task_folder {
            return Err(ConfigError::ValidationFailed(
                "valve_folder and task_folder must differ",
            ));
        }
        if !(10..=1000).contains(&self.control_tick_ms) {
            return Err(ConfigError::ValidationFailed("control_tick_ms must be 10–1000"));
        }
        for (secs, msg) in [
            (self.argon_flush_secs, "argon_flush_secs must be 1–3600"),
            (self.air_flush_secs, "air_flush_secs must be 1–3600"),
            (self.hyperflush_flush_secs, "hyperflush_flush_secs must be 1–3600"),
            (self.hyperflush_clean_secs, "hyperflush_clean_secs must be 1–3600"),
            (self.hyperflush_preload_secs, "hyperflush_preload_secs must be 1–3600"),
            (self.prefill_secs, "prefill_secs must be 1–3600"),
        ] {
            if !(1..=3600).contains(&secs) {
                return Err(ConfigError::ValidationFailed(msg));
            }
        }
        self.default_task_params.validate()
    }

    /// Load and validate the stored configuration.
    pub fn load(storage: &impl StoragePort) -> Result<Self, ConfigError> {
        let bytes = storage.read(CONFIG_PATH).map_err(|e| match e {
            StorageError::NotFound => ConfigError::NotFound,
            _ => ConfigError::Corrupted,
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the stored configuration, falling back to defaults on any failure.
    pub fn load_or_default(storage: &impl StoragePort) -> Self {
        match Self::load(storage) {
            Ok(config) => {
                info!("Config loaded from {}", CONFIG_PATH);
                config
            }
            Err(ConfigError::NotFound) => {
                info!("No stored config, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!("Config load failed ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Validate and persist.
    pub fn save(&self, storage: &mut impl StoragePort) -> crate::error::Result<()> {
        self.validate()?;
        let bytes = serde_json::to_vec_pretty(self)?;
        storage.write(CONFIG_PATH, &bytes)?;
        Ok(())
    }
}
