//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SamplerService (domain)
//! ```
//!
//! Driven adapters (sensors, actuators, real-time clock, storage, event
//! sinks) implement these traits.  The domain core never touches pins,
//! buses or files directly; every collaborator is handed in at the call
//! site, so the whole service is testable with mock adapters.

use crate::app::events::AppEvent;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Scalar sensor readings consumed by procedure guards.
///
/// Reads are side-effect free: guards evaluate them every tick.
pub trait SensorPort {
    /// Latest line pressure (sensor units; anomaly limit is 20).
    fn pressure(&self) -> f32;

    /// Latest water temperature (°C).
    fn temperature(&self) -> f32;

    /// Whether the barometric sensor is fitted and reporting.  The
    /// low-temperature anomaly only applies when it is.
    fn pressure_sensor_enabled(&self) -> bool;

    /// Volume accumulated since the last reset (mL).
    fn flow_volume(&self) -> f32;

    /// Zero the accumulated flow volume.
    fn reset_flow_volume(&mut self);

    /// Begin accumulating flow pulses into the volume.
    fn start_flow_measurement(&mut self);

    /// Stop accumulating flow pulses.
    fn stop_flow_measurement(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Pump motor direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpDirection {
    /// Draw water in through the intake.
    Normal,
    /// Push back out through the manifold.
    Reverse,
}

/// Write-side port: shift-register outputs, the pump and the intake.
///
/// Pin writes are buffered: `set_pin` / `set_all_low` only stage levels,
/// `write` latches the staged buffer onto the outputs.
pub trait ActuatorPort {
    /// Stage one output pin.
    fn set_pin(&mut self, pin: u8, high: bool);

    /// Stage every output low without latching.
    fn set_all_low(&mut self);

    /// Latch the staged outputs.
    fn write(&mut self);

    /// Stage every output low and latch immediately.
    fn write_all_low(&mut self);

    /// Run the pump in the given direction.
    fn pump_on(&mut self, direction: PumpDirection);

    /// Stop the pump.
    fn pump_off(&mut self);

    /// Open the intake ball valve.
    fn intake_on(&mut self);

    /// Close the intake ball valve.
    fn intake_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Power / RTC port
// ───────────────────────────────────────────────────────────────

/// Real-time clock and power module.
///
/// The RTC alarm interrupt is routed by the board into
/// [`SamplerService::on_alarm`](super::service::SamplerService::on_alarm).
pub trait PowerPort {
    /// Wall-clock time, whole seconds since the Unix epoch.
    fn now(&self) -> i64;

    /// Program the hardware wake alarm for an absolute time.
    fn schedule_alarm(&mut self, at: i64);

    /// Cut power.  On real hardware this never returns.
    fn power_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ SD card / flash)
// ───────────────────────────────────────────────────────────────

/// Path-addressed blob storage for configuration, valves and tasks.
///
/// The domain encodes entities itself; adapters only move bytes.
pub trait StoragePort {
    /// Read the whole blob at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Replace the blob at `path`.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete the blob at `path`.  Returns `Ok(())` even if it didn't exist.
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// Names (not full paths) of the entries directly inside `dir`.
    /// A missing directory lists as empty.
    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from loading or validating [`SystemConfig`](crate::config::SystemConfig).
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested path does not exist.
    NotFound,
    /// Storage medium is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "path not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
