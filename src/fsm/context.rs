//! Collaborators and parameters threaded through every procedure handler.
//!
//! `ProcedureContext` borrows exactly what a state may touch: the plant
//! I/O (sensors + actuators) and a read-only view of the valve store for
//! the carousel.  It lives for one controller call; nothing in a state
//! holds onto it across ticks.

use crate::app::ports::{ActuatorPort, SensorPort};
use crate::config::SystemConfig;
use crate::store::task::TaskParams;
use crate::store::valve::{ValveId, ValveStore};

/// Everything a procedure drives or reads on the instrument.
pub trait ProcedureIo: SensorPort + ActuatorPort {}

impl<T: SensorPort + ActuatorPort + ?Sized> ProcedureIo for T {}

/// The shared context passed to every state handler.
pub struct ProcedureContext<'a> {
    pub io: &'a mut dyn ProcedureIo,
    pub valves: &'a ValveStore,
}

impl<'a> ProcedureContext<'a> {
    pub fn new(io: &'a mut dyn ProcedureIo, valves: &'a ValveStore) -> Self {
        Self { io, valves }
    }
}

// ---------------------------------------------------------------------------
// Procedure parameters
// ---------------------------------------------------------------------------

/// Durations and thresholds bound into the states.
///
/// Fixed procedure timings come from [`SystemConfig`]; the flush/sample
/// fields and the target valve are overwritten per task by
/// [`Controller::configure`](super::Controller::configure).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcedureParams {
    pub argon_flush_secs: u32,
    pub flush_secs: u32,
    pub sample_secs: u32,
    pub sample_pressure: f32,
    pub sample_volume: f32,
    pub air_flush_secs: u32,
    pub clean_secs: u32,
    pub preload_secs: u32,
    pub prefill_secs: u32,
    /// Valve the sampling procedure fills.
    pub valve: Option<ValveId>,
}

impl ProcedureParams {
    pub fn from_config(config: &SystemConfig) -> Self {
        let task = config.default_task_params;
        Self {
            argon_flush_secs: config.argon_flush_secs,
            flush_secs: task.flush_secs,
            sample_secs: task.sample_secs,
            sample_pressure: task.sample_pressure,
            sample_volume: task.sample_volume,
            air_flush_secs: config.air_flush_secs,
            clean_secs: config.hyperflush_clean_secs,
            preload_secs: config.hyperflush_preload_secs,
            prefill_secs: config.prefill_secs,
            valve: None,
        }
    }

    /// Bind a task's parameters and target valve.
    pub fn bind_task(&mut self, params: &TaskParams, valve: Option<ValveId>) {
        self.flush_secs = params.flush_secs;
        self.sample_secs = params.sample_secs;
        self.sample_pressure = params.sample_pressure;
        self.sample_volume = params.sample_volume;
        self.valve = valve;
    }
}

pub(crate) const fn secs_to_ms(secs: u32) -> u64 {
    secs as u64 * 1000
}
