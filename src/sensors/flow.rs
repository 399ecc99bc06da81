//! Hall-effect flow meter on the sample line.
//!
//! An ISR increments an atomic counter on each rising edge.  The meter
//! never resets that counter; it remembers where a measurement window
//! started and converts the delta to millilitres on demand, so reads stay
//! side-effect free.

use core::sync::atomic::{AtomicU32, Ordering};

/// Calibration for the sample-line meter (mL per pulse).
pub const DEFAULT_ML_PER_PULSE: f32 = 2.25;

/// Pulse counter fed by the GPIO ISR.
pub static FLOW_PULSE_COUNT: AtomicU32 = AtomicU32::new(0);

/// Called from the GPIO ISR on each rising edge.
pub fn flow_isr_handler() {
    FLOW_PULSE_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub struct FlowMeter {
    counter: &'static AtomicU32,
    ml_per_pulse: f32,
    /// Volume banked from closed measurement windows.
    banked_ml: f32,
    /// Counter value at the start of the open window.
    window_start: Option<u32>,
}

impl FlowMeter {
    pub fn new(counter: &'static AtomicU32, ml_per_pulse: f32) -> Self {
        Self {
            counter,
            ml_per_pulse,
            banked_ml: 0.0,
            window_start: None,
        }
    }

    fn pulses_since(&self, start: u32) -> u32 {
        self.counter.load(Ordering::Relaxed).wrapping_sub(start)
    }

    /// Accumulated volume (mL), including the open window.
    pub fn volume(&self) -> f32 {
        let open = self
            .window_start
            .map_or(0.0, |start| self.pulses_since(start) as f32 * self.ml_per_pulse);
        self.banked_ml + open
    }

    pub fn reset(&mut self) {
        self.banked_ml = 0.0;
        if self.window_start.is_some() {
            self.window_start = Some(self.counter.load(Ordering::Relaxed));
        }
    }

    pub fn start(&mut self) {
        if self.window_start.is_none() {
            self.window_start = Some(self.counter.load(Ordering::Relaxed));
        }
    }

    pub fn stop(&mut self) {
        if let Some(start) = self.window_start.take() {
            self.banked_ml += self.pulses_since(start) as f32 * self.ml_per_pulse;
        }
    }

    pub fn is_measuring(&self) -> bool {
        self.window_start.is_some()
    }
}
