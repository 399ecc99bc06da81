//! Reversible pump motor driver (two-input H-bridge).
//!
//! | IN1 | IN2 | motor   |
//! |-----|-----|---------|
//! |  1  |  0  | normal  |
//! |  0  |  1  | reverse |
//! |  0  |  0  | coast   |
//!
//! The bridge is never driven with both inputs high.

use embedded_hal::digital::OutputPin;
use log::debug;

use super::shift_register::drive;
use crate::app::ports::PumpDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Stopped,
    Running(PumpDirection),
}

pub struct Pump<A, B> {
    in1: A,
    in2: B,
    state: PumpState,
}

impl<A: OutputPin, B: OutputPin> Pump<A, B> {
    pub fn new(in1: A, in2: B) -> Self {
        let mut pump = Self {
            in1,
            in2,
            state: PumpState::Stopped,
        };
        pump.off();
        pump
    }

    pub fn on(&mut self, direction: PumpDirection) {
        // Drop both inputs first so a direction change never shorts the bridge.
        drive(&mut self.in1, false, "pump in1");
        drive(&mut self.in2, false, "pump in2");
        match direction {
            PumpDirection::Normal => drive(&mut self.in1, true, "pump in1"),
            PumpDirection::Reverse => drive(&mut self.in2, true, "pump in2"),
        }
        self.state = PumpState::Running(direction);
        debug!("Pump on ({:?})", direction);
    }

    pub fn off(&mut self) {
        drive(&mut self.in1, false, "pump in1");
        drive(&mut self.in2, false, "pump in2");
        self.state = PumpState::Stopped;
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, PumpState::Stopped)
    }
}
