//! TPIC6B595 shift-register chain driver.
//!
//! Every solenoid on the manifold hangs off a chain of power shift
//! registers driven by three GPIOs.  Pin levels are staged in a RAM
//! buffer; [`ShiftRegister::write`] clocks the whole chain out and pulses
//! the latch, so all outputs change together.
//!
//! ```text
//!  buffer[3] ─▶ … ─▶ buffer[0]      shifted MSB first, last register first
//!      │
//!  SER ┴─ bit ─┐  SRCK ▔▁▔▁▔▁ …  RCK ▁▁▁▁▔▁
//! ```
//!
//! GPIO errors are logged, not propagated: the actuator port is
//! infallible and a stuck pin shows up in the next write's log.

use embedded_hal::digital::{Error as _, OutputPin};
use log::warn;

use crate::pins::{CAPACITY_PER_REGISTER, NUMBER_OF_REGISTERS, TOTAL_OUTPUTS};

pub struct ShiftRegister<D, C, L> {
    data: D,
    clock: C,
    latch: L,
    buffer: [u8; NUMBER_OF_REGISTERS],
}

impl<D: OutputPin, C: OutputPin, L: OutputPin> ShiftRegister<D, C, L> {
    pub fn new(data: D, clock: C, latch: L) -> Self {
        Self {
            data,
            clock,
            latch,
            buffer: [0; NUMBER_OF_REGISTERS],
        }
    }

    /// Stage one output.  Out-of-range pins are ignored with a warning.
    pub fn set_pin(&mut self, pin: u8, high: bool) {
        if pin >= TOTAL_OUTPUTS {
            warn!("ShiftRegister: pin {} out of range", pin);
            return;
        }
        let register = (pin / CAPACITY_PER_REGISTER) as usize;
        let mask = 1u8 << (pin % CAPACITY_PER_REGISTER);
        if high {
            self.buffer[register] |= mask;
        } else {
            self.buffer[register] &= !mask;
        }
    }

    pub fn set_all_low(&mut self) {
        self.buffer = [0; NUMBER_OF_REGISTERS];
    }

    /// Staged level of one output.
    pub fn pin(&self, pin: u8) -> bool {
        let register = (pin / CAPACITY_PER_REGISTER) as usize;
        self.buffer
            .get(register)
            .is_some_and(|b| b & (1 << (pin % CAPACITY_PER_REGISTER)) != 0)
    }

    /// Clock the staged buffer out and latch it.
    pub fn write(&mut self) {
        drive(&mut self.latch, false, "latch");
        for register in (0..NUMBER_OF_REGISTERS).rev() {
            let byte = self.buffer[register];
            for bit in (0..CAPACITY_PER_REGISTER).rev() {
                drive(&mut self.data, byte & (1 << bit) != 0, "data");
                drive(&mut self.clock, true, "clock");
                drive(&mut self.clock, false, "clock");
            }
        }
        drive(&mut self.latch, true, "latch");
        drive(&mut self.latch, false, "latch");
    }

    pub fn write_all_low(&mut self) {
        self.set_all_low();
        self.write();
    }
}

pub(crate) fn drive<P: OutputPin>(pin: &mut P, high: bool, name: &str) {
    let result = if high { pin.set_high() } else { pin.set_low() };
    if let Err(e) = result {
        warn!("GPIO {} write failed: {:?}", name, e.kind());
    }
}
