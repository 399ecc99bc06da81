//! Shift-register output map.
//!
//! The TPIC6B595 chain drives every solenoid on the manifold.  Register 0
//! holds the fixed devices; valve `n` lives on output `n + 8`, i.e. the
//! first register is skipped.
//!
//! ```text
//!  register 0            register 1..=3
//! ┌─────────────────┐   ┌─────────────────────────────┐
//! │ 0 FLUSH_VALVE   │   │ 8  valve 0                   │
//! │ 1 INTAKE_OPEN   │   │ 9  valve 1                   │
//! │ 2 INTAKE_CLOSE  │   │ …                            │
//! │ 3 AIR_VALVE     │   │ 31 valve 23                  │
//! │ 4..7 spare      │   │                              │
//! └─────────────────┘   └─────────────────────────────┘
//! ```

use crate::store::valve::ValveId;

/// Outputs per shift register.
pub const CAPACITY_PER_REGISTER: u8 = 8;

/// Registers in the chain.
pub const NUMBER_OF_REGISTERS: usize = 4;

/// Total addressable outputs.
pub const TOTAL_OUTPUTS: u8 = CAPACITY_PER_REGISTER * NUMBER_OF_REGISTERS as u8;

/// Main-line flush solenoid.
pub const FLUSH_VALVE: u8 = 0;

/// Intake ball-valve motor, open coil.
pub const INTAKE_OPEN: u8 = 1;

/// Intake ball-valve motor, close coil.
pub const INTAKE_CLOSE: u8 = 2;

/// Air purge solenoid.
pub const AIR_VALVE: u8 = 3;

/// Number of sample valves the manifold can address.
pub const MAX_VALVES: usize = (TOTAL_OUTPUTS - CAPACITY_PER_REGISTER) as usize;

/// Output pin for a sample valve.
pub const fn valve_pin(id: ValveId) -> u8 {
    id + CAPACITY_PER_REGISTER
}
