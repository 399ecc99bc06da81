//! Actuator drivers over `embedded-hal` output pins.

pub mod pump;
pub mod shift_register;
