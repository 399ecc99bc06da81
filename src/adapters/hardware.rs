//! Hardware adapter: bridges the real peripherals to the domain port traits.
//!
//! Owns the shift-register chain, the pump bridge and the sensor array,
//! exposing them through [`SensorPort`] and [`ActuatorPort`].  This is
//! the only module in the system that touches actual hardware.

use embedded_hal::digital::OutputPin;
use log::debug;

use crate::app::ports::{ActuatorPort, PumpDirection, SensorPort};
use crate::drivers::pump::Pump;
use crate::drivers::shift_register::ShiftRegister;
use crate::pins::{INTAKE_CLOSE, INTAKE_OPEN};
use crate::sensors::SensorArray;

/// Concrete adapter that combines all hardware behind port traits.
///
/// `D`/`C`/`L` are the shift-register data, clock and latch lines;
/// `A`/`B` the two pump bridge inputs.
pub struct HardwareAdapter<D, C, L, A, B> {
    outputs: ShiftRegister<D, C, L>,
    pump: Pump<A, B>,
    sensors: SensorArray,
    intake_open: bool,
}

impl<D, C, L, A, B> HardwareAdapter<D, C, L, A, B>
where
    D: OutputPin,
    C: OutputPin,
    L: OutputPin,
    A: OutputPin,
    B: OutputPin,
{
    pub fn new(outputs: ShiftRegister<D, C, L>, pump: Pump<A, B>, sensors: SensorArray) -> Self {
        Self {
            outputs,
            pump,
            sensors,
            intake_open: false,
        }
    }

    pub fn sensors_mut(&mut self) -> &mut SensorArray {
        &mut self.sensors
    }

    pub fn pump(&self) -> &Pump<A, B> {
        &self.pump
    }

    pub fn is_intake_open(&self) -> bool {
        self.intake_open
    }

    /// Drive the intake ball-valve motor one way.  The motor lines share
    /// the chain with the valves, so the current staging goes out too.
    fn drive_intake(&mut self, open: bool) {
        self.outputs.set_pin(INTAKE_OPEN, open);
        self.outputs.set_pin(INTAKE_CLOSE, !open);
        self.outputs.write();
        self.intake_open = open;
        debug!("Intake {}", if open { "open" } else { "closed" });
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<D, C, L, A, B> SensorPort for HardwareAdapter<D, C, L, A, B> {
    fn pressure(&self) -> f32 {
        self.sensors.pressure()
    }

    fn temperature(&self) -> f32 {
        self.sensors.temperature()
    }

    fn pressure_sensor_enabled(&self) -> bool {
        self.sensors.barometer_enabled()
    }

    fn flow_volume(&self) -> f32 {
        self.sensors.flow.volume()
    }

    fn reset_flow_volume(&mut self) {
        self.sensors.flow.reset();
    }

    fn start_flow_measurement(&mut self) {
        self.sensors.flow.start();
    }

    fn stop_flow_measurement(&mut self) {
        self.sensors.flow.stop();
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<D, C, L, A, B> ActuatorPort for HardwareAdapter<D, C, L, A, B>
where
    D: OutputPin,
    C: OutputPin,
    L: OutputPin,
    A: OutputPin,
    B: OutputPin,
{
    fn set_pin(&mut self, pin: u8, high: bool) {
        self.outputs.set_pin(pin, high);
    }

    fn set_all_low(&mut self) {
        self.outputs.set_all_low();
    }

    fn write(&mut self) {
        self.outputs.write();
    }

    fn write_all_low(&mut self) {
        self.outputs.write_all_low();
    }

    fn pump_on(&mut self, direction: PumpDirection) {
        self.pump.on(direction);
    }

    fn pump_off(&mut self) {
        self.pump.off();
    }

    fn intake_on(&mut self) {
        self.drive_intake(true);
    }

    fn intake_off(&mut self) {
        self.drive_intake(false);
    }
}
