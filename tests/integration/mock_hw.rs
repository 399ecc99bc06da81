//! Mock adapters for integration tests.
//!
//! Records every actuator call so tests can assert on the full command
//! history without touching real GPIO.

use sampler::app::events::AppEvent;
use sampler::app::ports::{ActuatorPort, EventSink, PowerPort, PumpDirection, SensorPort};

pub const NOW: i64 = 1_700_000_000;

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    Write(Vec<u8>),
    PumpOn(PumpDirection),
    PumpOff,
    IntakeOn,
    IntakeOff,
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub calls: Vec<ActuatorCall>,
    pub pressure: f32,
    pub temperature: f32,
    pub barometer: bool,
    pub volume: f32,
    pub measuring: bool,
    staged: [bool; 32],
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            pressure: 1.0,
            temperature: 15.0,
            barometer: true,
            volume: 0.0,
            measuring: false,
            staged: [false; 32],
        }
    }

    /// Pins high at the last latch.
    pub fn latched(&self) -> Vec<u8> {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::Write(pins) => Some(pins.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn pump(&self) -> Option<PumpDirection> {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::PumpOn(d) => Some(Some(*d)),
                ActuatorCall::PumpOff => Some(None),
                _ => None,
            })
            .flatten()
    }

    pub fn intake_open(&self) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::IntakeOn => Some(true),
                ActuatorCall::IntakeOff => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for MockHardware {
    fn pressure(&self) -> f32 {
        self.pressure
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn pressure_sensor_enabled(&self) -> bool {
        self.barometer
    }

    fn flow_volume(&self) -> f32 {
        self.volume
    }

    fn reset_flow_volume(&mut self) {
        self.volume = 0.0;
    }

    fn start_flow_measurement(&mut self) {
        self.measuring = true;
    }

    fn stop_flow_measurement(&mut self) {
        self.measuring = false;
    }
}

impl ActuatorPort for MockHardware {
    fn set_pin(&mut self, pin: u8, high: bool) {
        self.staged[pin as usize] = high;
    }

    fn set_all_low(&mut self) {
        self.staged = [false; 32];
    }

    fn write(&mut self) {
        let pins = (0..32u8).filter(|&p| self.staged[p as usize]).collect();
        self.calls.push(ActuatorCall::Write(pins));
    }

    fn write_all_low(&mut self) {
        self.set_all_low();
        self.write();
    }

    fn pump_on(&mut self, direction: PumpDirection) {
        self.calls.push(ActuatorCall::PumpOn(direction));
    }

    fn pump_off(&mut self) {
        self.calls.push(ActuatorCall::PumpOff);
    }

    fn intake_on(&mut self) {
        self.calls.push(ActuatorCall::IntakeOn);
    }

    fn intake_off(&mut self) {
        self.calls.push(ActuatorCall::IntakeOff);
    }
}

// ── MockPower ─────────────────────────────────────────────────

pub struct MockPower {
    pub now: i64,
    pub alarms: Vec<i64>,
    pub power_offs: u32,
}

#[allow(dead_code)]
impl MockPower {
    pub fn new() -> Self {
        Self {
            now: NOW,
            alarms: Vec::new(),
            power_offs: 0,
        }
    }
}

impl PowerPort for MockPower {
    fn now(&self) -> i64 {
        self.now
    }

    fn schedule_alarm(&mut self, at: i64) {
        self.alarms.push(at);
    }

    fn power_off(&mut self) {
        self.power_offs += 1;
    }
}

// ── Event sink ────────────────────────────────────────────────

pub struct LogSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl LogSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
