//! Sensor subsystem: the flow meter and the latched barometer readings.
//!
//! The barometric sensor sits on a shared bus serviced by board code,
//! which pushes each conversion in with [`SensorArray::update_barometer`].
//! Guards read the latched values every tick.

pub mod flow;

use log::warn;

use flow::FlowMeter;

pub struct SensorArray {
    pub flow: FlowMeter,
    pressure: f32,
    temperature: f32,
    barometer_enabled: bool,
}

impl SensorArray {
    pub fn new(flow: FlowMeter, barometer_enabled: bool) -> Self {
        Self {
            flow,
            pressure: 0.0,
            temperature: 0.0,
            barometer_enabled,
        }
    }

    /// Latch a barometer conversion.  Non-finite readings keep the
    /// previous good value.
    pub fn update_barometer(&mut self, pressure: f32, temperature: f32) {
        if !pressure.is_finite() || !temperature.is_finite() {
            warn!("Barometer returned non-finite reading, keeping last value");
            return;
        }
        self.pressure = pressure;
        self.temperature = temperature;
    }

    pub fn set_barometer_enabled(&mut self, enabled: bool) {
        self.barometer_enabled = enabled;
    }

    pub fn pressure(&self) -> f32 {
        self.pressure
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn barometer_enabled(&self) -> bool {
        self.barometer_enabled
    }
}
