//! Back-calculation of supply voltages measured through a resistor divider
//! that is loaded by the ADC's finite input impedance.

use serde::Serialize;

/// ADC characteristics of the slave's analog front end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdcCalibration {
    /// Count reported at full scale.
    pub full_scale_count: f64,
    /// Voltage at the ADC pin that produces `full_scale_count`.
    pub full_scale_volt: f64,
    /// Equivalent input resistance of the ADC in Ohms.
    pub input_resistance: f64,
}

/// Top and bottom resistor of a voltage divider, in Ohms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DividerPair {
    pub top: f64,
    pub bottom: f64,
}

impl DividerPair {
    pub const fn new(top: f64, bottom: f64) -> Self {
        Self { top, bottom }
    }
}

pub const SLAVE_ADC: AdcCalibration = AdcCalibration {
    full_scale_count: 1023.0,
    full_scale_volt: 26.4,
    input_resistance: 44_000.0,
};

/// Servo supply divider (V1).
pub const SERVO_DIVIDER: DividerPair = DividerPair::new(33_000.0, 22_000.0);

/// Actuator supply divider (V2).
pub const ACTUATOR_DIVIDER: DividerPair = DividerPair::new(22_000.0, 68_000.0);

impl AdcCalibration {
    /// Voltage present at the ADC pin for a raw count.
    pub fn volt_at_input(&self, raw_count: f64) -> f64 {
        (raw_count / self.full_scale_count) * self.full_scale_volt
    }

    /// Bottom divider resistor in parallel with the ADC input resistance.
    ///
    /// `divider_bottom + input_resistance` is never zero for a valid calibration.
    pub fn loaded_bottom(&self, divider_bottom: f64) -> f64 {
        (divider_bottom * self.input_resistance) / (divider_bottom + self.input_resistance)
    }

    /// Voltage before the divider that produced `raw_count` at the ADC.
    pub fn convert(&self, raw_count: u16, divider: DividerPair) -> f64 {
        let volt_at_input = self.volt_at_input(f64::from(raw_count));
        let parallel_bottom = self.loaded_bottom(divider.bottom);
        volt_at_input * (divider.top + parallel_bottom) / parallel_bottom
    }
}
