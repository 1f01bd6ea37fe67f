use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::voltage::{AdcCalibration, DividerPair, ACTUATOR_DIVIDER, SERVO_DIVIDER, SLAVE_ADC};
use crate::modbus::client::RegisterClient;
use crate::modbus::protocol::{block_index, RegisterBlock};
use crate::utils::error::ModbusError;

/// Register map and calibration of the servo/actuator slave.
#[derive(Debug, Clone)]
pub struct SlaveDevice {
    pub block: RegisterBlock,
    pub adc: AdcCalibration,
    pub servo_divider: DividerPair,
    pub actuator_divider: DividerPair,
}

impl Default for SlaveDevice {
    fn default() -> Self {
        Self {
            block: RegisterBlock::default(),
            adc: SLAVE_ADC,
            servo_divider: SERVO_DIVIDER,
            actuator_divider: ACTUATOR_DIVIDER,
        }
    }
}

/// Decoded quantities of one register block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaveData {
    pub firmware_build: u32,
    pub diag_flags: u16,
    pub servo_voltage: f64,
    pub actuator_voltage: f64,
}

/// Derived views of the diagnostic word as the operator panel shows them.
///
/// These reproduce the panel's arithmetic literally. `servo_voltage` equals
/// `all`, and the two shifted views overlap bit ranges; the real sub-field
/// layout of the diagnostic word is unknown, so do not "fix" these without
/// the firmware's register documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagFlagViews {
    pub all: u16,
    pub servo_voltage: u16,
    pub actuator_voltage: u16,
    pub servo_status: u16,
}

impl DiagFlagViews {
    pub fn from_flags(flags: u16) -> Self {
        Self {
            all: flags,
            servo_voltage: flags,
            actuator_voltage: flags >> 4,
            servo_status: flags >> 2,
        }
    }
}

impl fmt::Display for DiagFlagViews {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "All: 0x{:08x}", self.all)?;
        writeln!(f, "Servo Voltage: 0x{:02x}", self.servo_voltage)?;
        writeln!(f, "Actuator Voltage: 0x{:02x}", self.actuator_voltage)?;
        write!(f, "Servo Status: 0x{:02x}", self.servo_status)
    }
}

impl SlaveData {
    pub fn diag_views(&self) -> DiagFlagViews {
        DiagFlagViews::from_flags(self.diag_flags)
    }

    /// Firmware build as the 8-digit, zero-padded decimal the panel shows.
    pub fn firmware_label(&self) -> String {
        format!("{:08}", self.firmware_build)
    }

    pub fn get_all_parameters(&self) -> Vec<(String, String)> {
        vec![
            ("FirmwareBuild".to_string(), self.firmware_label()),
            ("ServoPower".to_string(), format!("{:.2} Volts", self.servo_voltage)),
            ("ActuatorPower".to_string(), format!("{:.2} Volts", self.actuator_voltage)),
            ("DiagFlags".to_string(), format!("0x{:08x}", self.diag_flags)),
        ]
    }
}

/// Two consecutive registers as one 32-bit value, high word first.
pub fn compose_u32(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) + u32::from(low)
}

impl SlaveDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read_data(&self, client: &dyn RegisterClient) -> Result<SlaveData, ModbusError> {
        let registers = client
            .read_holding_registers(self.block.start_register, self.block.register_count)
            .await?;
        self.parse_registers(&registers)
    }

    /// Decodes a full block. Short blocks are rejected whole, never partially applied.
    pub fn parse_registers(&self, registers: &[u16]) -> Result<SlaveData, ModbusError> {
        let expected = self.block.register_count as usize;
        if registers.len() < expected {
            error!(
                "Insufficient register block: got {} of {} registers",
                registers.len(),
                expected
            );
            return Err(ModbusError::InvalidData(format!(
                "Insufficient register block: {} of {} registers",
                registers.len(),
                expected
            )));
        }

        debug!("Raw block: {}", hex_dump(registers));

        let word = |index: usize| -> Result<u16, ModbusError> {
            registers.get(index).copied().ok_or_else(|| {
                ModbusError::InvalidData(format!("Register index {} outside of block", index))
            })
        };

        let firmware_build = compose_u32(
            word(block_index::FIRMWARE_BUILD_HIGH)?,
            word(block_index::FIRMWARE_BUILD_LOW)?,
        );
        let diag_flags = word(block_index::DIAG_FLAGS)?;
        let servo_voltage = self
            .adc
            .convert(word(block_index::SERVO_VOLTAGE_ADC)?, self.servo_divider);
        let actuator_voltage = self
            .adc
            .convert(word(block_index::ACTUATOR_VOLTAGE_ADC)?, self.actuator_divider);

        Ok(SlaveData {
            firmware_build,
            diag_flags,
            servo_voltage,
            actuator_voltage,
        })
    }
}

fn hex_dump(registers: &[u16]) -> String {
    let bytes: Vec<u8> = registers.iter().flat_map(|r| r.to_be_bytes()).collect();
    hex::encode(bytes)
}
