//! Fixed holding-register layout of the slave.

/// Well-known Modbus TCP port.
pub const MODBUS_TCP_PORT: u16 = 502;

/// Unit identifier the slave answers on.
pub const DEFAULT_UNIT_ID: u8 = 1;

/// First register of the polled block.
pub const BLOCK_START_REGISTER: u16 = 0;

/// Number of registers read on every poll.
pub const BLOCK_REGISTER_COUNT: u16 = 30;

/// Register indexes inside the polled block.
pub mod block_index {
    /// High word of the firmware build number.
    pub const FIRMWARE_BUILD_HIGH: usize = 0;
    /// Low word of the firmware build number.
    pub const FIRMWARE_BUILD_LOW: usize = 1;
    pub const DIAG_FLAGS: usize = 9;
    /// Raw ADC count of the servo supply (divider channel 1).
    pub const SERVO_VOLTAGE_ADC: usize = 10;
    /// Raw ADC count of the actuator supply (divider channel 2).
    pub const ACTUATOR_VOLTAGE_ADC: usize = 21;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBlock {
    pub start_register: u16,
    pub register_count: u16,
}

impl RegisterBlock {
    pub const fn new(start_register: u16, register_count: u16) -> Self {
        Self {
            start_register,
            register_count,
        }
    }
}

impl Default for RegisterBlock {
    fn default() -> Self {
        Self::new(BLOCK_START_REGISTER, BLOCK_REGISTER_COUNT)
    }
}
