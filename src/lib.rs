//! Modbus TCP master for a single slave device.
//!
//! Connects to the slave, polls its 30-register holding block on a fixed
//! interval and publishes the decoded firmware build, supply voltages and
//! diagnostic flags through a watch channel.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, OutputFormat};
pub use devices::{SlaveData, SlaveDevice};
pub use modbus::{ClientFactory, RegisterClient, TcpRegisterClient};
pub use output::{ConsoleFormatter, JsonFormatter, SnapshotFormatter};
pub use services::{ConnectionStatus, DeviceSnapshot, SlaveCommand, SlaveService};
pub use utils::error::ModbusError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
