pub mod client;
pub mod protocol;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{ClientFactory, RegisterClient, TcpClientFactory, TcpRegisterClient};
pub use protocol::{RegisterBlock, MODBUS_TCP_PORT};
