use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Device exception response: {0}")]
    DeviceException(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Not connected to slave")]
    NotConnected,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Where a failure surfaced in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport or protocol failure while establishing the session.
    Connect,
    /// Failure of a block read on an established session.
    Read,
    /// The transport returned a block that cannot be decoded.
    Decode,
    /// Not a device failure (bad configuration, serialization).
    Local,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connect => write!(f, "connect failure"),
            FailureKind::Read => write!(f, "read failure"),
            FailureKind::Decode => write!(f, "decode failure"),
            FailureKind::Local => write!(f, "local failure"),
        }
    }
}

impl ModbusError {
    /// Classifies the error. Timeouts are attributed to the caller's phase,
    /// so `during_connect` decides between a connect and a read failure.
    pub fn kind(&self, during_connect: bool) -> FailureKind {
        match self {
            ModbusError::InvalidData(_) => FailureKind::Decode,
            ModbusError::ConfigError(_) | ModbusError::SerializationError(_) => FailureKind::Local,
            ModbusError::ConnectionError(_) => FailureKind::Connect,
            _ if during_connect => FailureKind::Connect,
            _ => FailureKind::Read,
        }
    }
}

impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        ModbusError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::ConfigError(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for ModbusError {
    fn from(err: toml::ser::Error) -> Self {
        ModbusError::SerializationError(format!("TOML error: {}", err))
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::CommunicationError(format!("IO error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for ModbusError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ModbusError::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_classification() {
        assert_eq!(ModbusError::Timeout.kind(true), FailureKind::Connect);
        assert_eq!(ModbusError::Timeout.kind(false), FailureKind::Read);
        assert_eq!(
            ModbusError::InvalidData("short".to_string()).kind(false),
            FailureKind::Decode
        );
        assert_eq!(
            ModbusError::ConnectionError("refused".to_string()).kind(false),
            FailureKind::Connect
        );
        assert_eq!(
            ModbusError::ConfigError("bad".to_string()).kind(true),
            FailureKind::Local
        );
    }
}
