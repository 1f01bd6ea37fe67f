use std::fmt;
use std::str::FromStr;

use crate::utils::error::ModbusError;

/// Commands a consumer may issue to the slave service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlaveCommand {
    Connect,
    Disconnect,
    Cancel,
    /// The operator panel's single button: disconnect when connected,
    /// cancel while connecting, connect otherwise.
    Toggle,
    SetAddress(String),
    AcknowledgeFailure,
    Raise,
    Lower,
    Status,
    Quit,
}

pub const COMMAND_HELP: &str = "\
Commands:
  connect | c          connect to the slave
  disconnect | d       close the session
  cancel               abort a pending connect
  toggle | t           connect / cancel / disconnect depending on state
  address <host>       set the slave address used by the next connect
  ack                  dismiss the connect-failure notice
  up | down            motion requests
  status | s           print the current state
  help | ?             this text
  quit | q             disconnect and exit";

impl FromStr for SlaveCommand {
    type Err = ModbusError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| ModbusError::InvalidData("Empty command".to_string()))?
            .to_lowercase();

        let command = match verb.as_str() {
            "connect" | "c" => SlaveCommand::Connect,
            "disconnect" | "d" => SlaveCommand::Disconnect,
            "cancel" => SlaveCommand::Cancel,
            "toggle" | "t" => SlaveCommand::Toggle,
            "address" | "ip" => {
                let address = parts.next().ok_or_else(|| {
                    ModbusError::InvalidData("Usage: address <host>".to_string())
                })?;
                SlaveCommand::SetAddress(address.to_string())
            }
            "ack" | "ok" => SlaveCommand::AcknowledgeFailure,
            "up" | "raise" => SlaveCommand::Raise,
            "down" | "lower" => SlaveCommand::Lower,
            "status" | "s" => SlaveCommand::Status,
            "quit" | "q" | "exit" => SlaveCommand::Quit,
            other => {
                return Err(ModbusError::InvalidData(format!("Unknown command '{}'", other)))
            }
        };

        if parts.next().is_some() {
            return Err(ModbusError::InvalidData(format!(
                "Too many arguments for '{}'",
                verb
            )));
        }

        Ok(command)
    }
}

impl fmt::Display for SlaveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlaveCommand::Connect => write!(f, "connect"),
            SlaveCommand::Disconnect => write!(f, "disconnect"),
            SlaveCommand::Cancel => write!(f, "cancel"),
            SlaveCommand::Toggle => write!(f, "toggle"),
            SlaveCommand::SetAddress(address) => write!(f, "address {}", address),
            SlaveCommand::AcknowledgeFailure => write!(f, "ack"),
            SlaveCommand::Raise => write!(f, "up"),
            SlaveCommand::Lower => write!(f, "down"),
            SlaveCommand::Status => write!(f, "status"),
            SlaveCommand::Quit => write!(f, "quit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbs_and_aliases() {
        assert_eq!("connect".parse::<SlaveCommand>().unwrap(), SlaveCommand::Connect);
        assert_eq!("  D ".parse::<SlaveCommand>().unwrap(), SlaveCommand::Disconnect);
        assert_eq!("t".parse::<SlaveCommand>().unwrap(), SlaveCommand::Toggle);
        assert_eq!("up".parse::<SlaveCommand>().unwrap(), SlaveCommand::Raise);
        assert_eq!("lower".parse::<SlaveCommand>().unwrap(), SlaveCommand::Lower);
        assert_eq!("ack".parse::<SlaveCommand>().unwrap(), SlaveCommand::AcknowledgeFailure);
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            "address 10.0.0.7".parse::<SlaveCommand>().unwrap(),
            SlaveCommand::SetAddress("10.0.0.7".to_string())
        );
        assert!("address".parse::<SlaveCommand>().is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<SlaveCommand>().is_err());
        assert!("reboot".parse::<SlaveCommand>().is_err());
        assert!("connect now".parse::<SlaveCommand>().is_err());
    }
}
