pub mod commands;
pub mod device_state;
pub mod poller;
pub mod session;
pub mod slave_service;

pub use commands::{SlaveCommand, COMMAND_HELP};
pub use device_state::{ConnectionStatus, DeviceSnapshot, DeviceState};
pub use poller::{Poller, TickOutcome};
pub use session::{ActiveLink, MotionCommand, Session, SessionSettings};
pub use slave_service::SlaveService;
