pub mod slave;
pub mod voltage;

pub use slave::{DiagFlagViews, SlaveData, SlaveDevice};
pub use voltage::{AdcCalibration, DividerPair};
