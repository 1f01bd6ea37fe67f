pub mod settings;

pub use settings::{Config, OutputFormat, DEFAULT_SLAVE_ADDRESS};
