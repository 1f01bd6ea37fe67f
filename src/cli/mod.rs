pub mod commands;

pub use commands::{build_cli, handle_subcommands, log_builder};
