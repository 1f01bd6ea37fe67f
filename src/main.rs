use anyhow::Result;
use log::error;

use modbus_master::cli::{build_cli, handle_subcommands, log_builder};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    log_builder(matches.get_one::<String>("log-level").map(String::as_str)).init();

    match handle_subcommands(&matches).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("❌ {}", e);
            Err(e)
        }
    }
}
