use clap::{value_parser, Arg, ArgMatches, Command};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::output::formatter_for;
use crate::services::{SlaveCommand, SlaveService, COMMAND_HELP};

pub fn build_cli() -> Command {
    Command::new("modbus-master")
        .version(crate::VERSION)
        .about("Polls a Modbus TCP slave and shows its firmware build, supply voltages and diagnostic flags")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .short('a')
                .global(true)
                .help("Slave IP address or host name"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .global(true)
                .value_parser(value_parser!(u16))
                .help("Modbus TCP port"),
        )
        .arg(
            Arg::new("unit-id")
                .long("unit-id")
                .global(true)
                .value_parser(value_parser!(u8))
                .help("Modbus unit identifier"),
        )
        .arg(
            Arg::new("interval-ms")
                .long("interval-ms")
                .short('i')
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Polling interval in milliseconds"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .short('f')
                .global(true)
                .help("Output format: console or json"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help("Log filter (e.g. debug), takes precedence over RUST_LOG"),
        )
        .subcommand(Command::new("monitor").about("Interactive console: connect, poll every interval, show state (default)"))
        .subcommand(Command::new("read").about("Connect, read the register block once and exit"))
        .subcommand(
            Command::new("init-config")
                .about("Write a configuration file with the effective settings")
                .arg(Arg::new("path").required(true).help("Destination TOML file")),
        )
}

/// Logger for the binary. An explicit `--log-level` wins over `RUST_LOG`,
/// which in turn wins over the `info` default.
pub fn log_builder(level: Option<&str>) -> env_logger::Builder {
    match level {
        Some(level) => {
            let mut builder = env_logger::Builder::new();
            builder.parse_filters(level);
            builder
        }
        None => env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")),
    }
}

/// Runs the selected subcommand. Returns the process exit status.
pub async fn handle_subcommands(matches: &ArgMatches) -> anyhow::Result<bool> {
    let config = Config::from_matches(matches)?;

    match matches.subcommand() {
        Some(("init-config", sub)) => {
            let path = sub
                .get_one::<String>("path")
                .ok_or_else(|| anyhow::anyhow!("missing path"))?;
            config.save_to_file(path)?;
            println!("📝 Configuration written to {}", path);
            Ok(true)
        }
        Some(("read", _)) => run_read(config).await,
        _ => run_monitor(config).await,
    }
}

async fn run_read(config: Config) -> anyhow::Result<bool> {
    let formatter = formatter_for(config.output_format);
    let service = SlaveService::with_tcp(config)?;

    match service.read_once().await {
        Ok(data) => {
            println!("{}", formatter.format_readings(&data));
            Ok(true)
        }
        Err(e) => {
            error!("❌ {}", e);
            Ok(false)
        }
    }
}

async fn run_monitor(config: Config) -> anyhow::Result<bool> {
    let formatter = formatter_for(config.output_format);
    let service = Arc::new(SlaveService::with_tcp(config)?);

    println!("🖥️  Modbus Master v{}", crate::VERSION);
    println!("{}", COMMAND_HELP);

    // Renders every published change.
    let mut rx = service.subscribe();
    let render = tokio::spawn(async move {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            println!("{}", formatter.format_snapshot(&snapshot));
            if rx.changed().await.is_err() {
                break;
            }
        }
    });

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let poller = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .run(async move {
                    let _ = stop_rx.await;
                })
                .await;
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Cannot read console input: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                if matches!(line.trim(), "help" | "?") {
                    println!("{}", COMMAND_HELP);
                    continue;
                }

                match line.parse::<SlaveCommand>() {
                    Ok(SlaveCommand::Status) => {
                        println!("{}", formatter_for(service.config().output_format).format_snapshot(&service.snapshot()));
                    }
                    Ok(command) => match service.handle_command(command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => println!("❌ {}", e),
                    },
                    Err(e) => println!("❌ {} (type 'help')", e),
                }
            }
        }
    }

    let _ = stop_tx.send(());
    if let Err(e) = poller.await {
        warn!("Polling task ended abnormally: {}", e);
    }
    render.abort();
    println!("👋 Goodbye!");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;

    #[test]
    fn test_cli_overrides_defaults() {
        let matches = build_cli()
            .try_get_matches_from([
                "modbus-master",
                "--address",
                "10.0.0.42",
                "--interval-ms",
                "500",
                "--format",
                "json",
                "read",
            ])
            .unwrap();

        let config = Config::from_matches(&matches).unwrap();
        assert_eq!(config.ip_address, "10.0.0.42");
        assert_eq!(config.update_interval_ms, 500);
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.port, 502);
        assert_eq!(matches.subcommand_name(), Some("read"));
    }

    #[test]
    fn test_log_level_flag_sets_filter() {
        let matches = build_cli()
            .try_get_matches_from(["modbus-master", "--log-level", "debug"])
            .unwrap();
        let level = matches.get_one::<String>("log-level").map(String::as_str);

        assert_eq!(log_builder(level).build().filter(), log::LevelFilter::Debug);
        assert_eq!(log_builder(Some("warn")).build().filter(), log::LevelFilter::Warn);
    }

    #[test]
    fn test_cli_rejects_bad_port() {
        let result = build_cli().try_get_matches_from(["modbus-master", "--port", "70000"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_zero_interval() {
        let matches = build_cli()
            .try_get_matches_from(["modbus-master", "--interval-ms", "0"])
            .unwrap();
        assert!(Config::from_matches(&matches).is_err());
    }
}
