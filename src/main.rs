//! # DS4 Bridge
//!
//! Use a DualShock 4 as an Xbox 360 (XInput) controller.
//!
//! ```text
//! ds4-bridge [CONFIG]
//! ds4-bridge --help
//! ```
//!
//! Console commands (one per line on stdin):
//!
//! | Command | Effect |
//! |---------|--------|
//! | `calibrate` | Start stick calibration |
//! | `stop` | Finish calibration |
//! | `clear-drift` | Re-run the drift check |
//! | `drift on` / `drift off` | Toggle drift detection |

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ds4_bridge::bridge::{Bridge, BridgeCommand};
use ds4_bridge::config::{Config, LoggingConfig};
use ds4_bridge::hid::Ds4Device;
use ds4_bridge::output::TracingSink;
use ds4_bridge::telemetry::EventLogger;
use ds4_bridge::translator::Translator;

/// Queued console commands before the bridge picks them up
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Daily log file name prefix
const LOG_FILE_PREFIX: &str = "ds4-bridge.log";

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "ds4-bridge")]
#[command(about = "Use a DualShock 4 as an XInput controller", long_about = None)]
#[command(version)]
struct Args {
    /// TOML config file (built-in defaults when omitted)
    config: Option<PathBuf>,
}

/// Main entry point for DS4 Bridge
///
/// # Control Flow
///
/// 1. Load configuration (defaults when no path is given) and set up logging
/// 2. Spawn the console command reader
/// 3. Open the controller and run the bridge until the controller is lost
/// 4. Wait `reconnect_interval_ms` and reopen, keeping calibration state
/// 5. Exit on Ctrl+C
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let _log_guard = init_logging(&config.logging)?;

    info!("DS4 Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let (tx, mut commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    tokio::spawn(read_commands(tx));

    let mut translator = Translator::from_config(&config);
    let mut sink = TracingSink::new();
    let mut telemetry = if config.telemetry.enabled {
        Some(EventLogger::new(&config.telemetry).context("Failed to set up event telemetry")?)
    } else {
        None
    };

    let read_timeout = Duration::from_millis(config.controller.read_timeout_ms);
    let reconnect_delay = Duration::from_millis(config.controller.reconnect_interval_ms);

    info!("Press Ctrl+C to exit");

    loop {
        let opened = tokio::select! {
            result = Ds4Device::open(&config.controller) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        };

        match opened {
            Ok(device) => {
                info!("Controller connected at {}", device.path());

                let mut bridge = Bridge::new(device, sink, translator, read_timeout);
                if let Some(logger) = telemetry.take() {
                    bridge = bridge.with_telemetry(logger);
                }

                let result = bridge.run(&mut commands, shutdown_signal()).await;
                let stats = bridge.stats();
                (sink, translator, telemetry) = bridge.into_parts();
                info!(
                    "Session ended: {} reports read, {} forwarded, {} send failures",
                    stats.reports_read, stats.reports_forwarded, stats.send_failures
                );

                match result {
                    Ok(()) => break,
                    Err(e) => warn!("Controller lost: {}", e),
                }
            }
            Err(e) => warn!("{}", e),
        }

        info!("Reconnecting in {:?}", reconnect_delay);
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    info!("Total reports forwarded: {}", sink.sent());
    Ok(())
}

/// Load the config file named on the command line, or the defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Console output, plus a daily rolling file when `log_dir` is set
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the program.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer();

    if config.log_dir.is_empty() {
        tracing_subscriber::registry().with(filter).with(console).init();
        return Ok(None);
    }

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory {}", config.log_dir))?;
    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(Some(guard))
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}

/// Forward console commands to the bridge until stdin closes
async fn read_commands(tx: mpsc::Sender<BridgeCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match BridgeCommand::parse(line) {
            Some(command) => {
                if tx.send(command).await.is_err() {
                    break;
                }
            }
            None => warn!(
                "Unknown command '{}' (expected: calibrate, stop, clear-drift, drift on, drift off)",
                line
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config.controller.reconnect_interval_ms, 3000);
        assert!(config.logging.log_dir.is_empty());
    }

    #[test]
    fn test_load_config_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[controller]\nread_timeout_ms = 250\n").unwrap();
        file.flush().unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.controller.read_timeout_ms, 250);
    }

    #[test]
    fn test_load_config_reports_path() {
        let err = load_config(Some(Path::new("/nonexistent/ds4.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ds4.toml"));
    }

    // ==================== Argument Tests ====================

    #[test]
    fn test_args_without_config() {
        let args = Args::try_parse_from(["ds4-bridge"]).unwrap();
        assert!(args.config.is_none());
    }

    #[test]
    fn test_args_with_config_path() {
        let args = Args::try_parse_from(["ds4-bridge", "config/default.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("config/default.toml")));
    }

    #[test]
    fn test_args_reject_extra_positional() {
        assert!(Args::try_parse_from(["ds4-bridge", "a.toml", "b.toml"]).is_err());
    }

    #[test]
    fn test_args_version_flag() {
        let err = Args::try_parse_from(["ds4-bridge", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_args_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
