//! sdmsgd: sdmsg housekeeping daemon
//!
//! Usage:
//!   sdmsgd [--config /etc/sdmsg/config.toml] [--once]
//!
//! Runs a housekeeping sweep every `daemon.sweep_interval_secs`, serves
//! Prometheus metrics and health probes on `daemon.metrics_addr`, and exits
//! cleanly on SIGTERM/SIGINT. `--once` runs a single sweep and exits.

mod daemon;
mod metrics;
mod sweeper;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use sdmsg_core::config::SdmsgConfig;

#[derive(Parser, Debug)]
#[command(name = "sdmsgd", version, about = "sdmsg housekeeping daemon")]
struct Cli {
    /// Path to sdmsg.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SDMSG_CONFIG",
        default_value = "/etc/sdmsg/config.toml"
    )]
    config: PathBuf,

    /// Log level (overrides daemon.log_level)
    #[arg(long, env = "SDMSG_LOG")]
    log: Option<String>,

    /// Log format (overrides daemon.log_format)
    #[arg(long, env = "SDMSG_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Run one sweep and exit
    #[arg(long)]
    once: bool,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config first: it supplies the logging defaults
    let config = load_config(&cli.config)?;

    let level = cli.log.as_deref().unwrap_or(&config.daemon.log_level);
    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.daemon.log_format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });
    init_logging(level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        once = cli.once,
        "sdmsgd starting"
    );

    if cli.once {
        daemon::run_once(config).await
    } else {
        daemon::run(config).await
    }
}

fn load_config(path: &PathBuf) -> Result<SdmsgConfig> {
    if !path.exists() {
        // Logging is not up yet
        eprintln!("config file not found: {}  (using defaults)", path.display());
    }
    SdmsgConfig::load(path).map_err(|e| anyhow::anyhow!("loading config {}: {e}", path.display()))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
