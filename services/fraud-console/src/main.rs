//! Fraud Console CLI
//!
//! Command-line interface for the fraud-detection job monitoring and export service.

use std::path::PathBuf;

use clap::Parser;
use fraud_console::{load_config, Config, ConsoleBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "fraud-console")]
#[command(about = "Job monitoring, notification and bulk export for the fraud-checker backend")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config file)
    #[arg(long)]
    backend_url: Option<String>,

    /// Dashboard port (overrides config file)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info", value_parser = parse_log_level)]
    log_level: Level,
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid log level: {}. Use: trace, debug, info, warn, error",
            s
        )
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, backend_url={:?}, dashboard_port={:?}, log_level={:?}",
        args.config,
        args.backend_url,
        args.dashboard_port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(backend_url) = args.backend_url {
        config.backend.base_url = backend_url;
    }
    if let Some(dashboard_port) = args.dashboard_port {
        config.dashboard.port = dashboard_port;
    }

    tracing::info!("Starting fraud console");
    tracing::debug!(
        "Job polling: {}ms running / {}ms idle, health every {}ms",
        config.polling.job_running_interval_ms,
        config.polling.job_idle_interval_ms,
        config.polling.health_interval_ms
    );
    tracing::info!("Exports go to {}", config.export.output_dir.display());

    ConsoleBuilder::new(config).build()?.start().await?;

    Ok(())
}
