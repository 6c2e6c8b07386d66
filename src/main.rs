//! CLI entry point for sensor-ingest
//!
//! Reads accelerometer lines from a serial port and stores each one in
//! PostgreSQL, tagged with the name of the part currently printing.
//!
//! # Usage
//!
//! ```bash
//! sensor-ingest --print benchy-v2
//! sensor-ingest --config settings.json --serial-port /dev/ttyACM0 --print N/A
//! ```
//!
//! Startup order: configuration, logging, database connect + ping, serial
//! open. Any failure before the read loop starts exits non-zero without
//! reading a single line.

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::Serialized;
use sensor_ingest::config::{IngestConfig, DEFAULT_CONFIG_PATH};
use sensor_ingest::sink::{PostgresSink, ReadingSink};
use sensor_ingest::{logging, serial, Coordinator, RunLabel};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sensor-ingest")]
#[command(about = "Serial accelerometer to PostgreSQL logger", long_about = None)]
struct Cli {
    /// Name of the part currently printing, stored with every reading
    #[arg(long = "print", default_value = sensor_ingest::record::DEFAULT_RUN_LABEL)]
    print: String,

    /// Settings file (.toml or .json)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial port, overriding the settings file
    #[arg(long)]
    serial_port: Option<String>,

    /// Baud rate, overriding the settings file
    #[arg(long)]
    baud: Option<u32>,

    /// Log level, overriding the settings file
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<IngestConfig> {
        let mut figment = IngestConfig::figment(&self.config);
        if let Some(port) = &self.serial_port {
            figment = figment.merge(Serialized::default("serial.port", port));
        }
        if let Some(baud) = self.baud {
            figment = figment.merge(Serialized::default("serial.baud_rate", baud));
        }
        if let Some(level) = &self.log_level {
            figment = figment.merge(Serialized::default("application.log_level", level));
        }

        let config = IngestConfig::from_figment(figment)
            .with_context(|| format!("failed to load {}", self.config.display()))?;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let label = RunLabel::from(cli.print);
    info!(label = %label, config = %cli.config.display(), "starting sensor-ingest");

    let sink = PostgresSink::open(&config.database)
        .await
        .context("failed to open reading store")?;
    sink.ping().await.context("reading store did not answer ping")?;
    let sink = Arc::new(sink);

    let stream = serial::open(&config.serial)?;

    let coordinator = Coordinator::new(Arc::clone(&sink), label, config.dispatch.clone())
        .with_max_line_len(config.serial.max_line_len);

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let result = coordinator.run(stream, shutdown).await;
    sink.close().await;

    match result {
        Ok(summary) => {
            info!(
                persisted = summary.persisted,
                failed = summary.failed,
                rejected = summary.rejected,
                "done"
            );
            Ok(())
        }
        Err(err) => {
            if err.is_stream_error() {
                error!(error = %err, "serial stream ended with an error");
            } else {
                error!(error = %err, "ingestion aborted");
            }
            Err(err.into())
        }
    }
}
