//! smlmeter - SML smart meter reader
//!
//! Reads the optical/serial interface of a smart meter, extracts SML frames
//! and prints the decoded element trees.

use clap::{Parser, ValueEnum};
use smlmeter_reader::{
    sink, Config, MeterReader, MeterStream, OutputFormat, ReaderError, TransportMode,
    UnknownTypePolicy,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smlmeter")]
#[command(about = "Read and decode SML frames from a smart meter")]
#[command(version)]
struct Cli {
    /// Serial device or capture file
    #[arg(env = "DEVICE")]
    device: Option<PathBuf>,

    /// Path to YAML config file
    #[arg(short, long, env = "SMLMETER_CONFIG")]
    config: Option<PathBuf>,

    /// Serial baud rate
    #[arg(short, long)]
    baud_rate: Option<u32>,

    /// Read DEVICE as a plain file instead of opening a serial port
    #[arg(long)]
    file: bool,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Report frames with unknown TLV types and keep reading
    #[arg(long)]
    skip_unknown: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

impl Cli {
    /// Applies command-line flags on top of file and environment settings.
    fn apply(&self, config: &mut Config) {
        if let Some(ref device) = self.device {
            config.transport.device = Some(device.clone());
        }
        if let Some(baud_rate) = self.baud_rate {
            config.transport.baud_rate = baud_rate;
        }
        if self.file {
            config.transport.mode = TransportMode::File;
        }
        if let Some(format) = self.format {
            config.output.format = format.into();
        }
        if self.skip_unknown {
            config.decode.on_unknown_type = UnknownTypePolicy::SkipFrame;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Decoded frames go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => match Config::load_from(path) {
            Ok(c) => {
                tracing::info!("Loaded config from {}", path.display());
                c
            }
            Err(e) => {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
        },
        None => Config::load()?,
    };
    cli.apply(&mut config);

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("Starting smlmeter");
    if let Some(ref device) = config.transport.device {
        tracing::info!("  Device: {}", device.display());
    }
    tracing::info!("  Unknown TLV types: {:?}", config.decode.on_unknown_type);

    let stream = MeterStream::open(&config.transport).await?;
    if stream.is_serial() {
        tracing::info!("Opened serial port at {} baud, 8N1", config.transport.baud_rate);
    } else {
        tracing::info!("Opened plain file");
    }
    let output = sink::for_format(config.output.format, std::io::stdout());
    let mut reader = MeterReader::from_config(stream, output, &config);

    match reader.run().await {
        Ok(stats) => {
            tracing::info!(
                bytes = stats.bytes_read,
                frames = stats.frames,
                resyncs = stats.resyncs,
                version_errors = stats.version_errors,
                decode_failures = stats.decode_failures,
                "Reader stopped"
            );
            Ok(())
        }
        Err(e @ ReaderError::Fatal(_)) => {
            tracing::error!(
                kind = ?e.failure_kind(),
                stats = ?reader.stats(),
                "Aborting on unrecoverable frame: {}",
                e
            );
            Err(e.into())
        }
        Err(e) => {
            tracing::error!("Reader failed: {}", e);
            Err(e.into())
        }
    }
}
