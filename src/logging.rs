//! Logging configuration
//!
//! Wires `tracing` output for binaries and tests embedding the runtime.
//! Everything goes to stderr or a file so stdio transports keep stdout
//! clean for protocol traffic.

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging settings, usually read from the environment
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directives, e.g. "info" or "jsonrpc_endpoint=debug"
    pub filter: String,
    /// Append logs to this file instead of stderr
    pub file: Option<PathBuf>,
    /// Emit structured JSON instead of human readable lines
    pub json: bool,
}

impl LogConfig {
    /// Read settings from `RUST_LOG`, `JSONRPC_LOG_FILE` and `JSONRPC_LOG_JSON`
    pub fn from_env() -> Self {
        Self {
            filter: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            file: env::var("JSONRPC_LOG_FILE").ok().map(PathBuf::from),
            json: env::var("JSONRPC_LOG_JSON").is_ok_and(|value| value == "true"),
        }
    }
}

/// Install a global subscriber for the given configuration
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_new(&config.filter).or_else(|_| EnvFilter::try_new("info"))?;

    let output = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            if config.json {
                fmt::layer().json().with_writer(file).with_ansi(false).boxed()
            } else {
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed()
            }
        }
        None if config.json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_ansi(false)
            .boxed(),
        None => fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(output).init();
    Ok(())
}
