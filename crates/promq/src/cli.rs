//! Command-line argument parsing with clap.
//!
//! The query itself is fixed; flags only locate the configuration files and
//! select how results and logs are written.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{DEFAULT_ADDRESS_FILE, DEFAULT_TOKEN_FILE};

/// promq - run one authenticated instant query against a Prometheus-compatible backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "promq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// File holding the bearer token.
    #[arg(long, env = "PROMQ_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    pub token_file: PathBuf,

    /// File holding the backend base address.
    #[arg(long, env = "PROMQ_ADDRESS_FILE", default_value = DEFAULT_ADDRESS_FILE)]
    pub address_file: PathBuf,

    /// Result output format.
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Log output format (logs always go to stderr).
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

/// Result output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Prometheus text rendering.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Single-line human-readable logs.
    #[default]
    Compact,
    /// Newline-delimited JSON logs.
    Json,
}
