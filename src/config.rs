use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use crate::bench::Settings;
use crate::store::BackendRegistry;

/// kvbench - load generator and throughput aggregator for key-value stores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Run the aggregation server on this endpoint instead of benchmarking
    #[arg(short = 's', long, env = "KVBENCH_SERVER")]
    pub server: Option<String>,

    /// Backend name
    #[arg(short = 'b', long, env = "KVBENCH_BACKEND", default_value = "memory")]
    pub backend: String,

    /// Backend addresses (comma-separated)
    #[arg(short = 'a', long, env = "KVBENCH_ADDRESSES", default_value = "")]
    pub addresses: String,

    /// Aggregation server to publish samples to
    #[arg(short = 'p', long, env = "KVBENCH_PUBLISH")]
    pub publish: Option<String>,

    /// Number of reader tasks
    #[arg(short = 'r', long, env = "KVBENCH_READERS", default_value = "1")]
    pub readers: usize,

    /// Number of writer tasks
    #[arg(short = 'w', long, env = "KVBENCH_WRITERS", default_value = "0")]
    pub writers: usize,

    /// Number of keys to use
    #[arg(short = 'k', long, env = "KVBENCH_KEYS", default_value = "10")]
    pub keys: usize,

    /// Size of values in bytes
    #[arg(long, env = "KVBENCH_PAYLOAD", default_value = "10")]
    pub payload: usize,

    /// Reporting interval in seconds
    #[arg(short = 'i', long, env = "KVBENCH_INTERVAL", default_value = "10")]
    pub interval: u64,

    /// Identity reported to the aggregation server (defaults to the hostname)
    #[arg(long, env = "KVBENCH_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// What this process does
#[derive(Clone, Debug, PartialEq)]
pub enum Mode {
    /// Aggregation server listening on an endpoint
    Serve { endpoint: String },
    /// Benchmark client
    Bench(Settings),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Self::from_args(CliArgs::parse()))
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Self {
        let mode = match non_empty(args.server) {
            Some(endpoint) => Mode::Serve { endpoint },
            None => Mode::Bench(Settings {
                backend: args.backend,
                addresses: parse_addresses(&args.addresses),
                publish: non_empty(args.publish),
                readers: args.readers,
                writers: args.writers,
                keys: args.keys,
                payload: args.payload,
                interval: Duration::from_secs(args.interval),
                client_id: non_empty(args.client_id).unwrap_or_else(default_client_id),
            }),
        };

        Config {
            mode,
            log_level: args.log_level,
        }
    }

    /// Validate configuration
    pub fn validate(&self, registry: &BackendRegistry) -> Result<()> {
        let settings = match &self.mode {
            Mode::Serve { .. } => return Ok(()),
            Mode::Bench(settings) => settings,
        };

        if !registry.contains(&settings.backend) {
            anyhow::bail!(
                "Unknown backend: {} (available: {})",
                settings.backend,
                registry.names().join(", ")
            );
        }
        if settings.tasks() > 0 && settings.keys == 0 {
            anyhow::bail!("--keys must be at least 1 when readers or writers are configured");
        }
        if settings.interval.is_zero() {
            anyhow::bail!("--interval must be at least 1 second");
        }
        if settings.client_id.is_empty() || settings.client_id.contains(char::is_whitespace) {
            anyhow::bail!(
                "Client id must be a single non-empty word: {:?}",
                settings.client_id
            );
        }

        Ok(())
    }
}

/// Split a comma-separated address list, dropping empty entries
fn parse_addresses(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect()
}

/// Treat empty strings (e.g. `KVBENCH_PUBLISH=`) as unset
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Machine hostname, used as the default client identity
fn default_client_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
