// src/config.rs

//! Manages gateway configuration: command-line parsing, defaults, and validation.
//!
//! There is no configuration file. Every setting has a default and can be
//! overridden with a flag.

use anyhow::{Result, anyhow};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where `set`, `get` and `del` are forwarded to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// An in-process map. Nothing survives a restart.
    #[default]
    Memory,
    /// Upstream RESP servers, given as `host:port` endpoints.
    Remote(Vec<String>),
}

impl StoreBackend {
    /// Parses `memory` or a comma-separated endpoint list.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.eq_ignore_ascii_case("memory") {
            return Ok(StoreBackend::Memory);
        }
        let endpoints: Vec<String> = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if endpoints.is_empty() {
            return Err(anyhow!("store must be 'memory' or a list of host:port endpoints"));
        }
        for endpoint in &endpoints {
            match endpoint.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
                _ => return Err(anyhow!("invalid store endpoint '{}'", endpoint)),
            }
        }
        Ok(StoreBackend::Remote(endpoints))
    }
}

/// Settings for the upstream store client.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Pooled connections per gateway process.
    #[serde(default = "default_store_pool_size")]
    pub pool_size: usize,
    /// Per-request deadline in milliseconds. `0` disables it.
    #[serde(default = "default_store_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            pool_size: default_store_pool_size(),
            request_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Port of the Prometheus exporter. The exporter is off when unset.
    #[serde(default)]
    pub port: Option<u16>,
}

/// The main configuration structure for the gateway.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Capacity of each connection's outbound queue, in frames.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Seconds of silence before a normal-mode connection is closed. `0` disables it.
    #[serde(default)]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            idle_timeout_secs: 0,
            store: StoreConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6380
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
fn default_outbound_queue_capacity() -> usize {
    1024
}
fn default_store_pool_size() -> usize {
    4
}
fn default_store_timeout_ms() -> u64 {
    5000
}

/// Command-line flags accepted by the `respgate` binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "A RESP gateway to a key/value store with built-in pub/sub", long_about = None)]
pub struct Cli {
    /// Interface to listen on.
    #[arg(long, default_value_t = default_host())]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = default_port())]
    pub port: u16,

    /// Backing store: `memory`, or comma-separated `host:port` upstream endpoints.
    #[arg(long, default_value = "memory")]
    pub store: String,

    /// Number of pooled upstream connections.
    #[arg(long, default_value_t = default_store_pool_size())]
    pub store_pool_size: usize,

    /// Upstream request timeout in milliseconds (0 disables it).
    #[arg(long, default_value_t = default_store_timeout_ms())]
    pub store_timeout_ms: u64,

    /// Maximum number of simultaneously connected clients.
    #[arg(long, default_value_t = default_max_clients())]
    pub max_clients: usize,

    /// Per-connection outbound queue capacity, in frames.
    #[arg(long, default_value_t = default_outbound_queue_capacity())]
    pub outbound_queue: usize,

    /// Close idle normal-mode connections after this many seconds (0 disables it).
    #[arg(long, default_value_t = 0)]
    pub idle_timeout: u64,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value_t = default_log_level())]
    pub log_level: String,

    /// Serve Prometheus metrics on this port.
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Builds and validates a configuration from parsed command-line flags.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let config = Config {
            host: cli.host,
            port: cli.port,
            log_level: cli.log_level,
            max_clients: cli.max_clients,
            outbound_queue_capacity: cli.outbound_queue,
            idle_timeout_secs: cli.idle_timeout,
            store: StoreConfig {
                backend: StoreBackend::parse(&cli.store)?,
                pool_size: cli.store_pool_size,
                request_timeout_ms: cli.store_timeout_ms,
            },
            metrics: MetricsConfig {
                port: cli.metrics_port,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns the idle timeout, if enabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration settings to ensure they are logical and within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(anyhow!("outbound queue capacity cannot be 0"));
        }
        if self.store.pool_size == 0 {
            return Err(anyhow!("store pool size cannot be 0"));
        }
        if self.metrics.port == Some(0) {
            return Err(anyhow!("metrics port cannot be 0"));
        }
        if self.metrics.port == Some(self.port) {
            return Err(anyhow!(
                "metrics port {} collides with the listening port",
                self.port
            ));
        }
        Ok(())
    }
}
