use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tracker and agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metrics listen address. A leading `:` binds all interfaces.
    pub listen: String,

    /// How often `current` is merged into the down window. Default: 15s.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Silent flush cycles before a down destination expires. Default: 3.
    pub expire_after: u16,

    /// Most addresses the down window may hold. Default: 4096.
    pub max_addresses: usize,

    /// Most (protocol, port) keys tracked per address. Default: 16.
    pub max_destinations_per_address: usize,

    /// Decode workers reading the netlink socket. Default: 1.
    pub workers: usize,

    /// Requested socket receive buffer in bytes. Default: 1 MiB.
    pub read_buffer_size: usize,

    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            interval: Duration::from_secs(15),
            expire_after: 3,
            max_addresses: 4096,
            max_destinations_per_address: 16,
            workers: 1,
            read_buffer_size: 1024 * 1024,
            verbose: false,
        }
    }
}

fn default_listen() -> String {
    ":9179".to_string()
}

impl Config {
    /// Load a TOML config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = toml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        Ok(cfg.with_defaults())
    }

    /// Replace zero values with defaults.
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.listen.is_empty() {
            self.listen = defaults.listen;
        }
        if self.interval.is_zero() {
            self.interval = defaults.interval;
        }
        if self.expire_after == 0 {
            self.expire_after = defaults.expire_after;
        }
        if self.max_addresses == 0 {
            self.max_addresses = defaults.max_addresses;
        }
        if self.max_destinations_per_address == 0 {
            self.max_destinations_per_address = defaults.max_destinations_per_address;
        }
        if self.workers == 0 {
            self.workers = defaults.workers;
        }
        if self.read_buffer_size == 0 {
            self.read_buffer_size = defaults.read_buffer_size;
        }
        self
    }

    /// Socket address to bind, expanding the `:port` shorthand.
    pub fn bind_addr(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }
}
