use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use node_conntrack::config::Config;

/// Watch conntrack for connections that never complete and report the
/// destinations that look down.
#[derive(Parser, Debug)]
#[command(name = "node-conntrack", version, about)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address and port to listen on for metrics
    #[arg(long)]
    pub listen: Option<String>,

    /// Write verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Number of decode workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Flush interval in seconds
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Silent flush cycles before a down destination expires
    #[arg(long)]
    pub expire_after: Option<u16>,

    /// Most addresses tracked as down
    #[arg(long)]
    pub max_addresses: Option<usize>,

    /// Most ports tracked per address
    #[arg(long)]
    pub max_destinations_per_address: Option<usize>,
}

impl Args {
    /// Load the config file, if any, and apply flag overrides.
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if self.verbose {
            config.verbose = true;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(secs) = self.interval {
            config.interval = Duration::from_secs(secs);
        }
        if let Some(expire_after) = self.expire_after {
            config.expire_after = expire_after;
        }
        if let Some(max) = self.max_addresses {
            config.max_addresses = max;
        }
        if let Some(max) = self.max_destinations_per_address {
            config.max_destinations_per_address = max;
        }

        Ok(config.with_defaults())
    }
}
