//! Command line arguments

use clap::{Parser, Subcommand};
use dsync_core::MutexConfig;

/// Take a distributed lock and work with the value it carries
#[derive(Debug, Parser)]
#[command(name = "dsync", version, about)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON, picked by extension)
    #[arg(short = 'c', long = "config", env = "DSYNC_CONFIG")]
    pub config: Option<String>,

    /// Lock name
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// Table holding lock records
    #[arg(long = "table")]
    pub table: Option<String>,

    /// Store endpoint, e.g. sqlite://locks.db?mode=rwc
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub db_url: Option<String>,

    /// Seize locks whose holder has not written for this long (0 = never)
    #[arg(long = "expiry-ms")]
    pub expiry_ms: Option<u64>,

    /// Give up acquiring after this long (0 = wait forever)
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the current value
    Get,
    /// Replace the value
    Set { value: String },
    /// Add to the integer value and print the result
    Incr {
        #[arg(long = "by", default_value_t = 1, allow_negative_numbers = true)]
        by: i64,
    },
    /// Print the stored record without taking the lock
    Status,
    /// Run a command while holding the lock; the value is passed as DSYNC_VALUE
    Exec {
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },
}

impl Cli {
    /// Load the config file and environment, then apply command line overrides
    pub fn mutex_config(&self) -> anyhow::Result<MutexConfig> {
        let config = MutexConfig::load(self.config.as_deref())?;
        Ok(self.apply_overrides(config))
    }

    fn apply_overrides(&self, mut config: MutexConfig) -> MutexConfig {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(table) = &self.table {
            config.table = table.clone();
        }
        if let Some(url) = &self.db_url {
            // Already resolved from the flag or DATABASE_URL by clap
            config.store_url = Some(url.clone());
            config.ignore_env_vars = true;
        }
        if let Some(expiry_ms) = self.expiry_ms {
            config.expiry_ms = expiry_ms;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = Some(timeout_ms);
        }
        config
    }
}
