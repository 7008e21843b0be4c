//! Command-line interface
//!
//! Every flag is optional. An unset flag leaves the value from `--config` (or
//! the built-in default) untouched, so precedence is: built-in default, then
//! config file, then command line.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};

/// Parse a non-negative number of seconds
fn parse_seconds(s: &str) -> std::result::Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number of seconds"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("'{s}' must be a non-negative number of seconds"));
    }
    Ok(value)
}

/// Parse a worker count of at least one
fn parse_jobs(s: &str) -> std::result::Result<usize, String> {
    let value: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("jobs must be at least 1".to_string());
    }
    Ok(value)
}

/// Fetch per-subnet JSON snapshots through btcli with rate limiting and retries
#[derive(Parser, Debug)]
#[command(name = "netuid-fetch")]
#[command(about = "Fetch per-identifier JSON snapshots from an external CLI", long_about = None)]
#[command(version)]
pub struct Cli {
    /// JSON configuration file; flags given on the command line override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Concurrent workers in the first pass (default: 6)
    #[arg(short = 'j', long, value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Global queries per second; 0 disables limiting (default: 3.0)
    #[arg(long)]
    pub qps: Option<f64>,

    /// Per-call timeout in seconds (default: 20)
    #[arg(long, value_parser = parse_seconds)]
    pub timeout: Option<f64>,

    /// First identifier, inclusive (default: 1)
    #[arg(long)]
    pub start: Option<u64>,

    /// Last identifier, inclusive (default: 128)
    #[arg(long)]
    pub end: Option<u64>,

    /// Ask the source for its identifiers instead of sweeping the range
    #[arg(long, default_value_t = false)]
    pub discover: bool,

    /// Output directory (default: netuid_data)
    #[arg(long, value_name = "DIR")]
    pub outdir: Option<PathBuf>,

    /// Attempts per identifier in the first pass (default: 3)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: Option<u32>,

    /// Base backoff in seconds, doubled after each failed attempt (default: 1.0)
    #[arg(long, value_parser = parse_seconds)]
    pub backoff: Option<f64>,

    /// Randomize the processing order
    #[arg(long, default_value_t = false)]
    pub shuffle: bool,

    /// External program to invoke (default: btcli)
    #[arg(long, value_name = "PATH")]
    pub program: Option<String>,

    /// Write a JSON run report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Do not retry first-pass failures in the slow lane
    #[arg(long, default_value_t = false)]
    pub no_slow_lane: bool,
}

impl Cli {
    /// Build the effective configuration: file (if any), then flag overrides
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    /// Apply every flag that was given to `config`
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(jobs) = self.jobs {
            config.fetch.concurrency = jobs;
        }
        if let Some(qps) = self.qps {
            config.fetch.qps = qps;
        }
        if let Some(secs) = self.timeout {
            config.fetch.timeout = seconds("fetch.timeout", secs)?;
        }
        if let Some(start) = self.start {
            config.ids.start = start;
        }
        if let Some(end) = self.end {
            config.ids.end = end;
        }
        if self.discover {
            config.ids.discover = true;
        }
        if let Some(outdir) = &self.outdir {
            config.output_dir = outdir.clone();
        }
        if let Some(retries) = self.retries {
            config.retry.max_attempts = retries;
        }
        if let Some(secs) = self.backoff {
            config.retry.backoff_base = seconds("retry.backoff_base", secs)?;
        }
        if self.shuffle {
            config.ids.shuffle = true;
        }
        if let Some(program) = &self.program {
            config.source.program = program.clone();
        }
        if self.no_slow_lane {
            config.slow_lane.enabled = false;
        }
        Ok(())
    }
}

fn seconds(key: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| Error::config(key, e.to_string()))
}
