//! Configuration types for netuid-fetch

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Lane;

/// Placeholder substituted with the identifier in [`SourceConfig::fetch_args`]
pub const ID_PLACEHOLDER: &str = "{id}";

/// Largest number of identifiers an inclusive range may cover
pub const MAX_ID_SPAN: u64 = 1_000_000;

/// External data source command (program, argument templates, discovery)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Program to invoke, looked up in PATH when not absolute (default: "btcli")
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments for a single-identifier fetch; `{id}` is replaced with the identifier
    #[serde(default = "default_fetch_args")]
    pub fetch_args: Vec<String>,

    /// Arguments for the parameterless listing call used by discovery
    #[serde(default = "default_list_args")]
    pub list_args: Vec<String>,

    /// Object field that carries an identifier in listing output (default: "netuid")
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Wall-clock budget for the listing call (default: 20 seconds)
    #[serde(default = "default_discovery_timeout", with = "duration_serde")]
    pub discovery_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            fetch_args: default_fetch_args(),
            list_args: default_list_args(),
            id_field: default_id_field(),
            discovery_timeout: default_discovery_timeout(),
        }
    }
}

/// Fast-lane (pass 1) pool settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Concurrent workers (default: 6)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Global queries per second across all workers; <= 0 disables limiting (default: 3.0)
    #[serde(default = "default_qps")]
    pub qps: f64,

    /// Per-call timeout (default: 20 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Upper bound of the random delay added after waiting for a limiter slot (default: 0.15s)
    #[serde(default = "default_limiter_jitter", with = "duration_serde")]
    pub limiter_jitter: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            qps: default_qps(),
            timeout: default_timeout(),
            limiter_jitter: default_limiter_jitter(),
        }
    }
}

/// Retry behavior for a single identifier
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per identifier, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay; attempt `n` waits `backoff_base * 2^(n-1)` (default: 1 second)
    #[serde(default = "default_backoff_base", with = "duration_serde")]
    pub backoff_base: Duration,

    /// Cap on the exponential part of the delay (default: 300 seconds)
    #[serde(default = "default_max_backoff", with = "duration_serde")]
    pub max_backoff: Duration,

    /// Upper bound of the uniform random jitter added to each delay (default: 0.25s)
    #[serde(default = "default_backoff_jitter", with = "duration_serde")]
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            max_backoff: default_max_backoff(),
            jitter: default_backoff_jitter(),
        }
    }
}

/// Conservative settings for re-running pass 1 failures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlowLaneConfig {
    /// Run the slow lane at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Concurrent workers, never more than pass 1 (default: 2)
    #[serde(default = "default_slow_concurrency")]
    pub concurrency: usize,

    /// Queries per second, never faster than a limited pass 1 (default: 1.0)
    #[serde(default = "default_slow_qps")]
    pub qps: f64,

    /// Floor for attempts per identifier (default: 3)
    #[serde(default = "default_max_attempts")]
    pub min_attempts: u32,

    /// Floor for the backoff base (default: 1.5 seconds)
    #[serde(default = "default_slow_backoff_base", with = "duration_serde")]
    pub min_backoff_base: Duration,

    /// Floor for the per-call timeout (default: 25 seconds)
    #[serde(default = "default_slow_timeout", with = "duration_serde")]
    pub min_timeout: Duration,
}

impl Default for SlowLaneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_slow_concurrency(),
            qps: default_slow_qps(),
            min_attempts: default_max_attempts(),
            min_backoff_base: default_slow_backoff_base(),
            min_timeout: default_slow_timeout(),
        }
    }
}

/// Which identifiers to query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSpaceConfig {
    /// First identifier, inclusive (default: 1)
    #[serde(default = "default_start")]
    pub start: u64,

    /// Last identifier, inclusive (default: 128)
    #[serde(default = "default_end")]
    pub end: u64,

    /// Ask the source for its identifiers instead of sweeping the range
    #[serde(default)]
    pub discover: bool,

    /// Randomize processing order
    #[serde(default)]
    pub shuffle: bool,
}

impl Default for IdSpaceConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            end: default_end(),
            discover: false,
            shuffle: false,
        }
    }
}

/// Main configuration for netuid-fetch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// External command settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Fast-lane pool settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Slow-lane settings
    #[serde(default)]
    pub slow_lane: SlowLaneConfig,

    /// Identifier space
    #[serde(default)]
    pub ids: IdSpaceConfig,

    /// Output directory, one `<id>.json` per identifier (default: "netuid_data")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
            slow_lane: SlowLaneConfig::default(),
            ids: IdSpaceConfig::default(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Reject settings that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.source.program.trim().is_empty() {
            return Err(Error::config("source.program", "program must not be empty"));
        }
        if !self.source.fetch_args.iter().any(|a| a.contains(ID_PLACEHOLDER)) {
            return Err(Error::config(
                "source.fetch_args",
                format!("fetch arguments must contain the {} placeholder", ID_PLACEHOLDER),
            ));
        }
        if self.fetch.concurrency == 0 {
            return Err(Error::config("fetch.concurrency", "concurrency must be at least 1"));
        }
        if self.fetch.qps.is_nan() || self.fetch.qps.is_infinite() {
            return Err(Error::config("fetch.qps", "qps must be a finite number"));
        }
        if self.fetch.timeout.is_zero() {
            return Err(Error::config("fetch.timeout", "timeout must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts", "at least one attempt is required"));
        }
        if self.slow_lane.enabled {
            if self.slow_lane.concurrency == 0 {
                return Err(Error::config(
                    "slow_lane.concurrency",
                    "concurrency must be at least 1",
                ));
            }
            if !self.slow_lane.qps.is_finite() {
                return Err(Error::config("slow_lane.qps", "qps must be a finite number"));
            }
        }
        if self.ids.start > self.ids.end {
            return Err(Error::config(
                "ids.start",
                format!(
                    "start ({}) must not exceed end ({})",
                    self.ids.start, self.ids.end
                ),
            ));
        }
        if self.ids.end - self.ids.start >= MAX_ID_SPAN {
            return Err(Error::config(
                "ids.end",
                format!(
                    "range {}..={} covers more than {} identifiers",
                    self.ids.start, self.ids.end, MAX_ID_SPAN
                ),
            ));
        }
        Ok(())
    }
}

/// Effective settings for one pass of the batch runner
#[derive(Clone, Debug, PartialEq)]
pub struct PassSettings {
    /// Lane this pass runs in
    pub lane: Lane,
    /// Concurrently active fetches
    pub concurrency: usize,
    /// Global admission rate; <= 0 means unlimited
    pub qps: f64,
    /// Random delay bound added after a limiter wait
    pub limiter_jitter: Duration,
    /// Per-call timeout
    pub timeout: Duration,
    /// Retry settings
    pub retry: RetryConfig,
}

impl PassSettings {
    /// Pass 1 settings, taken as configured
    pub fn fast(config: &Config) -> Self {
        Self {
            lane: Lane::Fast,
            concurrency: config.fetch.concurrency,
            qps: config.fetch.qps,
            limiter_jitter: config.fetch.limiter_jitter,
            timeout: config.fetch.timeout,
            retry: config.retry.clone(),
        }
    }

    /// Derive pass 2 settings: fewer workers and a slower rate, but retry
    /// parameters at least as generous as this pass.
    pub fn slow_lane(&self, slow: &SlowLaneConfig) -> Self {
        let qps = if self.qps > 0.0 && slow.qps > 0.0 {
            slow.qps.min(self.qps)
        } else if self.qps > 0.0 {
            self.qps
        } else {
            slow.qps
        };

        Self {
            lane: Lane::Slow,
            concurrency: slow.concurrency.min(self.concurrency).max(1),
            qps,
            limiter_jitter: self.limiter_jitter,
            timeout: self.timeout.max(slow.min_timeout),
            retry: RetryConfig {
                max_attempts: self.retry.max_attempts.max(slow.min_attempts),
                backoff_base: self.retry.backoff_base.max(slow.min_backoff_base),
                max_backoff: self.retry.max_backoff,
                jitter: self.retry.jitter,
            },
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_program() -> String {
    "btcli".to_string()
}

fn default_fetch_args() -> Vec<String> {
    ["s", "show", "--json-out", "--netuid", ID_PLACEHOLDER]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_list_args() -> Vec<String> {
    vec!["s".into(), "list".into(), "--json-out".into()]
}

fn default_id_field() -> String {
    "netuid".to_string()
}

fn default_discovery_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_concurrency() -> usize {
    6
}

fn default_qps() -> f64 {
    3.0
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_limiter_jitter() -> Duration {
    Duration::from_millis(150)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(300)
}

fn default_backoff_jitter() -> Duration {
    Duration::from_millis(250)
}

fn default_slow_concurrency() -> usize {
    2
}

fn default_slow_qps() -> f64 {
    1.0
}

fn default_slow_backoff_base() -> Duration {
    Duration::from_millis(1500)
}

fn default_slow_timeout() -> Duration {
    Duration::from_secs(25)
}

fn default_start() -> u64 {
    1
}

fn default_end() -> u64 {
    128
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("netuid_data")
}

// Duration serialization helper (fractional seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
