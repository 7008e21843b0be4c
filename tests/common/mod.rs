//! Common test utilities for netuid-fetch integration tests

use async_trait::async_trait;
use netuid_fetch::{Config, DataSource, FetchError, Identifier};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory source: every identifier succeeds unless told to fail first
pub struct FakeSource {
    failures_left: Mutex<HashMap<u64, u32>>,
    delay: Duration,
    calls: Mutex<HashMap<u64, u32>>,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn new() -> Self {
        Self {
            failures_left: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the first `times` calls for `id` with a non-zero exit
    pub fn failing(self, id: u64, times: u32) -> Self {
        self.failures_left.lock().unwrap().insert(id, times);
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, id: u64) -> u32 {
        self.calls.lock().unwrap().get(&id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn fetch(&self, id: Identifier, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        *self.calls.lock().unwrap().entry(id.get()).or_insert(0) += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let should_fail = {
            let mut failures = self.failures_left.lock().unwrap();
            match failures.get_mut(&id.get()) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_fail {
            return Err(FetchError::NonZeroExit {
                code: Some(1),
                stderr: format!("subnet {} unavailable", id),
            });
        }

        Ok(format!("{{\"netuid\": {}, \"tempo\": 360}}\n", id).into_bytes())
    }

    async fn list(&self, _timeout: Duration) -> Result<String, FetchError> {
        Ok("[]".to_string())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Config writing to `dir` with no jitter anywhere
pub fn quiet_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.output_dir = dir.to_path_buf();
    config.fetch.limiter_jitter = Duration::ZERO;
    config.retry.jitter = Duration::ZERO;
    config
}

/// Sorted file names in `dir`
#[allow(dead_code)]
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Snapshot path for `id` under `dir`
#[allow(dead_code)]
pub fn snapshot(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}.json", id))
}
