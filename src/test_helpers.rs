//! Shared test helpers: an in-process [`DataSource`] with scripted responses.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{Config, PassSettings, RetryConfig};
use crate::error::FetchError;
use crate::source::DataSource;
use crate::types::Identifier;

/// One scripted response
#[derive(Clone, Debug)]
pub(crate) enum Step {
    /// Return this text as stdout
    Respond(Vec<u8>),
    /// Fail the call with this error
    Fail(FetchError),
    /// Panic inside the call
    Panic,
    /// Never complete
    Hang,
}

/// Scripted data source
///
/// Each identifier consumes its queued steps in order. Once the queue is
/// empty the identifier either fails permanently (if marked so) or returns a
/// small JSON document naming it.
pub(crate) struct ScriptedSource {
    scripts: Mutex<HashMap<Identifier, VecDeque<Step>>>,
    permanent: Mutex<HashMap<Identifier, FetchError>>,
    listing: Mutex<Result<String, FetchError>>,
    calls: Mutex<HashMap<Identifier, u32>>,
    list_calls: Mutex<u32>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            permanent: Mutex::new(HashMap::new()),
            listing: Mutex::new(Ok("[]".to_string())),
            calls: Mutex::new(HashMap::new()),
            list_calls: Mutex::new(0),
        }
    }

    /// Queue steps for `id`
    pub(crate) fn script(self, id: u64, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(Identifier(id))
            .or_default()
            .extend(steps);
        self
    }

    /// Make every unscripted call for `id` fail with `err`
    pub(crate) fn always_fail(self, id: u64, err: FetchError) -> Self {
        self.permanent.lock().unwrap().insert(Identifier(id), err);
        self
    }

    /// Set the listing response
    pub(crate) fn with_listing(self, listing: Result<String, FetchError>) -> Self {
        *self.listing.lock().unwrap() = listing;
        self
    }

    /// Calls made for `id`
    pub(crate) fn calls(&self, id: u64) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&Identifier(id))
            .copied()
            .unwrap_or(0)
    }

    /// Calls made across all identifiers
    pub(crate) fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    /// Identifiers that were called at least once
    pub(crate) fn called_ids(&self) -> HashSet<Identifier> {
        self.calls.lock().unwrap().keys().copied().collect()
    }

    /// Listing calls made
    pub(crate) fn list_calls(&self) -> u32 {
        *self.list_calls.lock().unwrap()
    }

    fn next_step(&self, id: Identifier) -> Step {
        *self.calls.lock().unwrap().entry(id).or_insert(0) += 1;

        if let Some(step) = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
        {
            return step;
        }
        if let Some(err) = self.permanent.lock().unwrap().get(&id) {
            return Step::Fail(err.clone());
        }
        Step::Respond(default_payload(id).into_bytes())
    }
}

/// Payload returned for identifiers without a script
pub(crate) fn default_payload(id: Identifier) -> String {
    format!("{{\"netuid\": {}, \"name\": \"subnet-{}\"}}", id, id)
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch(&self, id: Identifier, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        match self.next_step(id) {
            Step::Respond(payload) => Ok(payload),
            Step::Fail(err) => Err(err),
            Step::Panic => panic!("scripted panic for {}", id),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn list(&self, _timeout: Duration) -> Result<String, FetchError> {
        *self.list_calls.lock().unwrap() += 1;
        self.listing.lock().unwrap().clone()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Fast-lane settings with no waiting anywhere, for deterministic tests
pub(crate) fn instant_settings(max_attempts: u32) -> PassSettings {
    PassSettings {
        retry: RetryConfig {
            max_attempts,
            backoff_base: Duration::from_millis(100),
            max_backoff: Duration::from_secs(60),
            jitter: Duration::ZERO,
        },
        qps: 0.0,
        limiter_jitter: Duration::ZERO,
        ..PassSettings::fast(&Config::default())
    }
}

/// Config whose output goes to `dir` and which never sleeps on jitter
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.output_dir = dir.to_path_buf();
    config.fetch.limiter_jitter = Duration::ZERO;
    config.retry.jitter = Duration::ZERO;
    config
}
