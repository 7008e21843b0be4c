//! Core types for netuid-fetch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::FetchError;

/// Identifier of one fetchable snapshot (a subnet netuid)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(pub u64);

impl Identifier {
    /// Create a new Identifier
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Identifier {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<Identifier> for u64 {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl PartialEq<u64> for Identifier {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Identifier {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Terminal result of one identifier's fetch-with-retries sequence
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The payload was validated and written
    Success {
        /// Identifier that was fetched
        id: Identifier,
        /// Number of payload bytes written to disk
        bytes: usize,
        /// Attempts used, including the successful one
        attempts: u32,
    },
    /// Every attempt failed; `reason` is the last attempt's error
    Failure {
        /// Identifier that was fetched
        id: Identifier,
        /// Classified reason of the final attempt
        reason: FetchError,
        /// Attempts used
        attempts: u32,
    },
}

impl FetchOutcome {
    /// Identifier this outcome belongs to
    pub fn id(&self) -> Identifier {
        match self {
            FetchOutcome::Success { id, .. } | FetchOutcome::Failure { id, .. } => *id,
        }
    }

    /// Number of attempts that were made
    pub fn attempts(&self) -> u32 {
        match self {
            FetchOutcome::Success { attempts, .. } | FetchOutcome::Failure { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Whether the payload was persisted
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

/// Aggregate of one pass over an identifier set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Identifiers dispatched in this pass
    pub attempted: usize,
    /// Identifiers whose payload was written
    pub succeeded: usize,
    /// Identifiers that failed every attempt
    pub failed: BTreeSet<Identifier>,
}

impl BatchResult {
    /// Fold one outcome into the aggregate
    pub fn record(&mut self, outcome: &FetchOutcome) {
        self.attempted += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed.insert(outcome.id());
        }
    }
}

/// Which lane a pass ran in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// First pass with the configured (aggressive) settings
    Fast,
    /// Retry pass over failures with conservative settings
    Slow,
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lane::Fast => write!(f, "fast"),
            Lane::Slow => write!(f, "slow"),
        }
    }
}

/// Per-pass line of the run report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    /// Lane the pass ran in
    pub lane: Lane,
    /// Identifiers dispatched
    pub attempted: usize,
    /// Identifiers written
    pub succeeded: usize,
    /// Identifiers still failing after the pass
    pub failed: usize,
}

impl PassSummary {
    /// Summarize a batch result for the given lane
    pub fn from_batch(lane: Lane, batch: &BatchResult) -> Self {
        Self {
            lane,
            attempted: batch.attempted,
            succeeded: batch.succeeded,
            failed: batch.failed.len(),
        }
    }
}

/// Final report of a full run (both passes)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Distinct identifiers in the run
    pub total_attempted: usize,
    /// Identifiers written across both passes
    pub total_succeeded: usize,
    /// Identifiers still failing after the last pass (likely missing or broken)
    pub unresolved: Vec<Identifier>,
    /// One entry per pass that ran
    pub passes: Vec<PassSummary>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Whether every identifier was fetched
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}
