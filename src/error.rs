//! Error types for netuid-fetch
//!
//! Errors are split by how far they are allowed to travel:
//! - [`FetchError`] tags a single failed attempt against the external source.
//!   Every variant except [`FetchError::ToolMissing`] stays inside the retry loop.
//! - [`DiscoveryError`] explains why identifier discovery fell back to a range.
//!   It never aborts a run.
//! - [`Error`] is what escapes a pass: configuration problems, a missing
//!   external tool, an operator interrupt, or local I/O.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for netuid-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for netuid-fetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.concurrency")
        key: Option<String>,
    },

    /// The external data source binary could not be found
    #[error("external tool not found: {program}")]
    ToolMissing {
        /// Program name or path that failed to launch
        program: String,
    },

    /// Operator requested shutdown before the run finished
    #[error("interrupted before the run finished")]
    Interrupted,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Process exit status for this error
    ///
    /// 127 mirrors the shell's "command not found", 130 the conventional
    /// SIGINT status. Everything else is a generic failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ToolMissing { .. } => 127,
            Error::Interrupted => 130,
            Error::Config { .. } | Error::Io(_) | Error::Serialization(_) => 1,
        }
    }
}

/// Why a single attempt against the external source failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The external program does not exist (fatal for the whole run)
    #[error("{program} not found in PATH")]
    ToolMissing {
        /// Program name or path that failed to launch
        program: String,
    },

    /// The call exceeded its wall-clock budget and was killed
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The program exited unsuccessfully
    #[error("{}", exit_message(.code, .stderr))]
    NonZeroExit {
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Trimmed diagnostic text from stderr
        stderr: String,
    },

    /// The program ran but printed nothing usable
    #[error("empty response")]
    EmptyPayload,

    /// The payload could not be persisted
    #[error("failed to write {path:?}: {reason}")]
    WriteFailure {
        /// Destination file
        path: PathBuf,
        /// Underlying I/O error text
        reason: String,
    },

    /// The program exists but could not be started (permissions, resource limits)
    #[error("failed to launch {program}: {reason}")]
    Launch {
        /// Program name or path
        program: String,
        /// Underlying I/O error text
        reason: String,
    },

    /// The worker task panicked or was torn down unexpectedly
    #[error("worker fault: {0}")]
    WorkerFault(String),
}

fn exit_message(code: &Option<i32>, stderr: &str) -> String {
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Why discovery could not produce an identifier list
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The listing call itself failed
    #[error("listing call failed: {0}")]
    Source(#[from] FetchError),

    /// The listing output was not valid JSON
    #[error("malformed discovery response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The listing parsed but contained no identifiers
    #[error("discovery response contained no identifiers")]
    NoCandidates,
}
