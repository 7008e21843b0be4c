//! # netuid-fetch
//!
//! Rate-limited, retrying bulk fetcher for per-identifier JSON snapshots
//! produced by an external command-line tool (by default `btcli`, one call
//! per subnet netuid).
//!
//! ## How a run works
//!
//! - The identifier set comes from an inclusive range or from one listing call
//!   to the tool (discovery), falling back to the range if the listing is
//!   unusable
//! - Pass 1 fetches every identifier with a bounded worker pool that shares one
//!   global rate limiter; each identifier gets several attempts with
//!   exponential backoff and jitter
//! - Pass 2 (the slow lane) re-runs only pass 1 failures with fewer workers,
//!   a lower rate, and longer timeouts
//! - Each success is written atomically to `<output_dir>/<id>.json`; whatever
//!   still fails is reported as likely missing or broken
//!
//! ## Quick Start
//!
//! ```no_run
//! use netuid_fetch::{CommandSource, Config, fetch_all};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.ids.end = 16;
//!
//!     let source = Arc::new(CommandSource::from_config(&config.source));
//!     let report = fetch_all(config, source, &CancellationToken::new()).await?;
//!
//!     println!("{} of {} fetched", report.total_succeeded, report.total_attempted);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Bounded-concurrency batch runner
pub mod batch;
/// Command-line interface
pub mod cli;
/// Configuration types
pub mod config;
/// Two-pass orchestration
pub mod controller;
/// Error types
pub mod error;
/// Single-identifier fetch with retries
pub mod fetcher;
/// Output directory and atomic writes
pub mod output;
/// Response payload classification
pub mod payload;
/// Global call-rate limiting
pub mod rate_limiter;
/// Identifier range and discovery
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// External data source invocation
pub mod source;
/// Core types and reports
pub mod types;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{Config, PassSettings};
pub use controller::{TwoPassController, fetch_all};
pub use error::{DiscoveryError, Error, FetchError, Result};
pub use source::{CommandSource, DataSource};
pub use types::{BatchResult, FetchOutcome, Identifier, Lane, PassSummary, RunReport};

/// Wait until the process receives a termination signal
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let cancel = CancellationToken::new();
/// let trigger = cancel.clone();
/// tokio::spawn(async move {
///     netuid_fetch::wait_for_signal().await;
///     trigger.cancel();
/// });
/// # }
/// ```
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

/// Wait until the process receives Ctrl+C
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
