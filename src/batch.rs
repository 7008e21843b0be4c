//! Bounded-concurrency batch runner
//!
//! Runs [`fetch_one`] over a set of identifiers with at most
//! `settings.concurrency` fetches in flight, all sharing one [`RateLimiter`].
//! Every identifier is dispatched exactly once per pass.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::PassSettings;
use crate::error::{Error, FetchError, Result};
use crate::fetcher::fetch_one;
use crate::output::OutputStore;
use crate::rate_limiter::RateLimiter;
use crate::source::DataSource;
use crate::types::{BatchResult, FetchOutcome, Identifier};

/// How a spawned worker ended
enum WorkerExit {
    Finished(Result<FetchOutcome>),
    Cancelled,
    Panicked(String),
}

/// Fetch every identifier in `ids` and aggregate the outcomes
///
/// A worker that panics is recorded as a failure of its identifier and the
/// batch carries on. A missing external tool cancels the remaining workers and
/// returns [`Error::ToolMissing`]. Cancelling `cancel` stops all workers and
/// returns [`Error::Interrupted`].
pub async fn run_batch(
    ids: &[Identifier],
    settings: &PassSettings,
    source: Arc<dyn DataSource>,
    store: &OutputStore,
    cancel: &CancellationToken,
) -> Result<BatchResult> {
    let mut result = BatchResult::default();
    if ids.is_empty() {
        return Ok(result);
    }

    store.prepare().await?;

    let concurrency = settings.concurrency.max(1);
    let limiter = Arc::new(RateLimiter::new(settings.qps).with_jitter(settings.limiter_jitter));
    let settings = Arc::new(settings.clone());
    let batch_token = cancel.child_token();
    // Workers must not outlive this call, however it ends
    let _guard = batch_token.clone().drop_guard();

    tracing::info!(
        lane = %settings.lane,
        ids = ids.len(),
        concurrency,
        qps = settings.qps,
        max_attempts = settings.retry.max_attempts,
        source = source.name(),
        "Starting pass"
    );

    let mut exits = stream::iter(ids.iter().copied())
        .map(|id| {
            let settings = Arc::clone(&settings);
            let limiter = Arc::clone(&limiter);
            let source = Arc::clone(&source);
            let store = store.clone();
            let token = batch_token.clone();

            async move {
                let handle = tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        outcome = fetch_one(id, &settings, &limiter, source.as_ref(), &store) => Some(outcome),
                    }
                });

                let exit = match handle.await {
                    Ok(Some(outcome)) => WorkerExit::Finished(outcome),
                    Ok(None) => WorkerExit::Cancelled,
                    Err(e) if e.is_panic() => WorkerExit::Panicked(panic_message(e.into_panic())),
                    Err(e) => WorkerExit::Panicked(e.to_string()),
                };
                (id, exit)
            }
        })
        .buffer_unordered(concurrency);

    while let Some((id, exit)) = exits.next().await {
        match exit {
            WorkerExit::Finished(Ok(outcome)) => {
                if let FetchOutcome::Failure {
                    ref reason,
                    attempts,
                    ..
                } = outcome
                {
                    tracing::warn!(netuid = %id, attempts, error = %reason, "Giving up on identifier");
                }
                result.record(&outcome);
            }
            WorkerExit::Finished(Err(e)) => {
                tracing::error!(netuid = %id, error = %e, "Aborting pass");
                batch_token.cancel();
                return Err(e);
            }
            WorkerExit::Cancelled => {
                if cancel.is_cancelled() {
                    return Err(Error::Interrupted);
                }
            }
            WorkerExit::Panicked(message) => {
                tracing::error!(netuid = %id, panic = %message, "Worker panicked");
                result.record(&FetchOutcome::Failure {
                    id,
                    reason: FetchError::WorkerFault(message),
                    attempts: 0,
                });
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Interrupted);
    }

    tracing::info!(
        lane = %settings.lane,
        attempted = result.attempted,
        succeeded = result.succeeded,
        failed = result.failed.len(),
        "Pass complete"
    );
    Ok(result)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
