//! Two-pass orchestration
//!
//! Pass 1 runs every identifier with the configured settings. If anything
//! failed, pass 2 re-runs only those identifiers in the slow lane: fewer
//! workers, a lower rate, and retry limits at least as generous as pass 1.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::batch::run_batch;
use crate::config::{Config, PassSettings};
use crate::error::{Error, Result};
use crate::output::OutputStore;
use crate::resolver::resolve_identifiers;
use crate::source::DataSource;
use crate::types::{Identifier, PassSummary, RunReport};

/// Runs the fast pass and, when needed, the slow-lane pass
pub struct TwoPassController {
    config: Config,
    source: Arc<dyn DataSource>,
    store: OutputStore,
}

impl TwoPassController {
    /// Create a controller writing into `config.output_dir`
    pub fn new(config: Config, source: Arc<dyn DataSource>) -> Self {
        let store = OutputStore::new(config.output_dir.clone());
        Self {
            config,
            source,
            store,
        }
    }

    /// Output store used by both passes
    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    /// Fetch `ids` in up to two passes and report what is still missing
    pub async fn run(&self, ids: &[Identifier], cancel: &CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut passes = Vec::with_capacity(2);

        let fast = PassSettings::fast(&self.config);
        let first = run_batch(ids, &fast, Arc::clone(&self.source), &self.store, cancel).await?;
        passes.push(PassSummary::from_batch(fast.lane, &first));
        let mut total_succeeded = first.succeeded;

        tracing::info!(
            attempted = first.attempted,
            succeeded = first.succeeded,
            failed = first.failed.len(),
            "Pass 1 summary"
        );

        let unresolved: Vec<Identifier> = if first.failed.is_empty() {
            Vec::new()
        } else if !self.config.slow_lane.enabled {
            tracing::info!(failed = first.failed.len(), "Slow lane disabled, not retrying failures");
            first.failed.into_iter().collect()
        } else {
            let retry_ids: Vec<Identifier> = first.failed.into_iter().collect();
            let slow = fast.slow_lane(&self.config.slow_lane);
            tracing::info!(
                count = retry_ids.len(),
                concurrency = slow.concurrency,
                qps = slow.qps,
                max_attempts = slow.retry.max_attempts,
                "Retrying failures in the slow lane"
            );

            let second = run_batch(&retry_ids, &slow, Arc::clone(&self.source), &self.store, cancel).await?;
            passes.push(PassSummary::from_batch(slow.lane, &second));
            total_succeeded += second.succeeded;

            tracing::info!(
                attempted = second.attempted,
                succeeded = second.succeeded,
                failed = second.failed.len(),
                "Pass 2 summary"
            );
            second.failed.into_iter().collect()
        };

        let report = RunReport {
            total_attempted: ids.len(),
            total_succeeded,
            unresolved,
            passes,
            started_at,
            finished_at: Utc::now(),
        };

        if report.is_complete() {
            tracing::info!(
                succeeded = report.total_succeeded,
                attempted = report.total_attempted,
                dir = %self.store.dir().display(),
                "All identifiers fetched"
            );
        } else {
            let missing = report
                .unresolved
                .iter()
                .map(Identifier::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                succeeded = report.total_succeeded,
                attempted = report.total_attempted,
                unresolved = %missing,
                "Identifiers still failing after all passes (likely missing or broken)"
            );
        }

        Ok(report)
    }
}

/// Validate `config`, resolve the identifier set and run both passes
///
/// Cancelling `cancel` at any point, including during discovery, returns
/// [`Error::Interrupted`].
pub async fn fetch_all(
    config: Config,
    source: Arc<dyn DataSource>,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    config.validate()?;

    let ids = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Interrupted),
        ids = resolve_identifiers(&config, source.as_ref()) => ids,
    };
    tracing::info!(
        count = ids.len(),
        dir = %config.output_dir.display(),
        "Resolved identifiers"
    );

    TwoPassController::new(config, source).run(&ids, cancel).await
}
