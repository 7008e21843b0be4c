//! Single-identifier fetch with retries
//!
//! One call to [`fetch_one`] runs the whole attempt sequence for an
//! identifier: wait for a limiter slot, call the source, validate the payload,
//! write it, and back off before trying again. Only a missing external tool
//! escapes as an error; everything else ends as a [`FetchOutcome`].

use crate::config::PassSettings;
use crate::error::{Error, FetchError, Result};
use crate::output::OutputStore;
use crate::payload::is_empty_payload;
use crate::rate_limiter::RateLimiter;
use crate::retry::with_retry;
use crate::source::DataSource;
use crate::types::{FetchOutcome, Identifier};
use std::time::Duration;

/// Fetch, validate and persist the snapshot for `id`
///
/// Returns `Err(Error::ToolMissing)` as soon as the source reports that its
/// program does not exist. Every other failure is retried up to
/// `settings.retry.max_attempts` times and then reported as
/// [`FetchOutcome::Failure`] carrying the last attempt's reason.
pub async fn fetch_one(
    id: Identifier,
    settings: &PassSettings,
    limiter: &RateLimiter,
    source: &dyn DataSource,
    store: &OutputStore,
) -> Result<FetchOutcome> {
    let max_attempts = settings.retry.max_attempts.max(1);
    let timeout = settings.timeout;

    let outcome = with_retry(&settings.retry, |attempt| async move {
        limiter.acquire().await;
        tracing::info!(netuid = %id, attempt, max_attempts, "Fetching");

        let result = attempt_once(id, timeout, source, store).await;
        match &result {
            Ok(bytes) => {
                tracing::info!(
                    netuid = %id,
                    bytes,
                    path = %store.path_for(id).display(),
                    "Saved"
                );
            }
            Err(FetchError::ToolMissing { program }) => {
                tracing::error!(netuid = %id, attempt, program = %program, "External tool not found");
            }
            Err(e) => {
                tracing::warn!(netuid = %id, attempt, max_attempts, error = %e, "Fetch attempt failed");
            }
        }
        result
    })
    .await;

    match outcome.result {
        Ok(bytes) => Ok(FetchOutcome::Success {
            id,
            bytes,
            attempts: outcome.attempts,
        }),
        Err(FetchError::ToolMissing { program }) => Err(Error::ToolMissing { program }),
        Err(reason) => Ok(FetchOutcome::Failure {
            id,
            reason,
            attempts: outcome.attempts,
        }),
    }
}

/// One attempt: call, classify, persist
async fn attempt_once(
    id: Identifier,
    timeout: Duration,
    source: &dyn DataSource,
    store: &OutputStore,
) -> std::result::Result<usize, FetchError> {
    let payload = source.fetch(id, timeout).await?;
    // Undecodable output is still data and is kept as-is
    if std::str::from_utf8(&payload).is_ok_and(is_empty_payload) {
        return Err(FetchError::EmptyPayload);
    }
    store.write(id, &payload).await
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedSource, Step, default_payload, instant_settings};
    use tokio::time::Instant;

    async fn prepared_store() -> (OutputStore, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(temp_dir.path());
        store.prepare().await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let (store, _dir) = prepared_store().await;
        let source = ScriptedSource::new();
        let limiter = RateLimiter::unlimited();

        let outcome = fetch_one(Identifier(3), &instant_settings(3), &limiter, &source, &store)
            .await
            .unwrap();

        let expected = default_payload(Identifier(3));
        assert_eq!(
            outcome,
            FetchOutcome::Success {
                id: Identifier(3),
                bytes: expected.len(),
                attempts: 1
            }
        );
        assert_eq!(source.calls(3), 1);
        assert_eq!(
            std::fs::read_to_string(store.path_for(Identifier(3))).unwrap(),
            expected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payloads_are_retried() {
        let (store, _dir) = prepared_store().await;
        let source = ScriptedSource::new().script(
            8,
            vec![
                Step::Respond("".into()),
                Step::Respond("null".into()),
                Step::Respond(r#"{"netuid": 8}"#.into()),
            ],
        );
        let limiter = RateLimiter::unlimited();

        let outcome = fetch_one(Identifier(8), &instant_settings(3), &limiter, &source, &store)
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(
            std::fs::read_to_string(store.path_for(Identifier(8))).unwrap(),
            r#"{"netuid": 8}"#
        );
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_saved_verbatim() {
        let (store, _dir) = prepared_store().await;
        let raw = b"{\"name\": \"\xff\xfe\"}".to_vec();
        let source = ScriptedSource::new().script(9, vec![Step::Respond(raw.clone())]);
        let limiter = RateLimiter::unlimited();

        let outcome = fetch_one(Identifier(9), &instant_settings(3), &limiter, &source, &store)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::Success {
                id: Identifier(9),
                bytes: raw.len(),
                attempts: 1
            }
        );
        assert_eq!(std::fs::read(store.path_for(Identifier(9))).unwrap(), raw);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_uses_exactly_max_attempts() {
        let (store, _dir) = prepared_store().await;
        let source = ScriptedSource::new().always_fail(
            4,
            FetchError::NonZeroExit {
                code: Some(1),
                stderr: "no such subnet".into(),
            },
        );
        let limiter = RateLimiter::unlimited();

        let outcome = fetch_one(Identifier(4), &instant_settings(4), &limiter, &source, &store)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::Failure {
                id: Identifier(4),
                reason: FetchError::NonZeroExit {
                    code: Some(1),
                    stderr: "no such subnet".into()
                },
                attempts: 4
            }
        );
        assert_eq!(source.calls(4), 4);
        assert!(!store.path_for(Identifier(4)).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reports_last_reason() {
        let (store, _dir) = prepared_store().await;
        let source = ScriptedSource::new().script(
            2,
            vec![
                Step::Fail(FetchError::Timeout(Duration::from_secs(20))),
                Step::Respond("{}".into()),
            ],
        );
        let limiter = RateLimiter::unlimited();

        let outcome = fetch_one(Identifier(2), &instant_settings(2), &limiter, &source, &store)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            FetchOutcome::Failure {
                reason: FetchError::EmptyPayload,
                attempts: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_tool_missing_short_circuits() {
        let (store, _dir) = prepared_store().await;
        let source = ScriptedSource::new().always_fail(
            1,
            FetchError::ToolMissing {
                program: "btcli".into(),
            },
        );
        let limiter = RateLimiter::unlimited();

        let result =
            fetch_one(Identifier(1), &instant_settings(5), &limiter, &source, &store).await;

        assert!(matches!(result, Err(Error::ToolMissing { ref program }) if program == "btcli"));
        assert_eq!(source.calls(1), 1, "missing tool must not be retried");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_is_retried() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(temp_dir.path().join("not-created"));
        let source = ScriptedSource::new();
        let limiter = RateLimiter::unlimited();

        let outcome = fetch_one(Identifier(6), &instant_settings(3), &limiter, &source, &store)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            FetchOutcome::Failure {
                reason: FetchError::WriteFailure { .. },
                attempts: 3,
                ..
            }
        ));
        assert_eq!(source.calls(6), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts_grows() {
        let (store, _dir) = prepared_store().await;
        let source = ScriptedSource::new().always_fail(9, FetchError::EmptyPayload);
        let limiter = RateLimiter::unlimited();

        // Delays of 100ms, 200ms and 400ms between four attempts
        let start = Instant::now();
        let _ = fetch_one(Identifier(9), &instant_settings(4), &limiter, &source, &store)
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(700), "waited {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(720), "waited {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_waits_for_the_limiter() {
        let (store, _dir) = prepared_store().await;
        let source = ScriptedSource::new().always_fail(5, FetchError::EmptyPayload);
        let mut settings = instant_settings(3);
        settings.retry.backoff_base = Duration::ZERO;
        // 2 qps: slots at 0ms, 500ms, 1000ms
        let limiter = RateLimiter::new(2.0).with_jitter(Duration::ZERO);

        let start = Instant::now();
        let _ = fetch_one(Identifier(5), &settings, &limiter, &source, &store)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
