use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::NetworkConfig;
use crate::errors::BifrostError;

/// Fixed, case-insensitive substring patterns that mark a provider error
/// message as rate-limiting even when the provider returns no retryable
/// status code. Standalone prefix words ("rate", "limit", "quota",
/// "throttle") deliberately do not match — they produce too many false
/// positives on unrelated error text.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota exceeded",
    "quota_exceeded",
    "throttled",
    "throttling",
    "limit exceeded",
    "requests per",
    "rpm exceeded",
    "tpm exceeded",
    "tokens per minute",
    "requests per minute",
    "requests per second",
    "api rate limit",
    "usage limit",
    "concurrent requests limit",
    "request limit",
    "rate exceeded",
];

const RETRYABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

pub fn is_rate_limit_message(message: &str) -> bool {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_ascii_lowercase();
    RATE_LIMIT_PATTERNS.iter().any(|pat| lower.contains(pat))
}

/// Whether `err` should be retried at all. Engine-internal errors and
/// cancellation are never retried; everything else defers to the provider's
/// status code or the rate-limit message classifier.
pub fn is_retryable(err: &BifrostError) -> bool {
    if err.is_bifrost_error || err.is_cancelled() {
        return false;
    }
    if let Some(status) = err.status_code
        && RETRYABLE_STATUS_CODES.contains(&status)
    {
        return true;
    }
    if is_rate_limit_message(&err.error.message) {
        return true;
    }
    // The wrapped raw error string is this error model's analog of a
    // provider-reported error-type tag (e.g. an upstream JSON body's own
    // `error.type` field, carried through unparsed); classify it the same
    // way a top-level message would be.
    match &err.error.error {
        Some(wrapped) => is_rate_limit_message(wrapped),
        None => false,
    }
}

/// `min(initial * 2^attempt, max) * U(0.8, 1.2)`, capped again after jitter
/// so a lucky roll can never push the sleep past `max`.
pub fn backoff_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let base = initial.saturating_mul(2u32.saturating_pow(attempt)).min(max);
    let jitter = rand::rng().random_range(0.8..=1.2);
    let jittered = base.mul_f64(jitter);
    jittered.min(max)
}

pub enum AttemptOutcome<T> {
    Completed(Result<T, BifrostError>),
    Cancelled,
}

/// Retries `attempt` up to `network.max_retries` additional times. The sleep
/// between attempts races the cancellation token so a caller cancelling
/// mid-backoff gets `RequestCancelled` immediately rather than waiting out
/// the remaining delay.
pub async fn run_with_retry<T, F, Fut>(
    network: &NetworkConfig,
    cancellation: &CancellationToken,
    mut attempt: F,
) -> AttemptOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BifrostError>>,
{
    let initial = Duration::from_millis(network.retry_backoff_initial_ms);
    let max = Duration::from_millis(network.retry_backoff_max_ms);

    let mut last_err = None;
    for attempt_no in 0..=network.max_retries {
        if cancellation.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        match attempt().await {
            Ok(value) => return AttemptOutcome::Completed(Ok(value)),
            Err(err) if err.is_cancelled() => return AttemptOutcome::Cancelled,
            Err(err) => {
                let retryable = is_retryable(&err);
                last_err = Some(err);
                if !retryable || attempt_no == network.max_retries {
                    break;
                }
                let delay = backoff_delay(attempt_no, initial, max);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancellation.cancelled() => return AttemptOutcome::Cancelled,
                }
            }
        }
    }

    AttemptOutcome::Completed(Err(last_err.unwrap_or_else(|| {
        BifrostError::internal("retry loop exited without an attempt ever running")
    })))
}
