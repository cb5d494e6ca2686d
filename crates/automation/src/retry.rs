//! Retry classification and jittered exponential backoff for action
//! execution. The backoff curve mirrors the teacher's schedule-cooldown
//! formula (`2^(n-1)`, capped) but operates on seconds instead of
//! minutes, with added jitter so a thundering herd of retries spreads
//! out instead of re-colliding every interval.

use std::time::Duration;

use rand::Rng;

/// Whether a failure category should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network error, 5xx, or 429 — likely to succeed on retry.
    Transient,
    /// Auth failure or 4xx other than 429 — retrying cannot help.
    Permanent,
}

/// Classify an HTTP status code per the retry policy in the action
/// executor spec: network/5xx/429 are transient, everything else
/// (including auth failures) is terminal.
pub fn classify_status(status: u16) -> FailureClass {
    match status {
        429 | 500..=599 => FailureClass::Transient,
        _ => FailureClass::Permanent,
    }
}

/// Exponential backoff with full jitter: `uniform(0, base * 2^(attempt-1))`,
/// capped at `max_delay`. `attempt` is 1-indexed (the first retry uses
/// `attempt = 1`).
pub fn backoff_delay(attempt: u32, base: Duration, max_delay: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(20);
    let scaled = base.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
    let capped = scaled.min(max_delay);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64);
    Duration::from_millis(jitter_ms)
}

/// Runs `f` up to `max_attempts` times, retrying only on
/// `FailureClass::Transient` errors as classified by `classify`. Returns
/// the last error if every attempt is exhausted, along with the number
/// of retries actually performed (attempts beyond the first).
pub async fn with_retry<T, E, F, Fut, C>(
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    classify: C,
    mut f: F,
) -> (Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    C: Fn(&E) -> FailureClass,
{
    let mut retries = 0;
    loop {
        match f().await {
            Ok(v) => return (Ok(v), retries),
            Err(e) => {
                let terminal = matches!(classify(&e), FailureClass::Permanent);
                if terminal || retries + 1 >= max_attempts {
                    return (Err(e), retries);
                }
                retries += 1;
                tokio::time::sleep(backoff_delay(retries, base_delay, max_delay)).await;
            }
        }
    }
}
