//! Bounded retry of a unit of work that lost a sequence allocation race.
//!
//! Only [`FiscalError::SequenceConflict`] is retried; every other error is
//! returned immediately. Each attempt runs a fresh transaction, so a retried
//! attempt never sees state from the one that failed.

use std::future::Future;
use std::time::Duration;

use fisc_core::FiscalError;

/// Base delay between attempts (grows linearly: 25ms, 50ms, 75ms, ...).
const BASE_DELAY_MS: u64 = 25;

/// Run `op` up to `limit` times while it reports a sequence conflict.
///
/// `scope` labels the contended resource in logs. When the budget is
/// exhausted the returned conflict carries `scope` as its series and the
/// number of attempts made.
pub(crate) async fn with_retry<T, F, Fut>(scope: &str, limit: u32, mut op: F) -> Result<T, FiscalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FiscalError>>,
{
    let limit = limit.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_sequence_conflict() && attempt < limit => {
                let delay = Duration::from_millis(BASE_DELAY_MS * u64::from(attempt));
                tracing::warn!(
                    scope,
                    attempt,
                    max_attempts = limit,
                    "sequence allocation contended, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_sequence_conflict() => {
                return Err(FiscalError::SequenceConflict {
                    series: scope.to_string(),
                    attempts: attempt,
                });
            }
            other => return other,
        }
    }
}
