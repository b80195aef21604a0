//! Bounding of external calls
//!
//! Every suspension point (embedding, vector search, LLM completion) goes
//! through [`bounded`], so a stalled collaborator fails the stage instead of
//! leaving the query pending.

use std::future::Future;
use std::time::Duration;

/// Await `fut` for at most `limit`, mapping an elapsed deadline through `on_timeout`.
///
/// The closure receives the limit in milliseconds.
pub async fn bounded<F, T, E>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce(u64) -> E,
) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit.as_millis() as u64)),
    }
}
