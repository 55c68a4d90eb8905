//! Shared utility functions.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Await `fut`, mapping an elapsed deadline to [`Error::Timeout`].
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, fut).await {
        Ok(inner) => inner,
        Err(_) => Err(Error::Timeout(duration)),
    }
}

/// Await `fut` unless `cancel` fires first, in which case `None`.
///
/// A token that is already cancelled wins without polling `fut`.
pub async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Exponential backoff delay before retry number `retry` (1-based).
///
/// Doubles `base` per retry and never exceeds `cap`.
pub fn backoff_delay(base: Duration, retry: u32, cap: Duration) -> Duration {
    let exponent = retry.saturating_sub(1).min(20);
    base.saturating_mul(1u32 << exponent).min(cap)
}

/// Truncate `s` to at most `max` characters for log lines.
pub fn preview(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
