//! Injectable delays.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use backon::TokioSleeper;

/// A [`backon::Sleeper`] that can be driven from spawned tasks.
///
/// Every retry and backoff delay in the pipeline goes through a [`Sleeper`], so tests can record
/// the requested durations instead of waiting. [`TokioSleeper`] is the production one.
pub trait Sleeper: backon::Sleeper<Sleep: Send> + Send + Sync {}

impl<T> Sleeper for T
where
    T: backon::Sleeper + Send + Sync,
    T::Sleep: Send,
{
}

/// Sleeps for `duration` unless `cancellation` fires first.
///
/// Returns `false` if the sleep was cut short by cancellation.
pub(crate) async fn sleep_or_cancel<S: Sleeper>(
    sleeper: &S,
    duration: Duration,
    cancellation: &CancellationToken,
) -> bool {
    if cancellation.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => false,
        _ = backon::Sleeper::sleep(sleeper, duration) => true,
    }
}
