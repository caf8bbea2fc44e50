use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use std::time::Duration;

/// Builds the resubscribe delays: `initial`, then doubling up to `max`, without jitter and
/// without a retry limit.
///
/// The sequence has no reset. Build a fresh one to start over at `initial`.
pub fn resubscribe_backoff(initial: Duration, max: Duration) -> ExponentialBackoff {
    ExponentialBuilder::default()
        .with_min_delay(initial)
        .with_max_delay(max.max(initial))
        .with_factor(2.0)
        .without_max_times()
        .build()
}
