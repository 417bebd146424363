// =============================================================================
// Signals Module
// =============================================================================
//
// The learning half of the engine:
// - Weight table (per-indicator trust, multiplicative updates)
// - Aggregator (weight-biased vote -> at most one signal)
// - Signal ledger (pending signals awaiting feedback)
// - Feedback processor (outcome -> ledger + weights)

pub mod aggregator;
pub mod feedback;
pub mod ledger;
pub mod signal;
pub mod weight_table;

pub use aggregator::{Aggregator, IndicatorOpinion};
pub use feedback::FeedbackProcessor;
pub use ledger::{LedgerStats, SignalLedger};
pub use signal::{Contribution, Signal};
pub use weight_table::{IndicatorRecord, WeightSettings, WeightTable};

use std::time::Duration;

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::warn;

/// Take the write guard of `lock`, waiting at most `timeout` per attempt and
/// making `retries` attempts. `None` means every attempt timed out.
pub(crate) fn write_with_retry<'a, T>(
    lock: &'a RwLock<T>,
    timeout: Duration,
    retries: u32,
    what: &str,
) -> Option<RwLockWriteGuard<'a, T>> {
    let attempts = retries.max(1);
    for attempt in 1..=attempts {
        if let Some(guard) = lock.try_write_for(timeout) {
            return Some(guard);
        }
        warn!(
            lock = what,
            attempt,
            attempts,
            timeout_ms = timeout.as_millis() as u64,
            "lock contended"
        );
    }
    None
}
