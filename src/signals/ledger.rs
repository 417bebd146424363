// =============================================================================
// Signal Ledger — emitted signals keyed by id, pending until resolved
// =============================================================================
//
// Life-cycle:
//   Pending  ->  Won
//   Pending  ->  Lost
//
// A signal transitions exactly once and never back. Signals without feedback
// stay pending indefinitely; expiry is the caller's concern.
//
// Thread-safety: the map sits behind one `parking_lot::RwLock`; `store` and
// `resolve` both take the write guard, so they never interleave on an id.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::signal::Signal;
use super::write_with_retry;
use crate::error::LedgerError;
use crate::types::{Outcome, SignalStatus};

/// Counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub pending: usize,
    pub won: usize,
    pub lost: usize,
}

impl LedgerStats {
    pub fn total(&self) -> usize {
        self.pending + self.won + self.lost
    }

    /// Fraction of resolved signals that won, if any were resolved.
    pub fn win_rate(&self) -> Option<f64> {
        let resolved = self.won + self.lost;
        (resolved > 0).then(|| self.won as f64 / resolved as f64)
    }
}

pub struct SignalLedger {
    signals: RwLock<HashMap<String, Signal>>,
    lock_timeout: Duration,
    max_lock_retries: u32,
}

impl SignalLedger {
    pub fn new(lock_timeout: Duration, max_lock_retries: u32) -> Self {
        Self {
            signals: RwLock::new(HashMap::new()),
            lock_timeout,
            max_lock_retries,
        }
    }

    /// Record a freshly emitted signal.
    ///
    /// Ids are generated internally, so `DuplicateId` means the generator is
    /// broken; callers must treat it as fatal rather than retry.
    pub fn store(&self, signal: Signal) -> Result<(), LedgerError> {
        let mut signals = self.lock_for_write()?;

        if signals.contains_key(&signal.id) {
            error!(id = %signal.id, "duplicate signal id, refusing to overwrite");
            return Err(LedgerError::DuplicateId(signal.id));
        }

        info!(id = %signal.id, asset = %signal.asset, action = %signal.action, "signal stored");
        signals.insert(signal.id.clone(), signal);
        Ok(())
    }

    /// Move a pending signal to its terminal status and return it.
    pub fn resolve(&self, id: &str, outcome: Outcome) -> Result<Signal, LedgerError> {
        self.resolve_with(id, outcome, |_| Ok::<(), LedgerError>(()))
    }

    /// Like [`resolve`](Self::resolve), but runs `before_commit` on the
    /// still-pending signal under the write guard. The status only changes if
    /// `before_commit` succeeds, so a failed side effect leaves the signal
    /// pending and the report can be retried.
    pub fn resolve_with<F, E>(&self, id: &str, outcome: Outcome, before_commit: F) -> Result<Signal, E>
    where
        F: FnOnce(&Signal) -> Result<(), E>,
        E: From<LedgerError>,
    {
        let mut signals = self.lock_for_write()?;

        let signal = signals
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        if signal.status != SignalStatus::Pending {
            return Err(LedgerError::AlreadyResolved {
                id: id.to_string(),
                status: signal.status,
            }
            .into());
        }

        before_commit(&*signal)?;

        signal.status = outcome.status();
        signal.resolved_at = Some(Utc::now());

        info!(id, status = %signal.status, "signal resolved");
        Ok(signal.clone())
    }

    pub fn get(&self, id: &str) -> Option<Signal> {
        self.signals.read().get(id).cloned()
    }

    /// Pending signals, oldest first.
    pub fn pending(&self) -> Vec<Signal> {
        let mut pending: Vec<Signal> = self
            .signals
            .read()
            .values()
            .filter(|s| s.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    pub fn stats(&self) -> LedgerStats {
        let signals = self.signals.read();
        let mut stats = LedgerStats::default();
        for s in signals.values() {
            match s.status {
                SignalStatus::Pending => stats.pending += 1,
                SignalStatus::Won => stats.won += 1,
                SignalStatus::Lost => stats.lost += 1,
            }
        }
        stats
    }

    /// Every signal, oldest first.
    pub fn snapshot(&self) -> Vec<Signal> {
        let mut all: Vec<Signal> = self.signals.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Load saved signals. Ids already present keep their current entry, so
    /// restoring the same snapshot twice is harmless.
    pub fn restore(&self, saved: Vec<Signal>) -> Result<usize, LedgerError> {
        let mut signals = self.lock_for_write()?;
        let mut restored = 0usize;
        for s in saved {
            if let Some(existing) = signals.get(&s.id) {
                // Restoring the same snapshot twice is expected after a
                // partial restore; only conflicting copies are reported.
                if existing != &s {
                    error!(id = %s.id, "duplicate id in saved ledger, skipping");
                }
                continue;
            }
            signals.insert(s.id.clone(), s);
            restored += 1;
        }
        info!(restored, "ledger restored");
        Ok(restored)
    }

    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.read().is_empty()
    }

    fn lock_for_write(
        &self,
    ) -> Result<parking_lot::RwLockWriteGuard<'_, HashMap<String, Signal>>, LedgerError> {
        write_with_retry(&self.signals, self.lock_timeout, self.max_lock_retries, "ledger")
            .ok_or(LedgerError::Busy)
    }
}

impl Default for SignalLedger {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), 3)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    fn sample() -> Signal {
        Signal::new("BTC/USD", Action::Buy, 0.8, 5, Vec::new())
    }

    #[test]
    fn store_then_get() {
        let ledger = SignalLedger::default();
        let s = sample();
        ledger.store(s.clone()).unwrap();
        assert_eq!(ledger.get(&s.id), Some(s));
        assert!(ledger.get("missing").is_none());
    }

    #[test]
    fn duplicate_store_rejected() {
        let ledger = SignalLedger::default();
        let s = sample();
        ledger.store(s.clone()).unwrap();
        assert_eq!(
            ledger.store(s.clone()),
            Err(LedgerError::DuplicateId(s.id.clone()))
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn resolve_transitions_once() {
        let ledger = SignalLedger::default();
        let s = sample();
        ledger.store(s.clone()).unwrap();

        let resolved = ledger.resolve(&s.id, Outcome::Won).unwrap();
        assert_eq!(resolved.status, SignalStatus::Won);
        assert!(resolved.resolved_at.is_some());

        assert_eq!(
            ledger.resolve(&s.id, Outcome::Lost),
            Err(LedgerError::AlreadyResolved {
                id: s.id.clone(),
                status: SignalStatus::Won
            })
        );
        assert_eq!(ledger.get(&s.id).unwrap().status, SignalStatus::Won);
    }

    #[test]
    fn failed_commit_hook_keeps_signal_pending() {
        let ledger = SignalLedger::default();
        let s = sample();
        ledger.store(s.clone()).unwrap();

        let result = ledger.resolve_with(&s.id, Outcome::Won, |_| Err(LedgerError::Busy));
        assert_eq!(result, Err(LedgerError::Busy));
        assert!(ledger.get(&s.id).unwrap().is_pending());

        assert!(ledger.resolve(&s.id, Outcome::Won).is_ok());
    }

    #[test]
    fn resolve_unknown_id() {
        let ledger = SignalLedger::default();
        assert_eq!(
            ledger.resolve("nope", Outcome::Won),
            Err(LedgerError::NotFound("nope".into()))
        );
    }

    #[test]
    fn pending_and_stats() {
        let ledger = SignalLedger::default();
        let a = sample();
        let b = sample();
        let c = sample();
        for s in [&a, &b, &c] {
            ledger.store(s.clone()).unwrap();
        }
        ledger.resolve(&a.id, Outcome::Won).unwrap();
        ledger.resolve(&b.id, Outcome::Lost).unwrap();

        let pending = ledger.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, c.id);

        let stats = ledger.stats();
        assert_eq!(stats, LedgerStats { pending: 1, won: 1, lost: 1 });
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.win_rate(), Some(0.5));
    }

    #[test]
    fn restore_skips_duplicates() {
        let ledger = SignalLedger::default();
        let s = sample();
        let restored = ledger.restore(vec![s.clone(), s.clone()]).unwrap();
        assert_eq!(restored, 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn contended_resolve_reports_busy() {
        let ledger = SignalLedger::new(Duration::from_millis(1), 1);
        let _reader = ledger.signals.read();
        assert_eq!(ledger.resolve("x", Outcome::Won), Err(LedgerError::Busy));
    }
}
