// =============================================================================
// Weight Table — per-indicator trust learned from reported outcomes
// =============================================================================
//
// Update rule (bounded multiplicative weights):
//   win  : w *= 1 + η·c
//   loss : w *= 1 − η·c
//   w = max(w, floor)
// where c is the indicator's raw confidence in the resolved signal.
//
// After every update the table is renormalised so that Σw equals the number
// of registered indicators, without letting any weight drop under the floor
// (weights that would fall below it are pinned at the floor and the remaining
// mass is spread over the others).
//
// Each record also keeps a Beta(1, 1) win/loss tally for reporting.
//
// Thread-safety: reads take a shared `parking_lot::RwLock` guard; updates take
// the write guard, so at most one update is applied at a time.
// =============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::signal::Contribution;
use super::write_with_retry;
use crate::config::EngineConfig;
use crate::error::WeightError;
use crate::types::Outcome;

/// Weight of an indicator that has never been updated.
pub const INITIAL_WEIGHT: f64 = 1.0;

/// Trust state for a single indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub indicator_id: String,
    pub weight: f64,
    #[serde(default)]
    pub wins: u64,
    #[serde(default)]
    pub losses: u64,
}

impl IndicatorRecord {
    pub fn new(indicator_id: impl Into<String>) -> Self {
        Self {
            indicator_id: indicator_id.into(),
            weight: INITIAL_WEIGHT,
            wins: 0,
            losses: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.wins + self.losses
    }

    /// Posterior mean of Beta(1 + wins, 1 + losses).
    pub fn estimated_win_rate(&self) -> f64 {
        (self.wins as f64 + 1.0) / (self.total() as f64 + 2.0)
    }
}

/// Learning dynamics and lock behaviour for a [`WeightTable`].
#[derive(Debug, Clone, Copy)]
pub struct WeightSettings {
    pub learning_rate: f64,
    pub floor: f64,
    pub lock_timeout: Duration,
    pub max_lock_retries: u32,
}

impl WeightSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            floor: config.weight_floor,
            lock_timeout: config.lock_timeout(),
            max_lock_retries: config.max_lock_retries,
        }
    }
}

impl Default for WeightSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

pub struct WeightTable {
    records: RwLock<BTreeMap<String, IndicatorRecord>>,
    settings: WeightSettings,
}

impl WeightTable {
    /// Create a table with every registered indicator at weight 1.0.
    pub fn new<I, S>(indicator_ids: I, settings: WeightSettings) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records: BTreeMap<String, IndicatorRecord> = indicator_ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                (id.clone(), IndicatorRecord::new(id))
            })
            .collect();

        info!(
            indicators = records.len(),
            learning_rate = settings.learning_rate,
            floor = settings.floor,
            "WeightTable initialised"
        );

        Self {
            records: RwLock::new(records),
            settings,
        }
    }

    pub fn settings(&self) -> WeightSettings {
        self.settings
    }

    /// Current weight; 1.0 for an indicator the table has never seen.
    pub fn get(&self, indicator_id: &str) -> f64 {
        self.records
            .read()
            .get(indicator_id)
            .map_or(INITIAL_WEIGHT, |r| r.weight)
    }

    /// Weights for several indicators read under one guard, so a concurrent
    /// update cannot be observed half-applied.
    pub fn weights_for<'a, I>(&self, indicator_ids: I) -> BTreeMap<String, f64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let records = self.records.read();
        indicator_ids
            .into_iter()
            .map(|id| {
                let w = records.get(id).map_or(INITIAL_WEIGHT, |r| r.weight);
                (id.to_string(), w)
            })
            .collect()
    }

    /// All records in identity order.
    pub fn snapshot(&self) -> Vec<IndicatorRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Apply one outcome to one indicator and renormalise. Returns the new
    /// weight of `indicator_id`; unregistered ids are left out of the table
    /// and report the initial weight.
    pub fn update(
        &self,
        indicator_id: &str,
        outcome_was_win: bool,
        raw_confidence: f64,
    ) -> Result<f64, WeightError> {
        let mut records = self.lock_for_update()?;
        self.apply(&mut records, indicator_id, outcome_was_win, raw_confidence);
        Ok(records.get(indicator_id).map_or(INITIAL_WEIGHT, |r| r.weight))
    }

    /// Apply `outcome` to every contributor of a resolved signal, in order,
    /// under a single write guard. Either all updates land or none do.
    pub fn apply_outcome(
        &self,
        contributions: &[Contribution],
        outcome: Outcome,
    ) -> Result<(), WeightError> {
        let mut records = self.lock_for_update()?;
        for c in contributions {
            self.apply(&mut records, &c.indicator_id, outcome.is_win(), c.confidence);
        }
        Ok(())
    }

    /// Replace weights and tallies with saved records.
    ///
    /// Only currently registered indicators are restored; saved weights are
    /// re-floored and renormalised so the invariants hold even if the saved
    /// state was produced with different settings.
    pub fn restore(&self, saved: &[IndicatorRecord]) -> Result<(), WeightError> {
        let mut records = self.lock_for_update()?;
        let floor = self.settings.floor;
        let mut restored = 0usize;

        for s in saved {
            if let Some(r) = records.get_mut(&s.indicator_id) {
                r.weight = if s.weight.is_finite() {
                    s.weight.max(floor)
                } else {
                    INITIAL_WEIGHT
                };
                r.wins = s.wins;
                r.losses = s.losses;
                restored += 1;
            }
        }

        renormalise(&mut records, floor);
        info!(restored, skipped = saved.len() - restored, "weights restored");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn hold_read_for_test(
        &self,
    ) -> parking_lot::RwLockReadGuard<'_, BTreeMap<String, IndicatorRecord>> {
        self.records.read()
    }

    fn lock_for_update(
        &self,
    ) -> Result<parking_lot::RwLockWriteGuard<'_, BTreeMap<String, IndicatorRecord>>, WeightError>
    {
        write_with_retry(
            &self.records,
            self.settings.lock_timeout,
            self.settings.max_lock_retries,
            "weight table",
        )
        .ok_or(WeightError::Busy)
    }

    fn apply(
        &self,
        records: &mut BTreeMap<String, IndicatorRecord>,
        indicator_id: &str,
        outcome_was_win: bool,
        raw_confidence: f64,
    ) {
        let eta = self.settings.learning_rate;
        let floor = self.settings.floor;
        let c = if raw_confidence.is_finite() {
            raw_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Only registered indicators carry weight; a signal saved before an
        // indicator was retired must not bring it back.
        let Some(record) = records.get_mut(indicator_id) else {
            warn!(indicator = indicator_id, "outcome for unregistered indicator ignored");
            return;
        };

        let before = record.weight;
        let factor = if outcome_was_win {
            record.wins += 1;
            1.0 + eta * c
        } else {
            record.losses += 1;
            1.0 - eta * c
        };
        record.weight = (record.weight * factor).max(floor);

        debug!(
            indicator = indicator_id,
            win = outcome_was_win,
            confidence = c,
            before,
            after = record.weight,
            "weight updated"
        );

        renormalise(records, floor);
    }
}

/// Scale weights so they sum to `records.len()` while keeping every weight at
/// or above `floor`. Requires `floor <= 1.0`.
fn renormalise(records: &mut BTreeMap<String, IndicatorRecord>, floor: f64) {
    let n = records.len();
    if n == 0 {
        return;
    }

    let target = n as f64;
    let mut pinned = vec![false; n];

    loop {
        let pinned_count = pinned.iter().filter(|p| **p).count();
        let free_sum: f64 = records
            .values()
            .zip(&pinned)
            .filter(|(_, p)| !**p)
            .map(|(r, _)| r.weight)
            .sum();
        let free_target = target - floor * pinned_count as f64;

        if free_sum <= 0.0 || !free_sum.is_finite() {
            let free_count = (n - pinned_count).max(1) as f64;
            for (r, p) in records.values_mut().zip(&pinned) {
                if !*p {
                    r.weight = free_target / free_count;
                }
            }
            return;
        }

        let scale = free_target / free_sum;
        let mut newly_pinned = false;
        for (r, p) in records.values_mut().zip(pinned.iter_mut()) {
            if *p {
                continue;
            }
            r.weight *= scale;
            if r.weight < floor {
                r.weight = floor;
                *p = true;
                newly_pinned = true;
            }
        }

        if !newly_pinned {
            return;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
