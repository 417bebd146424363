// =============================================================================
// Persistence — durable engine state (weights + ledger)
// =============================================================================
//
// One JSON document per engine instance. Written atomically (tmp + rename)
// after every accepted feedback report and at shutdown, read once at startup.
// Restoring goes through `WeightTable::restore` / `SignalLedger::restore`, so
// the weight and id-uniqueness invariants hold for any file on disk.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::signals::{IndicatorRecord, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    #[serde(default)]
    pub weights: Vec<IndicatorRecord>,
    #[serde(default)]
    pub signals: Vec<Signal>,
    pub saved_at: DateTime<Utc>,
}

impl EngineSnapshot {
    pub fn new(weights: Vec<IndicatorRecord>, signals: Vec<Signal>) -> Self {
        Self {
            weights,
            signals,
            saved_at: Utc::now(),
        }
    }

    /// Read a snapshot from `path`. `Ok(None)` when no file exists yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine state from {}", path.display()))?;

        let snapshot: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine state from {}", path.display()))?;

        info!(
            path = %path.display(),
            weights = snapshot.weights.len(),
            signals = snapshot.signals.len(),
            saved_at = %snapshot.saved_at,
            "engine state loaded"
        );
        Ok(Some(snapshot))
    }

    /// Atomic write: serialise to `<path>.tmp`, then rename over `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine state to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp state to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp state to {}", path.display()))?;

        info!(
            path = %path.display(),
            signals = self.signals.len(),
            "engine state saved (atomic)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Contribution;
    use crate::types::{Action, Outcome};

    fn temp_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("signal_engine_state_{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_file_is_none() {
        assert!(EngineSnapshot::load(temp_path()).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let path = temp_path();
        let mut record = IndicatorRecord::new("bollinger");
        record.weight = 1.2;
        record.wins = 3;
        let mut signal = Signal::new(
            "ETH/USD",
            Action::Sell,
            0.8,
            3,
            vec![Contribution {
                indicator_id: "bollinger".into(),
                confidence: 0.8,
                weight: 1.2,
            }],
        );
        signal.status = Outcome::Lost.status();

        let snapshot = EngineSnapshot::new(vec![record], vec![signal]);
        snapshot.save(&path).unwrap();

        let loaded = EngineSnapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = temp_path();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(EngineSnapshot::load(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
