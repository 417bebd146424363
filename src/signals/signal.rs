// =============================================================================
// Signal — the engine's merged, emitted trading call
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Action, SignalStatus};

/// One indicator's share in an emitted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub indicator_id: String,
    /// The indicator's own confidence, before weighting.
    pub confidence: f64,
    /// Weight-table value used when the signal was merged.
    pub weight: f64,
}

/// An aggregated decision awaiting (or holding) its reported outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Random UUID v4 (simple form), cited back in feedback commands.
    pub id: String,
    pub asset: String,
    pub action: Action,
    /// Weighted average confidence of the agreeing indicators, in (0, 1].
    pub confidence: f64,
    /// Trade horizon in minutes.
    pub duration: u32,
    /// Indicators whose opinion matched `action`, in identity order.
    pub contributing_indicators: Vec<Contribution>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: SignalStatus,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// Create a pending signal with a fresh id.
    pub fn new(
        asset: impl Into<String>,
        action: Action,
        confidence: f64,
        duration: u32,
        contributing_indicators: Vec<Contribution>,
    ) -> Self {
        Self {
            id: new_signal_id(),
            asset: asset.into(),
            action,
            confidence,
            duration,
            contributing_indicators,
            created_at: Utc::now(),
            status: SignalStatus::Pending,
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SignalStatus::Pending
    }

    /// Confidence as a whole-number percentage for display.
    pub fn confidence_pct(&self) -> f64 {
        (self.confidence * 100.0).round()
    }
}

/// Unguessable signal identifier.
pub fn new_signal_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_signal_is_pending_with_unique_id() {
        let a = Signal::new("BTC/USD", Action::Buy, 0.8, 5, Vec::new());
        let b = Signal::new("BTC/USD", Action::Buy, 0.8, 5, Vec::new());
        assert!(a.is_pending());
        assert!(a.resolved_at.is_none());
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
    }

    #[test]
    fn confidence_pct_rounds() {
        let s = Signal::new("ETH/USD", Action::Sell, 0.8249, 3, Vec::new());
        assert_eq!(s.confidence_pct(), 82.0);
    }
}
