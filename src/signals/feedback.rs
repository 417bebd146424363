// =============================================================================
// Feedback Processor — closes the learning loop
// =============================================================================
//
// Sequence for one report:
//   1. Resolve the signal in the ledger (Pending -> Won/Lost).
//   2. Apply the outcome to every contributing indicator's weight, using the
//      raw confidence recorded in the signal.
//
// Indicators that did not contribute to the signal are never touched. Step 1
// fails for unknown or already-resolved ids, so weights change at most once
// per signal.
//
// The weight update runs inside the ledger's write guard before the status
// flips: if the weight table is contended the signal stays pending and the
// report can be retried. Lock order is always ledger -> weights.
// =============================================================================

use std::sync::Arc;

use tracing::info;

use super::ledger::SignalLedger;
use super::signal::Signal;
use super::weight_table::WeightTable;
use crate::error::EngineError;
use crate::types::Outcome;

pub struct FeedbackProcessor {
    ledger: Arc<SignalLedger>,
    weights: Arc<WeightTable>,
}

impl FeedbackProcessor {
    pub fn new(ledger: Arc<SignalLedger>, weights: Arc<WeightTable>) -> Self {
        Self { ledger, weights }
    }

    /// Resolve `id` with `outcome` and adjust contributor weights.
    pub fn process_feedback(&self, id: &str, outcome: Outcome) -> Result<Signal, EngineError> {
        let signal = self.ledger.resolve_with(id, outcome, |pending| {
            self.weights
                .apply_outcome(&pending.contributing_indicators, outcome)
                .map_err(EngineError::from)
        })?;

        info!(
            id,
            outcome = %outcome,
            contributors = signal.contributing_indicators.len(),
            "feedback applied"
        );
        Ok(signal)
    }
}
