// =============================================================================
// Engine — facade over indicators, weights, aggregation, and the ledger
// =============================================================================
//
// process_market_data(asset, window):
//   1. Share the window behind an `Arc` (never copied, never mutated).
//   2. Fan out to every registered indicator, at most
//      `max_concurrent_indicators` at a time, each in its own task under
//      `indicator_timeout`.
//   3. Errors, timeouts, and panics count as "no opinion" for that indicator.
//      Only when every indicator failed is `DataUnavailable` returned.
//   4. Merge the opinions, store the signal as pending, and return it.
//
// process_feedback(id, won) delegates to the `FeedbackProcessor`.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, LedgerError};
use crate::indicators::{Indicator, IndicatorRegistry};
use crate::market_data::Window;
use crate::persistence::EngineSnapshot;
use crate::signals::{
    Aggregator, FeedbackProcessor, IndicatorOpinion, Signal, SignalLedger, WeightSettings,
    WeightTable,
};
use crate::types::Outcome;

/// Result of one indicator call inside the fan-out.
enum Evaluation {
    Opinion(IndicatorOpinion),
    NoOpinion,
    Failed,
}

pub struct Engine {
    config: EngineConfig,
    registry: IndicatorRegistry,
    weights: Arc<WeightTable>,
    ledger: Arc<SignalLedger>,
    aggregator: Aggregator,
    feedback: FeedbackProcessor,
}

impl Engine {
    /// Engine with the indicators enabled in `config`.
    pub fn new(config: EngineConfig) -> Self {
        let registry = IndicatorRegistry::from_config(&config.indicators);
        Self::with_registry(config, registry)
    }

    /// Engine over an explicit set of indicators. Every registered indicator
    /// starts at weight 1.0.
    pub fn with_registry(config: EngineConfig, registry: IndicatorRegistry) -> Self {
        let weights = Arc::new(WeightTable::new(
            registry.ids(),
            WeightSettings::from_config(&config),
        ));
        let ledger = Arc::new(SignalLedger::new(
            config.lock_timeout(),
            config.max_lock_retries,
        ));
        let aggregator = Aggregator::new(weights.clone(), config.emission_threshold);
        let feedback = FeedbackProcessor::new(ledger.clone(), weights.clone());

        info!(
            indicators = ?registry.ids(),
            emission_threshold = config.emission_threshold,
            timeout_ms = config.indicator_timeout_ms,
            "signal engine ready"
        );

        Self {
            config,
            registry,
            weights,
            ledger,
            aggregator,
            feedback,
        }
    }

    /// Evaluate `window` with every indicator and emit at most one signal.
    pub async fn process_market_data(
        &self,
        asset: &str,
        window: Window,
    ) -> Result<Option<Signal>, EngineError> {
        let total = self.registry.len();
        if total == 0 {
            warn!(asset, "no indicators registered");
            return Err(EngineError::DataUnavailable {
                asset: asset.to_string(),
                failed: 0,
            });
        }

        let window = Arc::new(window);
        let timeout = self.config.indicator_timeout();
        let limit = self.config.max_concurrent_indicators.max(1);

        let evaluations: Vec<Evaluation> = stream::iter(self.registry.iter().cloned())
            .map(|indicator| evaluate_with_timeout(indicator, asset, window.clone(), timeout))
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut opinions = Vec::with_capacity(total);
        let mut failed = 0usize;
        for evaluation in evaluations {
            match evaluation {
                Evaluation::Opinion(o) => opinions.push(o),
                Evaluation::NoOpinion => {}
                Evaluation::Failed => failed += 1,
            }
        }

        if failed == total {
            warn!(asset, failed, "every indicator failed");
            return Err(EngineError::DataUnavailable {
                asset: asset.to_string(),
                failed,
            });
        }

        debug!(
            asset,
            opinions = opinions.len(),
            failed,
            candles = window.len(),
            "fan-out complete"
        );

        let Some(signal) = self.aggregator.aggregate(asset, &opinions) else {
            return Ok(None);
        };

        if let Err(e) = self.ledger.store(signal.clone()) {
            if let LedgerError::DuplicateId(id) = &e {
                error!(id = %id, "signal id collision, ledger invariant broken");
            }
            return Err(e.into());
        }

        info!(
            id = %signal.id,
            asset,
            action = %signal.action,
            confidence = signal.confidence,
            duration = signal.duration,
            "signal emitted"
        );
        Ok(Some(signal))
    }

    /// Report the outcome of a previously emitted signal.
    pub fn process_feedback(&self, id: &str, won: bool) -> Result<Signal, EngineError> {
        self.feedback.process_feedback(id, Outcome::from_win(won))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Minimum merged confidence for a signal to be emitted.
    pub fn emission_threshold(&self) -> f64 {
        self.aggregator.emission_threshold()
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn ledger(&self) -> &SignalLedger {
        &self.ledger
    }

    /// Current weights and every signal, ready to be written to disk.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::new(self.weights.snapshot(), self.ledger.snapshot())
    }

    /// Load saved state into a freshly built engine.
    ///
    /// The ledger goes first. Both steps are idempotent, so if the weight
    /// table is contended the same snapshot can be restored again to finish.
    pub fn restore(&self, snapshot: EngineSnapshot) -> Result<(), EngineError> {
        self.ledger.restore(snapshot.signals)?;
        self.weights.restore(&snapshot.weights)?;
        Ok(())
    }
}

/// Run one indicator in its own task so a slow or blocking implementation
/// cannot hold up the others. The task is aborted on timeout.
async fn evaluate_with_timeout(
    indicator: Arc<dyn Indicator>,
    asset: &str,
    window: Arc<Window>,
    timeout: Duration,
) -> Evaluation {
    let id = indicator.id().to_string();
    let task_asset = asset.to_string();

    let mut handle =
        tokio::spawn(async move { indicator.evaluate(&task_asset, &window).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(Some(opinion)))) => {
            debug!(indicator = %id, asset, action = %opinion.action, confidence = opinion.confidence, "opinion");
            Evaluation::Opinion(IndicatorOpinion::new(id, opinion))
        }
        Ok(Ok(Ok(None))) => {
            debug!(indicator = %id, asset, "no opinion");
            Evaluation::NoOpinion
        }
        Ok(Ok(Err(e))) => {
            warn!(indicator = %id, asset, error = %e, "indicator failed");
            Evaluation::Failed
        }
        Ok(Err(join_err)) => {
            warn!(indicator = %id, asset, error = %join_err, "indicator task aborted");
            Evaluation::Failed
        }
        Err(_) => {
            handle.abort();
            warn!(
                indicator = %id,
                asset,
                timeout_ms = timeout.as_millis() as u64,
                "indicator timed out"
            );
            Evaluation::Failed
        }
    }
}

/// Markdown message announcing `signal` at `current_price`.
pub fn format_signal_message(signal: &Signal, current_price: f64) -> String {
    let contributors = signal
        .contributing_indicators
        .iter()
        .map(|c| format!("{} ({:.0}%)", c.indicator_id, c.confidence * 100.0))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "*{asset} {action}*\n\
         Confidence: {confidence:.0}%\n\
         Duration: {duration} min\n\
         Entry: {price:.5}\n\
         Indicators: {contributors}\n\
         ID: `{id}`\n\
         Report with /won {id} or /lost {id}",
        asset = signal.asset,
        action = signal.action,
        confidence = signal.confidence_pct(),
        duration = signal.duration,
        price = current_price,
        contributors = contributors,
        id = signal.id,
    )
}

// =============================================================================
// Tests
// =============================================================================
