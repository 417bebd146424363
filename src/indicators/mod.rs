// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Every strategy implements the `Indicator` capability: given an asset and an
// immutable candle window it returns an `Opinion` or nothing.  The band/RSI/EMA
// math lives next to each strategy as pure functions returning `Option<T>`, so
// callers are forced to handle insufficient-data and numerical edge cases.
//
// Indicators are registered by identity in an `IndicatorRegistry`; the engine
// fans a window out to all of them concurrently, so implementations must be
// `Send + Sync` and must not share mutable state with each other.

pub mod bollinger;
pub mod ema;
pub mod rsi;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::IndicatorsConfig;
use crate::error::IndicatorError;
use crate::market_data::Window;
use crate::types::Action;

pub use bollinger::{BollingerConfig, BollingerIndicator};
pub use ema::{EmaTrendConfig, EmaTrendIndicator};
pub use rsi::{RsiConfig, RsiIndicator};

/// Window length required by indicators that do not state their own.
pub const DEFAULT_MIN_WINDOW: usize = 50;

// =============================================================================
// Opinion
// =============================================================================

/// One indicator's directional call for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub action: Action,
    /// Always within (0, 1].
    pub confidence: f64,
    /// Suggested trade horizon in minutes.
    pub suggested_duration: u32,
    /// Indicator-specific detail for logging. Not read by aggregation.
    #[serde(default)]
    pub evidence: BTreeMap<String, f64>,
}

impl Opinion {
    /// Build an opinion, clamping `confidence` into (0, 1].
    pub fn new(action: Action, confidence: f64, suggested_duration: u32) -> Self {
        Self {
            action,
            confidence: clamp_confidence(confidence),
            suggested_duration,
            evidence: BTreeMap::new(),
        }
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: f64) -> Self {
        self.evidence.insert(key.into(), value);
        self
    }
}

/// Clamp a confidence into (0, 1]. Non-finite input maps to the lower edge.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(f64::MIN_POSITIVE, 1.0)
    } else {
        f64::MIN_POSITIVE
    }
}

// =============================================================================
// Confidence breakpoints
// =============================================================================

/// Two-breakpoint confidence scaling shared by the concrete indicators.
///
/// `marginal` applies when the triggering condition is only just met,
/// `extreme` once the underlying measure is past the indicator's extreme
/// breakpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceScale {
    pub marginal: f64,
    pub extreme: f64,
}

impl ConfidenceScale {
    pub const STANDARD: Self = Self {
        marginal: 0.75,
        extreme: 0.85,
    };

    /// Step interpolation: `marginal` below the extreme breakpoint, `extreme`
    /// at or beyond it.
    pub fn step(&self, is_extreme: bool) -> f64 {
        if is_extreme {
            self.extreme
        } else {
            self.marginal
        }
    }

    /// Linear interpolation; `fraction` is how far the measure has travelled
    /// from the marginal breakpoint (0.0) to the extreme one (1.0).
    pub fn linear(&self, fraction: f64) -> f64 {
        let t = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.marginal + (self.extreme - self.marginal) * t
    }
}

// =============================================================================
// Indicator contract
// =============================================================================

/// A pluggable technical-analysis strategy.
///
/// `evaluate` must not mutate anything outside its own return value and must
/// be a pure function of `(asset, window)` plus static configuration.
/// `Ok(None)` means "no actionable condition"; `Err` means the indicator could
/// not evaluate the window at all. Opinions whose confidence falls below the
/// indicator's configured minimum are filtered before returning.
#[async_trait]
pub trait Indicator: Send + Sync {
    /// Stable identity used for weights and tie-breaking.
    fn id(&self) -> &str;

    /// Minimum number of candles `evaluate` needs.
    fn min_window(&self) -> usize {
        DEFAULT_MIN_WINDOW
    }

    async fn evaluate(
        &self,
        asset: &str,
        window: &Window,
    ) -> Result<Option<Opinion>, IndicatorError>;
}

/// Shape check every indicator runs before computing.
pub fn validate_window(
    indicator: &str,
    window: &Window,
    required: usize,
) -> Result<(), IndicatorError> {
    if window.len() < required {
        return Err(IndicatorError::InsufficientData {
            indicator: indicator.to_string(),
            required,
            available: window.len(),
        });
    }

    // Windows are validated on construction; guard the price scale anyway
    // since band and spread ratios divide by it.
    if window.candles().iter().any(|c| c.close <= 0.0) {
        return Err(IndicatorError::InvalidWindow {
            indicator: indicator.to_string(),
            reason: "close prices must be positive".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Registry
// =============================================================================

/// Indicators keyed by identity, iterated in identity order.
#[derive(Clone, Default)]
pub struct IndicatorRegistry {
    indicators: BTreeMap<String, Arc<dyn Indicator>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration, skipping disabled strategies.
    pub fn from_config(config: &IndicatorsConfig) -> Self {
        let mut registry = Self::new();
        if config.bollinger.enabled {
            registry.register(Arc::new(BollingerIndicator::new(config.bollinger.clone())));
        }
        if config.rsi.enabled {
            registry.register(Arc::new(RsiIndicator::new(config.rsi.clone())));
        }
        if config.ema_trend.enabled {
            registry.register(Arc::new(EmaTrendIndicator::new(config.ema_trend.clone())));
        }
        registry
    }

    /// Register an indicator, returning any previous one with the same id.
    pub fn register(&mut self, indicator: Arc<dyn Indicator>) -> Option<Arc<dyn Indicator>> {
        self.indicators.insert(indicator.id().to_string(), indicator)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Indicator>> {
        self.indicators.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.indicators.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Indicator>> {
        self.indicators.values()
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Minimum window length per indicator, for diagnostics.
    pub fn min_windows(&self) -> HashMap<String, usize> {
        self.indicators
            .iter()
            .map(|(id, ind)| (id.clone(), ind.min_window()))
            .collect()
    }
}

impl std::fmt::Debug for IndicatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorRegistry")
            .field("indicators", &self.ids())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
