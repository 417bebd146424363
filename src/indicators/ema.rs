// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period` closes.
//
// `EmaTrendIndicator` reading (fast/mid/slow stack, default 9/21/50):
//   fast > mid > slow  => BUY
//   fast < mid < slow  => SELL
//
// Confidence breakpoints (linear interpolation on spread = |fast - slow| / slow):
//   marginal 0.75  spread = 0 (stack only just aligned)
//   extreme  0.85  spread >= `strong_spread` (default 1 %)
// =============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{validate_window, ConfidenceScale, Indicator, Opinion};
use crate::error::IndicatorError;
use crate::market_data::Window;
use crate::types::Action;

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Each output element corresponds to a close starting at index `period - 1`.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            // Downstream consumers should not trust a broken series.
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// Check whether a fast / mid / slow EMA stack is trend-aligned.
///
/// Returns `Some((is_bullish, strength))` where:
/// - `is_bullish == true`  when fast > mid > slow
/// - `is_bullish == false` when fast < mid < slow
/// - `strength = |fast - slow| / slow`
///
/// Returns `None` when there is not enough data for the slow EMA, when the
/// stack is mixed, or when slow is zero.
pub fn ema_trend_aligned(
    closes: &[f64],
    fast: usize,
    mid: usize,
    slow: usize,
) -> Option<(bool, f64)> {
    if closes.len() < slow {
        return None;
    }

    let f = *calculate_ema(closes, fast).last()?;
    let m = *calculate_ema(closes, mid).last()?;
    let s = *calculate_ema(closes, slow).last()?;

    let bullish = f > m && m > s;
    let bearish = f < m && m < s;

    if !bullish && !bearish {
        return None;
    }

    if s == 0.0 {
        return None;
    }

    let strength = (f - s).abs() / s;
    if !strength.is_finite() {
        return None;
    }

    Some((bullish, strength))
}

// =============================================================================
// Configuration
// =============================================================================

fn default_enabled() -> bool {
    true
}

fn default_fast() -> usize {
    9
}

fn default_mid() -> usize {
    21
}

fn default_slow() -> usize {
    50
}

fn default_strong_spread() -> f64 {
    0.01
}

fn default_min_confidence() -> f64 {
    0.75
}

fn default_duration_minutes() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmaTrendConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_fast")]
    pub fast: usize,

    #[serde(default = "default_mid")]
    pub mid: usize,

    /// Slow EMA period; also the minimum window length.
    #[serde(default = "default_slow")]
    pub slow: usize,

    /// Fast/slow spread at which confidence reaches the extreme breakpoint.
    #[serde(default = "default_strong_spread")]
    pub strong_spread: f64,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
}

impl Default for EmaTrendConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            fast: default_fast(),
            mid: default_mid(),
            slow: default_slow(),
            strong_spread: default_strong_spread(),
            min_confidence: default_min_confidence(),
            duration_minutes: default_duration_minutes(),
        }
    }
}

// =============================================================================
// Strategy
// =============================================================================

pub struct EmaTrendIndicator {
    config: EmaTrendConfig,
    scale: ConfidenceScale,
}

impl EmaTrendIndicator {
    pub const ID: &'static str = "ema_trend";

    pub fn new(config: EmaTrendConfig) -> Self {
        Self {
            config,
            scale: ConfidenceScale::STANDARD,
        }
    }
}

#[async_trait]
impl Indicator for EmaTrendIndicator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn min_window(&self) -> usize {
        self.config.slow
    }

    async fn evaluate(
        &self,
        asset: &str,
        window: &Window,
    ) -> Result<Option<Opinion>, IndicatorError> {
        let cfg = &self.config;
        validate_window(Self::ID, window, cfg.slow)?;

        let Some((bullish, strength)) =
            ema_trend_aligned(&window.closes(), cfg.fast, cfg.mid, cfg.slow)
        else {
            debug!(asset, "EMA stack not aligned");
            return Ok(None);
        };

        let action = if bullish { Action::Buy } else { Action::Sell };
        let confidence = self.scale.linear(strength / cfg.strong_spread);
        if confidence < cfg.min_confidence {
            return Ok(None);
        }

        info!(asset, action = %action, strength, confidence, "EMA trend opinion");
        Ok(Some(
            Opinion::new(action, confidence, cfg.duration_minutes).with_evidence("spread", strength),
        ))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::window::tests::window_from_closes;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn ema_known_values() {
        // SMA of first 5 = 3.0, multiplier = 2/6 = 1/3
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 5);
        assert_eq!(ema.len(), 6);

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        let mut expected_vec = vec![expected];
        for &c in &closes[5..] {
            expected = c * mult + expected * (1.0 - mult);
            expected_vec.push(expected);
        }
        for (a, b) in ema.iter().zip(expected_vec.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn trend_aligned_insufficient_data() {
        assert!(ema_trend_aligned(&ascending(49), 9, 21, 50).is_none());
    }

    #[test]
    fn trend_aligned_flat_returns_none() {
        assert!(ema_trend_aligned(&[100.0; 200], 9, 21, 50).is_none());
    }

    #[tokio::test]
    async fn strong_uptrend_is_extreme_buy() {
        let ind = EmaTrendIndicator::new(EmaTrendConfig::default());
        let opinion = ind
            .evaluate("SOL/USD", &window_from_closes(&ascending(60)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opinion.action, Action::Buy);
        assert!((opinion.confidence - 0.85).abs() < 1e-12);
    }

    #[tokio::test]
    async fn strong_downtrend_is_sell() {
        let ind = EmaTrendIndicator::new(EmaTrendConfig::default());
        let closes: Vec<f64> = (1..=60).rev().map(|x| x as f64).collect();
        let opinion = ind
            .evaluate("SOL/USD", &window_from_closes(&closes))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opinion.action, Action::Sell);
    }

    #[tokio::test]
    async fn gentle_trend_is_near_marginal() {
        let ind = EmaTrendIndicator::new(EmaTrendConfig::default());
        let closes: Vec<f64> = (0..60).map(|i| 1000.0 + i as f64 * 0.01).collect();
        let opinion = ind
            .evaluate("SOL/USD", &window_from_closes(&closes))
            .await
            .unwrap()
            .unwrap();
        assert!(opinion.confidence >= 0.75 && opinion.confidence < 0.76);
    }

    #[tokio::test]
    async fn short_window_is_an_error() {
        let ind = EmaTrendIndicator::new(EmaTrendConfig::default());
        let result = ind.evaluate("SOL/USD", &window_from_closes(&ascending(30))).await;
        assert!(matches!(result, Err(IndicatorError::InsufficientData { required: 50, .. })));
    }
}
