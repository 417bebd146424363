// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1 — Compute price changes (deltas) from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3 — Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// `RsiIndicator` reading:
//   RSI <= oversold (30)    => BUY
//   RSI >= overbought (70)  => SELL
//
// Confidence breakpoints (step interpolation):
//   marginal 0.75  RSI has crossed the threshold
//   extreme  0.85  RSI is `extreme_margin` (10) points or more beyond it
// =============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{validate_window, ConfidenceScale, Indicator, Opinion};
use crate::error::IndicatorError;
use crate::market_data::Window;
use crate::types::Action;

/// Compute the full RSI series for the given `closes` and `period`.
///
/// The returned vector has one RSI value for each close starting at index
/// `period` (the first `period` closes are consumed to seed the averages).
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period + 1` => empty vec (need at least `period` deltas)
/// - If average loss is zero (no down moves), RSI is clamped to 100.0.
/// - Non-finite results are dropped and the series is truncated.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let Some(first_rsi) = rsi_from_averages(avg_gain, avg_loss) else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push(first_rsi);

    for &delta in &deltas[period..] {
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { delta.abs() } else { 0.0 };

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => result.push(rsi),
            None => break,
        }
    }

    result
}

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// - If both averages are zero, RSI is 50.0 (no movement).
/// - If average loss is zero (only gains), RSI is 100.0.
/// - Returns `None` when the result is non-finite.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    if rsi.is_finite() {
        Some(rsi)
    } else {
        None
    }
}

// =============================================================================
// Configuration
// =============================================================================

fn default_enabled() -> bool {
    true
}

fn default_period() -> usize {
    14
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

fn default_extreme_margin() -> f64 {
    10.0
}

fn default_min_confidence() -> f64 {
    0.75
}

fn default_duration_minutes() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsiConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_period")]
    pub period: usize,

    #[serde(default = "default_oversold")]
    pub oversold: f64,

    #[serde(default = "default_overbought")]
    pub overbought: f64,

    /// RSI points beyond a threshold that count as extreme.
    #[serde(default = "default_extreme_margin")]
    pub extreme_margin: f64,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            period: default_period(),
            oversold: default_oversold(),
            overbought: default_overbought(),
            extreme_margin: default_extreme_margin(),
            min_confidence: default_min_confidence(),
            duration_minutes: default_duration_minutes(),
        }
    }
}

// =============================================================================
// Strategy
// =============================================================================

pub struct RsiIndicator {
    config: RsiConfig,
    scale: ConfidenceScale,
}

impl RsiIndicator {
    pub const ID: &'static str = "rsi";

    pub fn new(config: RsiConfig) -> Self {
        Self {
            config,
            scale: ConfidenceScale::STANDARD,
        }
    }

    fn read_rsi(&self, rsi: f64) -> Option<Opinion> {
        let cfg = &self.config;

        let (action, is_extreme) = if rsi <= cfg.oversold {
            (Action::Buy, rsi <= cfg.oversold - cfg.extreme_margin)
        } else if rsi >= cfg.overbought {
            (Action::Sell, rsi >= cfg.overbought + cfg.extreme_margin)
        } else {
            return None;
        };

        Some(
            Opinion::new(action, self.scale.step(is_extreme), cfg.duration_minutes)
                .with_evidence("rsi", rsi),
        )
    }
}

#[async_trait]
impl Indicator for RsiIndicator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn min_window(&self) -> usize {
        self.config.period + 1
    }

    async fn evaluate(
        &self,
        asset: &str,
        window: &Window,
    ) -> Result<Option<Opinion>, IndicatorError> {
        validate_window(Self::ID, window, self.min_window())?;

        let series = calculate_rsi(&window.closes(), self.config.period);
        let rsi = *series.last().ok_or_else(|| IndicatorError::Computation {
            indicator: Self::ID.to_string(),
            reason: "RSI series is empty".to_string(),
        })?;

        match self.read_rsi(rsi) {
            Some(opinion) if opinion.confidence >= self.config.min_confidence => {
                info!(asset, rsi, action = %opinion.action, confidence = opinion.confidence, "RSI opinion");
                Ok(Some(opinion))
            }
            _ => {
                debug!(asset, rsi, "RSI: no opinion");
                Ok(None)
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::window::tests::window_from_closes;

    #[test]
    fn rsi_empty_input() {
        assert!(calculate_rsi(&[], 14).is_empty());
    }

    #[test]
    fn rsi_period_zero() {
        assert!(calculate_rsi(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn rsi_insufficient_data() {
        // Need period+1 closes (period deltas). 14 closes => 13 deltas < 14.
        assert!(calculate_rsi(&(1..=14).map(|x| x as f64).collect::<Vec<_>>(), 14).is_empty());
    }

    #[test]
    fn rsi_all_gains() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let series = calculate_rsi(&closes, 14);
        assert!(!series.is_empty());
        for &v in &series {
            assert!((v - 100.0).abs() < 1e-10, "expected 100.0, got {v}");
        }
    }

    #[test]
    fn rsi_flat_market() {
        let closes = vec![100.0; 30];
        let series = calculate_rsi(&closes, 14);
        for &v in &series {
            assert!((v - 50.0).abs() < 1e-10, "expected 50.0, got {v}");
        }
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let series = calculate_rsi(&closes, 14);
        for &v in &series {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }

    #[test]
    fn read_rsi_breakpoints() {
        let ind = RsiIndicator::new(RsiConfig::default());
        assert!(ind.read_rsi(50.0).is_none());
        assert_eq!(ind.read_rsi(29.0).unwrap().confidence, 0.75);
        assert_eq!(ind.read_rsi(20.0).unwrap().confidence, 0.85);
        assert_eq!(ind.read_rsi(71.0).unwrap().action, Action::Sell);
        assert_eq!(ind.read_rsi(85.0).unwrap().confidence, 0.85);
    }

    #[tokio::test]
    async fn falling_market_is_buy() {
        let ind = RsiIndicator::new(RsiConfig::default());
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let opinion = ind
            .evaluate("ETH/USD", &window_from_closes(&closes))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opinion.action, Action::Buy);
        assert_eq!(opinion.confidence, 0.85);
        assert_eq!(opinion.suggested_duration, 3);
    }

    #[tokio::test]
    async fn flat_market_no_opinion() {
        let ind = RsiIndicator::new(RsiConfig::default());
        let opinion = ind
            .evaluate("ETH/USD", &window_from_closes(&[100.0; 30]))
            .await
            .unwrap();
        assert!(opinion.is_none());
    }

    #[tokio::test]
    async fn short_window_is_an_error() {
        let ind = RsiIndicator::new(RsiConfig::default());
        let result = ind.evaluate("ETH/USD", &window_from_closes(&[100.0; 14])).await;
        assert!(matches!(result, Err(IndicatorError::InsufficientData { required: 15, .. })));
    }
}
