// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ). The Band Width (BBW) is the normalised
// distance: BBW = (upper - lower) / middle * 100.
//
// Mean-reversion reading used by `BollingerIndicator`:
//   close <= lower  => BUY
//   close >= upper  => SELL
//
// Confidence breakpoints (step interpolation):
//   marginal 0.75  close is on or past the band by less than `extreme_extension`
//   extreme  0.85  close is more than `extreme_extension` (default 2 %) past it,
//                  i.e. close < lower * 0.98 or close > upper * 1.02
// =============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{validate_window, ConfidenceScale, Indicator, Opinion};
use crate::error::IndicatorError;
use crate::market_data::Window;
use crate::types::Action;

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub width: f64,
}

/// Calculate Bollinger Bands over the last `period` closing prices.
///
/// Returns `Some(BollingerResult)` containing:
/// - `upper`  = SMA + `num_std` * σ
/// - `middle` = SMA
/// - `lower`  = SMA - `num_std` * σ
/// - `width`  = (upper - lower) / middle * 100  (Bollinger Band Width)
///
/// σ is the population standard deviation.
///
/// Returns `None` when:
/// - Fewer than `period` data points.
/// - Middle band is zero (degenerate input).
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let sum: f64 = window.iter().sum();
    let middle = sum / period as f64;

    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let width = (upper - lower) / middle * 100.0;

    if width.is_finite() {
        Some(BollingerResult {
            upper,
            middle,
            lower,
            width,
        })
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
    20
}

fn default_std_dev() -> f64 {
    2.0
}

fn default_min_confidence() -> f64 {
    0.75
}

fn default_extreme_extension() -> f64 {
    0.02
}

fn default_duration_minutes() -> u32 {
    5
}

/// Parameters for the Bollinger strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BollingerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// SMA look-back; also the minimum window length.
    #[serde(default = "default_period")]
    pub period: usize,

    /// Band half-width in standard deviations.
    #[serde(default = "default_std_dev")]
    pub std_dev: f64,

    /// Opinions below this confidence are dropped.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Fractional distance past a band that counts as extreme.
    #[serde(default = "default_extreme_extension")]
    pub extreme_extension: f64,

    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
}

impl Default for BollingerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            period: default_period(),
            std_dev: default_std_dev(),
            min_confidence: default_min_confidence(),
            extreme_extension: default_extreme_extension(),
            duration_minutes: default_duration_minutes(),
        }
    }
}

// =============================================================================
// Strategy
// =============================================================================

pub struct BollingerIndicator {
    config: BollingerConfig,
    scale: ConfidenceScale,
}

impl BollingerIndicator {
    pub const ID: &'static str = "bollinger";

    pub fn new(config: BollingerConfig) -> Self {
        debug!(
            period = config.period,
            std_dev = config.std_dev,
            min_confidence = config.min_confidence,
            "BollingerIndicator initialised"
        );
        Self {
            config,
            scale: ConfidenceScale::STANDARD,
        }
    }

    /// Map the latest close against the bands to an unfiltered opinion.
    fn read_bands(&self, close: f64, bands: &BollingerResult) -> Option<Opinion> {
        let ext = self.config.extreme_extension;

        let (action, is_extreme) = if close <= bands.lower {
            (Action::Buy, close < bands.lower * (1.0 - ext))
        } else if close >= bands.upper {
            (Action::Sell, close > bands.upper * (1.0 + ext))
        } else {
            return None;
        };

        Some(
            Opinion::new(action, self.scale.step(is_extreme), self.config.duration_minutes)
                .with_evidence("upper", bands.upper)
                .with_evidence("middle", bands.middle)
                .with_evidence("lower", bands.lower)
                .with_evidence("width", bands.width)
                .with_evidence("close", close),
        )
    }
}

#[async_trait]
impl Indicator for BollingerIndicator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn min_window(&self) -> usize {
        self.config.period
    }

    async fn evaluate(
        &self,
        asset: &str,
        window: &Window,
    ) -> Result<Option<Opinion>, IndicatorError> {
        validate_window(Self::ID, window, self.config.period)?;

        let closes = window.closes();
        let bands = calculate_bollinger(&closes, self.config.period, self.config.std_dev)
            .ok_or_else(|| IndicatorError::Computation {
                indicator: Self::ID.to_string(),
                reason: "degenerate bands".to_string(),
            })?;

        // Zero-width bands: every close touches both edges, no direction.
        if bands.upper <= bands.lower {
            debug!(asset, "bollinger: flat bands, no opinion");
            return Ok(None);
        }

        let opinion = match self.read_bands(window.last_close(), &bands) {
            Some(o) if o.confidence >= self.config.min_confidence => o,
            _ => return Ok(None),
        };

        info!(
            asset,
            action = %opinion.action,
            confidence = opinion.confidence,
            "Bollinger opinion"
        );
        Ok(Some(opinion))
    }
}
