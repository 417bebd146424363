use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::WindowError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV sample supplied by the market-data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Sample open time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

// ---------------------------------------------------------------------------
// Window -- validated, immutable candle sequence for one asset
// ---------------------------------------------------------------------------

/// An ordered candle sequence, most recent last.
///
/// A `Window` can only be built through [`Window::new`], so every instance is
/// non-empty, strictly increasing in `timestamp`, and free of NaN/inf values.
/// It exposes no mutators; the engine shares one instance behind an `Arc`
/// across all indicator tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Candle>", into = "Vec<Candle>")]
pub struct Window {
    candles: Vec<Candle>,
}

impl Window {
    /// Validate and wrap `candles`.
    pub fn new(candles: Vec<Candle>) -> Result<Self, WindowError> {
        if candles.is_empty() {
            return Err(WindowError::Empty);
        }

        for (index, candle) in candles.iter().enumerate() {
            if !candle.is_finite() {
                return Err(WindowError::NonFiniteValue { index });
            }
            if index > 0 && candle.timestamp <= candles[index - 1].timestamp {
                return Err(WindowError::NonMonotonicTimestamps { index });
            }
        }

        Ok(Self { candles })
    }

    /// Read a window from a JSON array of candles.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read window from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse window from {}", path.display()))
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Always `false`; present for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Close prices, oldest first.
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// The most recent candle.
    pub fn last(&self) -> &Candle {
        // Non-empty by construction.
        &self.candles[self.candles.len() - 1]
    }

    /// Close price of the most recent candle.
    pub fn last_close(&self) -> f64 {
        self.last().close
    }
}

impl TryFrom<Vec<Candle>> for Window {
    type Error = WindowError;

    fn try_from(candles: Vec<Candle>) -> Result<Self, Self::Error> {
        Self::new(candles)
    }
}

impl From<Window> for Vec<Candle> {
    fn from(window: Window) -> Self {
        window.candles
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a window of one-minute candles from a list of closes.
    pub(crate) fn window_from_closes(closes: &[f64]) -> Window {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: 1_700_000_000_000 + i as i64 * 60_000,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect();
        Window::new(candles).unwrap()
    }

    fn sample_candle(timestamp: i64, close: f64) -> Candle {
        Candle {
            timestamp,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn empty_window_rejected() {
        assert_eq!(Window::new(Vec::new()), Err(WindowError::Empty));
    }

    #[test]
    fn non_increasing_timestamps_rejected() {
        let candles = vec![
            sample_candle(1, 100.0),
            sample_candle(2, 101.0),
            sample_candle(2, 102.0),
        ];
        assert_eq!(
            Window::new(candles),
            Err(WindowError::NonMonotonicTimestamps { index: 2 })
        );
    }

    #[test]
    fn nan_close_rejected() {
        let candles = vec![sample_candle(1, 100.0), sample_candle(2, f64::NAN)];
        assert_eq!(
            Window::new(candles),
            Err(WindowError::NonFiniteValue { index: 1 })
        );
    }

    #[test]
    fn accessors_follow_candle_order() {
        let w = window_from_closes(&[1.0, 2.0, 3.0]);
        assert_eq!(w.len(), 3);
        assert!(!w.is_empty());
        assert_eq!(w.closes(), vec![1.0, 2.0, 3.0]);
        assert_eq!(w.last_close(), 3.0);
    }

    #[test]
    fn deserialise_validates() {
        let ok = r#"[
            {"timestamp": 1, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 5.0},
            {"timestamp": 2, "open": 1.0, "high": 2.0, "low": 1.0, "close": 2.0}
        ]"#;
        let w: Window = serde_json::from_str(ok).unwrap();
        assert_eq!(w.len(), 2);
        assert_eq!(w.candles()[1].volume, 0.0);

        let bad = r#"[
            {"timestamp": 5, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0},
            {"timestamp": 4, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0}
        ]"#;
        assert!(serde_json::from_str::<Window>(bad).is_err());
    }
}
