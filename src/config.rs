// =============================================================================
// Engine Configuration — JSON settings with serde defaults and atomic save
// =============================================================================
//
// Every tunable of the engine lives here: emission threshold, learning-rate
// dynamics, concurrency limits, and per-indicator parameters.
//
// All fields carry `#[serde(default)]` so that adding new fields never breaks
// loading an older config file. Persistence uses an atomic tmp + rename.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::{BollingerConfig, EmaTrendConfig, RsiConfig};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_emission_threshold() -> f64 {
    0.70
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_weight_floor() -> f64 {
    0.1
}

fn default_indicator_timeout_ms() -> u64 {
    2_000
}

fn default_max_concurrent_indicators() -> usize {
    8
}

fn default_lock_timeout_ms() -> u64 {
    50
}

fn default_max_lock_retries() -> u32 {
    3
}

// =============================================================================
// IndicatorsConfig
// =============================================================================

/// Per-strategy parameters. A strategy with `enabled: false` is not
/// registered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorsConfig {
    #[serde(default)]
    pub bollinger: BollingerConfig,

    #[serde(default)]
    pub rsi: RsiConfig,

    #[serde(default)]
    pub ema_trend: EmaTrendConfig,
}

// =============================================================================
// EngineConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Aggregation ---------------------------------------------------------

    /// Minimum merged confidence for a signal to be emitted.
    #[serde(default = "default_emission_threshold")]
    pub emission_threshold: f64,

    // --- Learning ------------------------------------------------------------

    /// η in the multiplicative update `w *= 1 ± η·confidence`.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// No weight is ever driven below this value.
    #[serde(default = "default_weight_floor")]
    pub weight_floor: f64,

    // --- Concurrency ---------------------------------------------------------

    /// An indicator that has not answered after this long counts as no
    /// opinion.
    #[serde(default = "default_indicator_timeout_ms")]
    pub indicator_timeout_ms: u64,

    /// Upper bound on indicator evaluations in flight per call.
    #[serde(default = "default_max_concurrent_indicators")]
    pub max_concurrent_indicators: usize,

    /// Wait per attempt when acquiring a weight-table or ledger write lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Attempts before a contended write surfaces as a transient failure.
    #[serde(default = "default_max_lock_retries")]
    pub max_lock_retries: u32,

    // --- Persistence ---------------------------------------------------------

    /// Where weights and the ledger are saved. `None` keeps state in memory.
    #[serde(default)]
    pub state_path: Option<String>,

    // --- Indicators ----------------------------------------------------------

    #[serde(default)]
    pub indicators: IndicatorsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            emission_threshold: default_emission_threshold(),
            learning_rate: default_learning_rate(),
            weight_floor: default_weight_floor(),
            indicator_timeout_ms: default_indicator_timeout_ms(),
            max_concurrent_indicators: default_max_concurrent_indicators(),
            lock_timeout_ms: default_lock_timeout_ms(),
            max_lock_retries: default_max_lock_retries(),
            state_path: None,
            indicators: IndicatorsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid engine config in {}", path.display()))?;

        info!(
            path = %path.display(),
            emission_threshold = config.emission_threshold,
            learning_rate = config.learning_rate,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write (write to
    /// `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Reject values that would break the weight or confidence invariants.
    pub fn validate(&self) -> Result<()> {
        if !(self.emission_threshold > 0.0 && self.emission_threshold <= 1.0) {
            bail!("emission_threshold must be in (0, 1], got {}", self.emission_threshold);
        }
        if !(self.learning_rate > 0.0 && self.learning_rate < 1.0) {
            bail!("learning_rate must be in (0, 1), got {}", self.learning_rate);
        }
        // A floor above 1.0 cannot coexist with weights summing to the
        // indicator count.
        if !(self.weight_floor > 0.0 && self.weight_floor <= 1.0) {
            bail!("weight_floor must be in (0, 1], got {}", self.weight_floor);
        }
        if self.indicator_timeout_ms == 0 {
            bail!("indicator_timeout_ms must be positive");
        }
        if self.max_concurrent_indicators == 0 {
            bail!("max_concurrent_indicators must be positive");
        }
        if self.max_lock_retries == 0 {
            bail!("max_lock_retries must be at least 1");
        }

        let ind = &self.indicators;
        if ind.bollinger.period == 0 || ind.rsi.period == 0 {
            bail!("indicator periods must be positive");
        }
        if ind.ema_trend.fast == 0 || !(ind.ema_trend.fast < ind.ema_trend.mid && ind.ema_trend.mid < ind.ema_trend.slow) {
            bail!("ema_trend periods must satisfy 0 < fast < mid < slow");
        }
        if ind.ema_trend.strong_spread <= 0.0 {
            bail!("ema_trend.strong_spread must be positive");
        }
        for (name, min) in [
            ("bollinger", ind.bollinger.min_confidence),
            ("rsi", ind.rsi.min_confidence),
            ("ema_trend", ind.ema_trend.min_confidence),
        ] {
            if !(min > 0.0 && min <= 1.0) {
                bail!("{name}.min_confidence must be in (0, 1], got {min}");
            }
        }

        Ok(())
    }

    pub fn indicator_timeout(&self) -> Duration {
        Duration::from_millis(self.indicator_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
