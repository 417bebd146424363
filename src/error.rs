// =============================================================================
// Error taxonomy
// =============================================================================
//
// Indicator errors never reach the caller of `process_market_data` on their
// own: the engine logs them and treats the indicator as having no opinion.
// Ledger and weight-table errors are surfaced through `EngineError`.
// =============================================================================

use thiserror::Error;

use crate::types::SignalStatus;

/// Structural problems with a candle window.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WindowError {
    #[error("window is empty")]
    Empty,

    #[error("timestamps must be strictly increasing (violated at index {index})")]
    NonMonotonicTimestamps { index: usize },

    #[error("non-finite price or volume at index {index}")]
    NonFiniteValue { index: usize },
}

/// Failure of a single indicator to evaluate a window.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("{indicator}: invalid window: {reason}")]
    InvalidWindow { indicator: String, reason: String },

    #[error("{indicator}: insufficient data ({available} < {required} candles)")]
    InsufficientData {
        indicator: String,
        required: usize,
        available: usize,
    },

    #[error("{indicator}: computation failed: {reason}")]
    Computation { indicator: String, reason: String },
}

/// Errors raised by the signal ledger.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("unknown signal id {0}")]
    NotFound(String),

    #[error("signal {id} already resolved as {status}")]
    AlreadyResolved { id: String, status: SignalStatus },

    /// The id generator produced an id that is already stored. This is an
    /// invariant violation, never a condition to retry.
    #[error("duplicate signal id {0}")]
    DuplicateId(String),

    #[error("ledger lock contended")]
    Busy,
}

/// Errors raised by the weight table.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WeightError {
    #[error("weight table lock contended")]
    Busy,
}

/// Errors surfaced by the engine facade.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("no indicator could evaluate {asset} ({failed} failed)")]
    DataUnavailable { asset: String, failed: usize },

    #[error("unknown signal id {0}")]
    UnknownSignalId(String),

    #[error("signal {id} already resolved as {status}")]
    AlreadyResolved { id: String, status: SignalStatus },

    #[error("duplicate signal id {0} (id generator is broken)")]
    DuplicateId(String),

    #[error("transient failure: {0} lock contended, retry later")]
    Transient(&'static str),
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => Self::UnknownSignalId(id),
            LedgerError::AlreadyResolved { id, status } => Self::AlreadyResolved { id, status },
            LedgerError::DuplicateId(id) => Self::DuplicateId(id),
            LedgerError::Busy => Self::Transient("ledger"),
        }
    }
}

impl From<WeightError> for EngineError {
    fn from(err: WeightError) -> Self {
        match err {
            WeightError::Busy => Self::Transient("weight table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_map_to_engine_errors() {
        assert_eq!(
            EngineError::from(LedgerError::NotFound("abc".into())),
            EngineError::UnknownSignalId("abc".into())
        );
        assert_eq!(
            EngineError::from(LedgerError::Busy),
            EngineError::Transient("ledger")
        );
        assert!(matches!(
            EngineError::from(LedgerError::AlreadyResolved {
                id: "x".into(),
                status: SignalStatus::Won
            }),
            EngineError::AlreadyResolved { status: SignalStatus::Won, .. }
        ));
    }

    #[test]
    fn messages_name_the_indicator() {
        let err = IndicatorError::InsufficientData {
            indicator: "bollinger".into(),
            required: 20,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "bollinger: insufficient data (3 < 20 candles)"
        );
    }
}
