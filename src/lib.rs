// =============================================================================
// Signal Engine — adaptive trading-signal core
// =============================================================================
//
// Pluggable technical indicators evaluate a candle window concurrently; their
// opinions are merged by a weight-biased vote into at most one signal, which
// waits in the ledger for a won/lost report. Reports adjust the weights of the
// indicators that contributed.
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod logging;
pub mod market_data;
pub mod persistence;
pub mod signals;
pub mod types;

pub use config::EngineConfig;
pub use engine::{format_signal_message, Engine};
pub use error::EngineError;
pub use market_data::{Candle, Window};
pub use signals::Signal;
pub use types::{Action, Outcome, SignalStatus};
