pub mod window;

// Re-export for convenient access (e.g. `use crate::market_data::Window`).
pub use window::{Candle, Window};
