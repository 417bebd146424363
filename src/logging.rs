// =============================================================================
// Logging — tracing subscriber setup for the binary
// =============================================================================
//
// `RUST_LOG` selects the filter (default `info`). `SIGNAL_ENGINE_LOG_JSON=1`
// switches the formatter to one JSON object per line.
// =============================================================================

use tracing_subscriber::EnvFilter;

pub const LOG_JSON_ENV: &str = "SIGNAL_ENGINE_LOG_JSON";

/// Install the global subscriber. Call once, at startup.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_requested(std::env::var(LOG_JSON_ENV).ok().as_deref()) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn json_requested(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_values() {
        assert!(json_requested(Some("1")));
        assert!(json_requested(Some("TRUE")));
        assert!(!json_requested(Some("0")));
        assert!(!json_requested(None));
    }
}
