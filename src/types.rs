// =============================================================================
// Shared types used across the signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of an opinion or an emitted signal.
///
/// There is deliberately no "hold" variant: an indicator without an opinion
/// returns nothing instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an emitted signal.
///
/// `Pending` transitions to `Won` or `Lost` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Pending,
    Won,
    Lost,
}

impl Default for SignalStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Won => write!(f, "WON"),
            Self::Lost => write!(f, "LOST"),
        }
    }
}

/// Reported result of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Won,
    Lost,
}

impl Outcome {
    pub fn from_win(won: bool) -> Self {
        if won {
            Self::Won
        } else {
            Self::Lost
        }
    }

    pub fn is_win(self) -> bool {
        matches!(self, Self::Won)
    }

    /// The terminal status a pending signal moves to for this outcome.
    pub fn status(self) -> SignalStatus {
        match self {
            Self::Won => SignalStatus::Won,
            Self::Lost => SignalStatus::Lost,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Won => write!(f, "win"),
            Self::Lost => write!(f, "loss"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serialises_uppercase() {
        assert_eq!(serde_json::to_string(&Action::Buy).unwrap(), "\"BUY\"");
        let a: Action = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(a, Action::Sell);
    }

    #[test]
    fn outcome_maps_to_terminal_status() {
        assert_eq!(Outcome::from_win(true).status(), SignalStatus::Won);
        assert_eq!(Outcome::from_win(false).status(), SignalStatus::Lost);
        assert!(Outcome::Won.is_win());
        assert!(!Outcome::Lost.is_win());
    }

    #[test]
    fn default_status_is_pending() {
        assert_eq!(SignalStatus::default(), SignalStatus::Pending);
    }
}
