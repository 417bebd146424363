// =============================================================================
// Aggregator — weight-biased vote over indicator opinions
// =============================================================================
//
// Pipeline:
//   1. Drop indicators without an opinion.
//   2. Score each side: S(action) = Σ weight·confidence over its opinions.
//   3. The larger side wins; an exact tie abstains.
//   4. Merged confidence = S(winner) / Σ weight(winner)  (weighted average
//      among the agreeing indicators only).
//   5. Duration comes from the highest-weighted contributor; ties go to the
//      lowest indicator id.
//   6. Emit only when merged confidence >= emission threshold.
// =============================================================================

use std::sync::Arc;

use tracing::{debug, info};

use super::signal::{Contribution, Signal};
use super::weight_table::WeightTable;
use crate::indicators::{clamp_confidence, Opinion};
use crate::types::Action;

/// An opinion tagged with the identity of the indicator that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorOpinion {
    pub indicator_id: String,
    pub opinion: Opinion,
}

impl IndicatorOpinion {
    pub fn new(indicator_id: impl Into<String>, opinion: Opinion) -> Self {
        Self {
            indicator_id: indicator_id.into(),
            opinion,
        }
    }
}

/// Per-side tally used while voting.
#[derive(Debug, Default, Clone, Copy)]
struct SideScore {
    weighted_confidence: f64,
    weight: f64,
    votes: usize,
}

pub struct Aggregator {
    weights: Arc<WeightTable>,
    emission_threshold: f64,
}

impl Aggregator {
    pub fn new(weights: Arc<WeightTable>, emission_threshold: f64) -> Self {
        Self {
            weights,
            emission_threshold,
        }
    }

    pub fn emission_threshold(&self) -> f64 {
        self.emission_threshold
    }

    /// Merge `opinions` for `asset` into at most one signal.
    ///
    /// The result does not depend on the order of `opinions`.
    pub fn aggregate(&self, asset: &str, opinions: &[IndicatorOpinion]) -> Option<Signal> {
        if opinions.is_empty() {
            debug!(asset, "no opinions to aggregate");
            return None;
        }

        // Identity order makes every later step independent of completion order.
        // `Opinion` fields are public, so confidences are re-clamped here.
        let mut sorted: Vec<IndicatorOpinion> = opinions
            .iter()
            .map(|o| {
                let mut o = o.clone();
                o.opinion.confidence = clamp_confidence(o.opinion.confidence);
                o
            })
            .collect();
        sorted.sort_by(|a, b| a.indicator_id.cmp(&b.indicator_id));

        let weights = self
            .weights
            .weights_for(sorted.iter().map(|o| o.indicator_id.as_str()));
        let weight_of = |id: &str| weights.get(id).copied().unwrap_or(1.0);

        let mut buy = SideScore::default();
        let mut sell = SideScore::default();
        for o in &sorted {
            let w = weight_of(&o.indicator_id);
            let side = match o.opinion.action {
                Action::Buy => &mut buy,
                Action::Sell => &mut sell,
            };
            side.weighted_confidence += w * o.opinion.confidence;
            side.weight += w;
            side.votes += 1;
        }

        let (action, winner) = if buy.weighted_confidence > sell.weighted_confidence {
            (Action::Buy, buy)
        } else if sell.weighted_confidence > buy.weighted_confidence {
            (Action::Sell, sell)
        } else {
            info!(
                asset,
                score = buy.weighted_confidence,
                "BUY and SELL tied, abstaining"
            );
            return None;
        };

        if winner.weight <= 0.0 {
            return None;
        }
        let confidence = clamp_confidence(winner.weighted_confidence / winner.weight);

        if confidence < self.emission_threshold {
            debug!(
                asset,
                action = %action,
                confidence,
                threshold = self.emission_threshold,
                "merged confidence below emission threshold"
            );
            return None;
        }

        let agreeing: Vec<&IndicatorOpinion> = sorted
            .iter()
            .filter(|o| o.opinion.action == action)
            .collect();

        // Strictly greater keeps the first (lowest id) among equal weights.
        let mut lead = agreeing[0];
        for &o in &agreeing[1..] {
            if weight_of(&o.indicator_id) > weight_of(&lead.indicator_id) {
                lead = o;
            }
        }
        let duration = lead.opinion.suggested_duration;

        let contributions: Vec<Contribution> = agreeing
            .iter()
            .map(|o| Contribution {
                indicator_id: o.indicator_id.clone(),
                confidence: o.opinion.confidence,
                weight: weight_of(&o.indicator_id),
            })
            .collect();

        info!(
            asset,
            action = %action,
            confidence,
            duration,
            agreeing = winner.votes,
            dissenting = sorted.len() - winner.votes,
            "opinions merged"
        );

        Some(Signal::new(asset, action, confidence, duration, contributions))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::weight_table::WeightSettings;

    fn aggregator(ids: &[&str]) -> (Aggregator, Arc<WeightTable>) {
        let weights = Arc::new(WeightTable::new(ids.iter().copied(), WeightSettings::default()));
        (Aggregator::new(weights.clone(), 0.70), weights)
    }

    fn op(id: &str, action: Action, confidence: f64, duration: u32) -> IndicatorOpinion {
        IndicatorOpinion::new(id, Opinion::new(action, confidence, duration))
    }

    #[test]
    fn no_opinions_no_signal() {
        let (agg, _) = aggregator(&["a"]);
        assert!(agg.aggregate("BTC/USD", &[]).is_none());
    }

    #[test]
    fn stronger_side_wins_and_only_it_contributes() {
        let (agg, _) = aggregator(&["a", "b"]);
        let signal = agg
            .aggregate(
                "BTC/USD",
                &[op("a", Action::Buy, 0.9, 5), op("b", Action::Sell, 0.6, 3)],
            )
            .unwrap();
        assert_eq!(signal.action, Action::Buy);
        assert!((signal.confidence - 0.9).abs() < 1e-12);
        assert_eq!(signal.duration, 5);
        assert_eq!(signal.contributing_indicators.len(), 1);
        assert_eq!(signal.contributing_indicators[0].indicator_id, "a");
        assert!(signal.is_pending());
    }

    #[test]
    fn exact_tie_abstains() {
        let (agg, _) = aggregator(&["a", "b"]);
        let result = agg.aggregate(
            "BTC/USD",
            &[op("a", Action::Buy, 0.8, 5), op("b", Action::Sell, 0.8, 5)],
        );
        assert!(result.is_none());
    }

    #[test]
    fn below_threshold_is_suppressed() {
        let (agg, _) = aggregator(&["a"]);
        assert!(agg
            .aggregate("BTC/USD", &[op("a", Action::Buy, 0.65, 5)])
            .is_none());
    }

    #[test]
    fn at_threshold_is_emitted() {
        let (agg, _) = aggregator(&["a"]);
        assert!(agg
            .aggregate("BTC/USD", &[op("a", Action::Sell, 0.70, 5)])
            .is_some());
    }

    #[test]
    fn merged_confidence_is_weighted_average_of_agreeing() {
        let (agg, weights) = aggregator(&["a", "b", "c"]);
        weights.update("a", true, 1.0).unwrap();
        let wa = weights.get("a");
        let wb = weights.get("b");

        let signal = agg
            .aggregate(
                "BTC/USD",
                &[
                    op("a", Action::Buy, 0.9, 5),
                    op("b", Action::Buy, 0.75, 3),
                    op("c", Action::Sell, 0.8, 1),
                ],
            )
            .unwrap();
        let expected = (wa * 0.9 + wb * 0.75) / (wa + wb);
        assert!((signal.confidence - expected).abs() < 1e-12);
        // a has the higher weight, so its duration is used.
        assert_eq!(signal.duration, 5);
        assert!(signal
            .contributing_indicators
            .iter()
            .all(|c| c.indicator_id != "c"));
        assert!((signal.contributing_indicators[0].weight - wa).abs() < 1e-12);
    }

    #[test]
    fn coalition_beats_single_heavier_dissenter() {
        let (agg, weights) = aggregator(&["a", "b", "c"]);
        for _ in 0..5 {
            weights.update("c", true, 1.0).unwrap();
        }
        assert!(weights.get("c") > weights.get("a"));

        let signal = agg
            .aggregate(
                "BTC/USD",
                &[
                    op("a", Action::Sell, 0.85, 5),
                    op("b", Action::Sell, 0.85, 5),
                    op("c", Action::Buy, 0.85, 5),
                ],
            )
            .unwrap();
        assert_eq!(signal.action, Action::Sell);
    }

    #[test]
    fn duration_tie_breaks_on_lowest_id() {
        let (agg, _) = aggregator(&["alpha", "beta"]);
        let signal = agg
            .aggregate(
                "BTC/USD",
                &[op("beta", Action::Buy, 0.8, 9), op("alpha", Action::Buy, 0.8, 2)],
            )
            .unwrap();
        assert_eq!(signal.duration, 2);
        assert_eq!(signal.contributing_indicators[0].indicator_id, "alpha");
    }

    #[test]
    fn out_of_range_confidences_are_clamped() {
        let (agg, _) = aggregator(&["a", "b"]);
        let raw = |id: &str, action, confidence| IndicatorOpinion {
            indicator_id: id.to_string(),
            opinion: Opinion {
                action,
                confidence,
                suggested_duration: 5,
                evidence: Default::default(),
            },
        };

        let signal = agg
            .aggregate(
                "BTC/USD",
                &[raw("a", Action::Buy, 5.0), raw("b", Action::Buy, 1.0)],
            )
            .unwrap();
        assert_eq!(signal.confidence, 1.0);
        assert!(signal
            .contributing_indicators
            .iter()
            .all(|c| c.confidence == 1.0));

        // A zero-confidence opinion cannot outvote anything.
        let signal = agg
            .aggregate(
                "BTC/USD",
                &[raw("a", Action::Buy, 0.0), raw("b", Action::Sell, 0.8)],
            )
            .unwrap();
        assert_eq!(signal.action, Action::Sell);
        assert_eq!(signal.contributing_indicators.len(), 1);
    }

    #[test]
    fn input_order_does_not_matter() {
        let (agg, _) = aggregator(&["a", "b", "c"]);
        let forward = [
            op("a", Action::Buy, 0.8, 5),
            op("b", Action::Buy, 0.9, 3),
            op("c", Action::Sell, 0.75, 1),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let s1 = agg.aggregate("BTC/USD", &forward).unwrap();
        let s2 = agg.aggregate("BTC/USD", &reversed).unwrap();
        assert_eq!(s1.action, s2.action);
        assert_eq!(s1.confidence, s2.confidence);
        assert_eq!(s1.duration, s2.duration);
        assert_eq!(s1.contributing_indicators, s2.contributing_indicators);
    }
}
