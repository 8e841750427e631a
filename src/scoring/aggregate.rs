//! PM aggregation: weighted directional scoring over analyst verdicts

use crate::verdict::Recommendation;
use serde::{Deserialize, Serialize};

/// Role inferred from an analyst label, driving the fixed weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalystRole {
    Fundamental,
    Valuation,
    Sentiment,
    News,
    Technical,
    Macro,
    Other,
}

impl AnalystRole {
    /// Classify a free-text label by ordered substring match.
    ///
    /// The priority order is fixed so that a label like "Fundamental
    /// Valuation" always resolves the same way.
    pub fn classify(label: &str) -> Self {
        let key = label.trim().to_lowercase();
        if key.contains("fundamental") {
            AnalystRole::Fundamental
        } else if key.contains("valuation") || key.contains("val") {
            AnalystRole::Valuation
        } else if key.contains("sentiment") {
            AnalystRole::Sentiment
        } else if key.contains("news") {
            AnalystRole::News
        } else if key.contains("technical") || key.contains("chart") || key.contains("market") {
            AnalystRole::Technical
        } else if key.contains("macro") {
            AnalystRole::Macro
        } else {
            AnalystRole::Other
        }
    }

    /// Fixed raw weight per role, normalized across present entries
    pub fn raw_weight(&self) -> f64 {
        match self {
            AnalystRole::Fundamental => 0.40,
            AnalystRole::Valuation => 0.30,
            AnalystRole::Sentiment => 0.20,
            AnalystRole::News => 0.20,
            AnalystRole::Technical => 0.10,
            AnalystRole::Macro => 0.10,
            AnalystRole::Other => 1.0,
        }
    }
}

/// One normalized analyst input to the PM stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmInput {
    pub analyst: String,
    pub role: AnalystRole,
    pub recommendation: Recommendation,
    /// Conviction clamped to [0,1]
    pub conviction: f64,
    /// Directional signal: Buy=+1.0, Hold=+0.2, Sell=-1.0
    pub signal: f64,
    /// Normalized weight across present entries
    pub weight: f64,
}

/// Append-only snapshot of the PM aggregation for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmAggregate {
    /// Composite directional score in [-1,1]
    pub composite_score: f64,
    pub direction: Recommendation,
    pub threshold: f64,
    /// Conviction magnitude for the chosen direction, in [0,1]
    pub base_conviction: f64,
    /// Weighted average conviction over Buy entries
    pub bullish_strength: f64,
    /// Weighted average conviction over Sell entries
    pub bearish_strength: f64,
    /// Weighted average conviction over Hold entries
    pub hold_strength: f64,
    /// Divergence across analysts, when a narrative pass supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_level: Option<f64>,
    pub inputs: Vec<PmInput>,
    /// Set when no valid entries reached the aggregation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Compute the composite directional score for the given analyst entries.
///
/// Entries carry (label, recommendation, conviction); anything unparsable was
/// already dropped upstream. Never fails: with no entries the degenerate
/// aggregate (score 0, Hold, conviction 0) is returned with a warning.
pub fn directional_score(
    entries: &[(String, Recommendation, f64)],
    threshold: f64,
) -> PmAggregate {
    let mut inputs: Vec<PmInput> = entries
        .iter()
        .map(|(label, rec, conviction)| {
            let role = AnalystRole::classify(label);
            PmInput {
                analyst: label.clone(),
                role,
                recommendation: *rec,
                conviction: conviction.clamp(0.0, 1.0),
                signal: rec.signal(),
                weight: role.raw_weight(),
            }
        })
        .collect();

    if inputs.is_empty() {
        tracing::warn!("no valid analyst entries reached PM aggregation");
        return PmAggregate {
            composite_score: 0.0,
            direction: Recommendation::Hold,
            threshold,
            base_conviction: 0.0,
            bullish_strength: 0.0,
            bearish_strength: 0.0,
            hold_strength: 0.0,
            conflict_level: None,
            inputs: Vec::new(),
            warning: Some("No valid analyst entries provided.".to_string()),
        };
    }

    // Normalize the fixed role weights; degenerate totals fall back to equal
    // weighting.
    let total_raw: f64 = inputs.iter().map(|i| i.weight).sum();
    if total_raw <= 0.0 {
        let equal = 1.0 / inputs.len() as f64;
        for input in &mut inputs {
            input.weight = equal;
        }
    } else {
        for input in &mut inputs {
            input.weight /= total_raw;
        }
    }

    let numerator: f64 = inputs
        .iter()
        .map(|i| i.weight * i.conviction * i.signal)
        .sum();
    let denominator: f64 = inputs.iter().map(|i| i.weight * i.conviction).sum();
    let composite = if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    };

    let direction = if composite >= threshold {
        Recommendation::Buy
    } else if composite <= -threshold {
        Recommendation::Sell
    } else {
        Recommendation::Hold
    };

    let weighted_avg = |rec: Recommendation| -> f64 {
        let num: f64 = inputs
            .iter()
            .filter(|i| i.recommendation == rec)
            .map(|i| i.weight * i.conviction)
            .sum();
        let denom: f64 = inputs
            .iter()
            .filter(|i| i.recommendation == rec)
            .map(|i| i.weight)
            .sum();
        if denom > 0.0 {
            num / denom
        } else {
            0.0
        }
    };

    let bullish_strength = weighted_avg(Recommendation::Buy);
    let bearish_strength = weighted_avg(Recommendation::Sell);
    let hold_strength = weighted_avg(Recommendation::Hold);

    let base_conviction = match direction {
        Recommendation::Buy => bullish_strength,
        Recommendation::Sell => bearish_strength,
        Recommendation::Hold => hold_strength,
    }
    .clamp(0.0, 1.0);

    PmAggregate {
        composite_score: round4(composite),
        direction,
        threshold,
        base_conviction: round4(base_conviction),
        bullish_strength: round4(bullish_strength),
        bearish_strength: round4(bearish_strength),
        hold_strength: round4(hold_strength),
        conflict_level: None,
        inputs,
        warning: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, rec: Recommendation, conviction: f64) -> (String, Recommendation, f64) {
        (label.to_string(), rec, conviction)
    }

    #[test]
    fn test_role_classifier_priority_order() {
        assert_eq!(AnalystRole::classify("Fundamental Analyst"), AnalystRole::Fundamental);
        // "fundamental" wins over later matches in a combined label
        assert_eq!(
            AnalystRole::classify("Fundamental Valuation Desk"),
            AnalystRole::Fundamental
        );
        assert_eq!(AnalystRole::classify("Valuation"), AnalystRole::Valuation);
        assert_eq!(AnalystRole::classify("Social/Sentiment"), AnalystRole::Sentiment);
        assert_eq!(AnalystRole::classify("News"), AnalystRole::News);
        assert_eq!(AnalystRole::classify("Market/Technical"), AnalystRole::Technical);
        assert_eq!(AnalystRole::classify("chart reader"), AnalystRole::Technical);
        assert_eq!(AnalystRole::classify("Macro"), AnalystRole::Macro);
        assert_eq!(AnalystRole::classify("mystery"), AnalystRole::Other);
    }

    #[test]
    fn test_weighted_composite_three_analysts() {
        let aggregate = directional_score(
            &[
                entry("Fundamental", Recommendation::Buy, 0.8),
                entry("Valuation", Recommendation::Buy, 0.6),
                entry("Sentiment", Recommendation::Sell, 0.4),
            ],
            0.33,
        );

        // Raw weights 0.40/0.30/0.20 normalize to 4/9, 3/9, 2/9.
        let w = [4.0 / 9.0, 3.0 / 9.0, 2.0 / 9.0];
        let num = w[0] * 0.8 + w[1] * 0.6 - w[2] * 0.4;
        let den = w[0] * 0.8 + w[1] * 0.6 + w[2] * 0.4;
        let expected = num / den;

        assert!((aggregate.composite_score - expected).abs() < 1e-3);
        assert_eq!(aggregate.direction, Recommendation::Buy);
        assert_eq!(aggregate.base_conviction, aggregate.bullish_strength);
        assert!(aggregate.warning.is_none());

        let weight_sum: f64 = aggregate.inputs.iter().map(|i| i.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_composite_stays_in_range() {
        let aggregate = directional_score(
            &[
                entry("Fundamental", Recommendation::Sell, 1.0),
                entry("News", Recommendation::Sell, 1.0),
            ],
            0.33,
        );
        assert!((-1.0..=1.0).contains(&aggregate.composite_score));
        assert_eq!(aggregate.direction, Recommendation::Sell);
        assert_eq!(aggregate.base_conviction, aggregate.bearish_strength);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        // A single Buy entry scores exactly +1.0 regardless of conviction.
        let aggregate = directional_score(&[entry("News", Recommendation::Buy, 0.2)], 1.0);
        assert_eq!(aggregate.direction, Recommendation::Buy);

        let aggregate = directional_score(&[entry("News", Recommendation::Sell, 0.2)], 1.0);
        assert_eq!(aggregate.direction, Recommendation::Sell);
    }

    #[test]
    fn test_hold_between_thresholds() {
        let aggregate = directional_score(
            &[
                entry("Fundamental", Recommendation::Buy, 0.5),
                entry("Valuation", Recommendation::Sell, 0.5),
            ],
            0.33,
        );
        assert_eq!(aggregate.direction, Recommendation::Hold);
        assert_eq!(aggregate.base_conviction, aggregate.hold_strength);
        assert_eq!(aggregate.hold_strength, 0.0);
    }

    #[test]
    fn test_zero_conviction_denominator_scores_zero() {
        let aggregate = directional_score(
            &[
                entry("Fundamental", Recommendation::Buy, 0.0),
                entry("News", Recommendation::Sell, 0.0),
            ],
            0.33,
        );
        assert_eq!(aggregate.composite_score, 0.0);
        assert_eq!(aggregate.direction, Recommendation::Hold);
    }

    #[test]
    fn test_no_entries_degenerate_aggregate() {
        let aggregate = directional_score(&[], 0.33);
        assert_eq!(aggregate.composite_score, 0.0);
        assert_eq!(aggregate.direction, Recommendation::Hold);
        assert_eq!(aggregate.base_conviction, 0.0);
        assert!(aggregate.warning.is_some());
        assert!(aggregate.inputs.is_empty());
    }

    #[test]
    fn test_conviction_clamped_to_unit_interval() {
        let aggregate = directional_score(&[entry("Fundamental", Recommendation::Buy, 1.7)], 0.33);
        assert_eq!(aggregate.inputs[0].conviction, 1.0);
        assert_eq!(aggregate.bullish_strength, 1.0);
    }

    #[test]
    fn test_hold_signal_contributes_positively() {
        let aggregate = directional_score(
            &[entry("Fundamental", Recommendation::Hold, 0.8)],
            0.33,
        );
        // A lone Hold scores +0.2, below the threshold.
        assert!((aggregate.composite_score - 0.2).abs() < 1e-9);
        assert_eq!(aggregate.direction, Recommendation::Hold);
        assert_eq!(aggregate.base_conviction, 0.8);
    }

    #[test]
    fn test_unknown_role_gets_unit_raw_weight() {
        let aggregate = directional_score(
            &[
                entry("mystery desk", Recommendation::Buy, 0.5),
                entry("Fundamental", Recommendation::Buy, 0.5),
            ],
            0.33,
        );
        let other = aggregate
            .inputs
            .iter()
            .find(|i| i.role == AnalystRole::Other)
            .unwrap();
        // 1.0 normalized against 1.0 + 0.4
        assert!((other.weight - 1.0 / 1.4).abs() < 1e-9);
    }
}
