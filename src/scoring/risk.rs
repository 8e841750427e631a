//! Risk adjustment: multiplicative conviction decay over the PM aggregate
//!
//! The risk stage may shrink conviction and attach sizing guidance; it never
//! flips the trade direction. The decay formula is applied engine-side, so a
//! narrative pass can describe the risks but cannot overwrite the numbers.

use crate::error::Result;
use crate::llm::{CompletionOptions, VerdictProducer};
use crate::prompts;
use crate::scoring::aggregate::PmAggregate;
use crate::verdict::{extract_json_object, Recommendation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The five independent risk factors, each in [0,1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    /// Company-specific risk R_c
    pub company_specific: f64,
    /// Valuation uncertainty V_u
    pub valuation_uncertainty: f64,
    /// Sentiment and narrative risk S_r
    pub sentiment_risk: f64,
    /// Macro/sector risk M_r; `None` is the literal absence, numerically 0
    pub macro_risk: Option<f64>,
    /// Analyst disagreement D
    pub disagreement: f64,
}

impl RiskFactors {
    fn clamped(mut self) -> Self {
        self.company_specific = self.company_specific.clamp(0.0, 1.0);
        self.valuation_uncertainty = self.valuation_uncertainty.clamp(0.0, 1.0);
        self.sentiment_risk = self.sentiment_risk.clamp(0.0, 1.0);
        self.macro_risk = self.macro_risk.map(|m| m.clamp(0.0, 1.0));
        self.disagreement = self.disagreement.clamp(0.0, 1.0);
        self
    }
}

/// Qualitative rationale per risk factor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskRationale {
    #[serde(default)]
    pub company_specific: String,
    #[serde(default)]
    pub volatility_risk: String,
    #[serde(default)]
    pub valuation_uncertainty: String,
    #[serde(default)]
    pub sentiment_risk: String,
    #[serde(default)]
    pub analyst_disagreement: String,
}

/// Coarse risk bucket derived from the adjusted conviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn from_adjusted(adjusted: f64) -> Self {
        if adjusted >= 0.6 {
            RiskLevel::Low
        } else if adjusted >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

/// Final decision record for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalDecision {
    pub risk_level: RiskLevel,
    /// C_PM before decay
    pub original_conviction: f64,
    /// C_final after decay, rounded to two decimals
    pub adjusted_conviction: f64,
    pub factors: RiskFactors,
    /// Qualitative macro warning, "None" when absent
    pub macro_risk_warning: String,
    /// Always equal to the PM direction
    pub final_recommendation: Recommendation,
    pub rationale: RiskRationale,
    /// Sizing guidance ("de-risk to Hold", "trim position"), direction unchanged
    pub recommendation_adjustment: String,
    pub explanation: String,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Apply the multiplicative decay formula:
/// `C_final = C_PM * (1-R_c) * (1-V_u) * (1-S_r) * (1-M_r) * (1-D)`,
/// rounded to two decimals and clamped to [0,1].
pub fn apply_risk_decay(c_pm: f64, factors: &RiskFactors) -> f64 {
    let factors = factors.clone().clamped();
    let macro_risk = factors.macro_risk.unwrap_or(0.0);
    let adjusted = c_pm.clamp(0.0, 1.0)
        * (1.0 - factors.company_specific)
        * (1.0 - factors.valuation_uncertainty)
        * (1.0 - factors.sentiment_risk)
        * (1.0 - macro_risk)
        * (1.0 - factors.disagreement);
    round2(adjusted.clamp(0.0, 1.0))
}

/// Base conviction for the decay: max of bullish/bearish strength when either
/// is present, otherwise the aggregate's own base conviction.
pub fn base_conviction_for(aggregate: &PmAggregate) -> f64 {
    let strongest = aggregate.bullish_strength.max(aggregate.bearish_strength);
    if strongest > 0.0 {
        strongest
    } else {
        aggregate.base_conviction
    }
    .clamp(0.0, 1.0)
}

/// Infer analyst disagreement from the aggregate inputs when no conflict
/// level was supplied: the conviction-weighted mass on the minority direction
/// relative to the directional mass, in [0,1].
pub fn infer_disagreement(aggregate: &PmAggregate) -> f64 {
    if let Some(conflict) = aggregate.conflict_level {
        return conflict.clamp(0.0, 1.0);
    }
    let bull_mass: f64 = aggregate
        .inputs
        .iter()
        .filter(|i| i.recommendation == Recommendation::Buy)
        .map(|i| i.weight * i.conviction)
        .sum();
    let bear_mass: f64 = aggregate
        .inputs
        .iter()
        .filter(|i| i.recommendation == Recommendation::Sell)
        .map(|i| i.weight * i.conviction)
        .sum();
    let total = bull_mass + bear_mass;
    if total > 0.0 {
        round2(2.0 * bull_mass.min(bear_mass) / total)
    } else {
        0.0
    }
}

/// Build a decision deterministically from the aggregate and assessed factors
pub fn decide(aggregate: &PmAggregate, factors: RiskFactors) -> FinalDecision {
    let factors = factors.clamped();
    let c_pm = base_conviction_for(aggregate);
    let adjusted = apply_risk_decay(c_pm, &factors);
    FinalDecision {
        risk_level: RiskLevel::from_adjusted(adjusted),
        original_conviction: round2(c_pm),
        adjusted_conviction: adjusted,
        macro_risk_warning: "None".to_string(),
        final_recommendation: aggregate.direction,
        factors,
        rationale: RiskRationale::default(),
        recommendation_adjustment: String::new(),
        explanation: String::new(),
    }
}

/// Parse a draft risk JSON and repair it field-by-field against the aggregate.
///
/// Malformed drafts are never discarded wholesale: usable factors are kept,
/// missing ones default to absent-risk, and the forced fields (direction and
/// conviction) are always re-derived from the PM stage. The adjusted
/// conviction is recomputed from the formula, so a narrative pass cannot
/// smuggle in a different number.
pub fn repair_decision(draft: &str, aggregate: &PmAggregate) -> FinalDecision {
    let parsed: Option<serde_json::Value> = extract_json_object(draft)
        .and_then(|json| serde_json::from_str(json).ok())
        .filter(|v: &serde_json::Value| v.is_object());

    let obj = parsed.as_ref().and_then(|v| v.as_object());

    let number = |key: &str| -> Option<f64> {
        let value = obj?.get(key)?;
        match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    };
    let text = |key: &str| -> String {
        obj.and_then(|o| o.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    // "None" (or absence) is a meaningful macro value, not a parse failure.
    let macro_risk = match obj.and_then(|o| o.get("risk_factor_rm")) {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) if s.trim().eq_ignore_ascii_case("none") => None,
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let factors = RiskFactors {
        company_specific: number("risk_factor_rc").unwrap_or(0.0),
        valuation_uncertainty: number("valuation_uncertainty").unwrap_or(0.0),
        sentiment_risk: number("sentiment_risk_score").unwrap_or(0.0),
        macro_risk,
        disagreement: number("disagreement").unwrap_or_else(|| infer_disagreement(aggregate)),
    }
    .clamped();

    let c_pm = base_conviction_for(aggregate);
    let adjusted = apply_risk_decay(c_pm, &factors);

    let risk_level = obj
        .and_then(|o| o.get("risk_level"))
        .and_then(|v| v.as_str())
        .and_then(RiskLevel::parse)
        .unwrap_or_else(|| RiskLevel::from_adjusted(adjusted));

    let rationale = obj
        .and_then(|o| o.get("risk_factors"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let macro_risk_warning = {
        let warning = text("macro_risk_warning");
        if warning.trim().is_empty() {
            "None".to_string()
        } else {
            warning
        }
    };

    FinalDecision {
        risk_level,
        original_conviction: round2(c_pm),
        adjusted_conviction: adjusted,
        factors,
        macro_risk_warning,
        // Forced regardless of draft content.
        final_recommendation: aggregate.direction,
        rationale,
        recommendation_adjustment: text("recommendation_adjustment"),
        explanation: text("explanation"),
    }
}

/// Risk adjustment stage: narrative assessment plus deterministic decay
pub struct RiskAdjustmentEngine {
    producer: Arc<dyn VerdictProducer>,
    options: CompletionOptions,
}

impl RiskAdjustmentEngine {
    /// Create the engine over the given producer
    pub fn new(producer: Arc<dyn VerdictProducer>, options: CompletionOptions) -> Self {
        Self { producer, options }
    }

    /// Assess risks for the run and produce the final decision.
    ///
    /// The producer drafts the risk JSON, a verifier pass re-checks it
    /// (falling back to the draft on failure), and the repaired decision is
    /// returned. A producer outage degrades to the deterministic decision
    /// with inferred disagreement as the only non-zero factor.
    pub async fn evaluate(
        &self,
        aggregate: &PmAggregate,
        reports: &[(String, String)],
        past_lessons: &str,
    ) -> FinalDecision {
        let draft = match self.draft(aggregate, reports, past_lessons).await {
            Ok(draft) => draft,
            Err(err) => {
                tracing::warn!(error = %err, "risk draft failed, using deterministic fallback");
                let factors = RiskFactors {
                    company_specific: 0.0,
                    valuation_uncertainty: 0.0,
                    sentiment_risk: 0.0,
                    macro_risk: None,
                    disagreement: infer_disagreement(aggregate),
                };
                let mut decision = decide(aggregate, factors);
                decision.explanation =
                    "Risk narrative unavailable; conviction decayed by inferred disagreement only."
                        .to_string();
                return decision;
            }
        };

        let verified = match self.verify(aggregate, &draft).await {
            Ok(Some(corrected)) => corrected,
            Ok(None) => draft.clone(),
            Err(err) => {
                tracing::warn!(error = %err, "risk verification failed, keeping draft");
                draft.clone()
            }
        };

        repair_decision(&verified, aggregate)
    }

    async fn draft(
        &self,
        aggregate: &PmAggregate,
        reports: &[(String, String)],
        past_lessons: &str,
    ) -> Result<String> {
        let prompt = prompts::risk_assessment_prompt(aggregate, reports, past_lessons);
        self.producer.produce("", &prompt, &self.options).await
    }

    async fn verify(&self, aggregate: &PmAggregate, draft: &str) -> Result<Option<String>> {
        let prompt = prompts::risk_verifier_prompt(aggregate, draft);
        let raw = self.producer.produce("", &prompt, &self.options).await?;
        Ok(extract_json_object(&raw)
            .filter(|json| {
                serde_json::from_str::<serde_json::Value>(json)
                    .map(|v| v.is_object())
                    .unwrap_or(false)
            })
            .map(|json| json.to_string()))
    }
}
