//! Prompt construction for analyst, PM, and risk stages

use crate::scoring::aggregate::PmAggregate;

/// JSON skeleton every analyst must fill in
pub const ANALYST_OUTPUT_TEMPLATE: &str = r#"{
  "analyst": "",
  "recommendation": "<Buy | Hold | Sell>",
  "conviction": <0.25 | 0.50 | 0.75>,
  "conviction_category": "<Low | Medium | High>",
  "evidence_strength": 0.0,
  "signal_clarity": 0.0,
  "data_quality": 0.0,
  "uncertainty_penalty": 0.0,
  "key_factors": ["...", "...", "..."],
  "risks": ["...", "..."],
  "overall_comment": "<concise overall takeaway>",
  "time_horizon": "<in months>",
  "confidence_level": "<Low | Medium | High>",
  "data_sources": ["...", "..."]
}"#;

/// Truncate an oversized payload to `max_chars`, appending a marker noting how
/// much was omitted. Keeps prompts bounded regardless of upstream verbosity.
pub fn clip_text(text: &str, label: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    let omitted = text.chars().count() - max_chars;
    format!("{clipped}\n\n...[truncated {label}, {omitted} chars omitted]...")
}

/// Instruction block enforcing the structured analyst JSON output
pub fn output_format_instructions(analyst_label: &str, is_valuation: bool) -> String {
    let overall_rule = if is_valuation {
        "In \"overall_comment\", include a concise valuation takeaway (intrinsic value range, margin of safety, and peer context)."
    } else {
        "In \"overall_comment\", add a concise 1-2 sentence takeaway that synthesizes your recommendation and why it matters right now."
    };
    format!(
        "Return output EXACTLY in this JSON structure (no markdown, no code fences, no extra text):\n\
         {ANALYST_OUTPUT_TEMPLATE}\n\
         - Set \"analyst\" to \"{analyst_label}\".\n\
         - \"recommendation\" must be one of: Buy, Hold, or Sell.\n\
         - Think step by step: score evidence_strength, signal_clarity, data_quality, and uncertainty_penalty on 0-1. \
         Choose a conviction_category of Low, Medium, or High and set conviction accordingly: Low=0.25, Medium=0.50, High=0.75 \
         (adjust by \u{b1}0.1 if the evidence is clearly weaker/stronger but keep within [0,1]). \
         Set confidence_level to match the conviction_category.\n\
         - Think step by step to choose the final recommendation consistent with the scored evidence and risks.\n\
         - Self-consistency check before finalizing: re-evaluate the conviction score and recommendation against the evidence \
         and risks; adjust only if necessary and apply the adjustment internally, returning the final JSON only.\n\
         - Include at least 5 concise \"key_factors\" driving the view and at least 2 \"risks\".\n\
         - {overall_rule}\n\
         - \"time_horizon\" should be a months string (e.g., \"3\", \"6-12\").\n\
         - \"confidence_level\" must be Low, Medium, or High.\n\
         - \"data_sources\" should cite the datasets you used (e.g., \"prices\", \"indicators\", \"fundamentals\", \"news\").\n\
         Do not add prose before or after the JSON."
    )
}

/// System prompt for the self-consistency review pass
pub fn review_system_prompt(analyst_label: &str) -> String {
    format!(
        "You are a quality-check reviewer for the {analyst_label}. \
         You will receive a draft JSON output with conviction and a recommendation. \
         Re-evaluate the conviction score and recommendation against the evidence and risks described. \
         Adjust only if needed, and explain the reasoning briefly inside the JSON if you change it. \
         Keep every structural field and the schema intact. \
         Return ONLY the final JSON object (no extra text, no markdown)."
    )
}

/// User message for the self-consistency review pass
pub fn review_user_prompt(draft_output: &str) -> String {
    format!(
        "Draft JSON to review:\n{draft_output}\n\n\
         Re-evaluate the conviction score and recommendation. Is it justified by the evidence and risks? \
         Adjust only if necessary and explain the reasoning. Return the final JSON only."
    )
}

/// Prompt wrapping the computed PM aggregate in a narrative synthesis.
///
/// All numeric fields in the response are overwritten afterwards with the
/// precomputed values; the model only contributes the qualitative sections.
pub fn pm_narrative_prompt(
    aggregate: &PmAggregate,
    reports: &[(String, String)],
    past_lessons: &str,
) -> String {
    let pm_json = serde_json::to_string(aggregate).unwrap_or_else(|_| "{}".to_string());
    let mut report_block = String::new();
    for (label, text) in reports {
        report_block.push_str(&format!("- {label}: {text}\n"));
    }
    format!(
        "You are the PM Engine, aggregating analyst outputs into a single JSON. \
         Use ONLY the provided analyst reports.\n\n\
         Return JSON exactly in this schema (no markdown, no extra text):\n\
         {{\n\
           \"module\": \"AnalystAggregation\",\n\
           \"summary\": {{\n\
             \"overall_signal\": \"<Bullish | Bearish | Mixed>\",\n\
             \"bullish_strength\": 0.0,\n\
             \"bearish_strength\": 0.0,\n\
             \"conflict_level\": 0.0,\n\
             \"interpretation\": \"\"\n\
           }},\n\
           \"bullish_indicators\": [{{\"indicator\": \"\", \"source_analyst\": \"\", \"conviction\": 0.0}}],\n\
           \"bearish_indicators\": [{{\"indicator\": \"\", \"source_analyst\": \"\", \"conviction\": 0.0}}],\n\
           \"conflicting_indicators\": [{{\"topic\": \"\", \"bullish_evidence\": \"\", \"bearish_evidence\": \"\", \"analysts_involved\": [\"\", \"\"]}}]\n\
         }}\n\n\
         Instructions:\n\
         - Derive conflict_level in [0,1] based on divergence across analysts.\n\
         - This precomputed PM scoring is authoritative; reflect it in the summary: {pm_json}\n\
         - Interpretation must explain why views align or conflict.\n\
         - Use at least 2 bullish_indicators and 2 bearish_indicators when present.\n\
         - Use past reflections if relevant: {past_lessons}\n\n\
         Analyst reports to ingest:\n{report_block}"
    )
}

/// Prompt asking the risk manager for the full risk assessment JSON
pub fn risk_assessment_prompt(
    aggregate: &PmAggregate,
    reports: &[(String, String)],
    past_lessons: &str,
) -> String {
    let mut report_block = String::new();
    for (label, text) in reports {
        report_block.push_str(&format!("- {label}: {text}\n"));
    }
    format!(
        "You are the Risk Manager for a single-stock review. Evaluate risks and adjust the PM Engine conviction \
         using the required formula. Use only the provided evidence.\n\n\
         PM Engine summary (use as priors):\n\
         - Bullish strength: {bull}\n\
         - Bearish strength: {bear}\n\
         - Base conviction from PM Engine (C_PM): {base}\n\
         - Composite score: {score}\n\
         - PM recommendation (do NOT change it): {direction}\n\n\
         Risk evaluation requirements (cover all):\n\
         1) Company-Specific Risk -> risk factor R_c in [0,1]: volatility, beta, balance sheet, earnings stability, \
         news controversy, analyst disagreement.\n\
         2) Valuation Uncertainty -> valuation_uncertainty in [0,1]: DCF sensitivity, fair-value range, input accuracy.\n\
         3) Sentiment & Narrative Risk -> sentiment_risk_score in [0,1]: negative news cycles, insider selling, \
         regulatory/litigation risk, sentiment volatility.\n\
         4) Macro / Sector Volatility -> macro risk factor in [0,1], or the literal string 'None' when absent: \
         sector volatility, macro alignment, near-term events (CPI, FOMC, earnings).\n\
         5) Disagreement Among Analysts -> D in [0,1]: use conflict_level if present, otherwise infer divergence.\n\n\
         Single-Stock Risk Adjustment Formula (apply every factor above):\n\
         C_final = C_PM * (1 - company_specific_risk) * (1 - valuation_uncertainty) * (1 - sentiment_risk) * (1 - macro_risk) * (1 - D)\n\
         - Keep all values between 0 and 1; round to two decimals where reasonable.\n\n\
         Data you can use:\n{report_block}\
         - Past lessons: {past_lessons}\n\n\
         Return STRICT JSON only (no markdown) in this shape:\n\
         {{\n\
           \"risk_level\": \"<Low|Medium|High>\",\n\
           \"original_conviction\": <float>,\n\
           \"adjusted_conviction\": <float>,\n\
           \"risk_factor_rc\": <float>,\n\
           \"risk_factor_rm\": <float or \"None\">,\n\
           \"disagreement\": <float>,\n\
           \"valuation_uncertainty\": <float>,\n\
           \"sentiment_risk_score\": <float>,\n\
           \"macro_risk_warning\": \"<string or 'None'>\",\n\
           \"final_recommendation\": \"<Buy|Hold|Sell>\",\n\
           \"risk_factors\": {{\n\
             \"company_specific\": \"\",\n\
             \"volatility_risk\": \"\",\n\
             \"valuation_uncertainty\": \"\",\n\
             \"sentiment_risk\": \"\",\n\
             \"analyst_disagreement\": \"\"\n\
           }},\n\
           \"recommendation_adjustment\": \"\",\n\
           \"explanation\": \"\"\n\
         }}\n\n\
         - Set risk_level based on adjusted_conviction and the assessed risks.\n\
         - final_recommendation MUST equal the PM recommendation: {direction}. Do not change Buy/Hold/Sell, only adjust conviction.\n\
         - Make recommendation_adjustment explicit (e.g., de-risk to Hold, trim size) but keep final_recommendation unchanged.\n\
         - For each entry in risk_factors, include a brief rationale for the assigned score.\n\
         - Be concise; no extra commentary outside the JSON.",
        bull = aggregate.bullish_strength,
        bear = aggregate.bearish_strength,
        base = aggregate.base_conviction,
        score = aggregate.composite_score,
        direction = aggregate.direction,
    )
}

/// Verifier prompt re-checking a draft risk JSON against the PM priors
pub fn risk_verifier_prompt(aggregate: &PmAggregate, draft: &str) -> String {
    format!(
        "You are a verifier for the Risk Manager output. Check that the JSON is complete, consistent with the \
         provided inputs, and all numeric fields are in [0,1] where applicable.\n\n\
         Inputs you must respect:\n\
         - Bullish strength: {bull}\n\
         - Bearish strength: {bear}\n\
         - Base conviction C_PM: {base}\n\n\
         Rules:\n\
         - Keep the structure exactly as specified earlier.\n\
         - final_recommendation MUST equal the PM recommendation: {direction}. Do not change Buy/Hold/Sell.\n\
         - If any field is missing or obviously inconsistent, fix it.\n\
         - Clamp all numeric values to [0,1], round to two decimals where reasonable.\n\
         - Return ONLY the corrected JSON (no markdown, no extra text).\n\n\
         Draft JSON to correct:\n{draft}",
        bull = aggregate.bullish_strength,
        bear = aggregate.bearish_strength,
        base = aggregate.base_conviction,
        direction = aggregate.direction,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_text_under_budget_untouched() {
        let text = "short payload";
        assert_eq!(clip_text(text, "news", 100), text);
    }

    #[test]
    fn test_clip_text_over_budget_marks_omission() {
        let text = "x".repeat(120);
        let clipped = clip_text(&text, "news", 100);
        assert!(clipped.starts_with(&"x".repeat(100)));
        assert!(clipped.contains("...[truncated news, 20 chars omitted]..."));
    }

    #[test]
    fn test_clip_text_exact_budget_untouched() {
        let text = "y".repeat(50);
        assert_eq!(clip_text(&text, "prices", 50), text);
    }

    #[test]
    fn test_output_format_mentions_label() {
        let block = output_format_instructions("Valuation Analyst", true);
        assert!(block.contains("Valuation Analyst"));
        assert!(block.contains("margin of safety"));

        let block = output_format_instructions("News Analyst", false);
        assert!(block.contains("News Analyst"));
        assert!(!block.contains("margin of safety"));
    }
}
