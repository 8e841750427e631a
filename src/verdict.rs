//! Structured analyst verdicts and tolerant parsing from LLM output

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional recommendation attached to a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

impl Recommendation {
    /// Directional signal used by the PM aggregation: Buy=+1.0, Hold=+0.2, Sell=-1.0
    pub fn signal(&self) -> f64 {
        match self {
            Recommendation::Buy => 1.0,
            Recommendation::Hold => 0.2,
            Recommendation::Sell => -1.0,
        }
    }

    /// Parse a recommendation from free text, case-insensitively
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "buy" => Some(Recommendation::Buy),
            "hold" => Some(Recommendation::Hold),
            "sell" => Some(Recommendation::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Buy => write!(f, "Buy"),
            Recommendation::Hold => write!(f, "Hold"),
            Recommendation::Sell => write!(f, "Sell"),
        }
    }
}

/// Coarse conviction bucket, mapped to a numeric anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvictionCategory {
    Low,
    Medium,
    High,
}

impl ConvictionCategory {
    /// Numeric anchor for the category: Low=0.25, Medium=0.50, High=0.75
    pub fn anchor(&self) -> f64 {
        match self {
            ConvictionCategory::Low => 0.25,
            ConvictionCategory::Medium => 0.50,
            ConvictionCategory::High => 0.75,
        }
    }

    /// Parse a category from free text
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(ConvictionCategory::Low),
            "medium" => Some(ConvictionCategory::Medium),
            "high" => Some(ConvictionCategory::High),
            _ => None,
        }
    }

    /// Whether a numeric conviction is consistent with this category.
    ///
    /// The anchor may be adjusted by up to 0.1 in either direction, clamped to
    /// [0,1], so High accepts [0.65, 0.85] and so on.
    pub fn accepts(&self, conviction: f64) -> bool {
        let anchor = self.anchor();
        let lo = (anchor - 0.1).max(0.0);
        let hi = (anchor + 0.1).min(1.0);
        (lo..=hi).contains(&conviction)
    }
}

impl fmt::Display for ConvictionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvictionCategory::Low => write!(f, "Low"),
            ConvictionCategory::Medium => write!(f, "Medium"),
            ConvictionCategory::High => write!(f, "High"),
        }
    }
}

/// Structured output of one analyst
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystVerdict {
    /// Label identifying the analyst (also drives PM role inference)
    pub analyst: String,
    pub recommendation: Recommendation,
    /// Conviction in [0,1]
    pub conviction: f64,
    pub conviction_category: ConvictionCategory,
    pub evidence_strength: f64,
    pub signal_clarity: f64,
    pub data_quality: f64,
    pub uncertainty_penalty: f64,
    /// At least 5 short factors driving the view
    pub key_factors: Vec<String>,
    /// At least 2 short risk statements
    pub risks: Vec<String>,
    pub overall_comment: String,
    /// Horizon in months, e.g. "3" or "6-12"
    pub time_horizon: String,
    pub confidence_level: ConvictionCategory,
    pub data_sources: Vec<String>,
}

impl AnalystVerdict {
    /// Check that the numeric conviction matches the stated category.
    ///
    /// Cross-field inconsistency is surfaced, not repaired: the aggregation
    /// stage consumes the verdict as-is and the caller decides how to log it.
    pub fn is_internally_consistent(&self) -> bool {
        (0.0..=1.0).contains(&self.conviction)
            && self.conviction_category.accepts(self.conviction)
    }
}

/// Strip markdown code fences and locate the outermost JSON object in raw LLM text.
///
/// Producers are asked for bare JSON but routinely wrap it anyway; tolerate
/// both fenced blocks and leading/trailing prose.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.trim_start().strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    };

    let start = inner.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in inner[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&inner[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a full analyst verdict from raw LLM output
pub fn parse_verdict(raw: &str) -> Option<AnalystVerdict> {
    let json = extract_json_object(raw)?;
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let obj = value.as_object()?;

    let analyst = obj.get("analyst")?.as_str()?.to_string();
    let recommendation = Recommendation::parse(obj.get("recommendation")?.as_str()?)?;
    let conviction = number_field(obj, "conviction")?;
    let conviction_category =
        ConvictionCategory::parse(obj.get("conviction_category")?.as_str()?)?;
    let confidence_level = obj
        .get("confidence_level")
        .and_then(|v| v.as_str())
        .and_then(ConvictionCategory::parse)
        .unwrap_or(conviction_category);

    Some(AnalystVerdict {
        analyst,
        recommendation,
        conviction,
        conviction_category,
        evidence_strength: number_field(obj, "evidence_strength").unwrap_or(0.0),
        signal_clarity: number_field(obj, "signal_clarity").unwrap_or(0.0),
        data_quality: number_field(obj, "data_quality").unwrap_or(0.0),
        uncertainty_penalty: number_field(obj, "uncertainty_penalty").unwrap_or(0.0),
        key_factors: string_list(obj, "key_factors"),
        risks: string_list(obj, "risks"),
        overall_comment: obj
            .get("overall_comment")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        time_horizon: obj
            .get("time_horizon")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        confidence_level,
        data_sources: string_list(obj, "data_sources"),
    })
}

/// Minimal extraction used by the PM stage: label, recommendation, conviction.
///
/// Conviction carried as a string number is accepted; anything that still
/// fails to parse makes the whole entry unusable and the caller drops it.
pub fn extract_pm_entry(raw: &str, fallback_label: &str) -> Option<(String, Recommendation, f64)> {
    let json = extract_json_object(raw)?;
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let obj = value.as_object()?;

    let label = obj
        .get("analyst")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(fallback_label)
        .to_string();
    let recommendation = Recommendation::parse(obj.get("recommendation")?.as_str()?)?;
    let conviction = number_field(obj, "conviction")?;
    Some((label, recommendation, conviction))
}

fn number_field(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn string_list(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        serde_json::json!({
            "analyst": "Fundamental Analyst",
            "recommendation": "Buy",
            "conviction": 0.75,
            "conviction_category": "High",
            "evidence_strength": 0.8,
            "signal_clarity": 0.7,
            "data_quality": 0.9,
            "uncertainty_penalty": 0.2,
            "key_factors": ["revenue growth", "margin expansion", "buybacks", "low debt", "moat"],
            "risks": ["multiple compression", "FX headwinds"],
            "overall_comment": "Strong balance sheet supports the thesis.",
            "time_horizon": "6-12",
            "confidence_level": "High",
            "data_sources": ["fundamentals", "balance_sheet"]
        })
        .to_string()
    }

    #[test]
    fn test_parse_plain_json() {
        let verdict = parse_verdict(&sample_json()).unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Buy);
        assert_eq!(verdict.conviction, 0.75);
        assert_eq!(verdict.key_factors.len(), 5);
        assert!(verdict.is_internally_consistent());
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let raw = format!("Here is my analysis:\n```json\n{}\n```", sample_json());
        let verdict = parse_verdict(&raw).unwrap();
        assert_eq!(verdict.analyst, "Fundamental Analyst");
    }

    #[test]
    fn test_parse_rejects_unknown_recommendation() {
        let raw = sample_json().replace("\"Buy\"", "\"Accumulate\"");
        assert!(parse_verdict(&raw).is_none());
    }

    #[test]
    fn test_extract_pm_entry_with_string_conviction() {
        let raw = r#"{"analyst": "News", "recommendation": "sell", "conviction": "0.4"}"#;
        let (label, rec, conviction) = extract_pm_entry(raw, "news").unwrap();
        assert_eq!(label, "News");
        assert_eq!(rec, Recommendation::Sell);
        assert_eq!(conviction, 0.4);
    }

    #[test]
    fn test_extract_pm_entry_malformed_conviction() {
        let raw = r#"{"analyst": "News", "recommendation": "Sell", "conviction": "n/a"}"#;
        assert!(extract_pm_entry(raw, "news").is_none());
    }

    #[test]
    fn test_category_tolerance_band() {
        assert!(ConvictionCategory::High.accepts(0.75));
        assert!(ConvictionCategory::High.accepts(0.85));
        assert!(ConvictionCategory::High.accepts(0.65));
        assert!(!ConvictionCategory::High.accepts(0.5));
        assert!(ConvictionCategory::Low.accepts(0.15));
    }

    #[test]
    fn test_inconsistent_verdict_detected() {
        let mut verdict = parse_verdict(&sample_json()).unwrap();
        verdict.conviction = 0.3;
        assert!(!verdict.is_internally_consistent());
    }

    #[test]
    fn test_extract_json_with_nested_braces_in_strings() {
        let raw = r#"noise {"analyst": "x {not a brace}", "recommendation": "Hold", "conviction": 0.5} trailing"#;
        let (_, rec, _) = extract_pm_entry(raw, "x").unwrap();
        assert_eq!(rec, Recommendation::Hold);
    }
}
