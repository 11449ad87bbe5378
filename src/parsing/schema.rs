use serde::Deserialize;

use crate::types::Confidence;

/// Reply shape requested by the prompt; aliases cover older prompt revisions.
#[derive(Debug, Deserialize)]
pub(super) struct RawReply {
    pub(super) themes: Vec<RawTheme>,
    pub(super) cut_points: Vec<RawCutPoint>,
    #[serde(default)]
    pub(super) locations: Vec<String>,
    #[serde(default, alias = "global_keywords")]
    pub(super) keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawTheme {
    pub(super) title: String,
    #[serde(alias = "start_approximate")]
    pub(super) start: f64,
    #[serde(alias = "end_approximate")]
    pub(super) end: f64,
    #[serde(default, alias = "description")]
    pub(super) justification: String,
    #[serde(default)]
    pub(super) keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawCutPoint {
    pub(super) timestamp: f64,
    #[serde(default)]
    pub(super) confidence: Option<RawConfidence>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum RawConfidence {
    Score(f64),
    Label(String),
}

impl RawConfidence {
    /// Labels map directly; 1-5 scores map 4-5 high, 3 medium, 1-2 low.
    pub(super) fn resolve(&self) -> Option<Confidence> {
        match self {
            RawConfidence::Label(label) => match label.trim().to_ascii_lowercase().as_str() {
                "high" => Some(Confidence::High),
                "medium" => Some(Confidence::Medium),
                "low" => Some(Confidence::Low),
                _ => None,
            },
            RawConfidence::Score(score) if (1.0..=5.0).contains(score) => {
                Some(if *score >= 4.0 {
                    Confidence::High
                } else if *score >= 3.0 {
                    Confidence::Medium
                } else {
                    Confidence::Low
                })
            }
            RawConfidence::Score(_) => None,
        }
    }
}
