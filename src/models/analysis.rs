use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::detection::RecognitionResult;

/// Output of the explanation stage. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub explanation: String,
    pub input_text: String,
    pub model: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_ms: u64,
}

/// Where a delivered result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Cache,
    Computed,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Cache => "cache",
            Origin::Computed => "computed",
        }
    }
}

/// Completed analysis of one frame. This is the cached value and the
/// `complete` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    #[serde(flatten)]
    pub recognition: RecognitionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub processing_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisResult {
    /// Merges recognition with an explanation; unsuccessful explanations are
    /// dropped so the result carries no explanation fields.
    pub fn assemble(
        recognition: RecognitionResult,
        explanation: Option<&Explanation>,
        processing_ms: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let explained = explanation.filter(|e| e.success);
        Self {
            success: true,
            recognition,
            explanation: explained.map(|e| e.explanation.clone()),
            model: explained.map(|e| e.model.clone()),
            processing_ms,
            timestamp,
        }
    }
}
