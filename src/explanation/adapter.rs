use std::sync::Arc;
use std::time::Instant;

use super::prompt::build_prompt;
use super::ExplanationModel;
use crate::cache::ExplanationCache;
use crate::fingerprint::ContentFingerprint;
use crate::models::Explanation;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const EMPTY_INPUT_MESSAGE: &str = "No text provided to explain.";
pub const FALLBACK_MESSAGE: &str =
    "Sorry, an explanation could not be generated for this text right now.";

/// Turns recognized text into a student-facing explanation.
///
/// Never fails: a model error comes back as an [`Explanation`] with
/// `success == false`, a generic message and the error detail in `error`.
/// Successful explanations are memoized by text and context.
pub struct ExplanationAdapter {
    model: Arc<dyn ExplanationModel>,
    memo: Option<ExplanationCache>,
}

impl ExplanationAdapter {
    pub fn new(model: Arc<dyn ExplanationModel>, memo: Option<ExplanationCache>) -> Self {
        Self { model, memo }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn memo(&self) -> Option<&ExplanationCache> {
        self.memo.as_ref()
    }

    pub async fn explain(&self, text: &str, context_hint: &str) -> Explanation {
        let started = Instant::now();

        if text.trim().is_empty() {
            return Explanation {
                explanation: EMPTY_INPUT_MESSAGE.to_string(),
                input_text: text.to_string(),
                model: self.model_name().to_string(),
                success: false,
                error: None,
                processing_ms: 0,
            };
        }

        let key = memo_key(text, context_hint);
        if let Some(hit) = self.memo.as_ref().and_then(|memo| memo.get(&key)) {
            log_debug!("explanation memo hit {}", crate::utils::short_key(&key.to_hex()));
            return hit;
        }

        let prompt = build_prompt(text, context_hint);
        let outcome = self.model.generate(&prompt).await;
        let processing_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(explanation) => {
                let explanation = Explanation {
                    explanation,
                    input_text: text.to_string(),
                    model: self.model_name().to_string(),
                    success: true,
                    error: None,
                    processing_ms,
                };
                if let Some(memo) = &self.memo {
                    memo.put(key, explanation.clone());
                }
                explanation
            }
            Err(err) => {
                log_warn!(
                    "explanation failed after {}ms (model={}): {err}",
                    processing_ms,
                    self.model_name()
                );
                Explanation {
                    explanation: FALLBACK_MESSAGE.to_string(),
                    input_text: text.to_string(),
                    model: self.model_name().to_string(),
                    success: false,
                    error: Some(err.to_string()),
                    processing_ms,
                }
            }
        }
    }
}

fn memo_key(text: &str, context_hint: &str) -> ContentFingerprint {
    ContentFingerprint::of_text(&format!("{context_hint}\u{0}{text}"))
}
