//! The stages shared by the streaming session and the single-shot facade.
//!
//! Both paths read and write the same [`ResultCache`] under the same key, so a
//! frame analysed by one path is a cache hit for the other.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cache::ResultCache;
use crate::explanation::ExplanationAdapter;
use crate::fingerprint::ContentFingerprint;
use crate::models::{AnalysisResult, Explanation, RecognitionResult};
use crate::recognition::{RecognitionAdapter, RecognitionError};
use crate::validation::sanitize_text;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error("{stage} worker failed: {detail}")]
    Worker { stage: &'static str, detail: String },
}

impl PipelineError {
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Recognition(err) => err.user_message(),
            PipelineError::Worker { stage, .. } => format!("Internal error during {stage}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_text_length: usize,
    pub context_hint: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_text_length: 50_000,
            context_hint: crate::explanation::prompt::DEFAULT_CONTEXT_HINT.to_string(),
        }
    }
}

pub struct Pipeline {
    cache: Arc<ResultCache>,
    recognition: Arc<RecognitionAdapter>,
    explanation: Arc<ExplanationAdapter>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        cache: Arc<ResultCache>,
        recognition: Arc<RecognitionAdapter>,
        explanation: Arc<ExplanationAdapter>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            cache,
            recognition,
            explanation,
            options,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn recognition(&self) -> &RecognitionAdapter {
        &self.recognition
    }

    pub fn explanation(&self) -> &ExplanationAdapter {
        &self.explanation
    }

    pub fn lookup(&self, key: &ContentFingerprint) -> Option<AnalysisResult> {
        let hit = self.cache.get(key);
        log_debug!(
            "cache {} for {}",
            if hit.is_some() { "hit" } else { "miss" },
            crate::utils::short_key(&key.to_hex())
        );
        hit
    }

    /// Runs recognition on the blocking pool. A panicking engine surfaces as
    /// [`PipelineError::Worker`].
    pub async fn recognize(&self, frame: Bytes) -> Result<RecognitionResult, PipelineError> {
        let adapter = Arc::clone(&self.recognition);
        let joined = tokio::task::spawn_blocking(move || adapter.recognize(&frame)).await;
        match joined {
            Ok(result) => Ok(result?),
            Err(err) => {
                log_error!("recognition worker join failed: {err}");
                Err(PipelineError::Worker {
                    stage: "recognition",
                    detail: err.to_string(),
                })
            }
        }
    }

    /// Sanitizes the recognized text and explains it. Returns `None` when
    /// there is nothing to explain.
    ///
    /// The model call runs on its own task so a panic stays contained. Dropping
    /// the returned future aborts that task, model request and memo write
    /// included.
    pub async fn explain(&self, recognition: &RecognitionResult) -> Option<Explanation> {
        if !recognition.has_text() {
            return None;
        }
        let text = sanitize_text(&recognition.combined_text, self.options.max_text_length);
        if text.is_empty() {
            return None;
        }

        let adapter = Arc::clone(&self.explanation);
        let hint = self.options.context_hint.clone();
        let model = adapter.model_name().to_string();
        let input = text.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move {
            adapter.explain(&input, &hint).await
        }));
        match (&mut task.0).await {
            Ok(explanation) => Some(explanation),
            Err(err) => {
                log_error!("explanation task failed: {err}");
                Some(Explanation {
                    explanation: crate::explanation::adapter::FALLBACK_MESSAGE.to_string(),
                    input_text: text,
                    model,
                    success: false,
                    error: Some(err.to_string()),
                    processing_ms: 0,
                })
            }
        }
    }

    pub fn store(&self, key: ContentFingerprint, result: &AnalysisResult) {
        self.cache.put(key, result.clone());
    }

    /// Empties the result cache and the explanation memo.
    pub fn clear_caches(&self) {
        self.cache.clear();
        if let Some(memo) = self.explanation.memo() {
            memo.clear();
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
