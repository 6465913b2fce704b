//! Single-shot analysis: one frame in, one result out, with the same cache
//! semantics as a streaming session.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;

use crate::fingerprint::{fingerprint, ContentFingerprint};
use crate::models::{AnalysisResult, Origin};
use crate::pipeline::{Pipeline, PipelineError};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis failed: {0}")]
    Pipeline(#[from] PipelineError),
}

impl AnalysisError {
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::Pipeline(err) => err.user_message(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzedFrame {
    pub result: AnalysisResult,
    pub origin: Origin,
    pub fingerprint: ContentFingerprint,
}

pub struct AnalysisFacade {
    pipeline: Arc<Pipeline>,
}

impl AnalysisFacade {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn analyze(&self, frame: Bytes) -> Result<AnalyzedFrame, AnalysisError> {
        let started = Instant::now();
        let key = fingerprint(&frame);

        if let Some(result) = self.pipeline.lookup(&key) {
            return Ok(AnalyzedFrame {
                result,
                origin: Origin::Cache,
                fingerprint: key,
            });
        }

        let recognition = self.pipeline.recognize(frame).await?;
        let explanation = self.pipeline.explain(&recognition).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = AnalysisResult::assemble(recognition, explanation.as_ref(), elapsed_ms, Utc::now());
        self.pipeline.store(key, &result);

        log_info!(
            "analyzed frame {} in {}ms",
            crate::utils::short_key(&key.to_hex()),
            elapsed_ms
        );
        Ok(AnalyzedFrame {
            result,
            origin: Origin::Computed,
            fingerprint: key,
        })
    }
}
