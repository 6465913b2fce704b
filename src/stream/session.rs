use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::messages::ServerMessage;
use super::state::{FrameStage, StageKind};
use crate::fingerprint::{fingerprint, ContentFingerprint};
use crate::models::{AnalysisResult, Origin};
use crate::pipeline::{Pipeline, PipelineError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// What the transport hands to a session.
#[derive(Debug)]
pub enum Inbound {
    /// A frame that passed transport validation.
    Frame(Bytes),
    /// A frame the transport refused, with the reason to report.
    Rejected(String),
}

/// The client can no longer be reached; only this session ends.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("session cancelled")]
    Cancelled,
    #[error("outbound channel closed")]
    Closed,
}

enum StepError {
    Pipeline(PipelineError),
    Transport(TransportError),
}

impl From<TransportError> for StepError {
    fn from(err: TransportError) -> Self {
        StepError::Transport(err)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u64,
    pub cache_hits: u64,
    pub failures: u64,
}

/// Per-frame bookkeeping carried across stages.
struct FrameContext {
    started: Instant,
    key: Option<ContentFingerprint>,
}

/// Drives one connection's frames through the pipeline, one at a time, and
/// pushes each stage's output to the client as soon as it exists.
pub struct StreamSession {
    id: Uuid,
    pipeline: Arc<Pipeline>,
    outbound: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
    stage: StageKind,
    summary: SessionSummary,
}

impl StreamSession {
    pub fn new(
        id: Uuid,
        pipeline: Arc<Pipeline>,
        outbound: mpsc::Sender<ServerMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            pipeline,
            outbound,
            cancel,
            stage: StageKind::Idle,
            summary: SessionSummary::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// Consumes inbound items until the client goes away, the inbound channel
    /// closes or the session is cancelled.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Inbound>) -> SessionSummary {
        log_info!("session {} started", self.id);

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                item = inbound.recv() => item,
            };

            let outcome = match item {
                Some(Inbound::Frame(frame)) => self.handle_frame(frame).await,
                Some(Inbound::Rejected(reason)) => {
                    log_warn!("session {} rejected frame: {}", self.id, reason);
                    self.summary.failures += 1;
                    self.emit(ServerMessage::error(reason)).await
                }
                None => break,
            };

            if let Err(err) = outcome {
                log_info!("session {} transport ended: {err}", self.id);
                break;
            }
        }

        log_info!(
            "session {} closed after {} frame(s) ({} from cache, {} failed)",
            self.id,
            self.summary.frames,
            self.summary.cache_hits,
            self.summary.failures
        );
        self.summary
    }

    /// Runs one frame to a terminal message. Pipeline failures are reported
    /// to the client and leave the session usable; transport failures end it.
    pub async fn handle_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.summary.frames += 1;
        let mut ctx = FrameContext {
            started: Instant::now(),
            key: None,
        };
        log_debug!("session {} frame of {} bytes", self.id, frame.len());

        let mut stage = FrameStage::Receiving { frame };
        loop {
            self.stage = stage.kind();
            stage = match self.step(stage, &mut ctx).await {
                Ok(next) => {
                    debug_assert!(
                        self.stage.can_advance_to(next.kind()),
                        "illegal transition {} -> {}",
                        self.stage.name(),
                        next.kind().name()
                    );
                    next
                }
                Err(StepError::Pipeline(err)) => {
                    self.summary.failures += 1;
                    log_warn!(
                        "session {} frame failed in {}: {err}",
                        self.id,
                        self.stage.name()
                    );
                    self.emit(ServerMessage::error(err.user_message())).await?;
                    FrameStage::Idle
                }
                Err(StepError::Transport(err)) => {
                    self.stage = StageKind::Idle;
                    return Err(err);
                }
            };

            if let FrameStage::Idle = stage {
                self.stage = StageKind::Idle;
                return Ok(());
            }
        }
    }

    async fn step(
        &mut self,
        stage: FrameStage,
        ctx: &mut FrameContext,
    ) -> Result<FrameStage, StepError> {
        match stage {
            FrameStage::Idle => Ok(FrameStage::Idle),
            FrameStage::Receiving { frame } => {
                self.emit(ServerMessage::processing()).await?;
                Ok(FrameStage::CacheCheck { frame })
            }
            FrameStage::CacheCheck { frame } => {
                let key = fingerprint(&frame);
                ctx.key = Some(key);
                Ok(match self.pipeline.lookup(&key) {
                    Some(result) => FrameStage::CacheHit { result },
                    None => FrameStage::CacheMiss { frame },
                })
            }
            FrameStage::CacheHit { result } => {
                self.summary.cache_hits += 1;
                Ok(FrameStage::Delivering {
                    result,
                    origin: Origin::Cache,
                })
            }
            FrameStage::CacheMiss { frame } => Ok(FrameStage::Recognizing { frame }),
            FrameStage::Recognizing { frame } => {
                let pipeline = Arc::clone(&self.pipeline);
                let recognition = self
                    .cancellable(async move { pipeline.recognize(frame).await })
                    .await?
                    .map_err(StepError::Pipeline)?;
                log_debug!(
                    "session {} recognized {} detection(s) in {}ms",
                    self.id,
                    recognition.detections.len(),
                    recognition.recognition_ms
                );
                self.emit(ServerMessage::recognition(&recognition)).await?;

                Ok(if recognition.has_text() {
                    FrameStage::Explaining { recognition }
                } else {
                    FrameStage::Caching {
                        recognition,
                        explanation: None,
                    }
                })
            }
            FrameStage::Explaining { recognition } => {
                let pipeline = Arc::clone(&self.pipeline);
                let explanation = self
                    .cancellable(async { pipeline.explain(&recognition).await })
                    .await?;
                if let Some(explained) = explanation.as_ref().filter(|e| e.success) {
                    self.emit(ServerMessage::explanation(
                        explained.explanation.clone(),
                        explained.model.clone(),
                    ))
                    .await?;
                }
                Ok(FrameStage::Caching {
                    recognition,
                    explanation,
                })
            }
            FrameStage::Caching {
                recognition,
                explanation,
            } => {
                let elapsed_ms = ctx.started.elapsed().as_millis() as u64;
                let result =
                    AnalysisResult::assemble(recognition, explanation.as_ref(), elapsed_ms, Utc::now());
                match ctx.key {
                    Some(key) => self.pipeline.store(key, &result),
                    None => log_error!("session {} reached caching without a key", self.id),
                }
                Ok(FrameStage::Delivering {
                    result,
                    origin: Origin::Computed,
                })
            }
            FrameStage::Delivering { result, origin } => {
                log_info!(
                    "session {} frame complete ({}, {}ms)",
                    self.id,
                    origin.as_str(),
                    ctx.started.elapsed().as_millis()
                );
                self.emit(ServerMessage::complete(result, origin)).await?;
                Ok(FrameStage::Idle)
            }
        }
    }

    /// Awaits `fut` unless the session is cancelled first.
    async fn cancellable<F, T>(&self, fut: F) -> Result<T, TransportError>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            out = fut => Ok(out),
        }
    }

    async fn emit(&self, message: ServerMessage) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let kind = message.kind();
        self.cancellable(self.outbound.send(message))
            .await?
            .map_err(|_| {
                log_debug!("session {} dropped {} message: receiver gone", self.id, kind);
                TransportError::Closed
            })
    }
}
