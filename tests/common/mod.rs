#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use classsight_lib::cache::{CacheConfig, ExplanationCache, ResultCache};
use classsight_lib::explanation::{ExplanationAdapter, ExplanationError, ExplanationModel};
use classsight_lib::models::{Detection, Quad};
use classsight_lib::pipeline::{Pipeline, PipelineOptions};
use classsight_lib::recognition::{RecognitionAdapter, RecognitionError, TextRecognizer};
use classsight_lib::server::{router, AppState};
use classsight_lib::stream::{Inbound, ServerMessage, SessionSummary, StreamSession};

/// Frames this wide make the fake recognizer fail.
pub const FAILING_WIDTH: u32 = 13;
/// Frames this wide contain no text.
pub const BLANK_WIDTH: u32 = 17;

/// Returns one line per configured text, unless the frame width says otherwise.
pub struct FakeRecognizer {
    lines: Vec<(String, f32)>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeRecognizer {
    pub fn new(lines: &[(&str, f32)]) -> Arc<Self> {
        Self::slow(lines, Duration::ZERO)
    }

    pub fn slow(lines: &[(&str, f32)], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            lines: lines.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for FakeRecognizer {
    fn name(&self) -> &str {
        "fake"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Detection>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match image.dimensions().0 {
            FAILING_WIDTH => Err(RecognitionError::Engine("synthetic failure".into())),
            BLANK_WIDTH => Ok(Vec::new()),
            _ => Ok(self
                .lines
                .iter()
                .enumerate()
                .map(|(row, (text, confidence))| Detection {
                    text: text.clone(),
                    confidence: *confidence,
                    bounding_box: Quad::from_rect(2.0, 2.0 + row as f32 * 12.0, 40.0, 10.0),
                })
                .collect()),
        }
    }
}

pub struct FakeModel {
    reply: Option<String>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub finished: AtomicUsize,
}

impl FakeModel {
    pub fn answering(reply: &str) -> Arc<Self> {
        Self::build(Some(reply), Duration::ZERO)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(None, Duration::ZERO)
    }

    /// Answers after `delay`; `finished` counts calls that ran to the end.
    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Self::build(Some(reply), delay)
    }

    fn build(reply: Option<&str>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.map(str::to_string),
            delay,
            calls: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExplanationModel for FakeModel {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ExplanationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(ExplanationError::Status {
                status: 429,
                body: "quota exceeded".into(),
            }),
        }
    }
}

pub fn cache_config(enabled: bool) -> CacheConfig {
    CacheConfig {
        enabled,
        ..CacheConfig::default()
    }
}

pub fn pipeline(
    recognizer: Arc<FakeRecognizer>,
    model: Arc<FakeModel>,
    cache_enabled: bool,
) -> Arc<Pipeline> {
    let recognition = RecognitionAdapter::with_engine(recognizer, 1024);
    let explanation = ExplanationAdapter::new(
        model,
        Some(ExplanationCache::new(cache_config(cache_enabled))),
    );
    Arc::new(Pipeline::new(
        Arc::new(ResultCache::new(cache_config(cache_enabled))),
        Arc::new(recognition),
        Arc::new(explanation),
        PipelineOptions::default(),
    ))
}

/// A PNG frame; `shade` makes otherwise identical frames differ.
pub fn png_frame(width: u32, height: u32, shade: u8) -> Bytes {
    let image = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode png");
    Bytes::from(out)
}

/// Runs a [`StreamSession`] on its own task with channel endpoints for the test.
pub struct SessionHarness {
    pub inbound: mpsc::Sender<Inbound>,
    pub outbound: mpsc::Receiver<ServerMessage>,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<SessionSummary>,
}

impl SessionHarness {
    pub fn start(pipeline: Arc<Pipeline>) -> Self {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let session = StreamSession::new(Uuid::new_v4(), pipeline, out_tx, cancel.clone());
        let handle = tokio::spawn(session.run(in_rx));
        Self {
            inbound: in_tx,
            outbound: out_rx,
            cancel,
            handle,
        }
    }

    pub async fn send(&self, frame: Bytes) {
        self.inbound.send(Inbound::Frame(frame)).await.expect("session alive");
    }

    pub async fn reject(&self, reason: &str) {
        self.inbound
            .send(Inbound::Rejected(reason.to_string()))
            .await
            .expect("session alive");
    }

    pub async fn next(&mut self) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
            .await
            .expect("message within timeout")
            .expect("outbound open")
    }

    /// Messages up to and including the next terminal one.
    pub async fn until_terminal(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        loop {
            let message = self.next().await;
            let done = message.is_terminal();
            messages.push(message);
            if done {
                return messages;
            }
        }
    }

    pub async fn finish(self) -> SessionSummary {
        drop(self.inbound);
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("session ends")
            .expect("session task")
    }
}

pub fn kinds(messages: &[ServerMessage]) -> Vec<&'static str> {
    messages.iter().map(ServerMessage::kind).collect()
}

/// Serves the full router on an ephemeral local port.
pub async fn serve(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}
