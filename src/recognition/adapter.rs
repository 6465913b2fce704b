use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;

use super::preprocess::{self, DEFAULT_MAX_DIMENSION};
use super::{RecognitionError, RecognizerLoader, TextRecognizer};
use crate::models::RecognitionResult;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Owns the recognition engine and turns raw frame bytes into a
/// [`RecognitionResult`].
///
/// The engine is loaded exactly once, on [`initialize`](Self::initialize) or on
/// the first frame, whichever comes first. Concurrent first callers block on
/// the same load. A failed load is remembered: every later call reports the
/// same `Unavailable` error without retrying.
pub struct RecognitionAdapter {
    loader: RecognizerLoader,
    engine: OnceCell<Result<Arc<dyn TextRecognizer>, String>>,
    max_dimension: u32,
    language: String,
}

impl RecognitionAdapter {
    pub fn new(loader: RecognizerLoader, language: impl Into<String>, max_dimension: u32) -> Self {
        Self {
            loader,
            engine: OnceCell::new(),
            max_dimension: if max_dimension == 0 {
                DEFAULT_MAX_DIMENSION
            } else {
                max_dimension
            },
            language: language.into(),
        }
    }

    /// Wraps an already constructed engine. It still counts as uninitialized
    /// until first use.
    pub fn with_engine(engine: Arc<dyn TextRecognizer>, max_dimension: u32) -> Self {
        let loader: RecognizerLoader =
            Box::new(move || -> Result<Arc<dyn TextRecognizer>, RecognitionError> {
                Ok(Arc::clone(&engine))
            });
        Self::new(loader, "eng", max_dimension)
    }

    pub fn initialize(&self) -> Result<(), RecognitionError> {
        self.engine().map(|_| ())
    }

    /// True once a load has succeeded. Never triggers a load.
    pub fn is_ready(&self) -> bool {
        matches!(self.engine.get(), Some(Ok(_)))
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Decodes, downscales and recognizes one frame. Blocking; run it on a
    /// worker thread. Detection quads are reported in original-frame pixels.
    pub fn recognize(&self, frame: &[u8]) -> Result<RecognitionResult, RecognitionError> {
        let started = Instant::now();
        let engine = self.engine()?;

        let image = preprocess::decode(frame)?;
        let prepared = preprocess::downscale(image, self.max_dimension);

        let mut detections = engine.recognize(&prepared.image)?;
        if prepared.is_resized() {
            for detection in detections.iter_mut() {
                detection.bounding_box = detection
                    .bounding_box
                    .scaled(prepared.scale_x, prepared.scale_y);
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(RecognitionResult::from_detections(detections, elapsed_ms))
    }

    fn engine(&self) -> Result<Arc<dyn TextRecognizer>, RecognitionError> {
        let loaded = self.engine.get_or_init(|| {
            let started = Instant::now();
            match (self.loader)() {
                Ok(engine) => {
                    log_info!(
                        "recognition engine '{}' ready (language={}, {}ms)",
                        engine.name(),
                        self.language,
                        started.elapsed().as_millis()
                    );
                    Ok(engine)
                }
                Err(err) => {
                    log_error!("recognition engine failed to load: {err}");
                    Err(err.to_string())
                }
            }
        });

        loaded.clone().map_err(RecognitionError::Unavailable)
    }
}
