pub mod adapter;
pub mod error;
pub mod preprocess;
pub mod tesseract;

use std::sync::Arc;

use image::DynamicImage;

use crate::models::Detection;

pub use adapter::RecognitionAdapter;
pub use error::RecognitionError;
pub use tesseract::TesseractEngine;

/// A text detector/recognizer. Implementations are blocking and must be safe
/// to call from several worker threads at once.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Detections in the coordinate space of `image`, in scan order.
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Detection>, RecognitionError>;
}

/// Builds the engine on first use. Called at most once per adapter.
pub type RecognizerLoader =
    Box<dyn Fn() -> Result<Arc<dyn TextRecognizer>, RecognitionError> + Send + Sync>;
