use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("OCR service not initialized: {0}")]
    Unavailable(String),
    #[error("Unable to decode image: {0}")]
    Decode(String),
    #[error("OCR processing failed: {0}")]
    Engine(String),
}

impl RecognitionError {
    /// Stable reason code for logs and clients.
    pub fn reason(&self) -> &'static str {
        match self {
            RecognitionError::Unavailable(_) => "unavailable",
            RecognitionError::Decode(_) => "decode_failure",
            RecognitionError::Engine(_) => "engine_failure",
        }
    }

    /// Message safe to show a client; engine internals stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            RecognitionError::Unavailable(_) => "OCR service not initialized".to_string(),
            RecognitionError::Decode(_) => "Unable to decode image data".to_string(),
            RecognitionError::Engine(_) => "OCR processing failed".to_string(),
        }
    }
}
