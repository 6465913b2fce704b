//! Input checks applied at the transport boundary, before bytes or text reach
//! the pipeline.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty frame received")]
    Empty,
    #[error("Frame too large: {size} bytes (maximum {max} bytes)")]
    TooLarge { size: usize, max: usize },
    #[error("Invalid frame content: expected a PNG, JPEG or BMP image")]
    UnsupportedFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Bmp,
}

impl ImageKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Bmp => "image/bmp",
        }
    }
}

const MAGIC_NUMBERS: &[(&[u8], ImageKind)] = &[
    (b"\x89PNG\r\n\x1a\n", ImageKind::Png),
    (b"\xFF\xD8\xFF", ImageKind::Jpeg),
    (b"BM", ImageKind::Bmp),
];

/// Checks size limits and the file signature of an incoming frame.
pub fn validate_frame(bytes: &[u8], max_bytes: usize) -> Result<ImageKind, ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(ValidationError::TooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }
    MAGIC_NUMBERS
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, kind)| *kind)
        .ok_or(ValidationError::UnsupportedFormat)
}

static SCRIPT_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("static regex")
});
static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("static regex"));

/// Strips markup, collapses whitespace and caps the length in characters.
///
/// Bare comparison signs (`x < y`) are kept; only things shaped like tags go.
pub fn sanitize_text(text: &str, max_chars: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    let without_scripts = SCRIPT_BLOCKS.replace_all(text, " ");
    let without_comments = COMMENTS.replace_all(&without_scripts, " ");
    let without_tags = TAGS.replace_all(&without_comments, " ");

    let normalized = without_tags.split_whitespace().collect::<Vec<_>>().join(" ");
    match normalized.char_indices().nth(max_chars) {
        Some((cut, _)) => normalized[..cut].to_string(),
        None => normalized,
    }
}
