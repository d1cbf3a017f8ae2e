//! OCR backend abstraction.
//!
//! Text recognition itself runs in an external service; the pipeline only
//! needs the recognized text and an overall confidence.

mod http;

pub use http::HttpOcrBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// A recognized block of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    /// Recognition confidence score (0.0 - 1.0).
    pub confidence: f32,
}

/// Result of OCR on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    /// Full text in reading order.
    pub text: String,

    /// Mean confidence score (0.0 - 1.0).
    pub confidence: f32,

    /// Per-block detail, when the backend reports it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<TextBlock>,
}

impl OcrOutput {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            blocks: Vec::new(),
        }
    }

    /// Build from blocks; confidence is the mean block confidence.
    pub fn from_blocks(text: impl Into<String>, blocks: Vec<TextBlock>) -> Self {
        let confidence = if blocks.is_empty() {
            0.0
        } else {
            blocks.iter().map(|b| b.confidence).sum::<f32>() / blocks.len() as f32
        };
        Self {
            text: text.into(),
            confidence,
            blocks,
        }
    }

    /// Whether any non-whitespace text was recognized.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Turns image bytes into text.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn extract_text(&self, image: &[u8]) -> Result<OcrOutput, OcrError>;
}
