//! Error types for the dteocr-core library.

use thiserror::Error;

use crate::models::invoice::DocumentStatus;

/// Main error type for the dteocr library.
#[derive(Error, Debug)]
pub enum DteError {
    /// Taxpayer registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Document pipeline error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Document or blob store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// OCR backend error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while talking to the SII taxpayer registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The registry answered with a non-success status.
    #[error("registry returned HTTP {0}")]
    Status(u16),

    /// The request did not complete in time.
    #[error("registry request timed out")]
    Timeout,

    /// Connection or protocol failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Every attempt failed.
    #[error("registry unavailable after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<RegistryError> },
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RegistryError::Timeout
        } else {
            RegistryError::Transport(err.to_string())
        }
    }
}

/// Errors from the taxpayer cache and the document/blob stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Backend I/O failure.
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded or encoded.
    #[error("corrupt store data: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The document is not in a state that allows the requested status.
    #[error("document {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: DocumentStatus,
        to: DocumentStatus,
    },
}

/// Errors reported by the OCR backend.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The backend could not be reached.
    #[error("OCR backend unreachable: {0}")]
    Unavailable(String),

    /// The backend processed the image and reported a failure.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The backend answered with something we cannot read.
    #[error("invalid OCR response: {0}")]
    InvalidResponse(String),
}

/// Per-document failures that terminalize a document in the `error` state.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The blob store has no bytes for the image reference.
    #[error("image not available in blob store: {0}")]
    ImageUnavailable(String),

    /// The OCR backend failed.
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    /// The OCR backend returned no text.
    #[error("no text extracted from image")]
    EmptyText,

    /// Reading from or writing to a store failed mid-document.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// Result type for the dteocr library.
pub type Result<T> = std::result::Result<T, DteError>;
