//! Core library for Chilean tax document OCR processing.
//!
//! This crate provides:
//! - RUT validation and formatting
//! - Rule-based invoice field extraction (document type, folio, dates, RUTs, amounts)
//! - A cache-aside client for the SII taxpayer registry
//! - The per-document pipeline and the polling worker that drives it

pub mod error;
pub mod invoice;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod registry;
pub mod rut;
pub mod store;

pub use error::{DteError, OcrError, PipelineError, RegistryError, Result, StoreError};
pub use invoice::{ExtractionResult, InvoiceParser, RuleBasedParser};
pub use models::config::DteConfig;
pub use models::invoice::{
    DocumentId, DocumentStatus, DocumentType, ExtractedFields, InvoiceDocument, LineItem,
    ParsedInvoiceRecord,
};
pub use models::taxpayer::TaxpayerRecord;
pub use ocr::{HttpOcrBackend, OcrBackend, OcrOutput};
pub use pipeline::{BatchReport, DocumentOutcome, Orchestrator, Worker};
pub use registry::{Lookup, RegistryClient, TaxpayerLookup};
pub use rut::{check_digit, format_rut, validate_rut, Rut};
pub use store::{BlobStore, DocumentStore, FsBlobStore, FsDocumentStore, MemoryBlobStore, MemoryDocumentStore};
