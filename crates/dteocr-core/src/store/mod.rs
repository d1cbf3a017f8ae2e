//! Document and image storage used by the pipeline.

mod fs;
mod memory;

pub use fs::{FsBlobStore, FsDocumentStore};
pub use memory::{MemoryBlobStore, MemoryDocumentStore};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::invoice::{DocumentId, DocumentStatus, ExtractedFields, InvoiceDocument};

/// Persistent record of scanned documents and their processing state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Up to `limit` documents currently in `status`, oldest first.
    async fn list_pending(
        &self,
        status: DocumentStatus,
        limit: usize,
    ) -> Result<Vec<InvoiceDocument>, StoreError>;

    /// Store raw text, OCR confidence and extracted fields.
    async fn update_fields(&self, id: &DocumentId, fields: &ExtractedFields) -> Result<(), StoreError>;

    /// Move a document to `status`. The message is recorded only for `error`.
    async fn update_status(
        &self,
        id: &DocumentId,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Read access to document images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bytes behind an image reference, `None` when nothing is stored there.
    async fn fetch(&self, image_ref: &str) -> Result<Option<Vec<u8>>, StoreError>;
}
