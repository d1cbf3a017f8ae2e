//! In-memory stores.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobStore, DocumentStore};
use crate::error::StoreError;
use crate::models::invoice::{DocumentId, DocumentStatus, ExtractedFields, InvoiceDocument};

/// Document store kept in insertion order.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<Vec<InvoiceDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = InvoiceDocument>) -> Self {
        Self {
            documents: RwLock::new(documents.into_iter().collect()),
        }
    }

    /// Add a document, replacing any with the same id.
    pub async fn insert(&self, document: InvoiceDocument) {
        let mut documents = self.documents.write().await;
        match documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
    }

    pub async fn get(&self, id: &DocumentId) -> Option<InvoiceDocument> {
        self.documents.read().await.iter().find(|d| &d.id == id).cloned()
    }

    async fn modify<F>(&self, id: &DocumentId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut InvoiceDocument) -> Result<(), StoreError>,
    {
        let mut documents = self.documents.write().await;
        let document = documents
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(document)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_pending(
        &self,
        status: DocumentStatus,
        limit: usize,
    ) -> Result<Vec<InvoiceDocument>, StoreError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|d| d.status == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_fields(&self, id: &DocumentId, fields: &ExtractedFields) -> Result<(), StoreError> {
        self.modify(id, |d| {
            d.apply_fields(fields);
            Ok(())
        })
        .await
    }

    async fn update_status(
        &self,
        id: &DocumentId,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        self.modify(id, |d| d.apply_status(status, error_message)).await
    }
}

/// Blob store backed by a map of reference to bytes.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, image_ref: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.write().await.insert(image_ref.into(), bytes);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, image_ref: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().await.get(image_ref).cloned())
    }
}
