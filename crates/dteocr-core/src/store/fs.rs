//! Directory-backed stores.
//!
//! Documents live at `<root>/<account_id>/<document_id>.json`; images are
//! files addressed by a path relative to the blob root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{BlobStore, DocumentStore};
use crate::error::StoreError;
use crate::models::invoice::{DocumentId, DocumentStatus, ExtractedFields, InvoiceDocument};

/// Document store with one JSON file per document.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a document, creating its account directory if needed.
    pub async fn insert(&self, document: &InvoiceDocument) -> Result<(), StoreError> {
        let path = self.path_for(&document.id)?;
        write_document(&path, document).await
    }

    pub async fn get(&self, id: &DocumentId) -> Result<InvoiceDocument, StoreError> {
        let path = self.path_for(id)?;
        read_document(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn path_for(&self, id: &DocumentId) -> Result<PathBuf, StoreError> {
        if !is_plain_name(&id.account_id) || !is_plain_name(&id.document_id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(self
            .root
            .join(&id.account_id)
            .join(format!("{}.json", id.document_id)))
    }

    async fn modify<F>(&self, id: &DocumentId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut InvoiceDocument) -> Result<(), StoreError>,
    {
        let path = self.path_for(id)?;
        let mut document = read_document(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(&mut document)?;
        write_document(&path, &document).await
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn list_pending(
        &self,
        status: DocumentStatus,
        limit: usize,
    ) -> Result<Vec<InvoiceDocument>, StoreError> {
        let mut found = Vec::new();

        for account_dir in sorted_entries(&self.root).await? {
            if found.len() >= limit {
                break;
            }
            if !tokio::fs::metadata(&account_dir).await?.is_dir() {
                continue;
            }

            for path in sorted_entries(&account_dir).await? {
                if found.len() >= limit {
                    break;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }

                match read_document(&path).await {
                    // Updates are addressed by the embedded id, so a file at
                    // another path could never leave the queue.
                    Ok(Some(document)) if !stored_at(&path, &document.id) => warn!(
                        "Skipping {}: it holds document {}",
                        path.display(),
                        document.id
                    ),
                    Ok(Some(document)) if document.status == status => found.push(document),
                    Ok(_) => {}
                    // A single unreadable file must not block the queue.
                    Err(StoreError::Corrupt(e)) => {
                        warn!("Skipping unreadable document {}: {}", path.display(), e)
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        debug!("Found {} {} documents under {}", found.len(), status, self.root.display());
        Ok(found)
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

/// Blob store reading files under a root directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn fetch(&self, image_ref: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let relative = Path::new(image_ref);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if image_ref.is_empty() || escapes {
            warn!("Rejecting image reference outside blob root: {:?}", image_ref);
            return Ok(None);
        }

        match tokio::fs::read(self.root.join(relative)).await {
            Ok(bytes) => {
                debug!("Read {} bytes for {}", bytes.len(), image_ref);
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether `path` ends in `<account_id>/<document_id>.json`.
fn stored_at(path: &Path, id: &DocumentId) -> bool {
    let stem = path.file_stem().and_then(|s| s.to_str());
    let account = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|s| s.to_str());
    stem == Some(id.document_id.as_str()) && account == Some(id.account_id.as_str())
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Directory entries sorted by path. A missing directory is empty.
async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

async fn read_document(path: &Path) -> Result<Option<InvoiceDocument>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_document(path: &Path, document: &InvoiceDocument) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(document)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::invoice::ParsedInvoiceRecord;
    use crate::rut::Rut;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn doc(account: &str, id: &str) -> InvoiceDocument {
        InvoiceDocument::pending(DocumentId::new(account, id), format!("{}/{}.jpg", account, id))
    }

    #[tokio::test]
    async fn test_document_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let document = doc("acme", "inv-1");
        store.insert(&document).await.unwrap();

        let fields = ExtractedFields {
            raw_text: "FACTURA ELECTRONICA".to_string(),
            ocr_confidence: 0.9,
            record: ParsedInvoiceRecord {
                document_number: Some(4521),
                issuer_id: Rut::parse("76.086.428-5"),
                total_amount: Some(Decimal::from(119_000)),
                ..Default::default()
            },
        };
        store
            .update_status(&document.id, DocumentStatus::Processing, None)
            .await
            .unwrap();
        store.update_fields(&document.id, &fields).await.unwrap();
        store
            .update_status(&document.id, DocumentStatus::Done, None)
            .await
            .unwrap();

        let stored = store.get(&document.id).await.unwrap();
        assert_eq!(stored.status, DocumentStatus::Done);
        assert_eq!(stored.raw_text.as_deref(), Some("FACTURA ELECTRONICA"));
        assert_eq!(stored.record, fields.record);
        assert!(dir.path().join("acme").join("inv-1.json").exists());
    }

    #[tokio::test]
    async fn test_list_pending_across_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        for (account, id) in [("beta", "2"), ("alpha", "1"), ("alpha", "3")] {
            store.insert(&doc(account, id)).await.unwrap();
        }
        store
            .update_status(&DocumentId::new("alpha", "1"), DocumentStatus::Error, Some("boom"))
            .await
            .unwrap();
        std::fs::write(dir.path().join("alpha").join("broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let pending = store.list_pending(DocumentStatus::Pending, 10).await.unwrap();
        let ids: Vec<String> = pending.iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, vec!["alpha/3", "beta/2"]);

        let limited = store.list_pending(DocumentStatus::Pending, 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        let failed = store.get(&DocumentId::new("alpha", "1")).await.unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_list_pending_skips_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        store.insert(&doc("acme", "inv-1")).await.unwrap();
        std::fs::write(dir.path().join("acme").join("aaa-bad.json"), [0xff, 0xfe, 0x00]).unwrap();

        let pending = store.list_pending(DocumentStatus::Pending, 10).await.unwrap();
        let ids: Vec<String> = pending.iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, vec!["acme/inv-1"]);
    }

    #[tokio::test]
    async fn test_list_pending_skips_misplaced_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        store.insert(&doc("acme", "inv-1")).await.unwrap();
        let misplaced = serde_json::to_string(&doc("acme", "bar")).unwrap();
        std::fs::write(dir.path().join("acme").join("foo.json"), misplaced).unwrap();
        let other_account = serde_json::to_string(&doc("beta", "inv-2")).unwrap();
        std::fs::write(dir.path().join("acme").join("inv-2.json"), other_account).unwrap();

        let pending = store.list_pending(DocumentStatus::Pending, 10).await.unwrap();
        let ids: Vec<String> = pending.iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, vec!["acme/inv-1"]);
    }

    #[tokio::test]
    async fn test_missing_root_and_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path().join("missing"));
        assert!(store.list_pending(DocumentStatus::Pending, 5).await.unwrap().is_empty());

        let err = store
            .update_status(&DocumentId::new("acme", "x"), DocumentStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store.get(&DocumentId::new("..", "x")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_blob_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("acme")).unwrap();
        std::fs::write(dir.path().join("acme").join("scan.jpg"), [0xff, 0xd8]).unwrap();
        let blobs = FsBlobStore::new(dir.path());

        assert_eq!(blobs.fetch("acme/scan.jpg").await.unwrap(), Some(vec![0xff, 0xd8]));
        assert_eq!(blobs.fetch("acme/missing.jpg").await.unwrap(), None);
        assert_eq!(blobs.fetch("../etc/passwd").await.unwrap(), None);
        assert_eq!(blobs.fetch("/etc/passwd").await.unwrap(), None);
        assert_eq!(blobs.fetch("").await.unwrap(), None);
    }
}
