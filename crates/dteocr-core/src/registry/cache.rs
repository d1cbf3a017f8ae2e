//! Taxpayer record caches.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::StoreError;
use crate::models::taxpayer::TaxpayerRecord;
use crate::rut::Rut;

/// Storage for taxpayer records keyed by RUT.
///
/// Freshness is the caller's concern: a cache returns whatever it holds.
#[async_trait]
pub trait TaxpayerCache: Send + Sync {
    async fn get(&self, rut: &Rut) -> Result<Option<TaxpayerRecord>, StoreError>;

    /// Insert or replace the record for its identifier.
    async fn put(&self, record: &TaxpayerRecord) -> Result<(), StoreError>;
}

/// Process-local cache.
#[derive(Default)]
pub struct MemoryTaxpayerCache {
    records: RwLock<HashMap<Rut, TaxpayerRecord>>,
}

impl MemoryTaxpayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-filled with records.
    pub fn with_records(records: impl IntoIterator<Item = TaxpayerRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.identifier, r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TaxpayerCache for MemoryTaxpayerCache {
    async fn get(&self, rut: &Rut) -> Result<Option<TaxpayerRecord>, StoreError> {
        Ok(self.records.read().await.get(rut).cloned())
    }

    async fn put(&self, record: &TaxpayerRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.identifier, record.clone());
        Ok(())
    }
}

/// Cache persisted as one JSON object keyed by formatted RUT.
///
/// The whole file is loaded on open and rewritten on every `put`.
pub struct JsonFileTaxpayerCache {
    path: PathBuf,
    records: Mutex<BTreeMap<String, TaxpayerRecord>>,
}

impl JsonFileTaxpayerCache {
    /// Open the cache at `path`. A missing file is an empty cache.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Loaded {} cached taxpayers from {}", records.len(), path.display());

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TaxpayerCache for JsonFileTaxpayerCache {
    async fn get(&self, rut: &Rut) -> Result<Option<TaxpayerRecord>, StoreError> {
        Ok(self.records.lock().await.get(&rut.to_string()).cloned())
    }

    async fn put(&self, record: &TaxpayerRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.insert(record.identifier.to_string(), record.clone());

        let content = serde_json::to_string_pretty(&*records)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
