//! SII taxpayer registry client.
//!
//! Lookups are cache-aside: a fresh cached record is returned without
//! touching the network, otherwise the registry web form is queried with
//! bounded retries and the scraped record is written back to the cache.

pub mod cache;
pub mod html;
pub mod transport;

pub use cache::{JsonFileTaxpayerCache, MemoryTaxpayerCache, TaxpayerCache};
pub use transport::{HttpRegistryTransport, LookupForm, RegistryResponse, RegistryTransport};

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::models::config::RegistryConfig;
use crate::models::taxpayer::TaxpayerRecord;
use crate::rut::Rut;

/// Outcome of a registry lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Served from a fresh cache entry.
    Cached(TaxpayerRecord),
    /// Fetched from the registry and written to the cache.
    Fetched(TaxpayerRecord),
    /// The registry has no data for this RUT.
    NotFound,
}

impl Lookup {
    pub fn record(&self) -> Option<&TaxpayerRecord> {
        match self {
            Lookup::Cached(record) | Lookup::Fetched(record) => Some(record),
            Lookup::NotFound => None,
        }
    }

    pub fn into_record(self) -> Option<TaxpayerRecord> {
        match self {
            Lookup::Cached(record) | Lookup::Fetched(record) => Some(record),
            Lookup::NotFound => None,
        }
    }
}

/// Something that can enrich a RUT with registry data.
///
/// A miss (unknown taxpayer or registry unavailable) is `None`.
#[async_trait]
pub trait TaxpayerLookup: Send + Sync {
    async fn resolve(&self, rut: &Rut) -> Option<TaxpayerRecord>;
}

/// Cache-aside registry client.
pub struct RegistryClient {
    transport: Arc<dyn RegistryTransport>,
    cache: Arc<dyn TaxpayerCache>,
    max_retries: u32,
    backoff: Duration,
    cache_ttl: chrono::Duration,
    in_flight: StdMutex<HashMap<Rut, Arc<Mutex<()>>>>,
}

impl RegistryClient {
    pub fn new(
        config: &RegistryConfig,
        transport: Arc<dyn RegistryTransport>,
        cache: Arc<dyn TaxpayerCache>,
    ) -> Self {
        Self {
            transport,
            cache,
            max_retries: config.max_retries.max(1),
            backoff: config.backoff(),
            cache_ttl: config.cache_ttl(),
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    /// Resolve a RUT, swallowing registry failures.
    pub async fn resolve(&self, rut: &Rut) -> Option<TaxpayerRecord> {
        match self.lookup(rut).await {
            Ok(lookup) => lookup.into_record(),
            Err(e) => {
                warn!("Taxpayer lookup for {} failed: {}", rut, e);
                None
            }
        }
    }

    /// Look up a RUT, reporting where the answer came from.
    pub async fn lookup(&self, rut: &Rut) -> Result<Lookup, RegistryError> {
        if let Some(record) = self.fresh_cached(rut).await {
            return Ok(Lookup::Cached(record));
        }

        let flight = self.flight(rut);
        let _guard = flight.lock.lock().await;
        // Another caller may have filled the cache while we waited.
        match self.fresh_cached(rut).await {
            Some(record) => Ok(Lookup::Cached(record)),
            None => self.fetch_and_store(rut).await,
        }
    }

    /// Skip the cache read and query the registry directly.
    pub async fn refresh(&self, rut: &Rut) -> Result<Lookup, RegistryError> {
        let flight = self.flight(rut);
        let _guard = flight.lock.lock().await;
        self.fetch_and_store(rut).await
    }

    async fn fresh_cached(&self, rut: &Rut) -> Option<TaxpayerRecord> {
        match self.cache.get(rut).await {
            Ok(Some(record)) if record.is_fresh(self.cache_ttl, Utc::now()) => {
                debug!("Cache hit for {}", rut);
                Some(record)
            }
            Ok(Some(_)) => {
                debug!("Cached record for {} is stale", rut);
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Taxpayer cache read failed for {}: {}", rut, e);
                None
            }
        }
    }

    async fn fetch_and_store(&self, rut: &Rut) -> Result<Lookup, RegistryError> {
        info!("Querying SII registry for {}", rut);

        let Some(record) = self.fetch(rut).await? else {
            info!("SII registry has no data for {}", rut);
            return Ok(Lookup::NotFound);
        };

        if let Err(e) = self.cache.put(&record).await {
            warn!("Taxpayer cache write failed for {}: {}", rut, e);
        }
        info!("Resolved {} as {}", rut, record.legal_name);

        Ok(Lookup::Fetched(record))
    }

    async fn fetch(&self, rut: &Rut) -> Result<Option<TaxpayerRecord>, RegistryError> {
        let form = LookupForm::new(rut);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let err = match self.transport.submit(&form).await {
                Ok(response) if response.is_success() => {
                    return Ok(html::parse_taxpayer_page(&response.body, *rut, Utc::now()));
                }
                Ok(response) => RegistryError::Status(response.status),
                Err(e) => e,
            };

            warn!(
                "Registry attempt {}/{} for {} failed: {}",
                attempt, self.max_retries, rut, err
            );

            if attempt >= self.max_retries {
                return Err(RegistryError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            tokio::time::sleep(backoff_delay(self.backoff, attempt)).await;
        }
    }

    /// Join the per-RUT flight shared by concurrent lookups of one identifier.
    fn flight(&self, rut: &Rut) -> Flight<'_> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        Flight {
            in_flight: &self.in_flight,
            rut: *rut,
            lock: in_flight.entry(*rut).or_default().clone(),
        }
    }
}

/// Membership in a per-RUT flight. Leaving it (also by cancellation)
/// removes the map entry once no other caller holds it.
struct Flight<'a> {
    in_flight: &'a StdMutex<HashMap<Rut, Arc<Mutex<()>>>>,
    rut: Rut,
    lock: Arc<Mutex<()>>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one held here.
        let last = Arc::strong_count(&self.lock) <= 2;
        let ours = in_flight
            .get(&self.rut)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock));
        if last && ours {
            in_flight.remove(&self.rut);
        }
    }
}

/// Pause before attempt `attempt + 1`: `base * attempt`, saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

#[async_trait]
impl TaxpayerLookup for RegistryClient {
    async fn resolve(&self, rut: &Rut) -> Option<TaxpayerRecord> {
        RegistryClient::resolve(self, rut).await
    }
}
