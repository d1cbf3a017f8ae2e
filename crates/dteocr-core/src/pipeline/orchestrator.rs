//! Per-document processing.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, StoreError};
use crate::invoice::{InvoiceParser, RuleBasedParser};
use crate::models::invoice::{
    DocumentId, DocumentStatus, ExtractedFields, InvoiceDocument, ParsedInvoiceRecord,
};
use crate::ocr::OcrBackend;
use crate::registry::TaxpayerLookup;
use crate::store::{BlobStore, DocumentStore};

/// How processing of one document ended.
#[derive(Debug)]
pub enum DocumentOutcome {
    /// Fields written, status `done`.
    Done,
    /// Status `error`, carrying the cause.
    Failed(PipelineError),
}

impl DocumentOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, DocumentOutcome::Done)
    }
}

/// Runs one document through image fetch, OCR, extraction and enrichment.
pub struct Orchestrator {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    ocr: Arc<dyn OcrBackend>,
    taxpayers: Arc<dyn TaxpayerLookup>,
    parser: Arc<dyn InvoiceParser>,
}

impl Orchestrator {
    /// Create an orchestrator using the rule-based parser.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        ocr: Arc<dyn OcrBackend>,
        taxpayers: Arc<dyn TaxpayerLookup>,
    ) -> Self {
        Self {
            documents,
            blobs,
            ocr,
            taxpayers,
            parser: Arc::new(RuleBasedParser::new()),
        }
    }

    /// Replace the invoice parser.
    pub fn with_parser(mut self, parser: Arc<dyn InvoiceParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Process one document. Never fails: errors end up in the document status.
    ///
    /// Only pending documents are processed. Anything else is reported as
    /// failed and left as stored.
    pub async fn process(&self, document: &InvoiceDocument) -> DocumentOutcome {
        if !document.status.can_transition_to(DocumentStatus::Processing) {
            warn!(
                "Skipping document {}: status is {}, not pending",
                document.id, document.status
            );
            return DocumentOutcome::Failed(PipelineError::Store(StoreError::InvalidTransition {
                id: document.id.to_string(),
                from: document.status,
                to: DocumentStatus::Processing,
            }));
        }

        let start = Instant::now();
        info!("Processing document {}", document.id);

        match self.run(document).await {
            Ok(()) => {
                info!(
                    "Document {} done in {}ms",
                    document.id,
                    start.elapsed().as_millis()
                );
                DocumentOutcome::Done
            }
            Err(e) => {
                error!("Document {} failed: {}", document.id, e);
                let message = e.to_string();
                if let Err(store_err) = self
                    .documents
                    .update_status(&document.id, DocumentStatus::Error, Some(&message))
                    .await
                {
                    error!(
                        "Could not record failure of document {}: {}",
                        document.id, store_err
                    );
                }
                DocumentOutcome::Failed(e)
            }
        }
    }

    async fn run(&self, document: &InvoiceDocument) -> Result<(), PipelineError> {
        self.documents
            .update_status(&document.id, DocumentStatus::Processing, None)
            .await?;

        info!("Fetching image {}", document.image_ref);
        let image = self
            .blobs
            .fetch(&document.image_ref)
            .await?
            .ok_or_else(|| PipelineError::ImageUnavailable(document.image_ref.clone()))?;

        info!("Running OCR on {} bytes", image.len());
        let ocr = self.ocr.extract_text(&image).await?;
        if !ocr.has_text() {
            return Err(PipelineError::EmptyText);
        }

        info!("Extracting fields from {} characters", ocr.text.len());
        let extraction = self.parser.parse(&ocr.text);
        for warning in &extraction.warnings {
            debug!("{}: {}", document.id, warning);
        }

        let mut record = extraction.record;
        self.enrich_issuer(&document.id, &mut record).await;

        let fields = ExtractedFields {
            raw_text: ocr.text,
            ocr_confidence: ocr.confidence,
            record,
        };
        self.documents.update_fields(&document.id, &fields).await?;
        self.documents
            .update_status(&document.id, DocumentStatus::Done, None)
            .await?;

        Ok(())
    }

    async fn enrich_issuer(&self, id: &DocumentId, record: &mut ParsedInvoiceRecord) {
        match record.issuer_id {
            Some(issuer) if issuer.is_valid() => {
                info!("Resolving issuer {} with the SII registry", issuer);
                match self.taxpayers.resolve(&issuer).await {
                    Some(taxpayer) => record.apply_taxpayer(&taxpayer),
                    None => warn!("No registry data for issuer {} of {}", issuer, id),
                }
            }
            Some(issuer) => warn!(
                "Issuer RUT {} of {} fails checksum, skipping registry lookup",
                issuer, id
            ),
            None => warn!("No issuer RUT found in {}, skipping registry lookup", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::models::taxpayer::TaxpayerRecord;
    use crate::ocr::OcrOutput;
    use crate::registry::{
        LookupForm, MemoryTaxpayerCache, RegistryClient, RegistryResponse, RegistryTransport,
    };
    use crate::rut::Rut;
    use crate::store::{MemoryBlobStore, MemoryDocumentStore};
    use crate::error::RegistryError;
    use crate::models::config::RegistryConfig;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    const INVOICE_TEXT: &str = "FACTURA ELECTRONICA N° 4521\n\
        R.U.T.: 76.086.428-5\n\
        Fecha: 15/03/2024\n\
        RUT: 12.345.678-5\n\
        NETO $ 100.000\n\
        IVA 19% $ 19.000\n\
        TOTAL $ 119.000";

    struct FixedOcr {
        result: fn() -> Result<OcrOutput, OcrError>,
        calls: AtomicU32,
    }

    impl FixedOcr {
        fn new(result: fn() -> Result<OcrOutput, OcrError>) -> Self {
            Self {
                result,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl OcrBackend for FixedOcr {
        async fn extract_text(&self, _image: &[u8]) -> Result<OcrOutput, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    /// Counts registry requests and always fails them.
    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RegistryTransport for CountingTransport {
        async fn submit(&self, _form: &LookupForm) -> Result<RegistryResponse, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RegistryError::Transport("offline".to_string()))
        }
    }

    /// Records every RUT it is asked about.
    #[derive(Default)]
    struct RecordingLookup {
        asked: std::sync::Mutex<Vec<Rut>>,
    }

    #[async_trait]
    impl TaxpayerLookup for RecordingLookup {
        async fn resolve(&self, rut: &Rut) -> Option<TaxpayerRecord> {
            self.asked.lock().unwrap().push(*rut);
            None
        }
    }

    struct Harness {
        documents: Arc<MemoryDocumentStore>,
        blobs: Arc<MemoryBlobStore>,
        ocr: Arc<FixedOcr>,
    }

    impl Harness {
        async fn new(ocr: fn() -> Result<OcrOutput, OcrError>) -> Self {
            let documents = Arc::new(MemoryDocumentStore::new());
            documents.insert(pending()).await;
            let blobs = Arc::new(MemoryBlobStore::new());
            blobs.insert("acme/scan-1.jpg", vec![0xff, 0xd8, 0xff]).await;
            Self {
                documents,
                blobs,
                ocr: Arc::new(FixedOcr::new(ocr)),
            }
        }

        fn orchestrator(&self, taxpayers: Arc<dyn TaxpayerLookup>) -> Orchestrator {
            Orchestrator::new(
                self.documents.clone(),
                self.blobs.clone(),
                self.ocr.clone(),
                taxpayers,
            )
        }

        async fn stored(&self) -> InvoiceDocument {
            self.documents.get(&pending().id).await.unwrap()
        }
    }

    fn pending() -> InvoiceDocument {
        InvoiceDocument::pending(DocumentId::new("acme", "inv-1"), "acme/scan-1.jpg")
    }

    fn invoice_ocr() -> Result<OcrOutput, OcrError> {
        Ok(OcrOutput::new(INVOICE_TEXT, 0.92))
    }

    fn issuer() -> Rut {
        Rut::parse("76.086.428-5").unwrap()
    }

    #[tokio::test]
    async fn test_cached_issuer_completes_without_network() {
        let harness = Harness::new(invoice_ocr).await;
        let transport = Arc::new(CountingTransport::default());
        let cache = Arc::new(MemoryTaxpayerCache::with_records([TaxpayerRecord {
            identifier: issuer(),
            legal_name: "COMERCIAL LOS ANDES SPA".to_string(),
            business_activity: Some("VENTA DE ALIMENTOS".to_string()),
            economic_activity: None,
            address: Some("AV. PROVIDENCIA 1234".to_string()),
            commune: Some("PROVIDENCIA".to_string()),
            region: None,
            last_verified_at: Utc::now() - chrono::Duration::days(3),
        }]));
        let registry = Arc::new(RegistryClient::new(
            &RegistryConfig::default(),
            transport.clone(),
            cache,
        ));

        let outcome = harness.orchestrator(registry).process(&pending()).await;

        assert!(outcome.is_done(), "{:?}", outcome);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        let stored = harness.stored().await;
        assert_eq!(stored.status, DocumentStatus::Done);
        assert_eq!(stored.error_message, None);
        assert_eq!(stored.raw_text.as_deref(), Some(INVOICE_TEXT));
        assert_eq!(stored.ocr_confidence, Some(0.92));
        assert_eq!(stored.record.document_number, Some(4521));
        assert_eq!(stored.record.issuer_id, Some(issuer()));
        assert_eq!(stored.record.total_amount, Some(Decimal::from(119_000)));
        assert_eq!(
            stored.record.issuer_legal_name.as_deref(),
            Some("COMERCIAL LOS ANDES SPA")
        );
        assert_eq!(stored.record.issuer_commune.as_deref(), Some("PROVIDENCIA"));
    }

    #[tokio::test]
    async fn test_missing_image_fails_without_lookup() {
        let harness = Harness::new(invoice_ocr).await;
        let lookup = Arc::new(RecordingLookup::default());
        let mut document = pending();
        document.image_ref = "acme/missing.jpg".to_string();

        let outcome = harness.orchestrator(lookup.clone()).process(&document).await;

        assert!(matches!(
            outcome,
            DocumentOutcome::Failed(PipelineError::ImageUnavailable(ref r)) if r == "acme/missing.jpg"
        ));
        let stored = harness.stored().await;
        assert_eq!(stored.status, DocumentStatus::Error);
        assert!(!stored.error_message.unwrap_or_default().is_empty());
        assert!(lookup.asked.lock().unwrap().is_empty());
        assert_eq!(harness.ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ocr_failure_and_empty_text() {
        fn unavailable() -> Result<OcrOutput, OcrError> {
            Err(OcrError::Unavailable("connection refused".to_string()))
        }
        fn blank() -> Result<OcrOutput, OcrError> {
            Ok(OcrOutput::new("   \n", 0.1))
        }

        let harness = Harness::new(unavailable).await;
        let outcome = harness
            .orchestrator(Arc::new(RecordingLookup::default()))
            .process(&pending())
            .await;
        assert!(matches!(outcome, DocumentOutcome::Failed(PipelineError::Ocr(_))));
        let stored = harness.stored().await;
        assert_eq!(stored.status, DocumentStatus::Error);
        assert!(stored.error_message.unwrap().contains("connection refused"));

        let harness = Harness::new(blank).await;
        let outcome = harness
            .orchestrator(Arc::new(RecordingLookup::default()))
            .process(&pending())
            .await;
        assert!(matches!(outcome, DocumentOutcome::Failed(PipelineError::EmptyText)));
        assert_eq!(harness.stored().await.status, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn test_invalid_issuer_skips_lookup() {
        fn bad_checksum() -> Result<OcrOutput, OcrError> {
            Ok(OcrOutput::new("BOLETA ELECTRONICA\nRUT 12.345.678-4\nTOTAL $5.000", 0.8))
        }

        let harness = Harness::new(bad_checksum).await;
        let lookup = Arc::new(RecordingLookup::default());

        let outcome = harness.orchestrator(lookup.clone()).process(&pending()).await;

        assert!(outcome.is_done());
        assert!(lookup.asked.lock().unwrap().is_empty());
        let stored = harness.stored().await;
        assert_eq!(stored.status, DocumentStatus::Done);
        assert_eq!(stored.record.issuer_legal_name, None);
        assert_eq!(stored.record.total_amount, Some(Decimal::from(5_000)));
    }

    #[tokio::test]
    async fn test_lookup_miss_still_completes() {
        let harness = Harness::new(invoice_ocr).await;
        let lookup = Arc::new(RecordingLookup::default());

        let outcome = harness.orchestrator(lookup.clone()).process(&pending()).await;

        assert!(outcome.is_done());
        assert_eq!(*lookup.asked.lock().unwrap(), vec![issuer()]);
        assert_eq!(harness.stored().await.record.issuer_legal_name, None);
    }

    #[tokio::test]
    async fn test_unknown_document_is_reported() {
        let harness = Harness::new(invoice_ocr).await;
        let mut document = pending();
        document.id = DocumentId::new("acme", "ghost");

        let outcome = harness
            .orchestrator(Arc::new(RecordingLookup::default()))
            .process(&document)
            .await;

        assert!(matches!(
            outcome,
            DocumentOutcome::Failed(PipelineError::Store(StoreError::NotFound(_)))
        ));
        assert_eq!(harness.stored().await.status, DocumentStatus::Pending);
    }

    #[tokio::test]
    async fn test_finished_document_is_not_reprocessed() {
        let harness = Harness::new(invoice_ocr).await;
        let mut finished = pending();
        finished.status = DocumentStatus::Done;
        harness.documents.insert(finished.clone()).await;
        let lookup = Arc::new(RecordingLookup::default());

        let outcome = harness.orchestrator(lookup.clone()).process(&finished).await;

        assert!(matches!(
            outcome,
            DocumentOutcome::Failed(PipelineError::Store(StoreError::InvalidTransition {
                from: DocumentStatus::Done,
                ..
            }))
        ));
        assert_eq!(harness.ocr.calls.load(Ordering::SeqCst), 0);
        assert!(lookup.asked.lock().unwrap().is_empty());
        let stored = harness.stored().await;
        assert_eq!(stored.status, DocumentStatus::Done);
        assert_eq!(stored.error_message, None);
    }

    #[tokio::test]
    async fn test_document_finished_elsewhere_keeps_its_status() {
        let harness = Harness::new(invoice_ocr).await;
        let mut finished = pending();
        finished.status = DocumentStatus::Done;
        harness.documents.insert(finished).await;

        // Stale snapshot: still pending for the caller, done in the store.
        let outcome = harness
            .orchestrator(Arc::new(RecordingLookup::default()))
            .process(&pending())
            .await;

        assert!(matches!(
            outcome,
            DocumentOutcome::Failed(PipelineError::Store(StoreError::InvalidTransition { .. }))
        ));
        assert_eq!(harness.ocr.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.stored().await.status, DocumentStatus::Done);
    }
}
