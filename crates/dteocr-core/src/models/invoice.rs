//! Invoice data models for Chilean tax documents (DTE).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::rut::Rut;

/// Type of tax document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    /// Factura electrónica.
    #[default]
    Invoice,
    /// Boleta electrónica.
    Receipt,
    /// Nota de crédito.
    CreditNote,
    /// Nota de débito.
    DebitNote,
    /// Guía de despacho.
    DispatchGuide,
    /// Factura exenta (no afecta o exenta de IVA).
    TaxExemptInvoice,
}

impl DocumentType {
    /// Stable machine name, as used in serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::CreditNote => "credit-note",
            DocumentType::DebitNote => "debit-note",
            DocumentType::DispatchGuide => "dispatch-guide",
            DocumentType::TaxExemptInvoice => "tax-exempt-invoice",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured data extracted from the text of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedInvoiceRecord {
    /// Detected document type.
    #[serde(default)]
    pub document_type: DocumentType,

    /// Folio (document number), always positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_number: Option<u64>,

    /// Issue date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,

    /// First RUT found in the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_id: Option<Rut>,

    /// Second RUT found in the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<Rut>,

    /// Issuer legal name (razón social), filled from the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_legal_name: Option<String>,

    /// Issuer business activity (giro).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_business_activity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_commune: Option<String>,

    /// Net amount (monto neto).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<Decimal>,

    /// Tax amount (IVA).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<Decimal>,

    /// Total amount (monto total).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,

    /// Line items. Table extraction is not implemented, so this stays empty.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl ParsedInvoiceRecord {
    /// Copy the issuer enrichment fields from a registry record.
    pub fn apply_taxpayer(&mut self, taxpayer: &super::taxpayer::TaxpayerRecord) {
        self.issuer_legal_name = Some(taxpayer.legal_name.clone());
        if taxpayer.business_activity.is_some() {
            self.issuer_business_activity = taxpayer.business_activity.clone();
        }
        if taxpayer.address.is_some() {
            self.issuer_address = taxpayer.address.clone();
        }
        if taxpayer.commune.is_some() {
            self.issuer_commune = taxpayer.commune.clone();
        }
    }

    /// Check the record invariants, returning human-readable issues.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.document_number == Some(0) {
            issues.push("Document number must be positive".to_string());
        }

        for (name, amount) in [
            ("net", self.net_amount),
            ("tax", self.tax_amount),
            ("total", self.total_amount),
        ] {
            if amount.is_some_and(|a| a.is_sign_negative() && !a.is_zero()) {
                issues.push(format!("Negative {} amount", name));
            }
        }

        if let Some(issuer) = &self.issuer_id {
            if !issuer.is_valid() {
                issues.push(format!("Issuer RUT {} fails checksum", issuer));
            }
        }

        if let (Some(net), Some(tax), Some(total)) =
            (self.net_amount, self.tax_amount, self.total_amount)
        {
            if net + tax != total {
                issues.push(format!(
                    "Net ({}) plus tax ({}) differs from total ({})",
                    net, tax, total
                ));
            }
        }

        issues
    }
}

/// A single line item. Reserved for table extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product/service description.
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

/// Processing status of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Error,
}

impl DocumentStatus {
    /// Whether the pipeline may move a document from `self` to `next`.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Pending, DocumentStatus::Processing)
                | (DocumentStatus::Processing, DocumentStatus::Done)
                | (DocumentStatus::Processing, DocumentStatus::Error)
                | (DocumentStatus::Pending, DocumentStatus::Error)
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Done => "done",
            DocumentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Identity of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId {
    /// Owning account (company).
    pub account_id: String,
    /// Document key within the account.
    pub document_id: String,
}

impl DocumentId {
    pub fn new(account_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            document_id: document_id.into(),
        }
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account_id, self.document_id)
    }
}

/// A scanned invoice tracked by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    #[serde(flatten)]
    pub id: DocumentId,

    #[serde(default)]
    pub status: DocumentStatus,

    /// Opaque locator resolved by the blob store.
    pub image_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    /// OCR confidence (0.0 - 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,

    /// Set only when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Time of the last status change made by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// Extracted fields, present once processing succeeded.
    #[serde(flatten)]
    pub record: ParsedInvoiceRecord,
}

impl InvoiceDocument {
    /// Create a new pending document.
    pub fn pending(id: DocumentId, image_ref: impl Into<String>) -> Self {
        Self {
            id,
            status: DocumentStatus::Pending,
            image_ref: image_ref.into(),
            raw_text: None,
            ocr_confidence: None,
            error_message: None,
            processed_at: None,
            record: ParsedInvoiceRecord::default(),
        }
    }

    /// Merge the result of a successful extraction.
    pub fn apply_fields(&mut self, fields: &ExtractedFields) {
        self.raw_text = Some(fields.raw_text.clone());
        self.ocr_confidence = Some(fields.ocr_confidence);
        self.record = fields.record.clone();
    }

    /// Apply a status change. The error message is kept only for `error`.
    ///
    /// Transitions the pipeline never makes, including any move out of
    /// `done` or `error`, are rejected and leave the document untouched.
    pub fn apply_status(
        &mut self,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        if !self.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: self.id.to_string(),
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.processed_at = Some(Utc::now());
        self.error_message = match status {
            DocumentStatus::Error => error_message.map(str::to_string),
            _ => None,
        };
        Ok(())
    }
}

/// Fields written back to the document store after extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub raw_text: String,
    pub ocr_confidence: f32,
    #[serde(flatten)]
    pub record: ParsedInvoiceRecord,
}
