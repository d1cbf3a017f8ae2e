//! Rule-based invoice parser.

use std::time::Instant;

use tracing::{debug, info};

use crate::models::invoice::{DocumentType, ParsedInvoiceRecord};

use super::rules::{
    amounts::extract_amounts, dates::extract_issue_date, document::extract_document_number,
    document::extract_document_type, rut::RutExtractor, FieldExtractor,
};

/// Result of invoice extraction.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Extracted invoice data.
    pub record: ParsedInvoiceRecord,
    /// Fields that could not be extracted or defaulted.
    pub warnings: Vec<String>,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Trait for invoice parsing.
///
/// Parsing is best-effort: a field that cannot be found is left empty and
/// reported as a warning, it never fails the whole parse.
pub trait InvoiceParser: Send + Sync {
    /// Parse invoice fields from raw document text.
    fn parse(&self, text: &str) -> ExtractionResult;
}

/// Invoice parser driven by the ordered rule tables in [`super::rules`].
pub struct RuleBasedParser {
    /// Whether to drop RUT candidates with a wrong check character.
    validate_ruts: bool,
}

impl RuleBasedParser {
    /// Create a new parser with default settings.
    pub fn new() -> Self {
        Self {
            validate_ruts: false,
        }
    }

    /// Set RUT checksum filtering for issuer/recipient candidates.
    pub fn with_rut_validation(mut self, validate: bool) -> Self {
        self.validate_ruts = validate;
        self
    }
}

impl Default for RuleBasedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceParser for RuleBasedParser {
    fn parse(&self, text: &str) -> ExtractionResult {
        let start = Instant::now();
        let mut warnings = Vec::new();

        info!("Parsing invoice from {} characters of text", text.len());

        let document_type = extract_document_type(text).unwrap_or_else(|| {
            warnings.push("Could not detect document type, assuming invoice".to_string());
            DocumentType::Invoice
        });

        let document_number = extract_document_number(text);
        if document_number.is_none() {
            warnings.push("Could not extract document number".to_string());
        }

        let issue_date = extract_issue_date(text);
        if issue_date.is_none() {
            warnings.push("Could not extract issue date".to_string());
        }

        let ruts = RutExtractor::new()
            .with_validation(self.validate_ruts)
            .extract_all(text);
        let issuer_id = ruts.first().map(|m| m.value);
        let recipient_id = ruts.get(1).map(|m| m.value);
        if issuer_id.is_none() {
            warnings.push("Could not extract issuer RUT".to_string());
        }

        let amounts = extract_amounts(text);
        for (name, found) in [
            ("net", amounts.net.is_some()),
            ("tax", amounts.tax.is_some()),
            ("total", amounts.total.is_some()),
        ] {
            if !found {
                warnings.push(format!("Could not extract {} amount", name));
            }
        }
        if let Some(total) = &amounts.total {
            debug!("Total {} matched by {}", total.value, total.rule);
        }

        let record = ParsedInvoiceRecord {
            document_type,
            document_number,
            issue_date,
            issuer_id,
            recipient_id,
            net_amount: amounts.net.map(|m| m.value),
            tax_amount: amounts.tax.map(|m| m.value),
            total_amount: amounts.total.map(|m| m.value),
            line_items: Vec::new(),
            ..Default::default()
        };

        info!(
            "Parsed {} number={:?} total={:?} ({} warnings)",
            record.document_type,
            record.document_number,
            record.total_amount,
            warnings.len()
        );

        ExtractionResult {
            record,
            warnings,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    const SAMPLE: &str = r#"
        COMERCIAL LOS ANDES SPA
        Giro: Venta al por mayor de alimentos
        R.U.T.: 76.086.428-5
        FACTURA ELECTRONICA
        N° 4521
        S.I.I. - SANTIAGO CENTRO

        Fecha Emision: 15 de marzo de 2024
        Señor(es): Juan Pérez Ltda.
        R.U.T.: 12.345.678-5

        Cant  Detalle              Precio      Total
        2     Caja de té           $ 25.000    $ 50.000
        1     Despacho             $ 50.000    $ 50.000

        MONTO NETO $ 100.000
        I.V.A. 19% $ 19.000
        TOTAL $ 119.000
    "#;

    #[test]
    fn test_parse_full_invoice() {
        let result = RuleBasedParser::new().parse(SAMPLE);
        let record = result.record;

        assert_eq!(record.document_type, DocumentType::Invoice);
        assert_eq!(record.document_number, Some(4521));
        assert_eq!(record.issue_date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(record.issuer_id.unwrap().to_string(), "76.086.428-5");
        assert_eq!(record.recipient_id.unwrap().to_string(), "12.345.678-5");
        assert_eq!(record.net_amount, Some(Decimal::from(100_000)));
        assert_eq!(record.tax_amount, Some(Decimal::from(19_000)));
        assert_eq!(record.total_amount, Some(Decimal::from(119_000)));
        assert!(record.line_items.is_empty());
        assert!(record.issuer_legal_name.is_none());
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let parser = RuleBasedParser::new();
        assert_eq!(parser.parse(SAMPLE).record, parser.parse(SAMPLE).record);
    }

    #[test]
    fn test_parse_empty_text_defaults() {
        let result = RuleBasedParser::new().parse("");
        assert_eq!(result.record, ParsedInvoiceRecord::default());
        assert_eq!(result.warnings.len(), 7);
    }

    #[test]
    fn test_rut_validation_filters_candidates() {
        let text = "RUT 12.345.678-4\nRUT 76.086.428-5";

        let lenient = RuleBasedParser::new().parse(text).record;
        assert_eq!(lenient.issuer_id.unwrap().to_string(), "12.345.678-4");

        let strict = RuleBasedParser::new().with_rut_validation(true).parse(text).record;
        assert_eq!(strict.issuer_id.unwrap().to_string(), "76.086.428-5");
        assert!(strict.recipient_id.is_none());
    }
}
