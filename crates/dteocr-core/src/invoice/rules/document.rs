//! Document type and document number (folio) rules.

use lazy_static::lazy_static;
use regex::Captures;
use tracing::debug;

use super::patterns::{
    CREDIT_NOTE, DEBIT_NOTE, DISPATCH_GUIDE, DOCUMENT_NUMBER_BARE, DOCUMENT_NUMBER_LABELED,
    ELECTRONIC_INVOICE, ELECTRONIC_RECEIPT, EXEMPT_INVOICE,
};
use super::{first_match, Rule};
use crate::models::invoice::DocumentType;

lazy_static! {
    /// Document type labels, in priority order.
    static ref DOCUMENT_TYPE_RULES: Vec<(DocumentType, &'static regex::Regex)> = vec![
        (DocumentType::Invoice, &*ELECTRONIC_INVOICE),
        (DocumentType::Receipt, &*ELECTRONIC_RECEIPT),
        (DocumentType::CreditNote, &*CREDIT_NOTE),
        (DocumentType::DebitNote, &*DEBIT_NOTE),
        (DocumentType::DispatchGuide, &*DISPATCH_GUIDE),
        (DocumentType::TaxExemptInvoice, &*EXEMPT_INVOICE),
    ];

    static ref DOCUMENT_NUMBER_RULES: Vec<Rule<u64>> = vec![
        Rule::new("number-labeled", DOCUMENT_NUMBER_LABELED.clone(), positive_number, 0.9),
        Rule::new("number-bare", DOCUMENT_NUMBER_BARE.clone(), positive_number, 0.7),
    ];
}

fn positive_number(caps: &Captures<'_>) -> Option<u64> {
    caps[1].parse::<u64>().ok().filter(|n| *n > 0)
}

/// Detect the document type. Falls back to [`DocumentType::Invoice`].
pub fn extract_document_type(text: &str) -> Option<DocumentType> {
    let found = DOCUMENT_TYPE_RULES
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(doc_type, _)| *doc_type);

    if let Some(doc_type) = found {
        debug!("Detected document type: {}", doc_type);
    }

    found
}

/// Extract the document number (folio).
pub fn extract_document_number(text: &str) -> Option<u64> {
    first_match(&DOCUMENT_NUMBER_RULES[..], text).map(|m| {
        debug!("Document number {} matched by {}", m.value, m.rule);
        m.value
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_document_types() {
        let cases = [
            ("FACTURA ELECTRONICA N° 123", DocumentType::Invoice),
            ("Boleta Electrónica", DocumentType::Receipt),
            ("NOTA DE CRÉDITO ELECTRÓNICA", DocumentType::CreditNote),
            ("nota de debito", DocumentType::DebitNote),
            ("GUÍA DE DESPACHO ELECTRÓNICA", DocumentType::DispatchGuide),
            ("FACTURA NO AFECTA O EXENTA ELECTRONICA", DocumentType::TaxExemptInvoice),
            ("FACTURA EXENTA", DocumentType::TaxExemptInvoice),
        ];

        for (text, expected) in cases {
            assert_eq!(extract_document_type(text), Some(expected), "{}", text);
        }
    }

    #[test]
    fn test_document_type_priority() {
        // Electronic invoice is listed first and shadows the exempt wording.
        assert_eq!(
            extract_document_type("FACTURA ELECTRÓNICA EXENTA"),
            Some(DocumentType::Invoice)
        );
        assert_eq!(extract_document_type("Comprobante de pago"), None);
    }

    #[test]
    fn test_document_number_labeled() {
        assert_eq!(extract_document_number("FACTURA ELECTRONICA N° 4521"), Some(4521));
        assert_eq!(extract_document_number("Nº:000789"), Some(789));
        assert_eq!(extract_document_number("Número: 55"), Some(55));
        assert_eq!(extract_document_number("FOLIO 10234"), Some(10234));
    }

    #[test]
    fn test_document_number_bare_fallback() {
        assert_eq!(extract_document_number("DOCN°77 emitido"), Some(77));
    }

    #[test]
    fn test_document_number_absent_or_unparsable() {
        assert_eq!(extract_document_number("sin folio visible"), None);
        assert_eq!(extract_document_number("N° 0"), None);
        assert_eq!(extract_document_number("N° 99999999999999999999999"), None);
    }
}
