//! Common regex patterns for Chilean tax document extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // RUT: XX.XXX.XXX-X or XXXXXXXX-X
    pub static ref RUT_PATTERN: Regex = Regex::new(
        r"\b(\d{1,2}\.?\d{3}\.?\d{3}-?[\dkK])\b"
    ).unwrap();

    // Document type labels
    pub static ref ELECTRONIC_INVOICE: Regex = Regex::new(
        r"(?i)FACTURA\s+ELECTR[ÓO]NICA"
    ).unwrap();

    pub static ref ELECTRONIC_RECEIPT: Regex = Regex::new(
        r"(?i)BOLETA\s+ELECTR[ÓO]NICA"
    ).unwrap();

    pub static ref CREDIT_NOTE: Regex = Regex::new(
        r"(?i)NOTA\s+DE\s+CR[ÉE]DITO"
    ).unwrap();

    pub static ref DEBIT_NOTE: Regex = Regex::new(
        r"(?i)NOTA\s+DE\s+D[ÉE]BITO"
    ).unwrap();

    pub static ref DISPATCH_GUIDE: Regex = Regex::new(
        r"(?i)GU[ÍI]A\s+DE\s+DESPACHO"
    ).unwrap();

    pub static ref EXEMPT_INVOICE: Regex = Regex::new(
        r"(?i)FACTURA\s+(?:NO\s+AFECTA\s+O\s+)?(?:ELECTR[ÓO]NICA\s+)?EXENTA"
    ).unwrap();

    // Document number (folio)
    pub static ref DOCUMENT_NUMBER_LABELED: Regex = Regex::new(
        r"(?i)\b(?:N\s?[°º]|N[UÚ]MERO|NRO\.?|FOLIO)[:\s]*(\d+)"
    ).unwrap();

    pub static ref DOCUMENT_NUMBER_BARE: Regex = Regex::new(
        r"N[°º]\s*(\d+)"
    ).unwrap();

    // Dates
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})\b"
    ).unwrap();

    pub static ref DATE_SPANISH_LONG: Regex = Regex::new(
        r"(?i)\b(\d{1,2})\s+(?:de\s+)?(\p{L}+)\s+(?:del?\s+)?(\d{4})\b"
    ).unwrap();

    // Currency-prefixed amount: $1.234.567 or $ 1.234,56
    pub static ref CURRENCY_AMOUNT: Regex = Regex::new(
        r"\$\s*(\d[\d.]*(?:,\d{1,2})?)"
    ).unwrap();
}

/// Pattern for `<label> [rate%] [:] [$] <number>`, case-insensitive.
///
/// The label is matched literally from a word boundary and the number must
/// sit on the same line.
pub fn labeled_amount(label: &str) -> Regex {
    let pattern = format!(
        r"(?i)\b{}[ \t]*(?:\(?[ \t]*\d{{1,2}}(?:[.,]\d+)?[ \t]*%[ \t]*\)?)?[ \t]*:?[ \t]*\$?[ \t]*(\d[\d.]*(?:,\d{{1,2}})?)",
        regex::escape(label)
    );
    Regex::new(&pattern).expect("escaped label always forms a valid pattern")
}
