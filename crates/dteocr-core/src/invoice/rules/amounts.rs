//! Amount extraction for Chilean tax documents.

use lazy_static::lazy_static;
use regex::Captures;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{labeled_amount, CURRENCY_AMOUNT};
use super::{first_match, ExtractionMatch, FieldExtractor, Rule};

/// Which summary amount to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountKind {
    /// Monto neto.
    Net,
    /// IVA.
    Tax,
    /// Monto total.
    Total,
}

impl AmountKind {
    /// Label synonyms, in priority order.
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            AmountKind::Total => &["total", "monto total", "total a pagar"],
            AmountKind::Net => &["neto", "monto neto", "subtotal"],
            AmountKind::Tax => &["iva", "i.v.a.", "impuesto"],
        }
    }
}

lazy_static! {
    static ref TOTAL_RULES: Vec<Rule<Decimal>> = label_rules(AmountKind::Total);
    static ref NET_RULES: Vec<Rule<Decimal>> = label_rules(AmountKind::Net);
    static ref TAX_RULES: Vec<Rule<Decimal>> = label_rules(AmountKind::Tax);
}

fn label_rules(kind: AmountKind) -> Vec<Rule<Decimal>> {
    kind.labels()
        .iter()
        .map(|&label| Rule::new(label, labeled_amount(label), captured_amount, 0.95))
        .collect()
}

fn captured_amount(caps: &Captures<'_>) -> Option<Decimal> {
    parse_clp_amount(&caps[1])
}

/// Currency-prefixed amount extractor (`$1.234.567`).
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        CURRENCY_AMOUNT
            .captures_iter(text)
            .filter_map(|caps| {
                let amount = parse_clp_amount(&caps[1])?;
                let full_match = caps.get(0)?;
                Some(
                    ExtractionMatch::new(amount, 0.6, full_match.as_str())
                        .with_position(full_match.start(), full_match.end())
                        .with_rule("currency"),
                )
            })
            .collect()
    }
}

/// Extracted summary amounts from a document.
#[derive(Debug, Clone, Default)]
pub struct InvoiceAmounts {
    pub net: Option<ExtractionMatch<Decimal>>,
    pub tax: Option<ExtractionMatch<Decimal>>,
    pub total: Option<ExtractionMatch<Decimal>>,
}

/// Extract one labeled amount.
///
/// Only [`AmountKind::Total`] falls back to the largest currency-prefixed
/// number in the text when no label matches.
pub fn extract_amount(text: &str, kind: AmountKind) -> Option<ExtractionMatch<Decimal>> {
    let rules: &[Rule<Decimal>] = match kind {
        AmountKind::Total => &TOTAL_RULES[..],
        AmountKind::Net => &NET_RULES[..],
        AmountKind::Tax => &TAX_RULES[..],
    };

    if let Some(found) = first_match(rules, text) {
        return Some(found);
    }

    if kind == AmountKind::Total {
        // Largest figure on the document is assumed to be the grand total.
        return AmountExtractor::new()
            .extract_all(text)
            .into_iter()
            .max_by(|a, b| a.value.cmp(&b.value))
            .map(|m| m.with_rule("largest-amount"));
    }

    None
}

/// Extract net, tax and total amounts from document text.
pub fn extract_amounts(text: &str) -> InvoiceAmounts {
    InvoiceAmounts {
        net: extract_amount(text, AmountKind::Net),
        tax: extract_amount(text, AmountKind::Tax),
        total: extract_amount(text, AmountKind::Total),
    }
}

/// Parse a Chilean-formatted amount: `.` groups thousands, `,` marks decimals.
pub fn parse_clp_amount(s: &str) -> Option<Decimal> {
    let normalized = s.trim().replace('.', "").replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    Decimal::from_str(&normalized).ok()
}
