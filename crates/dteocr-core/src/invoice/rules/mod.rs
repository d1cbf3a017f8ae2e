//! Rule-based field extractors for Chilean tax documents.

pub mod amounts;
pub mod dates;
pub mod document;
pub mod patterns;
pub mod rut;

pub use amounts::{extract_amounts, parse_clp_amount, AmountExtractor, AmountKind, InvoiceAmounts};
pub use dates::{extract_issue_date, DateExtractor};
pub use document::{extract_document_number, extract_document_type};
pub use rut::{extract_ruts, RutExtractor};

use regex::{Captures, Regex};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// Extraction context with confidence scores.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Position in source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
    /// Name of the rule that produced the value.
    pub rule: &'static str,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
            rule: "",
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }

    pub fn with_rule(mut self, rule: &'static str) -> Self {
        self.rule = rule;
        self
    }
}

/// One entry of an ordered rule table: a pattern plus the normalizer that
/// turns its captures into a value.
///
/// Tables are evaluated in order; the position in the table is the priority.
pub struct Rule<T> {
    /// Rule name, reported in matches and debug logs.
    pub name: &'static str,
    /// Pattern searched in the text.
    pub pattern: Regex,
    /// Turns a match into a value; `None` skips the candidate.
    pub normalize: fn(&Captures<'_>) -> Option<T>,
    /// Confidence assigned to values produced by this rule.
    pub confidence: f32,
}

impl<T> Rule<T> {
    pub fn new(
        name: &'static str,
        pattern: Regex,
        normalize: fn(&Captures<'_>) -> Option<T>,
        confidence: f32,
    ) -> Self {
        Self {
            name,
            pattern,
            normalize,
            confidence,
        }
    }

    /// First match in text order whose captures normalize to a value.
    pub fn find(&self, text: &str) -> Option<ExtractionMatch<T>> {
        self.pattern.captures_iter(text).find_map(|caps| {
            let value = (self.normalize)(&caps)?;
            let full = caps.get(0)?;
            Some(
                ExtractionMatch::new(value, self.confidence, full.as_str())
                    .with_position(full.start(), full.end())
                    .with_rule(self.name),
            )
        })
    }
}

/// Apply an ordered rule table; the first rule producing a value wins.
pub fn first_match<T>(rules: &[Rule<T>], text: &str) -> Option<ExtractionMatch<T>> {
    rules.iter().find_map(|rule| rule.find(text))
}
