//! RUT extraction from document text.

use super::patterns::RUT_PATTERN;
use super::{ExtractionMatch, FieldExtractor};
use crate::rut::Rut;

/// RUT field extractor.
///
/// Collects every RUT-shaped substring in text order. Checksum filtering is
/// off by default: the pipeline validates the issuer on its own.
pub struct RutExtractor {
    validate: bool,
}

impl RutExtractor {
    /// Create a new RUT extractor.
    pub fn new() -> Self {
        Self { validate: false }
    }

    /// Set whether to drop candidates with a wrong check character.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

impl Default for RutExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for RutExtractor {
    type Output = ExtractionMatch<Rut>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        RUT_PATTERN
            .find_iter(text)
            .filter_map(|m| {
                let rut = Rut::parse(m.as_str())?;
                if self.validate && !rut.is_valid() {
                    return None;
                }
                let confidence = if rut.is_valid() { 0.95 } else { 0.5 };
                Some(
                    ExtractionMatch::new(rut, confidence, m.as_str())
                        .with_position(m.start(), m.end())
                        .with_rule("rut"),
                )
            })
            .collect()
    }
}

/// Extract all RUTs from text, in order of appearance.
pub fn extract_ruts(text: &str) -> Vec<Rut> {
    RutExtractor::new()
        .extract_all(text)
        .into_iter()
        .map(|m| m.value)
        .collect()
}
