//! Date extraction for Chilean tax documents.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Captures;

use super::patterns::{DATE_DMY, DATE_SPANISH_LONG};
use super::{ExtractionMatch, FieldExtractor, Rule};

/// Spanish month names. Matching uses the first three letters.
const SPANISH_MONTHS: [(&str, u32); 13] = [
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

lazy_static! {
    /// Date formats, in priority order.
    static ref DATE_RULES: Vec<Rule<NaiveDate>> = vec![
        Rule::new("date-numeric", DATE_DMY.clone(), numeric_date, 0.9),
        Rule::new("date-spanish", DATE_SPANISH_LONG.clone(), spanish_date, 0.95),
    ];
}

/// Date field extractor.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    /// First date of the highest-priority format present in the text.
    fn extract(&self, text: &str) -> Option<Self::Output> {
        super::first_match(&DATE_RULES[..], text)
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        for rule in DATE_RULES.iter() {
            for caps in rule.pattern.captures_iter(text) {
                let Some(date) = (rule.normalize)(&caps) else {
                    continue;
                };
                if results.iter().any(|r| r.value == date) {
                    continue;
                }
                let full_match = &caps[0];
                let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
                results.push(
                    ExtractionMatch::new(date, rule.confidence, full_match)
                        .with_position(start, start + full_match.len())
                        .with_rule(rule.name),
                );
            }
        }

        results
    }
}

/// Extract the issue date: the first valid date of the first format that has one.
pub fn extract_issue_date(text: &str) -> Option<NaiveDate> {
    DateExtractor::new().extract(text).map(|m| m.value)
}

fn numeric_date(caps: &Captures<'_>) -> Option<NaiveDate> {
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year = parse_year(&caps[3])?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn spanish_date(caps: &Captures<'_>) -> Option<NaiveDate> {
    let day: u32 = caps[1].parse().ok()?;
    let month = spanish_month_to_number(&caps[2])?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Two-digit years are read as 20YY.
fn parse_year(s: &str) -> Option<i32> {
    if s.len() == 2 {
        format!("20{}", s).parse().ok()
    } else {
        s.parse().ok()
    }
}

fn spanish_month_to_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let prefix: String = lower.chars().take(3).collect();
    if prefix.chars().count() < 3 {
        return None;
    }

    SPANISH_MONTHS
        .iter()
        .find(|(month, _)| month.starts_with(&prefix))
        .map(|(_, number)| *number)
}
