//! RUT (Chilean taxpayer identifier) parsing, validation and formatting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A structurally well-formed RUT: numeric body plus check character.
///
/// Parsing only checks the shape. Use [`Rut::is_valid`] for the mod-11
/// checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rut {
    body: u32,
    check: char,
}

impl Rut {
    /// Parse a RUT, ignoring `.`, `-` and whitespace separators.
    pub fn parse(input: &str) -> Option<Self> {
        let cleaned: String = input
            .chars()
            .filter(|c| !matches!(*c, '.' | '-') && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        let check = cleaned.chars().last()?;
        if !(check.is_ascii_digit() || check == 'K') {
            return None;
        }

        let digits = &cleaned[..cleaned.len() - 1];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let body = digits.parse().ok()?;
        Some(Self { body, check })
    }

    /// Build a RUT from its body, computing the check character.
    pub fn from_body(body: u32) -> Self {
        Self {
            body,
            check: check_digit(body),
        }
    }

    /// Numeric body.
    pub fn body(&self) -> u32 {
        self.body
    }

    /// Check character (`0`-`9` or `K`).
    pub fn check(&self) -> char {
        self.check
    }

    /// Whether the check character matches the body.
    pub fn is_valid(&self) -> bool {
        check_digit(self.body) == self.check
    }
}

impl fmt::Display for Rut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.body.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }

        write!(f, "{}-{}", grouped, self.check)
    }
}

impl FromStr for Rut {
    type Err = InvalidRut;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rut::parse(s).ok_or_else(|| InvalidRut(s.to_string()))
    }
}

/// Returned when a string is not shaped like a RUT.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed RUT: {0:?}")]
pub struct InvalidRut(pub String);

impl Serialize for Rut {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rut {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute the mod-11 check character for a RUT body.
///
/// Digits are weighted 2, 3, 4, 5, 6, 7, 2, 3, ... starting from the least
/// significant one. An expected value of 11 maps to `0` and 10 maps to `K`.
pub fn check_digit(body: u32) -> char {
    let mut remaining = body;
    let mut weight = 2;
    let mut sum = 0;

    loop {
        sum += (remaining % 10) * weight;
        weight = if weight == 7 { 2 } else { weight + 1 };
        remaining /= 10;
        if remaining == 0 {
            break;
        }
    }

    match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        n => char::from_digit(n, 10).unwrap_or('0'),
    }
}

/// Validate a RUT given in any common notation.
pub fn validate_rut(rut: &str) -> bool {
    Rut::parse(rut).is_some_and(|r| r.is_valid())
}

/// Format a RUT as `XX.XXX.XXX-X`, or `None` if it is malformed.
pub fn format_rut(rut: &str) -> Option<String> {
    Rut::parse(rut).map(|r| r.to_string())
}
