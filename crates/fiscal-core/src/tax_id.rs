//! # Tax ID Validation
//!
//! National taxpayer identifier: a 7–8 digit body plus a modulo-11 check
//! character (`0`–`9` or `K`).
//!
//! ## Check Character Algorithm
//! ```text
//! body:        1  2  3  4  5  6  7  8
//! multiplier:  3  2  7  6  5  4  3  2   ◄── right-to-left, cycling 2..7
//! sum = Σ digit × multiplier = 138
//! 11 - (138 mod 11) = 5          11 ──► '0'
//! check = '5'                     10 ──► 'K'
//!
//! canonical format: 12.345.678-5
//! ```
//!
//! Every function here fails closed: malformed input yields `false` or
//! `None`, never a panic.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::error::ValidationError;

/// Shortest accepted cleaned length (7-digit body + check char).
const MIN_LEN: usize = 8;
/// Longest accepted cleaned length (8-digit body + check char).
const MAX_LEN: usize = 9;

// =============================================================================
// TaxId
// =============================================================================

/// A tax ID whose check character has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaxId {
    body: String,
    check: char,
}

impl TaxId {
    /// Parses and verifies a tax ID in any common punctuation.
    ///
    /// ## Example
    /// ```rust
    /// use fiscal_core::tax_id::TaxId;
    ///
    /// let id = TaxId::parse("12345678-5").unwrap();
    /// assert_eq!(id.to_string(), "12.345.678-5");
    /// assert!(TaxId::parse("12.345.678-6").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<TaxId, ValidationError> {
        let cleaned = clean(input);
        if cleaned.len() < MIN_LEN || cleaned.len() > MAX_LEN {
            return Err(ValidationError::invalid(
                "tax_id",
                format!("expected {MIN_LEN}-{MAX_LEN} characters, got {}", cleaned.len()),
            ));
        }

        let (body, check) = cleaned.split_at(cleaned.len() - 1);
        let expected = check_char(body)
            .ok_or_else(|| ValidationError::invalid("tax_id", "body must be digits"))?;
        let supplied = check.chars().next().unwrap_or_default();

        if supplied != expected {
            return Err(ValidationError::invalid(
                "tax_id",
                format!("check character {supplied} does not match"),
            ));
        }

        Ok(TaxId {
            body: body.to_string(),
            check: expected,
        })
    }

    /// Body digits and check char without separators: `12345678-5`.
    pub fn compact(&self) -> String {
        format!("{}-{}", self.body, self.check)
    }

    pub fn check(&self) -> char {
        self.check
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits: Vec<char> = self.body.chars().collect();
        let mut grouped = String::with_capacity(digits.len() + 3);
        for (i, digit) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(*digit);
        }
        write!(f, "{}-{}", grouped, self.check)
    }
}

// =============================================================================
// Free Functions
// =============================================================================

/// Strips separators and upper-cases the check character.
pub fn clean(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Computes the expected check character for a digit body.
///
/// Returns `None` when the body is empty or contains non-digits.
pub fn check_char(body: &str) -> Option<char> {
    if body.is_empty() {
        return None;
    }

    let mut sum: u32 = 0;
    let mut multiplier: u32 = 2;
    for c in body.chars().rev() {
        sum += c.to_digit(10)? * multiplier;
        multiplier = if multiplier == 7 { 2 } else { multiplier + 1 };
    }

    match 11 - (sum % 11) {
        11 => Some('0'),
        10 => Some('K'),
        n => char::from_digit(n, 10),
    }
}

/// Whether `input` is a valid tax ID.
pub fn is_valid(input: &str) -> bool {
    TaxId::parse(input).is_ok()
}

/// Canonical dotted format, or `None` when invalid.
pub fn format(input: &str) -> Option<String> {
    TaxId::parse(input).ok().map(|id| id.to_string())
}

/// Finds the first `NNNNNNN(N)-C` shaped token in free text.
///
/// The match is only a candidate; callers still validate it.
pub fn find_candidate(text: &str) -> Option<&str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"\d{7,8}-[\dKk]").expect("tax id pattern is a valid regex")
    });
    pattern.find(text).map(|m| m.as_str())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_valid_ids() {
        for id in [
            "11.111.111-1",
            "12345678-5",
            "7654321-6",
            "76.086.428-5",
            "20000000-5",
            "15800000-8",
        ] {
            assert!(is_valid(id), "{id} should be valid");
        }
    }

    #[test]
    fn test_check_char_k_case_insensitive() {
        assert!(is_valid("12.345.670-K"));
        assert!(is_valid("12345670-k"));
        assert!(is_valid("1000005-K"));
        assert_eq!(check_char("6000000"), Some('K'));
    }

    #[test]
    fn test_check_char_zero() {
        assert!(is_valid("10.000.004-0"));
        assert!(is_valid("1000013-0"));
        assert_eq!(check_char("10000018"), Some('0'));
    }

    #[test]
    fn test_known_invalid_ids() {
        assert!(!is_valid("12.345.678-6"));
        assert!(!is_valid("12345670-0"));
        assert!(!is_valid("10000004-K"));
    }

    #[test]
    fn test_fails_closed_on_bad_shape() {
        assert!(!is_valid(""));
        assert!(!is_valid("-"));
        assert!(!is_valid("123456-0"));
        assert!(!is_valid("1234567890-1"));
        assert!(!is_valid("1234A678-5"));
        assert!(!is_valid("ñandú"));
    }

    #[test]
    fn test_format_inserts_separators() {
        assert_eq!(format("123456785").as_deref(), Some("12.345.678-5"));
        assert_eq!(format("7654321-6").as_deref(), Some("7.654.321-6"));
        assert_eq!(format("12345670k").as_deref(), Some("12.345.670-K"));
        assert_eq!(format("12345678-6"), None);
    }

    #[test]
    fn test_formatted_output_revalidates() {
        for id in ["12345678-5", "1000005-k", "10000004-0", "7654321-6"] {
            let formatted = format(id).unwrap();
            assert!(is_valid(&formatted), "{formatted} should re-validate");
            assert_eq!(format(&formatted).unwrap(), formatted);
        }
    }

    #[test]
    fn test_compact() {
        let id = TaxId::parse("12.345.670-k").unwrap();
        assert_eq!(id.compact(), "12345670-K");
        assert_eq!(id.check(), 'K');
    }

    #[test]
    fn test_find_candidate() {
        assert_eq!(
            find_candidate("Comercial Andes SpA 76086428-5"),
            Some("76086428-5")
        );
        assert_eq!(find_candidate("RUT 12345670-k giro"), Some("12345670-k"));
        assert_eq!(find_candidate("12.345.678-5"), None);
        assert_eq!(find_candidate("no id here"), None);
    }
}
