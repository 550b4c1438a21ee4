//! Fixed-width hexadecimal identifier algebra used both for node addresses
//! and content keys.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum IdentifierError {
    #[error("identifier `{value}` has length {actual}, expected width {expected}")]
    WrongWidth {
        value: String,
        expected: usize,
        actual: usize,
    },
    #[error("identifier `{0}` contains a non-hexadecimal digit")]
    NotHex(String),
}

/// A fixed-width, lowercase hexadecimal identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    digits: String,
}

impl Identifier {
    pub fn new(value: impl Into<String>, width: usize) -> Result<Self, IdentifierError> {
        let digits = value.into();
        if digits.len() != width {
            return Err(IdentifierError::WrongWidth {
                actual: digits.len(),
                expected: width,
                value: digits,
            });
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdentifierError::NotHex(digits));
        }
        Ok(Self {
            digits: digits.to_ascii_lowercase(),
        })
    }

    pub fn width(&self) -> usize {
        self.digits.len()
    }

    pub fn as_str(&self) -> &str {
        &self.digits
    }

    /// The hex digit at position `i`, as its numeric value `0..16`.
    pub fn digit_value(&self, i: usize) -> u8 {
        self.digits.as_bytes()[i]
            .to_ascii_lowercase()
            .wrapping_sub(if self.digits.as_bytes()[i].is_ascii_digit() {
                b'0'
            } else {
                b'a' - 10
            })
    }

    /// The identifier's value as an unsigned integer, for ring-distance math.
    pub fn numeric(&self) -> u64 {
        u64::from_str_radix(&self.digits, 16).expect("validated hex on construction")
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.digits)
    }
}

/// Number of leading hex digits where `a` and `b` agree, `0..=D`.
pub fn common_prefix_length(a: &Identifier, b: &Identifier) -> usize {
    a.digits
        .as_bytes()
        .iter()
        .zip(b.digits.as_bytes().iter())
        .take_while(|(x, y)| x == y)
        .count()
}

/// The index of the first differing digit (or `D` if the identifiers are
/// equal) paired with the plain (non-wrapped) numeric distance `|a - b|`.
pub fn first_diff(a: &Identifier, b: &Identifier) -> (usize, u64) {
    let i = common_prefix_length(a, b);
    let delta = a.numeric().abs_diff(b.numeric());
    (i, delta)
}

/// Lexicographic comparison of two fixed-width hex strings: `a >= b`.
pub fn hex_greater_or_equal(a: &Identifier, b: &Identifier) -> bool {
    a.digits >= b.digits
}

/// Deterministic hash of an arbitrary UTF-8 string to an identifier of the
/// given width, truncating a SHA-1 digest to its leading hex digits.
pub fn hash_key(s: &str, width: usize) -> Identifier {
    let mut hasher = Sha1::new();
    hasher.update(s.as_bytes());
    let digest = hasher.finalize();
    let full_hex = hex::encode(digest);
    let truncated: String = full_hex.chars().take(width).collect();
    Identifier::new(truncated, width).expect("sha1 hex digest is always valid hex")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> Identifier {
        Identifier::new(s, 4).unwrap()
    }

    #[test]
    fn rejects_wrong_width() {
        assert_eq!(
            Identifier::new("abc", 4).unwrap_err(),
            IdentifierError::WrongWidth {
                value: "abc".into(),
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn rejects_non_hex() {
        assert!(matches!(
            Identifier::new("zzzz", 4).unwrap_err(),
            IdentifierError::NotHex(_)
        ));
    }

    #[test]
    fn common_prefix_length_counts_leading_agreement() {
        assert_eq!(common_prefix_length(&id("4b19"), &id("4b2a")), 2);
        assert_eq!(common_prefix_length(&id("4b19"), &id("4b19")), 4);
        assert_eq!(common_prefix_length(&id("1111"), &id("2222")), 0);
    }

    #[test]
    fn first_diff_reports_index_and_plain_distance() {
        let (i, delta) = first_diff(&id("c0ff"), &id("a3f1"));
        assert_eq!(i, 0);
        assert_eq!(delta, id("c0ff").numeric().abs_diff(id("a3f1").numeric()));
    }

    #[test]
    fn first_diff_of_equal_identifiers_is_full_width_and_zero() {
        assert_eq!(first_diff(&id("4b19"), &id("4b19")), (4, 0));
    }

    #[test]
    fn hex_greater_or_equal_is_lexicographic() {
        assert!(hex_greater_or_equal(&id("a3f1"), &id("4b19")));
        assert!(hex_greater_or_equal(&id("4b19"), &id("4b19")));
        assert!(!hex_greater_or_equal(&id("4b19"), &id("a3f1")));
    }

    #[test]
    fn hash_key_is_deterministic_and_fits_width() {
        let a = hash_key("XX", 4);
        let b = hash_key("XX", 4);
        assert_eq!(a, b);
        assert_eq!(a.width(), 4);
    }

    #[test]
    fn hash_key_differs_across_inputs_with_overwhelming_probability() {
        assert_ne!(hash_key("Italy", 4), hash_key("Ethiopia", 4));
    }
}
