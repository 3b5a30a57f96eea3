//! Namespace identifier validation
//!
//! Namespaces end up inside the session search path, so the grammar here is
//! the only thing standing between the namespace parameter and SQL text.
//! Accepted values are one lowercase ASCII letter followed by lowercase
//! ASCII letters, digits or underscores, at most [`MAX_NAMESPACE_LEN`]
//! bytes. Nothing in that alphabet can close a literal, end a statement or
//! start a comment.

use serde::Serialize;
use std::fmt;

/// PostgreSQL truncates identifiers beyond 63 bytes
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Why a namespace was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidIdentifier {
    Empty,
    TooLong { len: usize },
    BadFirstChar { found: char },
    BadChar { found: char, position: usize },
}

impl fmt::Display for InvalidIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidIdentifier::Empty => write!(f, "namespace cannot be empty"),
            InvalidIdentifier::TooLong { len } => write!(
                f,
                "namespace is {} characters long (max {})",
                len, MAX_NAMESPACE_LEN
            ),
            InvalidIdentifier::BadFirstChar { found } => write!(
                f,
                "namespace must start with a lowercase letter, found {:?}",
                found
            ),
            InvalidIdentifier::BadChar { found, position } => write!(
                f,
                "character {:?} at position {} is not allowed (use a-z, 0-9, _)",
                found, position
            ),
        }
    }
}

impl std::error::Error for InvalidIdentifier {}

/// A namespace that passed [`validate_namespace`].
///
/// There is no other constructor, so holding a `Namespace` means the value
/// is safe to place into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// The `public` schema
    pub fn public() -> Self {
        Namespace("public".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Namespace {
    type Error = InvalidIdentifier;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_namespace(value)
    }
}

/// Validate a namespace against the identifier grammar
pub fn validate_namespace(name: &str) -> Result<Namespace, InvalidIdentifier> {
    let mut chars = name.chars();

    let first = chars.next().ok_or(InvalidIdentifier::Empty)?;
    if !first.is_ascii_lowercase() {
        return Err(InvalidIdentifier::BadFirstChar { found: first });
    }

    for (offset, c) in chars.enumerate() {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(InvalidIdentifier::BadChar {
                found: c,
                position: offset + 1,
            });
        }
    }

    // Every accepted char is one byte, so len() is the character count
    if name.len() > MAX_NAMESPACE_LEN {
        return Err(InvalidIdentifier::TooLong { len: name.len() });
    }

    Ok(Namespace(name.to_string()))
}

/// Search path value for a tenant: the namespace first, then the fallback
pub fn search_path(namespace: &Namespace, fallback: &Namespace) -> String {
    format!("{}, {}", namespace, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_assignment_schemas() {
        for name in [
            "asgn_high_salary",
            "asgn_dept_count",
            "asgn_order_value",
            "asgn_highest_paid",
            "a",
            "public",
            "t1_2_3",
        ] {
            assert!(validate_namespace(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_rejects_injection_attempts() {
        let attempts = [
            "bad;name",
            "public; DROP TABLE employees",
            "asgn'--",
            "asgn\"x",
            "asgn high",
            "asgn.employees",
            "asgn\n",
            "asgn/*x*/",
        ];

        for name in attempts {
            assert!(validate_namespace(name).is_err(), "{:?} should be rejected", name);
        }
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(validate_namespace(""), Err(InvalidIdentifier::Empty));
        assert_eq!(
            validate_namespace("1asgn"),
            Err(InvalidIdentifier::BadFirstChar { found: '1' })
        );
        assert_eq!(
            validate_namespace("_asgn"),
            Err(InvalidIdentifier::BadFirstChar { found: '_' })
        );
        assert_eq!(
            validate_namespace("Asgn"),
            Err(InvalidIdentifier::BadFirstChar { found: 'A' })
        );
        assert_eq!(
            validate_namespace("bad;name"),
            Err(InvalidIdentifier::BadChar {
                found: ';',
                position: 3
            })
        );
    }

    #[test]
    fn test_length_limit() {
        let max = "a".repeat(MAX_NAMESPACE_LEN);
        assert!(validate_namespace(&max).is_ok());

        let too_long = "a".repeat(MAX_NAMESPACE_LEN + 1);
        assert_eq!(
            validate_namespace(&too_long),
            Err(InvalidIdentifier::TooLong {
                len: MAX_NAMESPACE_LEN + 1
            })
        );
    }

    #[test]
    fn test_non_ascii_letters_rejected() {
        assert!(validate_namespace("asgné").is_err());
        assert!(validate_namespace("ａsgn").is_err());
    }

    #[test]
    fn test_search_path_value() {
        let ns = validate_namespace("asgn_high_salary").unwrap();
        let fallback = validate_namespace("public").unwrap();
        assert_eq!(search_path(&ns, &fallback), "asgn_high_salary, public");
    }
}
