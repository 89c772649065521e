//! Labels, identifiers and the identifier normalizer.
//!
//! A [`ParameterLabel`] is whatever the author wrote in the source document.
//! A [`ParameterIdentifier`] is what ends up as an XML element name and as the
//! value column of the registry. The only way to turn an arbitrary string into
//! an identifier is [`normalize`], which is total: it never fails and never
//! returns an empty string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix used when a normalized candidate is empty, starts with a digit, or
/// starts with the XML-reserved `xml` prefix.
pub const PLACEHOLDER_PREFIX: &str = "param";

const SEPARATOR: char = '_';

// ============================================================================
// Labels
// ============================================================================

/// The original, untranslated parameter text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterLabel(String);

impl ParameterLabel {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty or whitespace-only labels cannot be resolved.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ParameterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParameterLabel {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ParameterLabel {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// A legal output identifier: `[A-Za-z_][A-Za-z0-9_]*`, not starting with `xml`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParameterIdentifier(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier {0:?} starts with a digit")]
    LeadingDigit(String),
    #[error("identifier {0:?} contains characters outside [A-Za-z0-9_]")]
    IllegalCharacter(String),
    #[error("identifier {0:?} starts with the reserved prefix `xml`")]
    ReservedPrefix(String),
}

impl ParameterIdentifier {
    /// Validate an already-normalized string.
    pub fn parse(s: impl Into<String>) -> Result<Self, IdentifierError> {
        let s = s.into();
        let Some(first) = s.chars().next() else {
            return Err(IdentifierError::Empty);
        };
        if first.is_ascii_digit() {
            return Err(IdentifierError::LeadingDigit(s));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == SEPARATOR) {
            return Err(IdentifierError::IllegalCharacter(s));
        }
        if has_reserved_prefix(&s) {
            return Err(IdentifierError::ReservedPrefix(s));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `name` -> `name_<n>`; still a legal identifier for any `n`.
    pub fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}{SEPARATOR}{n}", self.0))
    }
}

impl fmt::Display for ParameterIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ParameterIdentifier {
    type Error = IdentifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<ParameterIdentifier> for String {
    fn from(id: ParameterIdentifier) -> Self {
        id.0
    }
}

impl AsRef<str> for ParameterIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn has_reserved_prefix(s: &str) -> bool {
    s.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("xml"))
}

// ============================================================================
// Normalizer
// ============================================================================

/// Turn an arbitrary candidate into a legal identifier.
///
/// - ASCII letters are lower-cased
/// - every character outside `[a-z0-9_]` becomes `_`
/// - runs of `_` collapse to one, leading/trailing `_` are trimmed
/// - an empty result becomes [`PLACEHOLDER_PREFIX`]
/// - a result starting with a digit or `xml` gets `PLACEHOLDER_PREFIX_` prepended
pub fn normalize(candidate: &str) -> ParameterIdentifier {
    let mut out = String::with_capacity(candidate.len());
    for c in candidate.chars() {
        let c = c.to_ascii_lowercase();
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            SEPARATOR
        };
        if c == SEPARATOR && (out.is_empty() || out.ends_with(SEPARATOR)) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with(SEPARATOR) {
        out.pop();
    }

    if out.is_empty() {
        return ParameterIdentifier(PLACEHOLDER_PREFIX.to_string());
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) || has_reserved_prefix(&out) {
        out = format!("{PLACEHOLDER_PREFIX}{SEPARATOR}{out}");
    }
    ParameterIdentifier(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_lowercases_and_collapses() {
        assert_eq!(normalize("Parametr1").as_str(), "parametr1");
        assert_eq!(normalize("Data  rozhdeniya").as_str(), "data_rozhdeniya");
        assert_eq!(normalize("--a -- b__c--").as_str(), "a_b_c");
    }

    #[test]
    fn test_normalize_placeholder_cases() {
        assert_eq!(normalize("").as_str(), "param");
        assert_eq!(normalize("  ;;; ").as_str(), "param");
        assert_eq!(normalize("123abc").as_str(), "param_123abc");
        assert_eq!(normalize("XML-Schema").as_str(), "param_xml_schema");
    }

    #[test]
    fn test_normalize_non_ascii_becomes_separator() {
        assert_eq!(normalize("café au lait").as_str(), "caf_au_lait");
        assert_eq!(normalize("Ω").as_str(), "param");
    }

    #[test]
    fn test_parse_rejects_illegal() {
        assert_eq!(ParameterIdentifier::parse(""), Err(IdentifierError::Empty));
        assert!(matches!(
            ParameterIdentifier::parse("9lives"),
            Err(IdentifierError::LeadingDigit(_))
        ));
        assert!(matches!(
            ParameterIdentifier::parse("a-b"),
            Err(IdentifierError::IllegalCharacter(_))
        ));
        assert!(matches!(
            ParameterIdentifier::parse("xmlns"),
            Err(IdentifierError::ReservedPrefix(_))
        ));
        assert!(ParameterIdentifier::parse("_ok_1").is_ok());
    }

    #[test]
    fn test_suffix() {
        let id = normalize("param");
        assert_eq!(id.with_suffix(2).as_str(), "param_2");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_always_legal(s in "\\PC*") {
            let id = normalize(&s);
            prop_assert!(ParameterIdentifier::parse(id.as_str()).is_ok());
        }

        #[test]
        fn prop_normalize_is_idempotent(s in "\\PC*") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(once.as_str()), once);
        }
    }
}
