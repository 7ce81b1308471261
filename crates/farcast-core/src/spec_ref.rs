//! Globally unique spec identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A globally unique identifier for one spec: the translation unit that
/// declares it plus its (possibly dotted) qualified name.
///
/// Rendered as `unit:qualname`, e.g. `pkg.billing:Invoice.total`.
/// Immutable once created; ordering is lexicographic on `(unit, qualname)`
/// so that sorted collections of refs are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpecRef {
    /// Dotted translation-unit name, e.g. `pkg.billing`.
    pub unit: String,
    /// Qualified name inside the unit; dotted for class members,
    /// e.g. `Invoice.total`.
    pub qualname: String,
}

impl SpecRef {
    pub fn new(unit: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            qualname: qualname.into(),
        }
    }

    /// The top-level declared name: `Invoice.total` -> `Invoice`.
    pub fn top_level_name(&self) -> &str {
        self.qualname.split('.').next().unwrap_or(&self.qualname)
    }

    /// Whether the qualname is nested (a class member).
    pub fn is_nested(&self) -> bool {
        self.qualname.contains('.')
    }
}

impl fmt::Display for SpecRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.qualname)
    }
}

/// Error produced when a string form cannot be parsed into a [`SpecRef`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefParseError {
    #[error("spec reference {0:?} is missing the `unit:qualname` separator")]
    MissingSeparator(String),

    #[error("spec reference {0:?} has an empty unit or qualname")]
    EmptyComponent(String),
}

impl FromStr for SpecRef {
    type Err = RefParseError;

    /// Parse the canonical `unit:qualname` string form. Surrounding
    /// whitespace on either component is discarded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (unit, qualname) = s
            .split_once(':')
            .ok_or_else(|| RefParseError::MissingSeparator(s.to_string()))?;
        let unit = unit.trim();
        let qualname = qualname.trim();
        if unit.is_empty() || qualname.is_empty() {
            return Err(RefParseError::EmptyComponent(s.to_string()));
        }
        Ok(SpecRef::new(unit, qualname))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_form() {
        let r: SpecRef = "pkg.billing:Invoice.total".parse().unwrap();
        assert_eq!(r.unit, "pkg.billing");
        assert_eq!(r.qualname, "Invoice.total");
        assert_eq!(r.top_level_name(), "Invoice");
        assert!(r.is_nested());
    }

    #[test]
    fn trims_whitespace() {
        let r: SpecRef = " pkg.a : fn_name ".parse().unwrap();
        assert_eq!(r, SpecRef::new("pkg.a", "fn_name"));
        assert!(!r.is_nested());
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(
            "no_separator".parse::<SpecRef>(),
            Err(RefParseError::MissingSeparator("no_separator".to_string()))
        );
        assert_eq!(
            "unit:".parse::<SpecRef>(),
            Err(RefParseError::EmptyComponent("unit:".to_string()))
        );
    }

    #[test]
    fn display_round_trips() {
        let r = SpecRef::new("m", "Class.method");
        let again: SpecRef = r.to_string().parse().unwrap();
        assert_eq!(r, again);
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut refs = vec![
            SpecRef::new("b", "x"),
            SpecRef::new("a", "y"),
            SpecRef::new("a", "x"),
        ];
        refs.sort();
        assert_eq!(refs[0], SpecRef::new("a", "x"));
        assert_eq!(refs[2], SpecRef::new("b", "x"));
    }
}
