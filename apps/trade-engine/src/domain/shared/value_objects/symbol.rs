//! Symbol value object for instrument identifiers.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// An equity ticker symbol, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol.
    ///
    /// The symbol is trimmed and normalized to uppercase.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_uppercase())
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a plain exchange ticker (1-10 ASCII letters).
    #[must_use]
    pub fn is_ticker(&self) -> bool {
        (1..=10).contains(&self.0.len()) && self.0.chars().all(|c| c.is_ascii_uppercase())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
    }

    #[test]
    fn deserialization_normalizes() {
        let symbol: Symbol = serde_json::from_str("\"msft\"").unwrap();
        assert_eq!(symbol, Symbol::new("MSFT"));
    }

    #[test]
    fn ticker_shape() {
        assert!(Symbol::new("AAPL").is_ticker());
        assert!(!Symbol::new("BRK.B").is_ticker());
        assert!(!Symbol::new("ABCDEFGHIJK").is_ticker());
    }
}
