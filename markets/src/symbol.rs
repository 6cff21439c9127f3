use serde::{de, Deserialize, Deserializer, Serialize};
use smol_str::SmolStr;
use std::{cmp::Ordering, fmt, hash::Hash, hash::Hasher, str::FromStr};
use thiserror::Error;

/// Maximum number of characters a [`Symbol`] may contain.
pub const MAX_SYMBOL_LEN: usize = 50;

/// Errors produced when constructing a [`Symbol`] from untrusted input.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SymbolError {
    #[error("symbol must not be empty")]
    Empty,
    #[error("symbol exceeds {MAX_SYMBOL_LEN} characters ({len} given)")]
    TooLong { len: usize },
    #[error("symbol contains invalid character '{0}' (allowed: A-Z a-z 0-9 . _ - : /)")]
    InvalidChar(char),
}

fn is_valid_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | '/')
}

/// A normalized, validated market-data symbol key.
///
/// Lookup (`Eq`, `Hash`, `Ord`) is case-insensitive, but the casing the caller
/// supplied is preserved for `Display`/serialization.
#[derive(Debug, Clone, Eq, Serialize)]
pub struct Symbol {
    original: SmolStr,
    #[serde(skip)]
    normalized: SmolStr,
}

impl Symbol {
    /// Validate and construct a [`Symbol`].
    ///
    /// Fails if `raw` is empty, longer than [`MAX_SYMBOL_LEN`] characters, or contains
    /// a character outside `[A-Za-z0-9._\-:/]`.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, SymbolError> {
        let raw = raw.as_ref();
        let len = raw.chars().count();

        if len == 0 {
            return Err(SymbolError::Empty);
        }
        if len > MAX_SYMBOL_LEN {
            return Err(SymbolError::TooLong { len });
        }
        if let Some(bad) = raw.chars().find(|c| !is_valid_symbol_char(*c)) {
            return Err(SymbolError::InvalidChar(bad));
        }

        Ok(Self {
            original: SmolStr::new(raw),
            normalized: SmolStr::new(raw.to_ascii_lowercase()),
        })
    }

    /// The original casing supplied at construction time.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// The case-folded form used for equality, hashing and ordering.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = SymbolError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Symbol::new(raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_charset() {
        for raw in ["AAPL", "BTC-USD", "ES.FUT:CME/2025Z", "a1._-:/Z"] {
            assert!(Symbol::new(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Symbol::new(""), Err(SymbolError::Empty));
    }

    #[test]
    fn rejects_too_long() {
        let raw = "A".repeat(MAX_SYMBOL_LEN + 1);
        assert_eq!(Symbol::new(&raw), Err(SymbolError::TooLong { len: raw.len() }));
    }

    #[test]
    fn rejects_invalid_char() {
        assert_eq!(Symbol::new("AAPL USD"), Err(SymbolError::InvalidChar(' ')));
        assert_eq!(Symbol::new("AAPL$"), Err(SymbolError::InvalidChar('$')));
    }

    #[test]
    fn equality_and_hash_are_case_insensitive_but_display_preserves_casing() {
        let a = Symbol::new("aApL").unwrap();
        let b = Symbol::new("AAPL").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "aApL");
        assert_eq!(b.to_string(), "AAPL");

        use std::collections::hash_map::DefaultHasher;
        use std::hash::Hasher as _;
        let mut ha = DefaultHasher::new();
        a.hash(&mut ha);
        let mut hb = DefaultHasher::new();
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn ordering_is_by_normalized_form() {
        let a = Symbol::new("AAPL").unwrap();
        let b = Symbol::new("msft").unwrap();
        assert!(a < b);
    }
}
