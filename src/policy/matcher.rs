//! Name patterns: regular expressions matched anywhere in a symbol name.
//!
//! Matching is unanchored search, case-sensitive. `"foo"` matches `"myfoo"`
//! and `"foobar"`; write `"^foo$"` for an exact name. A pattern that does not
//! compile never matches anything.

use crate::Error;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A policy name pattern, compiled once at load time
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NamePattern {
    source: String,
    regex: Option<Regex>,
}

impl NamePattern {
    /// Compile `source`; an invalid expression yields a pattern that matches nothing
    pub fn new(source: &str) -> Self {
        let regex = match Regex::new(source) {
            Ok(regex) => Some(regex),
            Err(e) => {
                let err = Error::InvalidNamePattern {
                    pattern: source.to_string(),
                    message: e.to_string(),
                };
                tracing::debug!("{}", err);
                None
            }
        };
        Self {
            source: source.to_string(),
            regex,
        }
    }

    /// Pattern text as written in the policy
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }

    /// Is the pattern found anywhere in `candidate`?
    pub fn matches(&self, candidate: &str) -> bool {
        self.regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(candidate))
    }
}

/// One-shot match of `pattern` against `candidate` (fails closed)
pub fn matches(pattern: &str, candidate: &str) -> bool {
    NamePattern::new(pattern).matches(candidate)
}

impl Default for NamePattern {
    fn default() -> Self {
        Self::new("")
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for NamePattern {}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamePattern({:?})", self.source)
    }
}

impl From<String> for NamePattern {
    fn from(source: String) -> Self {
        Self::new(&source)
    }
}

impl From<&str> for NamePattern {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<NamePattern> for String {
    fn from(pattern: NamePattern) -> Self {
        pattern.source
    }
}
