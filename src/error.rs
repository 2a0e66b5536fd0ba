//! Error types for the Loom instrumentation engine

use std::path::PathBuf;
use thiserror::Error;

/// Loom errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Policy errors
    /// The policy file could not be opened or read
    ///
    /// **Triggered by:** A missing, unreadable or non-regular policy file
    /// **Prevention:** Pass an existing path in `RewriteOptions::policy_file`
    #[error("Error opening policy file '{}': {message}", path.display())]
    PolicyFileNotFound {
        /// Path that was opened
        path: PathBuf,
        /// Operating system error description
        message: String,
    },

    /// The policy document is malformed or uses an unknown enumeration value
    ///
    /// **Triggered by:** Bad YAML, unknown keys, or values such as `strategy: sideways`
    #[error("Policy parse error at line {line}, column {column}: {message}")]
    PolicyParse {
        /// Line number (1-based, 0 when unknown)
        line: usize,
        /// Column number (1-based, 0 when unknown)
        column: usize,
        /// Parser message
        message: String,
    },

    /// A name pattern in the policy is not a valid regular expression.
    ///
    /// Never surfaced by matching: an invalid pattern simply matches nothing.
    #[error("Invalid name pattern '{pattern}': {message}")]
    InvalidNamePattern {
        /// The pattern as written in the policy
        pattern: String,
        /// Regex compiler message
        message: String,
    },

    // Program errors
    /// The module carries no debug metadata; file-scoped rules only match
    /// rules without a `within-file` constraint.
    #[error("Module '{module}' is missing debug metadata, instrumentation may be incomplete")]
    MissingDebugInfo {
        /// Module name
        module: String,
    },

    /// A recorded instrumentation point no longer resolves to an instruction
    #[error("Instrumentation point {value} not found in function '{function}'")]
    InvalidInstrumentationPoint {
        /// Enclosing function name
        function: String,
        /// Instruction id
        value: u32,
    },

    /// Malformed IR (e.g. JSON that does not describe a module)
    #[error("IR error: {0}")]
    Ir(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Aborts the run before any mutation
    Fatal,
    /// Warning that doesn't prevent instrumentation
    Warning,
}

impl Error {
    /// Create an IR error with a message
    pub fn ir(msg: impl Into<String>) -> Self {
        Error::Ir(msg.into())
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::PolicyFileNotFound { .. } => ErrorSeverity::Fatal,
            Error::PolicyParse { .. } => ErrorSeverity::Fatal,
            Error::Ir(_) => ErrorSeverity::Fatal,

            Error::InvalidNamePattern { .. } => ErrorSeverity::Warning,
            Error::MissingDebugInfo { .. } => ErrorSeverity::Warning,
            Error::InvalidInstrumentationPoint { .. } => ErrorSeverity::Warning,
        }
    }
}

impl From<serde_yaml_ng::Error> for Error {
    fn from(err: serde_yaml_ng::Error) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((0, 0));
        Error::PolicyParse {
            line,
            column,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Ir(err.to_string())
    }
}

/// Result type for Loom operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let err = Error::PolicyParse {
            line: 3,
            column: 1,
            message: "unknown variant".into(),
        };
        assert_eq!(err.classify(), ErrorSeverity::Fatal);

        let err = Error::MissingDebugInfo {
            module: "test.c".into(),
        };
        assert_eq!(err.classify(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_display_includes_position() {
        let err = Error::PolicyParse {
            line: 7,
            column: 12,
            message: "bad".into(),
        };
        assert_eq!(
            err.to_string(),
            "Policy parse error at line 7, column 12: bad"
        );
    }
}
