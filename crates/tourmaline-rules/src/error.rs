//! Rule construction and masking errors.

use thiserror::Error;

/// Errors raised while validating or applying a rule.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A regex-replacement pattern failed to compile.
    #[error("invalid masking regex {pattern:?}: {source}")]
    InvalidRegex {
        /// The offending pattern text.
        pattern: String,
        /// The compiler's diagnosis.
        #[source]
        source: regex::Error,
    },

    /// The masking key was rejected by the digest implementation.
    #[error("masking key rejected: {0}")]
    InvalidMaskKey(String),

    /// A length-prefixed term did not carry the advertised payload.
    #[error("malformed length-prefixed term: {0}")]
    MalformedTerm(String),
}

/// Result type for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
