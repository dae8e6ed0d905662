//! Engine errors.
//!
//! Evaluation errors always fail closed: a caller that receives an error
//! must deny the request, never fall back to unrestricted access. Role
//! compilation errors are non-fatal; the offending role is skipped and
//! recorded, every other role keeps working.

use thiserror::Error;

use tourmaline_rules::RuleError;

/// Errors raised by role compilation or restriction evaluation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A templated pattern references an attribute the identity does not
    /// carry.
    #[error("template {template:?} references missing identity attribute {attribute:?}")]
    MissingAttribute {
        /// The pattern text as authored.
        template: String,
        /// The attribute name the identity lacks.
        attribute: String,
    },

    /// A templated pattern is syntactically broken.
    #[error("template {template:?} is malformed: {reason}")]
    MalformedTemplate {
        /// The pattern text as authored.
        template: String,
        /// What exactly is wrong with it.
        reason: String,
    },

    /// A role carried an access rule that failed validation.
    #[error("invalid access rule: {0}")]
    InvalidRule(#[from] RuleError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
