//! # tourmaline-rules: Restriction rule kinds
//!
//! The three rule representations the engine merges and hands back to its
//! host, plus the capability trait that lets one generic evaluator work
//! over all of them:
//!
//! - **Document filters** ([`DocumentFilterRule`]) -- opaque filter
//!   expressions, unioned across roles.
//! - **Field allow rules** ([`FieldAllowRule`]) -- ordered include/exclude
//!   patterns with dotted-path ancestor lookup, unioned across roles.
//! - **Field masking rules** ([`FieldMaskingRule`]) -- pattern-to-masking
//!   mappings, intersected across roles, with a deterministic one-way
//!   masking function.
//!
//! Merging always follows the permissive-wins principle: across all roles
//! an identity holds, the least restrictive outcome prevails. For masking
//! that principle takes the form of an intersection, because "masked" is
//! the restrictive state -- a single role with no masking opinion unmasks
//! the field.

pub mod document;
pub mod error;
pub mod fields;
pub mod masking;
pub mod restriction;

pub use document::{DocumentFilterRule, FilterExpr};
pub use error::RuleError;
pub use fields::{FieldAction, FieldAllowRule, FieldPattern};
pub use masking::{DigestAlgorithm, FieldMaskingRule, MaskEntry, MaskKey, MaskSpec, RegexReplacement};
pub use restriction::{Restriction, RestrictionRule};
