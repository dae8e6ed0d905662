//! # Tourmaline
//!
//! Role-based access restrictions for partitioned data resources, at
//! three granularities:
//!
//! - **Document restriction** - which records a caller may see, as a
//!   union of opaque filter expressions.
//! - **Field restriction** - which fields a caller may see, as ordered
//!   include/exclude pattern lists.
//! - **Field masking** - which field values must be irreversibly
//!   transformed before being returned, via a deterministic keyed digest.
//!
//! Identities present a set of role names; each role carries patterns
//! that match resources (leaves, groups, sequences) and optional
//! per-resource rules. The engine answers, per identity and resource:
//! is access restricted at all, and what is the effective merged rule?
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Tourmaline                           │
//! │  ┌──────────┐   ┌───────────────┐   ┌─────────────────────┐  │
//! │  │ Topology │ → │ StaticPolicy  │ → │  RestrictionEngine  │  │
//! │  │(snapshot)│   │ ResourceIndex │   │ (evaluate / merge)  │  │
//! │  └──────────┘   └───────────────┘   └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Merging is permissive-wins across roles: document filters and field
//! allows are unioned, masking is intersected. Everything else fails
//! closed: no roles, unknown resources, and template errors all resolve
//! to denial.
//!
//! # Quick Start
//!
//! ```
//! use tourmaline::{
//!     DocumentFilterRule, Identity, Pattern, Resource, ResourceScope,
//!     RestrictionEngine, RoleDefinition, Topology,
//! };
//!
//! let topology = Topology::new(1).with_resource(Resource::new("logs-2024"));
//! let roles = vec![RoleDefinition::new("reader").grant_with_rule(
//!     ResourceScope::Resource,
//!     Pattern::new("logs-*"),
//!     DocumentFilterRule::from_expr("tenant == \"A\""),
//! )];
//!
//! let engine = RestrictionEngine::new(roles, topology);
//! let identity = Identity::new().with_role("reader");
//!
//! let restriction = engine.evaluate(&identity, "logs-2024")?;
//! assert!(restriction.rule().is_some());
//! # Ok::<(), tourmaline::EngineError>(())
//! ```

// Topology and identity
pub use tourmaline_types::{
    glob_matches, Identity, Resource, ResourceGroup, ResourceRef, ResourceScope, ResourceSequence,
    Topology,
};

// Rule kinds and the evaluation output
pub use tourmaline_rules::{
    DigestAlgorithm, DocumentFilterRule, FieldAction, FieldAllowRule, FieldMaskingRule, FieldPattern,
    FilterExpr, MaskEntry, MaskKey, MaskSpec, RegexReplacement, Restriction, RestrictionRule,
    RuleError,
};

// The engine
pub use tourmaline_engine::{
    AccessEntry, EngineError, Pattern, ResourceIndex, RestrictionEngine, RoleDefinition,
    StaticPolicy,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_start_surface() {
        let topology = Topology::new(1)
            .with_resource(Resource::new("logs-2024"))
            .with_resource(Resource::new("metrics-2024"));
        let roles = vec![RoleDefinition::new("reader").grant_with_rule(
            ResourceScope::Resource,
            Pattern::new("logs-*"),
            DocumentFilterRule::from_expr("tenant == \"A\""),
        )];

        let engine = RestrictionEngine::new(roles, topology);
        let identity = Identity::new().with_role("reader");

        assert!(engine.evaluate(&identity, "logs-2024").unwrap().rule().is_some());
        assert!(engine
            .evaluate(&identity, "metrics-2024")
            .unwrap()
            .is_fully_restricted());
    }

    #[test]
    fn test_masking_engine_end_to_end() {
        let topology = Topology::new(1).with_resource(Resource::new("patients"));
        let roles = vec![RoleDefinition::new("clinician").grant_with_rule(
            ResourceScope::Resource,
            Pattern::new("patients"),
            FieldMaskingRule::from_entries(vec![MaskEntry::new("ssn", MaskSpec::keyed())]),
        )];

        let engine = RestrictionEngine::new(roles, topology);
        let identity = Identity::new().with_role("clinician");

        let restriction = engine.evaluate(&identity, "patients").unwrap();
        let rule = restriction.rule().expect("expected a masking rule");
        let masked = rule.apply("ssn", b"123-45-6789").unwrap();
        assert_ne!(masked, b"123-45-6789");
        assert_eq!(rule.apply("name", b"alice").unwrap(), b"alice");
    }
}
