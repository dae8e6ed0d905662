//! Role definitions.
//!
//! A role is a name plus, per resource scope, an ordered list of access
//! entries. Each entry pairs a pattern with an optional access rule; an
//! entry without a rule grants unrestricted access to matching resources.
//! Definitions are immutable once built; configuration changes always
//! supply a whole new role set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tourmaline_types::ResourceScope;

use crate::pattern::Pattern;

/// One (pattern, optional rule) grant inside a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEntry<R> {
    pattern: Pattern,
    rule: Option<R>,
}

impl<R> AccessEntry<R> {
    /// The resource pattern this entry applies to.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The attached access rule; `None` grants unrestricted access.
    pub fn rule(&self) -> Option<&R> {
        self.rule.as_ref()
    }
}

/// A named role, generic over the access-rule kind it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition<R> {
    name: String,
    entries: BTreeMap<ResourceScope, Vec<AccessEntry<R>>>,
}

impl<R> RoleDefinition<R> {
    /// Creates a role with no grants.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Adds an unrestricted grant for resources matching `pattern`.
    pub fn grant(mut self, scope: ResourceScope, pattern: Pattern) -> Self {
        self.entries
            .entry(scope)
            .or_default()
            .push(AccessEntry { pattern, rule: None });
        self
    }

    /// Adds a rule-bound grant for resources matching `pattern`.
    pub fn grant_with_rule(mut self, scope: ResourceScope, pattern: Pattern, rule: R) -> Self {
        self.entries.entry(scope).or_default().push(AccessEntry {
            pattern,
            rule: Some(rule),
        });
        self
    }

    /// The role name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The access entries for one scope, in authored order.
    pub fn entries(&self, scope: ResourceScope) -> &[AccessEntry<R>] {
        self.entries.get(&scope).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourmaline_rules::DocumentFilterRule;

    #[test]
    fn test_role_builder() {
        let role = RoleDefinition::new("reader")
            .grant(ResourceScope::Resource, Pattern::new("public-*"))
            .grant_with_rule(
                ResourceScope::Resource,
                Pattern::new("logs-*"),
                DocumentFilterRule::from_expr("tenant == \"A\""),
            )
            .grant(ResourceScope::Group, Pattern::wildcard());

        assert_eq!(role.name(), "reader");
        assert_eq!(role.entries(ResourceScope::Resource).len(), 2);
        assert_eq!(role.entries(ResourceScope::Group).len(), 1);
        assert!(role.entries(ResourceScope::Sequence).is_empty());

        let entries = role.entries(ResourceScope::Resource);
        assert!(entries[0].rule().is_none());
        assert!(entries[1].rule().is_some());
    }

    #[test]
    fn test_serde_round_trip() {
        let role: RoleDefinition<DocumentFilterRule> = RoleDefinition::new("auditor")
            .grant(ResourceScope::Resource, Pattern::new("audit-${region}-*"));
        let json = serde_json::to_string(&role).unwrap();
        let back: RoleDefinition<DocumentFilterRule> = serde_json::from_str(&json).unwrap();
        assert_eq!(role, back);
    }
}
