//! The stateful resource index.
//!
//! For every concrete resource in a topology snapshot, the index
//! precomputes which roles reach it through a *concrete glob* pattern and
//! with what rule. Wildcards and templates never enter the index; the
//! static policy handles those at evaluation time.
//!
//! A group matched by a role's glob additionally fans out to the group's
//! member leaf resources, so a direct leaf lookup finds the grant without
//! walking the hierarchy. Sequence generations are deliberately not
//! fanned out; they are reached through the sequence itself.
//!
//! The index is immutable once built and is replaced wholesale when the
//! topology version changes.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use tourmaline_rules::RestrictionRule;
use tourmaline_types::{ResourceScope, Topology};

use crate::roles::RoleDefinition;

/// The precomputed tables for one resource scope.
#[derive(Debug)]
struct ScopeIndex<R> {
    /// resource name -> role name -> attached rule.
    with_rule: BTreeMap<String, BTreeMap<String, R>>,
    /// resource name -> roles granting unrestricted access.
    without_rule: BTreeMap<String, BTreeSet<String>>,
}

impl<R> ScopeIndex<R> {
    fn new() -> Self {
        Self {
            with_rule: BTreeMap::new(),
            without_rule: BTreeMap::new(),
        }
    }

    fn file(&mut self, resource: &str, role: &str, rule: Option<&R>)
    where
        R: Clone,
    {
        match rule {
            Some(rule) => {
                self.with_rule
                    .entry(resource.to_string())
                    .or_default()
                    .insert(role.to_string(), rule.clone());
            }
            None => {
                self.without_rule
                    .entry(resource.to_string())
                    .or_default()
                    .insert(role.to_string());
            }
        }
    }
}

/// The concrete-resource index for one topology snapshot.
#[derive(Debug)]
pub struct ResourceIndex<R> {
    version: u64,
    scopes: BTreeMap<ResourceScope, ScopeIndex<R>>,
}

impl<R: RestrictionRule> ResourceIndex<R> {
    /// An index over nothing, used before the first build completes.
    pub fn empty() -> Self {
        Self {
            version: 0,
            scopes: ResourceScope::ALL
                .iter()
                .map(|&scope| (scope, ScopeIndex::new()))
                .collect(),
        }
    }

    /// Expands every role's concrete glob patterns against the snapshot.
    pub fn build(roles: &[RoleDefinition<R>], topology: &Topology) -> Self {
        let mut index = Self::empty();
        index.version = topology.version();

        for role in roles {
            for &scope in &ResourceScope::ALL {
                for entry in role.entries(scope) {
                    let pattern = entry.pattern();
                    if !pattern.is_literal() {
                        continue;
                    }
                    let matched: Vec<String> = topology
                        .names_of(scope)
                        .filter(|name| pattern.matches(name))
                        .map(str::to_string)
                        .collect();
                    for name in matched {
                        index.scope_mut(scope).file(&name, role.name(), entry.rule());
                        if scope == ResourceScope::Group {
                            for leaf in topology.group_leaves(&name) {
                                index.scope_mut(ResourceScope::Resource).file(
                                    leaf.name(),
                                    role.name(),
                                    entry.rule(),
                                );
                            }
                        }
                    }
                }
            }
        }

        debug!(
            version = index.version,
            roles = roles.len(),
            "resource index built"
        );
        index
    }

    /// The topology version this index was built against.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Roles that reach the named resource without a rule.
    pub fn roles_without_rule(&self, scope: ResourceScope, resource: &str) -> Option<&BTreeSet<String>> {
        self.scope_ref(scope).without_rule.get(resource)
    }

    /// The rule a role attached to the named resource, if any.
    pub fn rule_for(&self, scope: ResourceScope, resource: &str, role: &str) -> Option<&R> {
        self.scope_ref(scope)
            .with_rule
            .get(resource)
            .and_then(|roles| roles.get(role))
    }

    fn scope_ref(&self, scope: ResourceScope) -> &ScopeIndex<R> {
        self.scopes
            .get(&scope)
            .unwrap_or_else(|| unreachable!("empty() seeds every scope"))
    }

    fn scope_mut(&mut self, scope: ResourceScope) -> &mut ScopeIndex<R> {
        self.scopes
            .get_mut(&scope)
            .unwrap_or_else(|| unreachable!("empty() seeds every scope"))
    }
}
