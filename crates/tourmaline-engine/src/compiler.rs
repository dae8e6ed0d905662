//! Static policy compilation.
//!
//! Per role and per scope, access entries are partitioned by pattern
//! shape: wildcard entries are kept here verbatim, templated entries are
//! kept unrendered for per-request rendering, and concrete globs are left
//! to the resource index, which expands them against topology snapshots.
//!
//! Compilation is partial-success: a role whose patterns or rules fail
//! validation is skipped and recorded, and every other role still
//! compiles. The result is immutable and shared across evaluations until
//! the role configuration changes.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use tourmaline_rules::RestrictionRule;
use tourmaline_types::ResourceScope;

use crate::error::EngineError;
use crate::pattern::Pattern;
use crate::roles::RoleDefinition;

/// The statically-compiled tables for one resource scope.
#[derive(Debug, Clone, Default)]
pub struct ScopePolicy<R> {
    wildcard_without_rule: BTreeSet<String>,
    wildcard_with_rule: BTreeMap<String, R>,
    templated_without_rule: BTreeMap<String, Vec<Pattern>>,
    templated_with_rule: BTreeMap<String, Vec<(Pattern, R)>>,
}

impl<R> ScopePolicy<R> {
    fn new() -> Self {
        Self {
            wildcard_without_rule: BTreeSet::new(),
            wildcard_with_rule: BTreeMap::new(),
            templated_without_rule: BTreeMap::new(),
            templated_with_rule: BTreeMap::new(),
        }
    }

    /// Whether the role holds an unconditional everything-grant.
    pub fn is_wildcard_unrestricted(&self, role: &str) -> bool {
        self.wildcard_without_rule.contains(role)
    }

    /// The role's everything-grant rule, if it filed one.
    pub fn wildcard_rule(&self, role: &str) -> Option<&R> {
        self.wildcard_with_rule.get(role)
    }

    /// The role's unrendered no-rule templates.
    pub fn templated_unrestricted(&self, role: &str) -> &[Pattern] {
        self.templated_without_rule
            .get(role)
            .map_or(&[], Vec::as_slice)
    }

    /// The role's unrendered rule-bound templates.
    pub fn templated_rules(&self, role: &str) -> &[(Pattern, R)] {
        self.templated_with_rule.get(role).map_or(&[], Vec::as_slice)
    }
}

/// The compiled static policy for the whole role set.
///
/// Rebuilt only when role definitions change; installed by atomic
/// replacement so in-flight evaluations keep their snapshot.
#[derive(Debug, Clone)]
pub struct StaticPolicy<R> {
    scopes: BTreeMap<ResourceScope, ScopePolicy<R>>,
    init_errors: BTreeMap<String, String>,
}

impl<R: RestrictionRule> StaticPolicy<R> {
    /// Compiles the full role set.
    ///
    /// A role that fails validation is skipped entirely (never partially
    /// applied) and recorded in [`init_errors`](Self::init_errors).
    pub fn compile(roles: &[RoleDefinition<R>]) -> Self {
        let mut scopes: BTreeMap<ResourceScope, ScopePolicy<R>> = ResourceScope::ALL
            .iter()
            .map(|&scope| (scope, ScopePolicy::new()))
            .collect();
        let mut init_errors = BTreeMap::new();

        for role in roles {
            if let Err(err) = validate_role(role) {
                warn!(role = %role.name(), error = %err, "skipping role with invalid definition");
                init_errors.insert(role.name().to_string(), err.to_string());
                continue;
            }
            for &scope in &ResourceScope::ALL {
                let policy = scopes
                    .get_mut(&scope)
                    .unwrap_or_else(|| unreachable!("all scopes were seeded above"));
                for entry in role.entries(scope) {
                    let pattern = entry.pattern();
                    if pattern.is_wildcard() {
                        match entry.rule() {
                            None => {
                                policy.wildcard_without_rule.insert(role.name().to_string());
                            }
                            Some(rule) => {
                                policy
                                    .wildcard_with_rule
                                    .insert(role.name().to_string(), rule.clone());
                            }
                        }
                    } else if pattern.is_template() {
                        match entry.rule() {
                            None => policy
                                .templated_without_rule
                                .entry(role.name().to_string())
                                .or_default()
                                .push(pattern.clone()),
                            Some(rule) => policy
                                .templated_with_rule
                                .entry(role.name().to_string())
                                .or_default()
                                .push((pattern.clone(), rule.clone())),
                        }
                    }
                    // Concrete globs are expanded by the resource index,
                    // blank patterns grant nothing.
                }
            }
        }

        debug!(
            roles = roles.len(),
            skipped = init_errors.len(),
            "static policy compiled"
        );
        Self {
            scopes,
            init_errors,
        }
    }

    /// The compiled tables for one scope.
    pub fn scope(&self, scope: ResourceScope) -> &ScopePolicy<R> {
        self.scopes
            .get(&scope)
            .unwrap_or_else(|| unreachable!("compile seeds every scope"))
    }

    /// Roles that failed to compile, with the reason. A configuration
    /// health signal for the host; evaluation treats these roles as if
    /// they did not exist.
    pub fn init_errors(&self) -> &BTreeMap<String, String> {
        &self.init_errors
    }
}

/// Checks every pattern and rule of a role before any of it is filed.
fn validate_role<R: RestrictionRule>(role: &RoleDefinition<R>) -> Result<(), EngineError> {
    for &scope in &ResourceScope::ALL {
        for entry in role.entries(scope) {
            entry.pattern().check_syntax()?;
            if let Some(rule) = entry.rule() {
                rule.validate()?;
            }
        }
    }
    Ok(())
}
