//! Field allow/deny rules (field-level security).
//!
//! A single role authors an ordered list of include/exclude patterns.
//! Lookup checks the field name and then its dotted-path ancestors
//! (`a.b.c`, then `a.b`, then `a`) against the patterns in order; the
//! first definitive match wins. Unmatched fields are excluded unless the
//! list was authored as exclusions only, in which case everything not
//! excluded is visible.
//!
//! Across roles the merge is a union: a field is visible if *any*
//! contributing role allows it.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tourmaline_types::glob_matches;

use crate::restriction::RestrictionRule;

/// Whether a pattern admits or removes matching fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldAction {
    /// Matching fields are visible.
    Include,
    /// Matching fields are removed.
    Exclude,
}

/// One authored (pattern, action) entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPattern {
    pattern: String,
    action: FieldAction,
}

impl FieldPattern {
    /// An include entry.
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            action: FieldAction::Include,
        }
    }

    /// An exclude entry.
    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            action: FieldAction::Exclude,
        }
    }
}

/// One role's normalized pattern list.
///
/// `fallback` is the implicit entry normalization adds: include-all for an
/// exclusions-only list, exclude-all otherwise. It is kept out of the
/// pattern list so ancestor lookup runs before the implicit entry applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Branch {
    patterns: Vec<FieldPattern>,
    fallback: FieldAction,
}

impl Branch {
    fn from_patterns(patterns: Vec<FieldPattern>) -> Self {
        let all_excludes =
            !patterns.is_empty() && patterns.iter().all(|p| p.action == FieldAction::Exclude);
        // Exclusions-only lists admit everything they do not exclude;
        // inclusion-bearing and empty lists exclude by default.
        let fallback = if all_excludes {
            FieldAction::Include
        } else {
            FieldAction::Exclude
        };
        Self { patterns, fallback }
    }

    fn allow_all() -> Self {
        Self {
            patterns: Vec::new(),
            fallback: FieldAction::Include,
        }
    }

    fn is_allow_all(&self) -> bool {
        self.patterns.is_empty() && self.fallback == FieldAction::Include
    }

    fn allows(&self, field: &str) -> bool {
        for name in lookup_names(field) {
            for entry in &self.patterns {
                if glob_matches(&entry.pattern, name) {
                    return entry.action == FieldAction::Include;
                }
            }
        }
        self.fallback == FieldAction::Include
    }
}

/// Returns the field and then each dotted-path ancestor, longest first.
fn lookup_names(field: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(field);
    std::iter::from_fn(move || {
        let current = next?;
        next = current.rsplit_once('.').map(|(parent, _)| parent);
        Some(current)
    })
}

/// A field-level security rule, possibly merged across several roles.
///
/// Each branch is one role's contribution; lookup succeeds if any branch
/// allows the field. Results are memoized per field name for the lifetime
/// of this rule value -- safe because contents never change after
/// construction.
#[derive(Debug, Serialize, Deserialize)]
pub struct FieldAllowRule {
    branches: Vec<Branch>,
    #[serde(skip)]
    cache: RwLock<HashMap<String, bool>>,
}

impl FieldAllowRule {
    /// Builds a rule from one role's authored pattern list.
    pub fn from_patterns(patterns: Vec<FieldPattern>) -> Self {
        Self {
            branches: vec![Branch::from_patterns(patterns)],
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The degenerate rule that shows every field.
    pub fn allow_all() -> Self {
        Self {
            branches: vec![Branch::allow_all()],
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the named field survives this rule.
    pub fn is_allowed(&self, field: &str) -> bool {
        if let Ok(cache) = self.cache.read() {
            if let Some(&allowed) = cache.get(field) {
                return allowed;
            }
        }
        let allowed = self.branches.iter().any(|b| b.allows(field));
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(field.to_string(), allowed);
        }
        allowed
    }

    /// Filters a field list down to the visible ones.
    pub fn filter<'a, I>(&self, fields: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        fields.into_iter().filter(|f| self.is_allowed(f)).collect()
    }
}

impl Clone for FieldAllowRule {
    fn clone(&self) -> Self {
        // The memo cache is per-instance; clones start cold.
        Self {
            branches: self.branches.clone(),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl PartialEq for FieldAllowRule {
    fn eq(&self, other: &Self) -> bool {
        self.branches == other.branches
    }
}

impl RestrictionRule for FieldAllowRule {
    fn unrestricted() -> Self {
        Self::allow_all()
    }

    fn fully_restricted() -> Self {
        Self {
            branches: Vec::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn is_unrestricted(&self) -> bool {
        self.branches.iter().any(Branch::is_allow_all)
    }

    fn merge<I: IntoIterator<Item = Self>>(rules: I) -> Self {
        let mut branches = Vec::new();
        for rule in rules {
            if rule.is_unrestricted() {
                return Self::unrestricted();
            }
            branches.extend(rule.branches);
        }
        Self {
            branches,
            cache: RwLock::new(HashMap::new()),
        }
    }
}
