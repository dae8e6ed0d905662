//! Evaluation identity.
//!
//! The engine never decides who a caller is; it receives an established
//! identity per call: the assigned role names plus the attributes that
//! templated patterns render against.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// The caller's role set and template attributes.
///
/// Supplied per evaluation; the engine does not own or cache identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    roles: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
}

impl Identity {
    /// Creates an identity with no roles and no attributes.
    ///
    /// An identity without roles is fully restricted everywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assigned role name.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Adds several assigned role names.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Adds an attribute usable by templated patterns.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The assigned role names.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    /// Whether any role is assigned.
    pub fn has_roles(&self) -> bool {
        !self.roles.is_empty()
    }

    /// Whether the given role is assigned.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Looks up a template attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}
