//! Resource-name patterns.
//!
//! A pattern is a glob over resource names (`*` and `?`), optionally
//! templated with `${attribute}` placeholders rendered against the
//! caller's identity, and optionally carrying an exclusion sub-pattern
//! that vetoes a match after the main pattern accepts.
//!
//! Rendering is lazy: templates depend on the caller, so they are never
//! precomputed -- the evaluator renders each (role, pattern) pair at most
//! once per request.

use serde::{Deserialize, Serialize};
use tourmaline_types::{glob_matches, Identity};

use crate::error::{EngineError, Result};

/// A resource-name pattern with an optional exclusion sub-pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    raw: String,
    exclusion: Option<String>,
}

impl Pattern {
    /// Creates a pattern from its glob (or template) text.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            exclusion: None,
        }
    }

    /// The match-everything pattern.
    pub fn wildcard() -> Self {
        Self::new("*")
    }

    /// Attaches an exclusion sub-pattern, checked after the main pattern.
    pub fn with_exclusion(mut self, exclusion: impl Into<String>) -> Self {
        self.exclusion = Some(exclusion.into());
        self
    }

    /// The pattern text as authored.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The exclusion sub-pattern, if any.
    pub fn exclusion(&self) -> Option<&str> {
        self.exclusion.as_deref()
    }

    /// Whether this pattern matches every name of its kind outright.
    ///
    /// An exclusion demotes a `*` to an ordinary glob: it no longer grants
    /// everything, so the short-circuit paths must not treat it as one.
    pub fn is_wildcard(&self) -> bool {
        self.raw == "*" && self.exclusion.is_none()
    }

    /// Whether the pattern has no literal form at all.
    pub fn is_blank(&self) -> bool {
        self.raw.is_empty()
    }

    /// Whether the pattern contains `${attribute}` placeholders.
    pub fn is_template(&self) -> bool {
        self.raw.contains("${") || self.exclusion.as_deref().is_some_and(|e| e.contains("${"))
    }

    /// Whether the pattern is a concrete glob: non-blank, non-wildcard,
    /// non-templated. Only these are expanded against topology snapshots.
    pub fn is_literal(&self) -> bool {
        !self.is_blank() && !self.is_wildcard() && !self.is_template()
    }

    /// Matches a resource name. The exclusion sub-pattern can veto a match
    /// the main pattern accepted.
    ///
    /// Callers must render templated patterns first; an unrendered
    /// placeholder never matches a real name.
    pub fn matches(&self, name: &str) -> bool {
        if !glob_matches(&self.raw, name) {
            return false;
        }
        match &self.exclusion {
            Some(exclusion) => !glob_matches(exclusion, name),
            None => true,
        }
    }

    /// Renders `${attribute}` placeholders against the identity.
    ///
    /// Fails if a referenced attribute is missing or the template syntax
    /// is broken; the evaluator turns that into a closed-access error.
    pub fn render(&self, identity: &Identity) -> Result<Pattern> {
        let raw = render_text(&self.raw, identity)?;
        let exclusion = match &self.exclusion {
            Some(exclusion) => Some(render_text(exclusion, identity)?),
            None => None,
        };
        Ok(Pattern { raw, exclusion })
    }

    /// Checks template syntax without an identity. Used at role-compile
    /// time so a malformed template disables its role up front instead of
    /// failing every evaluation.
    pub fn check_syntax(&self) -> Result<()> {
        check_text(&self.raw)?;
        if let Some(exclusion) = &self.exclusion {
            check_text(exclusion)?;
        }
        Ok(())
    }
}

fn render_text(template: &str, identity: &Identity) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let Some(end) = body.find('}') else {
            return Err(malformed(template, "unterminated `${`"));
        };
        let attribute = &body[..end];
        if attribute.is_empty() {
            return Err(malformed(template, "empty attribute reference"));
        }
        let value =
            identity
                .attribute(attribute)
                .ok_or_else(|| EngineError::MissingAttribute {
                    template: template.to_string(),
                    attribute: attribute.to_string(),
                })?;
        out.push_str(value);
        rest = &body[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn check_text(template: &str) -> Result<()> {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let body = &rest[start + 2..];
        let Some(end) = body.find('}') else {
            return Err(malformed(template, "unterminated `${`"));
        };
        if body[..end].is_empty() {
            return Err(malformed(template, "empty attribute reference"));
        }
        rest = &body[end + 1..];
    }
    Ok(())
}

fn malformed(template: &str, reason: &str) -> EngineError {
    EngineError::MalformedTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Pattern::wildcard().is_wildcard());
        assert!(!Pattern::wildcard().is_literal());

        let glob = Pattern::new("logs-*");
        assert!(glob.is_literal());
        assert!(!glob.is_wildcard());
        assert!(!glob.is_template());

        let template = Pattern::new("dept-${department}-*");
        assert!(template.is_template());
        assert!(!template.is_literal());

        assert!(Pattern::new("").is_blank());
    }

    #[test]
    fn test_wildcard_with_exclusion_is_not_wildcard() {
        let pattern = Pattern::wildcard().with_exclusion("secret-*");
        assert!(!pattern.is_wildcard());
        assert!(pattern.matches("logs-2024"));
        assert!(!pattern.matches("secret-2024"));
    }

    #[test]
    fn test_exclusion_vetoes_match() {
        let pattern = Pattern::new("logs-*").with_exclusion("logs-internal-*");
        assert!(pattern.matches("logs-2024"));
        assert!(!pattern.matches("logs-internal-2024"));
        assert!(!pattern.matches("metrics-2024"));
    }

    #[test]
    fn test_render_substitutes_attributes() {
        let identity = Identity::new().with_attribute("department", "cardiology");
        let pattern = Pattern::new("dept-${department}-*");

        let rendered = pattern.render(&identity).unwrap();
        assert_eq!(rendered.raw(), "dept-cardiology-*");
        assert!(rendered.matches("dept-cardiology-2024"));
        assert!(!rendered.matches("dept-oncology-2024"));
    }

    #[test]
    fn test_render_missing_attribute_fails() {
        let pattern = Pattern::new("dept-${department}-*");
        let err = pattern.render(&Identity::new()).unwrap_err();
        assert!(matches!(err, EngineError::MissingAttribute { .. }));
    }

    #[test]
    fn test_render_covers_exclusion() {
        let identity = Identity::new().with_attribute("team", "blue");
        let pattern = Pattern::new("logs-*").with_exclusion("logs-${team}-*");

        let rendered = pattern.render(&identity).unwrap();
        assert!(rendered.matches("logs-red-2024"));
        assert!(!rendered.matches("logs-blue-2024"));
    }

    #[test]
    fn test_malformed_templates_rejected() {
        assert!(Pattern::new("dept-${department").check_syntax().is_err());
        assert!(Pattern::new("dept-${}").check_syntax().is_err());
        assert!(Pattern::new("dept-${department}").check_syntax().is_ok());
        assert!(Pattern::new("plain-*").check_syntax().is_ok());
    }

    #[test]
    fn test_render_of_plain_pattern_is_identity() {
        let pattern = Pattern::new("logs-*");
        let rendered = pattern.render(&Identity::new()).unwrap();
        assert_eq!(rendered, pattern);
    }
}
