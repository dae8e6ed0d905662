//! Evaluation output and the rule-kind capability trait.

use crate::error::RuleError;

/// The capability surface a rule kind exposes to the generic evaluator.
///
/// The evaluator never inspects rule contents; it only needs the two
/// degenerate values, the kind-specific merge, and a validation hook used
/// by the static policy compiler's partial-success path.
pub trait RestrictionRule: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// The degenerate rule that restricts nothing.
    fn unrestricted() -> Self;

    /// The degenerate rule that allows nothing.
    fn fully_restricted() -> Self;

    /// Whether this rule is the restricts-nothing degenerate.
    fn is_unrestricted(&self) -> bool;

    /// Merges the rules contributed by all of an identity's roles.
    ///
    /// Kind-specific, but always permissive-wins: document filters and
    /// field allows are unioned, masking entries are intersected.
    fn merge<I: IntoIterator<Item = Self>>(rules: I) -> Self;

    /// Checks the rule for construction problems (bad regex, bad key).
    ///
    /// Called once per role at compile time; a failing rule disables the
    /// whole role, never just the entry.
    fn validate(&self) -> Result<(), RuleError> {
        Ok(())
    }
}

/// The engine's answer for one (identity, resource) pair.
///
/// Constructed fresh per evaluation; merged rules are never shared across
/// evaluations.
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction<R> {
    /// Some role grants unconditional access; no rule applies.
    Unrestricted,
    /// Access is granted subject to the merged rule.
    Rule(R),
    /// No role grants any access. The safe default.
    FullyRestricted,
}

impl<R> Restriction<R> {
    /// Whether access is unconditional.
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Restriction::Unrestricted)
    }

    /// Whether access is denied outright.
    pub fn is_fully_restricted(&self) -> bool {
        matches!(self, Restriction::FullyRestricted)
    }

    /// The merged rule, if access is rule-bound.
    pub fn rule(&self) -> Option<&R> {
        match self {
            Restriction::Rule(rule) => Some(rule),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let r: Restriction<()> = Restriction::Unrestricted;
        assert!(r.is_unrestricted());
        assert!(!r.is_fully_restricted());
        assert!(r.rule().is_none());

        let r = Restriction::Rule(42u32);
        assert_eq!(r.rule(), Some(&42));

        let r: Restriction<()> = Restriction::FullyRestricted;
        assert!(r.is_fully_restricted());
    }
}
