//! Document filter rules.
//!
//! The engine treats filter expressions as opaque values: it stores them,
//! deduplicates them, and unions them. Parsing and executing the filter
//! language is the host's concern.

use serde::{Deserialize, Serialize};

use crate::restriction::RestrictionRule;

/// One opaque filter expression, or the designated exclude-all value.
///
/// `MatchNone` is the only expression the engine itself ever constructs;
/// it exists so a fully-restricted document rule has a representation the
/// host can recognize without parsing anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterExpr {
    /// A host-supplied filter expression, stored verbatim.
    Opaque(String),
    /// The degenerate filter that matches no document.
    MatchNone,
}

impl FilterExpr {
    /// Wraps a host-supplied expression.
    pub fn new(expr: impl Into<String>) -> Self {
        FilterExpr::Opaque(expr.into())
    }

    /// Whether this is the exclude-all degenerate.
    pub fn is_match_none(&self) -> bool {
        matches!(self, FilterExpr::MatchNone)
    }
}

/// A set of document filters granted by one or more roles.
///
/// Semantics: a document is visible if *any* filter matches it, so the
/// multi-role merge is a plain union. An empty filter list means no
/// document restriction at all -- "match all" never needs an expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilterRule {
    filters: Vec<FilterExpr>,
}

impl DocumentFilterRule {
    /// Creates a rule from a single filter expression.
    pub fn from_expr(expr: impl Into<String>) -> Self {
        Self {
            filters: vec![FilterExpr::new(expr)],
        }
    }

    /// Creates a rule from several filter expressions.
    pub fn from_exprs<I, S>(exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filters: exprs.into_iter().map(FilterExpr::new).collect(),
        }
    }

    /// The filters to OR together, in contribution order.
    pub fn filters(&self) -> &[FilterExpr] {
        &self.filters
    }
}

impl RestrictionRule for DocumentFilterRule {
    fn unrestricted() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    fn fully_restricted() -> Self {
        Self {
            filters: vec![FilterExpr::MatchNone],
        }
    }

    fn is_unrestricted(&self) -> bool {
        self.filters.is_empty()
    }

    fn merge<I: IntoIterator<Item = Self>>(rules: I) -> Self {
        let mut filters: Vec<FilterExpr> = Vec::new();
        for rule in rules {
            // Union. An unrestricted contributor wins outright: ORing with
            // "match all" makes every other filter irrelevant.
            if rule.is_unrestricted() {
                return Self::unrestricted();
            }
            for filter in rule.filters {
                if !filters.contains(&filter) {
                    filters.push(filter);
                }
            }
        }
        Self { filters }
    }
}
