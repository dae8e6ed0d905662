//! # tourmaline-engine: Role compilation and restriction evaluation
//!
//! The core of the access-restriction system:
//!
//! - [`Pattern`] -- glob, templated, and excluded resource-name matching.
//! - [`RoleDefinition`] -- per-scope access grants with optional rules.
//! - [`StaticPolicy`] -- per-role compiled tables, rebuilt on role change.
//! - [`ResourceIndex`] -- concrete-resource expansion of glob grants,
//!   rebuilt asynchronously on topology change.
//! - [`RestrictionEngine`] -- the request-facing evaluator combining all
//!   of the above with permissive-wins merging.
//!
//! # Architecture
//!
//! ```text
//!   role config change        topology change
//!          |                        |
//!          v                        v
//!   StaticPolicy::compile    ResourceIndex::build (worker thread)
//!          \                       /
//!           \   atomic swaps      /
//!            v                   v
//!         RestrictionEngine::evaluate (request thread, lock-free reads)
//! ```
//!
//! Evaluation fails closed: unknown resources, empty role sets, and
//! template errors all resolve to denial, never to silent access.

pub mod compiler;
pub mod engine;
pub mod error;
pub mod index;
pub mod pattern;
pub mod roles;

pub use compiler::{ScopePolicy, StaticPolicy};
pub use engine::RestrictionEngine;
pub use error::EngineError;
pub use index::ResourceIndex;
pub use pattern::Pattern;
pub use roles::{AccessEntry, RoleDefinition};
