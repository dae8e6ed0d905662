//! # tourmaline-types: Core types for Tourmaline
//!
//! This crate contains the shared types used across the restriction engine:
//! - Resource topology ([`Topology`], [`Resource`], [`ResourceGroup`],
//!   [`ResourceSequence`])
//! - Pattern/index partitions ([`ResourceScope`])
//! - Evaluation context ([`Identity`])
//!
//! A [`Topology`] is an immutable snapshot with a monotonic version number.
//! A new snapshot fully replaces the old one; nothing here is mutated in
//! place after construction.

pub mod glob;
pub mod identity;
pub mod topology;

pub use glob::glob_matches;
pub use identity::Identity;
pub use topology::{
    Resource, ResourceGroup, ResourceRef, ResourceScope, ResourceSequence, Topology,
};
