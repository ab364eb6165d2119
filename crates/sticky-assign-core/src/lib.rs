// crates/sticky-assign-core/src/lib.rs
// ============================================================================
// Module: Sticky Assign Core Library
// Description: Public API surface for the Sticky Assign core.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Sticky Assign core maps (experiment, user) pairs onto weighted variants
//! deterministically and persists the first answer so every later request
//! sees the same variant. It is storage-agnostic: persistence plugs in through
//! the [`AssignmentStore`] interface, and transports call into
//! [`AssignmentService`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AssignmentStore;
pub use interfaces::StoreError;
pub use runtime::AssignError;
pub use runtime::AssignmentDecision;
pub use runtime::AssignmentService;
pub use runtime::AssignmentSource;
pub use runtime::BucketingError;
pub use runtime::InMemoryAssignmentStore;
pub use runtime::SharedAssignmentStore;
pub use runtime::VariantSelector;
pub use runtime::WeightedFnvSelector;
pub use runtime::assign_variant;
pub use runtime::fnv1a64;
pub use runtime::stable_hash;
