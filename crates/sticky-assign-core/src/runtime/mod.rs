// crates/sticky-assign-core/src/runtime/mod.rs
// ============================================================================
// Module: Sticky Assign Runtime
// Description: Bucketing engine, orchestrator, and in-memory store.
// Purpose: Turn (experiment, user) requests into durable sticky assignments.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The runtime composes the pure bucketing engine with an
//! [`crate::AssignmentStore`]: existing assignments short-circuit, new ones
//! are bucketed and persisted through the store's insert-or-fetch operation.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod bucketing;
pub mod orchestrator;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bucketing::BucketingError;
pub use bucketing::FNV_OFFSET_BASIS;
pub use bucketing::FNV_PRIME;
pub use bucketing::VariantSelector;
pub use bucketing::WeightedFnvSelector;
pub use bucketing::assign_variant;
pub use bucketing::fnv1a64;
pub use bucketing::stable_hash;
pub use orchestrator::AssignError;
pub use orchestrator::AssignmentDecision;
pub use orchestrator::AssignmentService;
pub use orchestrator::AssignmentSource;
pub use store::InMemoryAssignmentStore;
pub use store::SharedAssignmentStore;
