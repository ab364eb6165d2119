// crates/sticky-assign-core/src/core/mod.rs
// ============================================================================
// Module: Sticky Assign Core Types
// Description: Canonical identifiers and assignment records.
// Purpose: Provide stable, serializable types shared by every crate.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Core types define experiment, user, and variant identifiers, the variant
//! and assignment records, and the error taxonomy used to map failures onto
//! caller-visible categories.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod deadline;
pub mod error_kind;
pub mod identifiers;
pub mod model;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use deadline::RequestDeadline;
pub use error_kind::ErrorKind;
pub use identifiers::ExperimentId;
pub use identifiers::UserId;
pub use identifiers::VariantKey;
pub use model::Assignment;
pub use model::Variant;
