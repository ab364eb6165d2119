// crates/sticky-assign-core/src/interfaces/mod.rs
// ============================================================================
// Module: Sticky Assign Interfaces
// Description: Backend-agnostic storage interface for sticky assignments.
// Purpose: Define the contract surface used by the assignment orchestrator.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! [`AssignmentStore`] is the only way the orchestrator reads or writes
//! persisted state. Implementations own the natural-key uniqueness of
//! assignments and must return the persisted winner when an insert loses a
//! race, never the caller's proposal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Assignment;
use crate::core::ErrorKind;
use crate::core::ExperimentId;
use crate::core::RequestDeadline;
use crate::core::UserId;
use crate::core::Variant;
use crate::core::VariantKey;

// ============================================================================
// SECTION: Assignment Store
// ============================================================================

/// Assignment store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw row payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("assignment store io error: {0}")]
    Io(String),
    /// Storage engine error.
    #[error("assignment store db error: {0}")]
    Db(String),
    /// Stored data failed integrity checks.
    #[error("assignment store corruption: {0}")]
    Corrupt(String),
    /// Stored schema version is incompatible.
    #[error("assignment store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data or configuration is invalid.
    #[error("assignment store invalid data: {0}")]
    Invalid(String),
    /// The variant key does not exist for the experiment.
    #[error("variant {variant_key} not found for experiment {experiment_id}")]
    VariantNotFound {
        /// Experiment the key was resolved against.
        experiment_id: ExperimentId,
        /// Unresolved variant key.
        variant_key: VariantKey,
    },
    /// An insert conflicted but no existing assignment could be read back.
    #[error("assignment exists for experiment {experiment_id} but could not be fetched")]
    AssignmentNotFound {
        /// Experiment identifier of the conflicting pair.
        experiment_id: ExperimentId,
        /// User identifier of the conflicting pair.
        user_id: UserId,
    },
    /// The request deadline passed before the operation ran.
    #[error("assignment store operation cancelled: {0}")]
    Cancelled(String),
    /// The writer queue is saturated or unavailable.
    #[error("assignment store overloaded: {0}")]
    Overloaded(String),
}

impl StoreError {
    /// Returns the caller-visible category for the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::VariantNotFound {
                ..
            } => ErrorKind::Unprocessable,
            Self::Io(_)
            | Self::Db(_)
            | Self::Corrupt(_)
            | Self::VersionMismatch(_)
            | Self::Invalid(_)
            | Self::AssignmentNotFound {
                ..
            }
            | Self::Cancelled(_)
            | Self::Overloaded(_) => ErrorKind::Infrastructure,
        }
    }
}

/// Persistence contract for experiments, variants, and sticky assignments.
pub trait AssignmentStore {
    /// Looks up the assignment for an (experiment, user) pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on infrastructure failure; absence is `Ok(None)`.
    fn get_assignment(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
        user_id: &UserId,
    ) -> Result<Option<Assignment>, StoreError>;

    /// Lists the variants of an experiment in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on infrastructure failure; an unknown experiment
    /// yields an empty list.
    fn list_variants(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
    ) -> Result<Vec<Variant>, StoreError>;

    /// Inserts an assignment unless one exists, returning the persisted row.
    ///
    /// The returned assignment may name a different variant than
    /// `variant_key` when a concurrent writer inserted first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VariantNotFound`] when the key does not belong to
    /// the experiment, [`StoreError::AssignmentNotFound`] when a conflicting
    /// row cannot be read back, or another [`StoreError`] on failure.
    fn persist_assignment(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
        user_id: &UserId,
        variant_key: &VariantKey,
    ) -> Result<Assignment, StoreError>;

    /// Reports store readiness for the readiness endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
