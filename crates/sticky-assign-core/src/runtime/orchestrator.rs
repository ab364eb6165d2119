// crates/sticky-assign-core/src/runtime/orchestrator.rs
// ============================================================================
// Module: Sticky Assign Orchestrator
// Description: Get-or-create sticky assignments over an assignment store.
// Purpose: Compose lookup, bucketing, and insert-or-fetch into one operation.
// Dependencies: crate::core, crate::interfaces, crate::runtime, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`AssignmentService::assign`] resolves a sticky assignment:
//!
//! 1. Normalize identifiers; blanks fail before any store call.
//! 2. Return an existing assignment without bucketing.
//! 3. Otherwise list variants and bucket the pair.
//! 4. Persist through insert-or-fetch and return whatever the store kept.
//!
//! Step 4 may return a variant other than the bucketed one when a concurrent
//! request for the same pair committed first. The service is synchronous;
//! async transports run it on a blocking pool.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::core::Assignment;
use crate::core::ErrorKind;
use crate::core::ExperimentId;
use crate::core::RequestDeadline;
use crate::core::UserId;
use crate::core::Variant;
use crate::interfaces::AssignmentStore;
use crate::interfaces::StoreError;
use crate::runtime::bucketing::BucketingError;
use crate::runtime::bucketing::VariantSelector;
use crate::runtime::bucketing::WeightedFnvSelector;
use crate::runtime::store::SharedAssignmentStore;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Assignment orchestration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssignError {
    /// Experiment or user identifier is blank.
    #[error("experimentId and userId must be provided")]
    InvalidMetadata,
    /// The experiment has no variants.
    #[error("no variants configured for experiment {experiment_id}")]
    NoVariantsConfigured {
        /// Experiment that was looked up.
        experiment_id: ExperimentId,
    },
    /// Bucketing failed.
    #[error(transparent)]
    Bucketing(#[from] BucketingError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AssignError {
    /// Returns the caller-visible category for the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMetadata => ErrorKind::Validation,
            Self::NoVariantsConfigured {
                ..
            } => ErrorKind::Unprocessable,
            Self::Bucketing(err) => err.kind(),
            Self::Store(err) => err.kind(),
        }
    }
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// How an assignment was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// A persisted assignment was found before bucketing.
    Existing,
    /// The pair was bucketed and persisted (or lost a race to a peer).
    Bucketed,
}

/// Result of [`AssignmentService::assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentDecision {
    /// Persisted assignment.
    pub assignment: Assignment,
    /// Resolution path.
    pub source: AssignmentSource,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Sticky assignment orchestrator.
#[derive(Clone)]
pub struct AssignmentService<S = WeightedFnvSelector> {
    /// Backing store.
    store: SharedAssignmentStore,
    /// Variant selection strategy.
    selector: S,
}

impl AssignmentService<WeightedFnvSelector> {
    /// Creates a service using FNV-1a weighted bucketing.
    #[must_use]
    pub const fn new(store: SharedAssignmentStore) -> Self {
        Self {
            store,
            selector: WeightedFnvSelector,
        }
    }
}

impl<S: VariantSelector> AssignmentService<S> {
    /// Creates a service with a custom selector.
    #[must_use]
    pub const fn with_selector(store: SharedAssignmentStore, selector: S) -> Self {
        Self {
            store,
            selector,
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &SharedAssignmentStore {
        &self.store
    }

    /// Returns the sticky assignment for the pair, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AssignError`] when identifiers are blank, the experiment has
    /// no usable variants, or the store fails.
    pub fn assign(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &str,
        user_id: &str,
    ) -> Result<AssignmentDecision, AssignError> {
        let (experiment_id, user_id) = normalize_pair(experiment_id, user_id)?;

        if let Some(assignment) = self.store.get_assignment(deadline, &experiment_id, &user_id)? {
            return Ok(AssignmentDecision {
                assignment,
                source: AssignmentSource::Existing,
            });
        }

        let variants = self.store.list_variants(deadline, &experiment_id)?;
        if variants.is_empty() {
            return Err(AssignError::NoVariantsConfigured {
                experiment_id,
            });
        }

        let proposed = self.selector.select(&experiment_id, &user_id, &variants)?;
        let persisted = self.store.persist_assignment(
            deadline,
            &experiment_id,
            &user_id,
            &proposed.variant_key,
        )?;
        if persisted.variant_key != proposed.variant_key {
            tracing::debug!(
                experiment_id = %experiment_id,
                user_id = %user_id,
                proposed = %proposed.variant_key,
                persisted = %persisted.variant_key,
                "concurrent assignment won; returning persisted variant"
            );
        }
        Ok(AssignmentDecision {
            assignment: persisted,
            source: AssignmentSource::Bucketed,
        })
    }

    /// Returns the persisted assignment for the pair without creating one.
    ///
    /// # Errors
    ///
    /// Returns [`AssignError`] when identifiers are blank or the store fails.
    pub fn lookup(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &str,
        user_id: &str,
    ) -> Result<Option<Assignment>, AssignError> {
        let (experiment_id, user_id) = normalize_pair(experiment_id, user_id)?;
        Ok(self.store.get_assignment(deadline, &experiment_id, &user_id)?)
    }

    /// Lists the variants of an experiment in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`AssignError`] when the identifier is blank or the store fails.
    pub fn variants(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &str,
    ) -> Result<(ExperimentId, Vec<Variant>), AssignError> {
        let experiment_id =
            ExperimentId::normalized(experiment_id).ok_or(AssignError::InvalidMetadata)?;
        let variants = self.store.list_variants(deadline, &experiment_id)?;
        Ok((experiment_id, variants))
    }
}

/// Trims both identifiers and rejects blanks.
fn normalize_pair(experiment_id: &str, user_id: &str) -> Result<(ExperimentId, UserId), AssignError> {
    let experiment_id =
        ExperimentId::normalized(experiment_id).ok_or(AssignError::InvalidMetadata)?;
    let user_id = UserId::normalized(user_id).ok_or(AssignError::InvalidMetadata)?;
    Ok((experiment_id, user_id))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
