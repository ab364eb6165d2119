// crates/sticky-assign-core/src/core/model.rs
// ============================================================================
// Module: Sticky Assign Records
// Description: Variant and assignment records shared across crates.
// Purpose: Define the wire and storage shape of experiment arms and bindings.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Variant`] is one weighted arm of an experiment. An [`Assignment`] is the
//! permanent binding of a user to a variant for one experiment; it is created
//! once per (experiment, user) pair and never changes afterwards.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ExperimentId;
use crate::core::identifiers::UserId;
use crate::core::identifiers::VariantKey;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Weighted experiment arm.
///
/// # Invariants
/// - Order within an experiment is creation order and defines weight bands.
/// - Entries with a blank key or a non-positive weight are ignored by bucketing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant key as stored.
    pub key: VariantKey,
    /// Relative weight; only positive weights claim a band.
    pub weight: i64,
}

impl Variant {
    /// Creates a new variant record.
    #[must_use]
    pub fn new(key: impl Into<VariantKey>, weight: i64) -> Self {
        Self {
            key: key.into(),
            weight,
        }
    }
}

/// Sticky binding of a user to a variant within an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Experiment identifier.
    pub experiment_id: ExperimentId,
    /// User identifier.
    pub user_id: UserId,
    /// Assigned variant key.
    pub variant_key: VariantKey,
}

impl Assignment {
    /// Creates a new assignment record.
    #[must_use]
    pub const fn new(experiment_id: ExperimentId, user_id: UserId, variant_key: VariantKey) -> Self {
        Self {
            experiment_id,
            user_id,
            variant_key,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only serialization assertions.")]

    use super::Assignment;

    #[test]
    fn assignment_serializes_camel_case() {
        let assignment = Assignment::new("exp1".into(), "u1".into(), "A".into());
        let json = serde_json::to_string(&assignment).unwrap();
        assert_eq!(json, r#"{"experimentId":"exp1","userId":"u1","variantKey":"A"}"#);
    }
}
