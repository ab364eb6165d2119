// crates/sticky-assign-core/src/runtime/bucketing.rs
// ============================================================================
// Module: Sticky Assign Bucketing Engine
// Description: Deterministic weighted variant selection.
// Purpose: Map (experiment, user, variants) onto one variant key without I/O.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Bucketing hashes `"{experiment_id}:{user_id}"` with FNV-1a 64-bit and maps
//! the hash into `[0, total_weight)`. Each usable variant owns a contiguous
//! band of that range, sized by its weight, in list order.
//!
//! The hash is a frozen contract: changing the algorithm, its constants, or
//! the key layout reassigns every user that has not been persisted yet.
//! Variant order is part of the input as well, so callers must pass variants
//! in a stable order (creation order).
//!
//! Duplicate keys are not merged; each occurrence claims its own band.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Assignment;
use crate::core::ErrorKind;
use crate::core::ExperimentId;
use crate::core::UserId;
use crate::core::Variant;
use crate::core::VariantKey;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
/// Separator between experiment and user identifiers in the hash key.
const KEY_SEPARATOR: u8 = b':';

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bucketing failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BucketingError {
    /// Experiment or user identifier is blank.
    #[error("experimentId and userId must be provided")]
    InvalidMetadata,
    /// No variant survived filtering.
    #[error("at least one variant with a key and positive weight is required")]
    NoVariants,
    /// Total weight of the usable variants is not positive.
    #[error("total variant weight must be positive")]
    NoWeightedSpace,
    /// The band walk found no match; weight accounting is broken.
    #[error("failed to pick variant for experiment {experiment_id}")]
    Unmatched {
        /// Experiment being bucketed.
        experiment_id: ExperimentId,
    },
}

impl BucketingError {
    /// Returns the caller-visible category for the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMetadata => ErrorKind::Validation,
            Self::NoVariants | Self::NoWeightedSpace => ErrorKind::Unprocessable,
            Self::Unmatched {
                ..
            } => ErrorKind::Infrastructure,
        }
    }
}

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Computes FNV-1a 64-bit over raw bytes.
#[must_use]
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| fnv1a_step(hash, *byte))
}

/// Computes the bucketing hash for an (experiment, user) pair.
///
/// Equivalent to [`fnv1a64`] over `"{experiment_id}:{user_id}"` without
/// allocating the joined key.
#[must_use]
pub fn stable_hash(experiment_id: &str, user_id: &str) -> u64 {
    experiment_id
        .bytes()
        .chain(std::iter::once(KEY_SEPARATOR))
        .chain(user_id.bytes())
        .fold(FNV_OFFSET_BASIS, fnv1a_step)
}

/// Applies one FNV-1a round.
fn fnv1a_step(hash: u64, byte: u8) -> u64 {
    (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Deterministically assigns a user to one of the provided variants.
///
/// Identifiers and keys are trimmed; blank keys and non-positive weights are
/// skipped.
///
/// # Errors
///
/// Returns [`BucketingError`] when identifiers are blank, no usable variant
/// remains, or the band walk fails.
pub fn assign_variant(
    experiment_id: &str,
    user_id: &str,
    variants: &[Variant],
) -> Result<Assignment, BucketingError> {
    let experiment_id =
        ExperimentId::normalized(experiment_id).ok_or(BucketingError::InvalidMetadata)?;
    let user_id = UserId::normalized(user_id).ok_or(BucketingError::InvalidMetadata)?;

    let bands: Vec<(&str, u128)> = variants.iter().filter_map(usable_band).collect();
    if bands.is_empty() {
        return Err(BucketingError::NoVariants);
    }
    // Cannot overflow: each weight is below 2^63.
    let total_weight: u128 = bands.iter().map(|(_, weight)| weight).sum();
    if total_weight == 0 {
        return Err(BucketingError::NoWeightedSpace);
    }

    let pick = u128::from(stable_hash(experiment_id.as_str(), user_id.as_str())) % total_weight;
    let mut upper_bound: u128 = 0;
    for (key, weight) in bands {
        upper_bound += weight;
        if pick < upper_bound {
            return Ok(Assignment::new(experiment_id, user_id, VariantKey::new(key)));
        }
    }
    Err(BucketingError::Unmatched {
        experiment_id,
    })
}

/// Returns the trimmed key and weight when the variant may claim a band.
fn usable_band(variant: &Variant) -> Option<(&str, u128)> {
    let key = variant.key.as_str().trim();
    if key.is_empty() {
        return None;
    }
    let weight = u64::try_from(variant.weight).ok().filter(|weight| *weight > 0)?;
    Some((key, u128::from(weight)))
}

// ============================================================================
// SECTION: Selector
// ============================================================================

/// Variant selection strategy used by the orchestrator.
pub trait VariantSelector {
    /// Selects a variant for the pair.
    ///
    /// # Errors
    ///
    /// Returns [`BucketingError`] when no variant can be selected.
    fn select(
        &self,
        experiment_id: &ExperimentId,
        user_id: &UserId,
        variants: &[Variant],
    ) -> Result<Assignment, BucketingError>;
}

/// Default selector: FNV-1a weighted bands via [`assign_variant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedFnvSelector;

impl VariantSelector for WeightedFnvSelector {
    fn select(
        &self,
        experiment_id: &ExperimentId,
        user_id: &UserId,
        variants: &[Variant],
    ) -> Result<Assignment, BucketingError> {
        assign_variant(experiment_id.as_str(), user_id.as_str(), variants)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only assertions."
    )]

    use super::BucketingError;
    use super::FNV_OFFSET_BASIS;
    use super::assign_variant;
    use super::fnv1a64;
    use super::stable_hash;
    use crate::core::Variant;

    #[test]
    fn fnv1a64_matches_reference_vectors() {
        assert_eq!(fnv1a64(b""), FNV_OFFSET_BASIS);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a64(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn stable_hash_joins_with_colon() {
        assert_eq!(stable_hash("exp1", "u1"), fnv1a64(b"exp1:u1"));
        assert_ne!(stable_hash("exp1", "u1"), stable_hash("exp1u", "1"));
    }

    #[test]
    fn blank_identifiers_are_invalid() {
        let variants = vec![Variant::new("A", 1)];
        assert_eq!(assign_variant("", "u", &variants), Err(BucketingError::InvalidMetadata));
        assert_eq!(assign_variant("e", "", &variants), Err(BucketingError::InvalidMetadata));
        assert_eq!(assign_variant("  ", "u", &variants), Err(BucketingError::InvalidMetadata));
    }

    #[test]
    fn empty_or_filtered_variants_fail() {
        assert_eq!(assign_variant("e", "u", &[]), Err(BucketingError::NoVariants));
        assert_eq!(
            assign_variant("e", "u", &[Variant::new("a", 0)]),
            Err(BucketingError::NoVariants)
        );
        assert_eq!(
            assign_variant("e", "u", &[Variant::new("  ", 10), Variant::new("b", -3)]),
            Err(BucketingError::NoVariants)
        );
    }

    #[test]
    fn single_usable_variant_always_wins() {
        let variants = vec![Variant::new("off", 0), Variant::new("  on  ", 7)];
        for index in 0 .. 50 {
            let user = format!("user-{index}");
            let assignment = assign_variant("exp", &user, &variants).unwrap();
            assert_eq!(assignment.variant_key.as_str(), "on");
        }
    }

    #[test]
    fn identifiers_are_trimmed_in_result() {
        let variants = vec![Variant::new("A", 1)];
        let assignment = assign_variant(" exp1 ", "\tu1\n", &variants).unwrap();
        assert_eq!(assignment.experiment_id.as_str(), "exp1");
        assert_eq!(assignment.user_id.as_str(), "u1");
        assert_eq!(assign_variant("exp1", "u1", &variants).unwrap(), assignment);
    }

    #[test]
    fn pick_follows_weight_bands_in_order() {
        // With a single unit band per variant, the pick index equals hash mod n.
        let variants: Vec<Variant> =
            ["A", "B", "C", "D", "E"].iter().map(|key| Variant::new(*key, 1)).collect();
        for index in 0 .. 100 {
            let user = format!("u{index}");
            let expected = usize::try_from(stable_hash("exp", &user) % 5).unwrap();
            let assignment = assign_variant("exp", &user, &variants).unwrap();
            assert_eq!(assignment.variant_key, variants[expected].key);
        }
    }

    #[test]
    fn duplicate_keys_keep_separate_bands() {
        let variants = vec![Variant::new("A", 1), Variant::new("B", 1), Variant::new("A", 1)];
        let mut a_count = 0_u32;
        for index in 0 .. 3_000 {
            let user = format!("user-{index}");
            if assign_variant("dup", &user, &variants).unwrap().variant_key.as_str() == "A" {
                a_count += 1;
            }
        }
        // "A" owns two of three bands.
        assert!((1_800 .. 2_200).contains(&a_count), "A selected {a_count} times");
    }

    #[test]
    fn large_weights_do_not_overflow() {
        let variants = vec![Variant::new("A", i64::MAX), Variant::new("B", i64::MAX)];
        let assignment = assign_variant("exp", "u", &variants).unwrap();
        assert!(["A", "B"].contains(&assignment.variant_key.as_str()));
    }
}
