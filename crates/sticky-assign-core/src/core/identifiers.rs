// crates/sticky-assign-core/src/core/identifiers.rs
// ============================================================================
// Module: Sticky Assign Identifiers
// Description: Opaque identifiers for experiments, users, and variants.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque UTF-8 strings that serialize transparently. They do
//! not normalize on construction; trimming happens once at the orchestrator
//! boundary via [`ExperimentId::normalized`] and friends so stored keys and
//! hashed keys always agree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Experiment identifier.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization is applied by [`ExperimentId::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Creates a new experiment identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns a trimmed identifier, or `None` when nothing remains.
    #[must_use]
    pub fn normalized(raw: &str) -> Option<Self> {
        non_blank(raw).map(Self::new)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ExperimentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExperimentId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// User identifier scoped to an experiment assignment.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization is applied by [`UserId::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new user identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns a trimmed identifier, or `None` when nothing remains.
    #[must_use]
    pub fn normalized(raw: &str) -> Option<Self> {
        non_blank(raw).map(Self::new)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Variant key naming one arm of an experiment.
///
/// # Invariants
/// - Opaque UTF-8 string; keys produced by bucketing are already trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantKey(String);

impl VariantKey {
    /// Creates a new variant key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for VariantKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VariantKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Trims surrounding whitespace and rejects empty results.
fn non_blank(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
