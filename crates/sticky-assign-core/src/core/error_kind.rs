// crates/sticky-assign-core/src/core/error_kind.rs
// ============================================================================
// Module: Sticky Assign Error Kinds
// Description: Caller-visible failure categories.
// Purpose: Let transports map failures to precise status codes by kind.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every error raised by the core reports one [`ErrorKind`]. Transports switch
//! on the kind, never on message text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// SECTION: Error Kind
// ============================================================================

/// Failure category exposed to callers.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed identifiers supplied by the caller.
    Validation,
    /// Well-formed request with no viable assignment target.
    Unprocessable,
    /// Storage failure or violated internal invariant.
    Infrastructure,
}

impl ErrorKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Unprocessable => "unprocessable",
            Self::Infrastructure => "infrastructure",
        }
    }
}
