// crates/sticky-assign-core/src/core/deadline.rs
// ============================================================================
// Module: Sticky Assign Request Deadlines
// Description: Per-request deadline carried into every store operation.
// Purpose: Bound how long a request may wait on storage.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`RequestDeadline`] is the cancellation signal passed to every
//! [`crate::AssignmentStore`] call. Stores check it before starting work and
//! stop waiting once it passes; work already handed to the writer still runs
//! to completion or rolls back as a unit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Deadline
// ============================================================================

/// Point in time after which a request is abandoned.
///
/// # Invariants
/// - `None` means the request never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestDeadline {
    /// Expiry instant, if any.
    expires_at: Option<Instant>,
}

impl RequestDeadline {
    /// Returns a deadline that never expires.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            expires_at: None,
        }
    }

    /// Returns a deadline expiring at the provided instant.
    #[must_use]
    pub const fn at(expires_at: Instant) -> Self {
        Self {
            expires_at: Some(expires_at),
        }
    }

    /// Returns a deadline expiring `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Instant::now()
            .checked_add(timeout)
            .map_or_else(Self::unbounded, Self::at)
    }

    /// Returns true once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Instant::now() >= expires_at)
    }

    /// Returns the time left, or `None` for unbounded deadlines.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at.map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
