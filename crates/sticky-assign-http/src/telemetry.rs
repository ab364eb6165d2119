// crates/sticky-assign-http/src/telemetry.rs
// ============================================================================
// Module: Sticky Assign HTTP Telemetry
// Description: Metric hooks for HTTP routes.
// Purpose: Provide request events and latency buckets without a metrics backend.
// Dependencies: sticky-assign-core
// ============================================================================

//! ## Overview
//! A thin metrics interface for request counters and latency histograms.
//! Deployments plug in their own backend by implementing [`AssignMetrics`].
//! Labels never carry experiment or user identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use axum::http::StatusCode;
use sticky_assign_core::AssignmentSource;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
pub const ASSIGN_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Route classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AssignRoute {
    /// `GET /ready`.
    Ready,
    /// `POST /assign`.
    Assign,
    /// `GET /experiments/{experimentId}/variants`.
    Variants,
    /// `GET /experiments/{experimentId}/assignments/{userId}`.
    Lookup,
}

impl AssignRoute {
    /// Returns a stable label for the route.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Assign => "assign",
            Self::Variants => "variants",
            Self::Lookup => "lookup",
        }
    }
}

/// Request outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AssignOutcome {
    /// 2xx response.
    Ok,
    /// 4xx response.
    Rejected,
    /// 5xx response.
    Failed,
}

impl AssignOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    /// Classifies a response status.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_server_error() {
            Self::Failed
        } else if status.is_client_error() {
            Self::Rejected
        } else {
            Self::Ok
        }
    }
}

/// Request metric event payload.
///
/// # Invariants
/// - Optional fields are `None` when the metadata is unavailable.
#[derive(Debug, Clone)]
pub struct AssignMetricEvent {
    /// Route that served the request.
    pub route: AssignRoute,
    /// Request outcome.
    pub outcome: AssignOutcome,
    /// HTTP status code returned.
    pub status: u16,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// How the assignment was resolved (assign route only).
    pub source: Option<AssignmentSource>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for HTTP requests and latencies.
pub trait AssignMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: AssignMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: AssignMetricEvent, latency: Duration);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl AssignMetrics for NoopMetrics {
    fn record_request(&self, _event: AssignMetricEvent) {}

    fn record_latency(&self, _event: AssignMetricEvent, _latency: Duration) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
