// crates/sticky-assign-http/src/lib.rs
// ============================================================================
// Module: Sticky Assign HTTP Library
// Description: axum transport for sticky assignment.
// Purpose: Expose the HTTP server and its metrics hooks.
// Dependencies: crate::{server, telemetry}
// ============================================================================

//! ## Overview
//! The HTTP crate is a thin shell over [`sticky_assign_core::AssignmentService`]:
//! it parses bounded JSON requests, runs the synchronous service on the
//! blocking pool with a per-request deadline, and maps error kinds to status
//! codes. Storage is opened from [`sticky_assign_config::StickyAssignConfig`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod server;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use server::ServerError;
pub use server::StickyAssignServer;
pub use server::shutdown_signal;
pub use telemetry::AssignMetricEvent;
pub use telemetry::AssignMetrics;
pub use telemetry::AssignOutcome;
pub use telemetry::AssignRoute;
pub use telemetry::NoopMetrics;
