// crates/sticky-assign-config/src/lib.rs
// ============================================================================
// Module: Sticky Assign Config Library
// Description: Configuration model, environment overrides, and validation.
// Purpose: Single source of truth for sticky-assign.toml semantics.
// Dependencies: sticky-assign-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `sticky-assign-config` defines the configuration model for the Sticky
//! Assign service: listen address, request limits, and the `SQLite` store.
//! Loading is strict and fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
