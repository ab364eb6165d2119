// crates/sticky-assign-store-sqlite/src/lib.rs
// ============================================================================
// Module: Sticky Assign SQLite Store Library
// Description: SQLite-backed assignment store.
// Purpose: Expose the durable AssignmentStore implementation and its config.
// Dependencies: sticky-assign-core, rusqlite
// ============================================================================

//! ## Overview
//! Durable [`sticky_assign_core::AssignmentStore`] on `SQLite`. Writes are
//! serialized through one writer thread; reads use a small connection pool.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteAssignmentStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
