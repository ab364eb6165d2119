// crates/sticky-assign-core/src/runtime/store.rs
// ============================================================================
// Module: Sticky Assign In-Memory Store
// Description: In-memory assignment store and shared store wrapper.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryAssignmentStore`] implements [`AssignmentStore`] for tests and
//! local demos; it is not intended for production use. A single mutex is the
//! writer, so insert-or-fetch is trivially serialized.
//! [`SharedAssignmentStore`] wraps any store behind an `Arc` trait object.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::Assignment;
use crate::core::ExperimentId;
use crate::core::RequestDeadline;
use crate::core::UserId;
use crate::core::Variant;
use crate::core::VariantKey;
use crate::interfaces::AssignmentStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Variant row with its store-assigned identifier.
#[derive(Debug, Clone)]
struct StoredVariant {
    /// Store-assigned variant identifier.
    id: u64,
    /// Variant record.
    variant: Variant,
}

/// Mutable state behind the in-memory store mutex.
#[derive(Debug, Default)]
struct InMemoryState {
    /// Variants per experiment in creation order.
    variants: BTreeMap<ExperimentId, Vec<StoredVariant>>,
    /// Variant identifier per (experiment, user).
    assignments: BTreeMap<(ExperimentId, UserId), u64>,
    /// Next variant identifier.
    next_variant_id: u64,
}

impl InMemoryState {
    /// Resolves an assignment row to its variant key.
    fn assignment_for(&self, experiment_id: &ExperimentId, user_id: &UserId) -> Option<Assignment> {
        let variant_id =
            self.assignments.get(&(experiment_id.clone(), user_id.clone())).copied()?;
        let stored = self
            .variants
            .get(experiment_id)?
            .iter()
            .find(|stored| stored.id == variant_id)?;
        Some(Assignment::new(experiment_id.clone(), user_id.clone(), stored.variant.key.clone()))
    }
}

/// In-memory assignment store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAssignmentStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryAssignmentStore {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a variant to an experiment, preserving insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store mutex is poisoned.
    pub fn seed_variant(
        &self,
        experiment_id: impl Into<ExperimentId>,
        variant: Variant,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.next_variant_id = guard.next_variant_id.saturating_add(1);
        let id = guard.next_variant_id;
        guard.variants.entry(experiment_id.into()).or_default().push(StoredVariant {
            id,
            variant,
        });
        Ok(())
    }

    /// Returns the number of persisted assignments.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store mutex is poisoned.
    pub fn assignment_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.assignments.len())
    }

    /// Locks the store state.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Io("assignment store mutex poisoned".to_string()))
    }
}

impl AssignmentStore for InMemoryAssignmentStore {
    fn get_assignment(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
        user_id: &UserId,
    ) -> Result<Option<Assignment>, StoreError> {
        ensure_not_expired(deadline)?;
        Ok(self.lock()?.assignment_for(experiment_id, user_id))
    }

    fn list_variants(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
    ) -> Result<Vec<Variant>, StoreError> {
        ensure_not_expired(deadline)?;
        let guard = self.lock()?;
        Ok(guard
            .variants
            .get(experiment_id)
            .map(|stored| stored.iter().map(|entry| entry.variant.clone()).collect())
            .unwrap_or_default())
    }

    fn persist_assignment(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
        user_id: &UserId,
        variant_key: &VariantKey,
    ) -> Result<Assignment, StoreError> {
        ensure_not_expired(deadline)?;
        let mut guard = self.lock()?;
        let variant_id = guard
            .variants
            .get(experiment_id)
            .and_then(|stored| stored.iter().find(|entry| &entry.variant.key == variant_key))
            .map(|entry| entry.id)
            .ok_or_else(|| StoreError::VariantNotFound {
                experiment_id: experiment_id.clone(),
                variant_key: variant_key.clone(),
            })?;
        let natural_key = (experiment_id.clone(), user_id.clone());
        if guard.assignments.contains_key(&natural_key) {
            return guard.assignment_for(experiment_id, user_id).ok_or_else(|| {
                StoreError::AssignmentNotFound {
                    experiment_id: experiment_id.clone(),
                    user_id: user_id.clone(),
                }
            });
        }
        guard.assignments.insert(natural_key, variant_id);
        drop(guard);
        Ok(Assignment::new(experiment_id.clone(), user_id.clone(), variant_key.clone()))
    }
}

/// Rejects operations whose deadline already passed.
fn ensure_not_expired(deadline: &RequestDeadline) -> Result<(), StoreError> {
    if deadline.is_expired() {
        return Err(StoreError::Cancelled("request deadline exceeded".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Shared Store
// ============================================================================

/// Shared assignment store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedAssignmentStore {
    /// Inner store implementation.
    inner: Arc<dyn AssignmentStore + Send + Sync>,
}

impl SharedAssignmentStore {
    /// Wraps an assignment store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl AssignmentStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn AssignmentStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl AssignmentStore for SharedAssignmentStore {
    fn get_assignment(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
        user_id: &UserId,
    ) -> Result<Option<Assignment>, StoreError> {
        self.inner.get_assignment(deadline, experiment_id, user_id)
    }

    fn list_variants(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
    ) -> Result<Vec<Variant>, StoreError> {
        self.inner.list_variants(deadline, experiment_id)
    }

    fn persist_assignment(
        &self,
        deadline: &RequestDeadline,
        experiment_id: &ExperimentId,
        user_id: &UserId,
        variant_key: &VariantKey,
    ) -> Result<Assignment, StoreError> {
        self.inner.persist_assignment(deadline, experiment_id, user_id, variant_key)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::time::Instant;

    use super::InMemoryAssignmentStore;
    use crate::core::ExperimentId;
    use crate::core::RequestDeadline;
    use crate::core::UserId;
    use crate::core::Variant;
    use crate::core::VariantKey;
    use crate::interfaces::AssignmentStore;
    use crate::interfaces::StoreError;

    fn seeded() -> InMemoryAssignmentStore {
        let store = InMemoryAssignmentStore::new();
        store.seed_variant("exp", Variant::new("A", 50)).unwrap();
        store.seed_variant("exp", Variant::new("B", 50)).unwrap();
        store
    }

    #[test]
    fn list_variants_preserves_creation_order() {
        let store = seeded();
        let variants =
            store.list_variants(&RequestDeadline::unbounded(), &ExperimentId::new("exp")).unwrap();
        let keys: Vec<&str> = variants.iter().map(|variant| variant.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn persist_returns_first_writer() {
        let store = seeded();
        let deadline = RequestDeadline::unbounded();
        let exp = ExperimentId::new("exp");
        let user = UserId::new("u1");
        let first = store.persist_assignment(&deadline, &exp, &user, &VariantKey::new("A")).unwrap();
        let second =
            store.persist_assignment(&deadline, &exp, &user, &VariantKey::new("B")).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.variant_key.as_str(), "A");
        assert_eq!(store.assignment_count().unwrap(), 1);
    }

    #[test]
    fn persist_rejects_unknown_variant() {
        let store = seeded();
        let err = store
            .persist_assignment(
                &RequestDeadline::unbounded(),
                &ExperimentId::new("exp"),
                &UserId::new("u1"),
                &VariantKey::new("Z"),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::VariantNotFound { .. }));
    }

    #[test]
    fn expired_deadline_cancels() {
        let store = seeded();
        let err = store
            .get_assignment(
                &RequestDeadline::at(Instant::now()),
                &ExperimentId::new("exp"),
                &UserId::new("u1"),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled(_)));
    }
}
