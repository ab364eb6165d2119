// crates/sticky-assign-core/tests/sticky_concurrency.rs
// ============================================================================
// Module: Sticky Assignment Concurrency Tests
// Description: Concurrent first-requests converge on one assignment.
// ============================================================================
//! ## Overview
//! Spawns many threads that request the same pair at once through the
//! in-memory store and checks that all of them observe the same variant.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use sticky_assign_core::AssignmentService;
use sticky_assign_core::AssignmentSource;
use sticky_assign_core::InMemoryAssignmentStore;
use sticky_assign_core::RequestDeadline;
use sticky_assign_core::SharedAssignmentStore;
use sticky_assign_core::Variant;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn concurrent_first_requests_agree() {
    let store = InMemoryAssignmentStore::new();
    store.seed_variant("exp1", Variant::new("A", 50)).unwrap();
    store.seed_variant("exp1", Variant::new("B", 50)).unwrap();
    let service = Arc::new(AssignmentService::new(SharedAssignmentStore::from_store(store.clone())));

    let workers = 16;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0 .. workers)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.assign(&RequestDeadline::unbounded(), "exp1", "shared-user").unwrap()
            })
        })
        .collect();
    let decisions: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    let first = &decisions[0].assignment;
    assert!(decisions.iter().all(|decision| &decision.assignment == first));
    assert_eq!(store.assignment_count().unwrap(), 1);

    let again = service.assign(&RequestDeadline::unbounded(), "exp1", "shared-user").unwrap();
    assert_eq!(again.source, AssignmentSource::Existing);
    assert_eq!(&again.assignment, first);
}

#[test]
fn distinct_users_get_independent_rows() {
    let store = InMemoryAssignmentStore::new();
    store.seed_variant("exp1", Variant::new("A", 1)).unwrap();
    let service = AssignmentService::new(SharedAssignmentStore::from_store(store.clone()));
    for index in 0 .. 25 {
        let user = format!("user-{index}");
        let decision = service.assign(&RequestDeadline::unbounded(), "exp1", &user).unwrap();
        assert_eq!(decision.assignment.variant_key.as_str(), "A");
    }
    assert_eq!(store.assignment_count().unwrap(), 25);
}
