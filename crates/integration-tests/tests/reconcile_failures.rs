//! Failure handling during repairs.
//!
//! A repair that cannot finish safely must leave the stale record in place.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use freightdesk_core::{Document, FieldValue, Fields, UserKey};
use freightdesk_integration_tests::{Fixture, ORDERS, USERS, fields};
use freightdesk_reconcile::store::{Fault, StoreCall};
use freightdesk_reconcile::{
    AssumeYes, CollectionConfig, DocumentStore, IdentityStore, KeyShape, MemoryStore,
    ReconcileError, Reconciler, RepairState, ScriptedOperator, StoreError,
};

// =============================================================================
// Operator Decisions
// =============================================================================

#[tokio::test]
async fn test_declined_candidate_is_untouched() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH1")])
        .await
        .user("u2", &[("authId", "AUTH2")])
        .await
        .order("o1", "u1")
        .await
        .order("o2", "u2")
        .await
        .reconciler(ScriptedOperator::new().confirming([false, true]));

    let summary = reconciler.fix_mismatches().await.unwrap();
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.fixed(), 1);

    let users = reconciler.identity().store().snapshot(USERS).await;
    assert!(users.contains_key("u1"));
    assert!(!users.contains_key("AUTH1"));
    assert!(users.contains_key("AUTH2"));
    let orders = reconciler.identity().store().snapshot(ORDERS).await;
    assert_eq!(orders["o1"]["userRef"].as_str(), Some("u1"));
    assert_eq!(orders["o2"]["userRef"].as_str(), Some("AUTH2"));
}

// =============================================================================
// Store Failures
// =============================================================================

#[tokio::test]
async fn test_unavailable_store_during_repoint_never_deletes() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH1")])
        .await
        .order("o1", "u1")
        .await
        .reconciler(AssumeYes);
    reconciler
        .identity()
        .store()
        .fail(Fault::query(ORDERS), StoreError::Unavailable("connection reset".into()))
        .await;

    let summary = reconciler.fix_mismatches().await.unwrap();
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.outcomes[0].state, RepairState::Failed);

    let journal = reconciler.identity().store().journal().await;
    assert!(!journal.iter().any(|c| matches!(c, StoreCall::Delete { .. })));
    assert!(reconciler.identity().store().snapshot(USERS).await.contains_key("u1"));
}

#[tokio::test]
async fn test_missing_orders_collection_never_deletes() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH1")])
        .await
        .order("o1", "u1")
        .await
        .reconciler(AssumeYes);
    reconciler
        .identity()
        .store()
        .fail(
            Fault::query(ORDERS),
            StoreError::Api {
                status: 404,
                message: "The database (ordrs) does not exist for project freightdesk-prod".into(),
            },
        )
        .await;

    let summary = reconciler.fix_mismatches().await.unwrap();
    assert_eq!(summary.failed(), 1);
    assert!(summary.outcomes[0].repoint.is_none());

    let journal = reconciler.identity().store().journal().await;
    assert!(!journal.iter().any(|c| matches!(c, StoreCall::Delete { .. })));
    assert!(reconciler.identity().store().snapshot(USERS).await.contains_key("u1"));
}

#[tokio::test]
async fn test_failed_target_write_stops_before_repoint() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH1")])
        .await
        .order("o1", "u1")
        .await
        .reconciler(AssumeYes);
    reconciler
        .identity()
        .store()
        .fail(Fault::put(USERS, "AUTH1"), StoreError::Unavailable("timeout".into()))
        .await;

    let summary = reconciler.fix_mismatches().await.unwrap();
    let outcome = &summary.outcomes[0];
    assert_eq!(
        outcome.trail[outcome.trail.len() - 2..],
        [RepairState::Merging, RepairState::Failed]
    );
    let orders = reconciler.identity().store().snapshot(ORDERS).await;
    assert_eq!(orders["o1"]["userRef"].as_str(), Some("u1"));
}

#[tokio::test]
async fn test_rerun_finishes_partial_repoint() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH1")])
        .await
        .order("o1", "u1")
        .await
        .order("o2", "u1")
        .await
        .reconciler(ScriptedOperator::new().confirming([true, false, true]));
    reconciler
        .identity()
        .store()
        .fail(
            Fault::put(ORDERS, "o2"),
            StoreError::Api {
                status: 400,
                message: "invalid argument".into(),
            },
        )
        .await;

    let first = reconciler.fix_mismatches().await.unwrap();
    assert_eq!(first.failed(), 1);
    assert!(reconciler.identity().store().snapshot(USERS).await.contains_key("u1"));

    reconciler.identity().store().clear_faults().await;
    let second = reconciler.fix_mismatches().await.unwrap();
    assert_eq!(second.fixed(), 1);
    let repoint = second.outcomes[0].repoint.as_ref().unwrap();
    assert_eq!(repoint.updated.len(), 1);

    let orders = reconciler.identity().store().snapshot(ORDERS).await;
    assert!(orders.values().all(|o| o["userRef"].as_str() == Some("AUTH1")));
    assert!(!reconciler.identity().store().snapshot(USERS).await.contains_key("u1"));
}

#[tokio::test]
async fn test_detection_failure_is_an_error() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH1")])
        .await
        .reconciler(AssumeYes);
    reconciler
        .identity()
        .store()
        .fail(Fault::list(USERS), StoreError::Unavailable("offline".into()))
        .await;

    let err = reconciler.fix_mismatches().await.unwrap_err();
    assert!(matches!(err, ReconcileError::Store(ref e) if e.is_unavailable()));
}

// =============================================================================
// Concurrent Modification
// =============================================================================

/// Rewrites a user record behind the reconciler's back on the first order
/// write, as another client editing the profile mid-repair would.
struct ConcurrentEdit {
    inner: MemoryStore,
    user: &'static str,
    fired: AtomicBool,
}

#[async_trait]
impl DocumentStore for ConcurrentEdit {
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.inner.list(collection).await
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, key).await
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        fields: &Fields,
        merge: bool,
    ) -> Result<(), StoreError> {
        self.inner.put(collection, key, fields, merge).await
    }

    async fn update(&self, collection: &str, key: &str, fields: &Fields) -> Result<bool, StoreError> {
        if collection == ORDERS && !self.fired.swap(true, Ordering::SeqCst) {
            let edit = Fields::from([("phone".to_owned(), FieldValue::from("555-0199"))]);
            self.inner.update(USERS, self.user, &edit).await?;
        }
        self.inner.update(collection, key, fields).await
    }

    async fn delete(
        &self,
        collection: &str,
        key: &str,
        expected_version: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.delete(collection, key, expected_version).await
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.query_eq(collection, field, value).await
    }
}

#[tokio::test]
async fn test_concurrent_edit_blocks_delete() {
    let inner = MemoryStore::new();
    inner.insert(USERS, "u1", fields(&[("authId", "AUTH1")])).await;
    inner.insert(ORDERS, "o1", fields(&[("userRef", "u1")])).await;
    let store = ConcurrentEdit {
        inner,
        user: "u1",
        fired: AtomicBool::new(false),
    };

    let mut reconciler = Reconciler::new(
        IdentityStore::new(store, CollectionConfig::default()),
        AssumeYes,
        KeyShape::default(),
    );
    let summary = reconciler.fix_mismatches().await.unwrap();

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.state, RepairState::Failed);
    assert_eq!(outcome.trail[outcome.trail.len() - 2], RepairState::Deleting);

    // The edited stale record is kept for review, the new record is live
    let users = reconciler.identity().store().inner.snapshot(USERS).await;
    assert_eq!(users["u1"]["phone"].as_str(), Some("555-0199"));
    assert!(users.contains_key("AUTH1"));
}

// =============================================================================
// Manual Repoint
// =============================================================================

#[tokio::test]
async fn test_manual_repoint_refuses_unknown_users() {
    let mut reconciler = Fixture::new()
        .user("AUTH1", &[("authId", "AUTH1")])
        .await
        .order("o1", "ghost")
        .await
        .reconciler(AssumeYes);

    let err = reconciler
        .repoint(&UserKey::new("ghost"), &UserKey::new("AUTH1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::DanglingSource(_)));

    let err = reconciler
        .repoint(&UserKey::new("AUTH1"), &UserKey::new("nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::TargetMissing(_)));

    let orders = reconciler.identity().store().snapshot(ORDERS).await;
    assert_eq!(orders["o1"]["userRef"].as_str(), Some("ghost"));
}
