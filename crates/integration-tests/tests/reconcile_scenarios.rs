//! End-to-end mismatch and duplicate repairs.
//!
//! These tests seed an in-memory store, run a full reconciliation with
//! scripted operator answers, and check the resulting users and orders.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use freightdesk_core::{FieldValue, NormalizedEmail, UserKey};
use freightdesk_integration_tests::{AUTH_SHAPED_KEY, Fixture, ORDERS, USERS, fields};
use freightdesk_reconcile::store::StoreCall;
use freightdesk_reconcile::{
    AssumeYes, CanonicalRule, RepairKind, RepairState, ScriptedOperator,
};

// =============================================================================
// Mismatch Repair
// =============================================================================

#[tokio::test]
async fn test_mismatch_moves_user_and_repoints_orders() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH123"), ("email", "a@x.com")])
        .await
        .order("o1", "u1")
        .await
        .reconciler(ScriptedOperator::new().confirming([true]));

    let summary = reconciler.fix_mismatches().await.unwrap();
    assert_eq!(summary.fixed(), 1);
    assert_eq!(summary.failed(), 0);
    assert_eq!(
        summary.outcomes[0].trail,
        vec![
            RepairState::Detected,
            RepairState::ConfirmationPending,
            RepairState::Merging,
            RepairState::Repointing,
            RepairState::Deleting,
            RepairState::Done,
        ]
    );

    let store = reconciler.identity().store();
    let users = store.snapshot(USERS).await;
    assert_eq!(users.len(), 1);
    assert_eq!(users["AUTH123"], fields(&[("authId", "AUTH123"), ("email", "a@x.com")]));

    let orders = store.snapshot(ORDERS).await;
    assert_eq!(orders["o1"]["userRef"].as_str(), Some("AUTH123"));
    // Opaque order fields survive the repoint
    assert_eq!(orders["o1"]["weightKg"], FieldValue::IntegerValue(1200));
}

#[tokio::test]
async fn test_repair_writes_happen_in_order() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH123")])
        .await
        .order("o1", "u1")
        .await
        .order("o2", "u1")
        .await
        .reconciler(AssumeYes);

    reconciler.fix_mismatches().await.unwrap();

    let writes: Vec<StoreCall> = reconciler
        .identity()
        .store()
        .journal()
        .await
        .into_iter()
        .filter(|c| {
            matches!(
                c,
                StoreCall::Put { .. } | StoreCall::Update { .. } | StoreCall::Delete { .. }
            )
        })
        .collect();

    let update = |key: &str| StoreCall::Update {
        collection: ORDERS.to_owned(),
        key: key.to_owned(),
    };
    assert_eq!(
        writes,
        vec![
            StoreCall::Put {
                collection: USERS.to_owned(),
                key: "AUTH123".to_owned(),
                merge: false,
            },
            update("o1"),
            update("o2"),
            StoreCall::Delete {
                collection: USERS.to_owned(),
                key: "u1".to_owned(),
            },
        ]
    );
}

#[tokio::test]
async fn test_second_mismatch_run_is_a_no_op() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH123")])
        .await
        .order("o1", "u1")
        .await
        .reconciler(AssumeYes);

    reconciler.fix_mismatches().await.unwrap();
    let users = reconciler.identity().store().snapshot(USERS).await;
    let orders = reconciler.identity().store().snapshot(ORDERS).await;

    let second = reconciler.fix_mismatches().await.unwrap();
    assert!(second.outcomes.is_empty());
    assert_eq!(reconciler.identity().store().snapshot(USERS).await, users);
    assert_eq!(reconciler.identity().store().snapshot(ORDERS).await, orders);
}

#[tokio::test]
async fn test_mismatch_merges_into_existing_target() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH1"), ("displayName", "Dana")])
        .await
        .user("AUTH1", &[("authId", "AUTH1"), ("phone", "555-0100")])
        .await
        .reconciler(AssumeYes);

    let summary = reconciler.fix_mismatches().await.unwrap();
    assert_eq!(summary.fixed(), 1);

    let users = reconciler.identity().store().snapshot(USERS).await;
    assert_eq!(
        users["AUTH1"],
        fields(&[("authId", "AUTH1"), ("displayName", "Dana"), ("phone", "555-0100")])
    );
}

// =============================================================================
// Duplicate Repair
// =============================================================================

#[tokio::test]
async fn test_duplicate_merges_into_auth_keyed_record() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("email", "a@x.com"), ("company", "Acme Freight")])
        .await
        .user("AUTH1", &[("authId", "AUTH1"), ("email", "a@x.com")])
        .await
        .order("o1", "u1")
        .await
        .reconciler(ScriptedOperator::new().confirming([true]));

    let groups = reconciler.detect().await.unwrap().duplicates;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[&NormalizedEmail::new("a@x.com").unwrap()].len(), 2);

    let summary = reconciler.fix_duplicates().await.unwrap();
    assert_eq!(summary.fixed(), 1);
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.old_key, UserKey::new("u1"));
    assert_eq!(outcome.new_key, UserKey::new("AUTH1"));
    assert!(matches!(
        outcome.kind,
        RepairKind::Duplicate {
            rule: CanonicalRule::KeyedByAuthId,
            ..
        }
    ));

    let users = reconciler.identity().store().snapshot(USERS).await;
    assert_eq!(users.keys().map(String::as_str).collect::<Vec<_>>(), vec!["AUTH1"]);
    assert_eq!(users["AUTH1"]["company"].as_str(), Some("Acme Freight"));
    let orders = reconciler.identity().store().snapshot(ORDERS).await;
    assert_eq!(orders["o1"]["userRef"].as_str(), Some("AUTH1"));
}

#[tokio::test]
async fn test_duplicate_merge_keeps_canonical_auth_id() {
    let mut reconciler = Fixture::new()
        .user("legacy_1", &[("authId", "STALE"), ("email", "B@x.com")])
        .await
        .user(AUTH_SHAPED_KEY, &[("authId", AUTH_SHAPED_KEY), ("email", "b@x.com ")])
        .await
        .reconciler(AssumeYes);

    let summary = reconciler.fix_duplicates().await.unwrap();
    assert_eq!(summary.fixed(), 1);

    let users = reconciler.identity().store().snapshot(USERS).await;
    assert_eq!(users[AUTH_SHAPED_KEY]["authId"].as_str(), Some(AUTH_SHAPED_KEY));
    assert_eq!(users[AUTH_SHAPED_KEY]["email"].as_str(), Some("B@x.com"));
}

#[tokio::test]
async fn test_three_way_group_merges_every_other_member() {
    let mut reconciler = Fixture::new()
        .user("user_1", &[("email", "c@x.com")])
        .await
        .user("tmp_2", &[("email", "c@x.com")])
        .await
        .user(AUTH_SHAPED_KEY, &[("email", "C@X.COM")])
        .await
        .order("o1", "user_1")
        .await
        .order("o2", "tmp_2")
        .await
        .reconciler(AssumeYes);

    let summary = reconciler.fix_duplicates().await.unwrap();
    assert_eq!(summary.fixed(), 2);
    assert!(summary.outcomes.iter().all(|o| matches!(
        o.kind,
        RepairKind::Duplicate {
            rule: CanonicalRule::AuthShapedKey,
            ..
        }
    )));

    let orders = reconciler.identity().store().snapshot(ORDERS).await;
    assert!(orders.values().all(|o| o["userRef"].as_str() == Some(AUTH_SHAPED_KEY)));
    assert_eq!(reconciler.identity().store().snapshot(USERS).await.len(), 1);
}

#[tokio::test]
async fn test_unattended_run_skips_ambiguous_groups() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("email", "d@x.com")])
        .await
        .user("u2", &[("email", "d@x.com")])
        .await
        .reconciler(AssumeYes);

    let summary = reconciler.fix_duplicates().await.unwrap();
    assert_eq!(summary.fixed(), 0);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(reconciler.identity().store().snapshot(USERS).await.len(), 2);
    assert!(summary.to_string().contains("no canonical record selected"));
}

// =============================================================================
// Detection
// =============================================================================

#[tokio::test]
async fn test_detect_reports_without_writing() {
    let reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH123"), ("email", "a@x.com")])
        .await
        .user("AUTH9", &[("authId", "AUTH9"), ("email", "A@x.com")])
        .await
        .order("o1", "u1")
        .await
        .order("o2", "ghost")
        .await
        .orphan_order("o3")
        .await
        .reconciler(AssumeYes);

    let report = reconciler.detect().await.unwrap();
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.dangling.len(), 2);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["mismatches"][0]["key"], "u1");
    assert_eq!(json["dangling"][0]["user_ref"], "ghost");

    let journal = reconciler.identity().store().journal().await;
    assert!(journal.iter().all(|c| matches!(c, StoreCall::List { .. })));
}

#[tokio::test]
async fn test_fix_run_reports_dangling_references() {
    let mut reconciler = Fixture::new()
        .user("u1", &[("authId", "AUTH123")])
        .await
        .order("o9", "deleted-user")
        .await
        .reconciler(AssumeYes);

    let summary = reconciler.fix_mismatches().await.unwrap();
    assert_eq!(summary.fixed(), 1);
    assert_eq!(summary.dangling.len(), 1);
    assert!(
        summary
            .to_string()
            .contains("order o9 -> missing user deleted-user")
    );
    // Dangling orders are reported, never rewritten
    let orders = reconciler.identity().store().snapshot(ORDERS).await;
    assert_eq!(orders["o9"]["userRef"].as_str(), Some("deleted-user"));
}
