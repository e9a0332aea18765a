//! Integration tests for Freightdesk reconciliation.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p freightdesk-integration-tests
//! ```
//!
//! Scenarios run end to end against [`MemoryStore`]; no network or emulator
//! is needed.
//!
//! # Test Categories
//!
//! - `reconcile_scenarios` - Full mismatch and duplicate repairs
//! - `reconcile_failures` - Store failures, declines and concurrency checks

use freightdesk_core::{FieldValue, Fields};
use freightdesk_reconcile::{
    CollectionConfig, IdentityStore, KeyShape, MemoryStore, Operator, Reconciler,
};

/// Users collection used by the fixtures.
pub const USERS: &str = "Users";
/// Orders collection used by the fixtures.
pub const ORDERS: &str = "Orders";

/// An auth-issued looking key (28 chars, no legacy prefix).
pub const AUTH_SHAPED_KEY: &str = "kT3pQ9vX2mL8nR4sW6yZ1aB5cD7e";

/// Build a field map of string values.
#[must_use]
pub fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), FieldValue::from(*v)))
        .collect()
}

/// Seeds a [`MemoryStore`] with users and orders.
#[derive(Debug, Default)]
pub struct Fixture {
    store: MemoryStore,
}

impl Fixture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user document.
    pub async fn user(self, key: &str, pairs: &[(&str, &str)]) -> Self {
        self.store.insert(USERS, key, fields(pairs)).await;
        self
    }

    /// Insert an order referencing `user_ref`, with a few opaque fields.
    pub async fn order(self, key: &str, user_ref: &str) -> Self {
        let mut order = fields(&[("userRef", user_ref), ("status", "in_transit")]);
        order.insert("weightKg".to_owned(), FieldValue::IntegerValue(1200));
        self.store.insert(ORDERS, key, order).await;
        self
    }

    /// Insert an order with no user reference.
    pub async fn orphan_order(self, key: &str) -> Self {
        self.store.insert(ORDERS, key, fields(&[("status", "quoted")])).await;
        self
    }

    /// Finish seeding and build a reconciler driven by `operator`.
    #[must_use]
    pub fn reconciler<O: Operator>(self, operator: O) -> Reconciler<MemoryStore, O> {
        Reconciler::new(
            IdentityStore::new(self.store, CollectionConfig::default()),
            operator,
            KeyShape::default(),
        )
    }
}
