//! Order reference migration.
//!
//! Repointing is best-effort per order: a failed write is recorded and the
//! remaining orders are still processed. It is idempotent because every run
//! re-queries orders that still reference the old key, so orders updated by
//! an earlier run are not touched again.

use freightdesk_core::{OrderKey, UserKey};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::StoreError;
use crate::identity::IdentityStore;
use crate::store::DocumentStore;

/// A single order that could not be repointed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepointFailure {
    pub order: OrderKey,
    pub error: String,
}

/// Result of repointing the orders of one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepointOutcome {
    /// Orders now referencing the new key.
    pub updated: Vec<OrderKey>,
    /// Orders still referencing the old key.
    pub failures: Vec<RepointFailure>,
}

impl RepointOutcome {
    /// Number of orders that failed to update.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    /// Whether every matched order was updated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Point every order referencing `old_key` at `new_key`.
///
/// # Errors
///
/// Returns the store error only if the orders query itself fails; per-order
/// write failures are collected in [`RepointOutcome::failures`].
#[instrument(skip(identity), fields(old_key = %old_key, new_key = %new_key))]
pub async fn repoint_orders<S: DocumentStore>(
    identity: &IdentityStore<S>,
    old_key: &UserKey,
    new_key: &UserKey,
) -> Result<RepointOutcome, StoreError> {
    let orders = identity.orders_for_user(old_key).await?;
    let mut outcome = RepointOutcome::default();

    for order in orders {
        match identity.set_order_user_ref(&order.key, new_key).await {
            Ok(true) => outcome.updated.push(order.key),
            Ok(false) => debug!(order = %order.key, "Order deleted before repoint"),
            Err(e) => {
                warn!(order = %order.key, error = %e, "Failed to repoint order");
                outcome.failures.push(RepointFailure {
                    order: order.key,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        updated = outcome.updated.len(),
        failed = outcome.error_count(),
        "Repoint complete"
    );
    Ok(outcome)
}
