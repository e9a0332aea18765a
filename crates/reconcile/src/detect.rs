//! Mismatch and dangling-reference detection.
//!
//! Both scans are read-only and all-or-nothing: a failed bulk read is
//! returned as an error, never as a partial result.

use std::collections::HashSet;
use std::fmt;

use freightdesk_core::{OrderKey, OrderRecord, UserKey, UserRecord};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::StoreError;
use crate::identity::IdentityStore;
use crate::store::DocumentStore;

/// An order whose user reference resolves to no user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingReference {
    pub order: OrderKey,
    /// `None` when the order has no usable reference field at all.
    pub user_ref: Option<UserKey>,
}

impl fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user_ref {
            Some(user) => write!(f, "order {} -> missing user {user}", self.order),
            None => write!(f, "order {} has no user reference", self.order),
        }
    }
}

/// Users whose auth identifier is present and differs from their storage key.
#[must_use]
pub fn mismatches(users: &[UserRecord]) -> Vec<UserRecord> {
    users.iter().filter(|u| u.is_mismatched()).cloned().collect()
}

/// Orders whose reference matches no user's storage key.
#[must_use]
pub fn dangling_references(users: &[UserRecord], orders: &[OrderRecord]) -> Vec<DanglingReference> {
    let known: HashSet<&UserKey> = users.iter().map(|u| &u.key).collect();
    orders
        .iter()
        .filter(|o| o.user_ref.as_ref().is_none_or(|r| !known.contains(r)))
        .map(|o| DanglingReference {
            order: o.key.clone(),
            user_ref: o.user_ref.clone(),
        })
        .collect()
}

/// Read all users and return the mismatched ones.
///
/// # Errors
///
/// Returns the store error if the users collection cannot be read.
#[instrument(skip(identity))]
pub async fn find_mismatches<S: DocumentStore>(
    identity: &IdentityStore<S>,
) -> Result<Vec<UserRecord>, StoreError> {
    let users = identity.list_users().await?;
    let found = mismatches(&users);
    info!(scanned = users.len(), mismatched = found.len(), "Mismatch scan complete");
    Ok(found)
}

/// Read all users and orders and return orders pointing at no user.
///
/// # Errors
///
/// Returns the store error if either collection cannot be read.
#[instrument(skip(identity))]
pub async fn find_dangling_references<S: DocumentStore>(
    identity: &IdentityStore<S>,
) -> Result<Vec<DanglingReference>, StoreError> {
    let users = identity.list_users().await?;
    let orders = identity.list_orders().await?;
    let found = dangling_references(&users, &orders);
    info!(orders = orders.len(), dangling = found.len(), "Reference scan complete");
    Ok(found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use freightdesk_core::{FieldValue, Fields};

    use super::*;
    use crate::config::CollectionConfig;
    use crate::store::{Fault, MemoryStore};

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), FieldValue::from(*v)))
            .collect()
    }

    async fn seeded() -> IdentityStore<MemoryStore> {
        let store = MemoryStore::new();
        store.insert("Users", "u1", fields(&[("authId", "AUTH123")])).await;
        store.insert("Users", "AUTH9", fields(&[("authId", "AUTH9")])).await;
        store.insert("Users", "legacy", fields(&[("email", "l@x.com")])).await;
        store.insert("Orders", "o1", fields(&[("userRef", "u1")])).await;
        store.insert("Orders", "o2", fields(&[("userRef", "ghost")])).await;
        store.insert("Orders", "o3", fields(&[("total", "12")])).await;
        IdentityStore::new(store, CollectionConfig::default())
    }

    #[tokio::test]
    async fn test_find_mismatches() {
        let identity = seeded().await;
        let found = find_mismatches(&identity).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key.as_str(), "u1");
    }

    #[tokio::test]
    async fn test_find_dangling_references() {
        let identity = seeded().await;
        let found = find_dangling_references(&identity).await.unwrap();
        assert_eq!(
            found,
            vec![
                DanglingReference {
                    order: OrderKey::new("o2"),
                    user_ref: Some(UserKey::new("ghost")),
                },
                DanglingReference {
                    order: OrderKey::new("o3"),
                    user_ref: None,
                },
            ]
        );
        assert_eq!(found[0].to_string(), "order o2 -> missing user ghost");
    }

    #[tokio::test]
    async fn test_read_failure_is_not_partial() {
        let identity = seeded().await;
        identity
            .store()
            .fail(Fault::list("Users"), StoreError::Unavailable("offline".into()))
            .await;

        let err = find_mismatches(&identity).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
