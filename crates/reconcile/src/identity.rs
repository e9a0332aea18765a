//! Typed access to the users and orders collections.
//!
//! `IdentityStore` is the only component that touches the backing store.
//! It holds no cached state: every call reads or writes the store directly.

use freightdesk_core::{Document, FieldValue, Fields, NormalizedEmail, OrderKey, OrderRecord, UserKey, UserRecord};
use tracing::instrument;

use crate::config::CollectionConfig;
use crate::error::StoreError;
use crate::store::DocumentStore;

/// Users/orders accessor over a [`DocumentStore`].
#[derive(Debug)]
pub struct IdentityStore<S> {
    store: S,
    collections: CollectionConfig,
}

impl<S: DocumentStore> IdentityStore<S> {
    /// Wrap a store with the given collection layout.
    #[must_use]
    pub const fn new(store: S, collections: CollectionConfig) -> Self {
        Self { store, collections }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Collection names and field layout in use.
    #[must_use]
    pub const fn collections(&self) -> &CollectionConfig {
        &self.collections
    }

    /// Every user record.
    ///
    /// # Errors
    ///
    /// Returns the store error if the bulk read fails.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let docs = self.store.list(&self.collections.users).await?;
        Ok(docs.into_iter().map(|d| self.user(d)).collect())
    }

    /// Every order record.
    ///
    /// # Errors
    ///
    /// Returns the store error if the bulk read fails.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<OrderRecord>, StoreError> {
        let docs = self.store.list(&self.collections.orders).await?;
        Ok(docs.into_iter().map(|d| self.order(d)).collect())
    }

    /// A single user record, freshly read.
    ///
    /// # Errors
    ///
    /// Returns the store error if the read fails.
    pub async fn get_user(&self, key: &UserKey) -> Result<Option<UserRecord>, StoreError> {
        let doc = self.store.get(&self.collections.users, key.as_str()).await?;
        Ok(doc.map(|d| self.user(d)))
    }

    /// Whether a user record exists at `key`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the read fails.
    pub async fn user_exists(&self, key: &UserKey) -> Result<bool, StoreError> {
        Ok(self.get_user(key).await?.is_some())
    }

    /// Write a user record; with `merge`, overlay onto any existing record.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn put_user(&self, key: &UserKey, fields: &Fields, merge: bool) -> Result<(), StoreError> {
        self.store
            .put(&self.collections.users, key.as_str(), fields, merge)
            .await
    }

    /// Delete a user record, conditional on `expected_version` when given.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PreconditionFailed` if the record changed since
    /// `expected_version` was read, or any other store error.
    pub async fn delete_user(&self, key: &UserKey, expected_version: Option<&str>) -> Result<(), StoreError> {
        self.store
            .delete(&self.collections.users, key.as_str(), expected_version)
            .await
    }

    /// Orders whose user reference equals `key`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the query fails.
    pub async fn orders_for_user(&self, key: &UserKey) -> Result<Vec<OrderRecord>, StoreError> {
        let docs = self
            .store
            .query_eq(
                &self.collections.orders,
                &self.collections.layout.user_ref_field,
                &FieldValue::from(key.as_str()),
            )
            .await?;
        Ok(docs.into_iter().map(|d| self.order(d)).collect())
    }

    /// Point a single order at a different user.
    ///
    /// Only the reference field is written; every other order field is kept.
    /// Returns `false` if the order no longer exists; it is not recreated.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn set_order_user_ref(&self, order: &OrderKey, user: &UserKey) -> Result<bool, StoreError> {
        let fields = Fields::from([(
            self.collections.layout.user_ref_field.clone(),
            FieldValue::from(user.as_str()),
        )]);
        self.store
            .update(&self.collections.orders, order.as_str(), &fields)
            .await
    }

    /// Users registered under an email address.
    ///
    /// Stored emails are not normalized, so this queries both the address as
    /// given and its normalized form and keeps records whose normalized email
    /// matches.
    ///
    /// # Errors
    ///
    /// Returns the store error if either query fails.
    pub async fn users_with_email(&self, email: &str) -> Result<Vec<UserRecord>, StoreError> {
        let Some(wanted) = NormalizedEmail::new(email) else {
            return Ok(Vec::new());
        };

        let mut candidates = vec![email.trim().to_owned()];
        if wanted.as_str() != email.trim() {
            candidates.push(wanted.as_str().to_owned());
        }

        let mut users: Vec<UserRecord> = Vec::new();
        for candidate in candidates {
            let docs = self
                .store
                .query_eq(
                    &self.collections.users,
                    &self.collections.layout.email_field,
                    &FieldValue::from(candidate),
                )
                .await?;
            for user in docs.into_iter().map(|d| self.user(d)) {
                if user.normalized_email().as_ref() == Some(&wanted)
                    && !users.iter().any(|u| u.key == user.key)
                {
                    users.push(user);
                }
            }
        }
        users.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(users)
    }

    fn user(&self, doc: Document) -> UserRecord {
        UserRecord::from_document(doc, &self.collections.layout)
    }

    fn order(&self, doc: Document) -> OrderRecord {
        OrderRecord::from_document(doc, &self.collections.layout)
    }
}
