//! Document store abstraction.
//!
//! The reconciliation core speaks only this interface. Two implementations
//! ship with the crate:
//!
//! - [`FirestoreClient`] - the hosted store over its REST API
//! - [`MemoryStore`] - in-process store with a call journal and fault
//!   injection, used by tests
//!
//! Store handles are passed explicitly to [`IdentityStore`](crate::IdentityStore);
//! there is no process-wide connection.

use std::sync::Arc;

use async_trait::async_trait;
use freightdesk_core::{Document, FieldValue, Fields};

use crate::error::StoreError;

mod firestore;
mod memory;

pub use firestore::FirestoreClient;
pub use memory::{Fault, MemoryStore, StoreCall};

/// Collection/document storage with equality queries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document in a collection.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// A single document, or `None` if absent.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document. With `merge`, only the supplied top-level fields are
    /// overwritten and all others are kept; without it, the document is
    /// replaced. Either way the document is created if absent.
    async fn put(
        &self,
        collection: &str,
        key: &str,
        fields: &Fields,
        merge: bool,
    ) -> Result<(), StoreError>;

    /// Overlay `fields` onto an existing document.
    ///
    /// Returns `false` without writing anything if the document does not
    /// exist.
    async fn update(&self, collection: &str, key: &str, fields: &Fields) -> Result<bool, StoreError>;

    /// Delete a document. With `expected_version`, the delete only succeeds
    /// if the document is unchanged since that version was read.
    async fn delete(
        &self,
        collection: &str,
        key: &str,
        expected_version: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Documents whose top-level `field` equals `value`.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        (**self).list(collection).await
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        (**self).get(collection, key).await
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        fields: &Fields,
        merge: bool,
    ) -> Result<(), StoreError> {
        (**self).put(collection, key, fields, merge).await
    }

    async fn update(&self, collection: &str, key: &str, fields: &Fields) -> Result<bool, StoreError> {
        (**self).update(collection, key, fields).await
    }

    async fn delete(
        &self,
        collection: &str,
        key: &str,
        expected_version: Option<&str>,
    ) -> Result<(), StoreError> {
        (**self).delete(collection, key, expected_version).await
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        (**self).query_eq(collection, field, value).await
    }
}
