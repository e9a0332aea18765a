//! In-process document store.
//!
//! Behaves like the hosted store for everything reconciliation relies on:
//! merge writes overlay top-level fields, every write bumps the document's
//! version, and versioned deletes fail if the document moved on. On top of
//! that it journals every call (so tests can assert on ordering) and can be
//! told to fail specific operations.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use freightdesk_core::{Document, FieldValue, Fields, overlay_fields};
use tokio::sync::Mutex;

use super::DocumentStore;
use crate::error::StoreError;

/// One call made against a [`MemoryStore`], recorded before it executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List { collection: String },
    Get { collection: String, key: String },
    Put { collection: String, key: String, merge: bool },
    Update { collection: String, key: String },
    Delete { collection: String, key: String },
    Query { collection: String, field: String },
}

/// An operation that should fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    List { collection: String },
    Get { collection: String, key: String },
    Put { collection: String, key: String },
    Delete { collection: String, key: String },
    Query { collection: String },
}

impl Fault {
    /// Fail every list of `collection`.
    #[must_use]
    pub fn list(collection: &str) -> Self {
        Self::List {
            collection: collection.to_owned(),
        }
    }

    /// Fail every get of `collection/key`.
    #[must_use]
    pub fn get(collection: &str, key: &str) -> Self {
        Self::Get {
            collection: collection.to_owned(),
            key: key.to_owned(),
        }
    }

    /// Fail every put or update of `collection/key`.
    #[must_use]
    pub fn put(collection: &str, key: &str) -> Self {
        Self::Put {
            collection: collection.to_owned(),
            key: key.to_owned(),
        }
    }

    /// Fail every delete of `collection/key`.
    #[must_use]
    pub fn delete(collection: &str, key: &str) -> Self {
        Self::Delete {
            collection: collection.to_owned(),
            key: key.to_owned(),
        }
    }

    /// Fail every query against `collection`.
    #[must_use]
    pub fn query(collection: &str) -> Self {
        Self::Query {
            collection: collection.to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
struct Stored {
    fields: Fields,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    collections: BTreeMap<String, BTreeMap<String, Stored>>,
    journal: Vec<StoreCall>,
    faults: HashMap<Fault, StoreError>,
    clock: u64,
}

impl Inner {
    fn check(&self, fault: &Fault) -> Result<(), StoreError> {
        self.faults.get(fault).map_or(Ok(()), |err| Err(err.clone()))
    }

    fn write(&mut self, collection: &str, key: &str, fields: Fields) {
        self.clock += 1;
        let version = self.clock;
        self.collections
            .entry(collection.to_owned())
            .or_default()
            .insert(key.to_owned(), Stored { fields, version });
    }

    fn stored(&self, collection: &str, key: &str) -> Option<&Stored> {
        self.collections.get(collection).and_then(|docs| docs.get(key))
    }
}

fn to_document(key: &str, stored: &Stored) -> Document {
    Document {
        key: key.to_owned(),
        fields: stored.fields.clone(),
        version: Some(stored.version.to_string()),
    }
}

/// In-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without journaling the write.
    pub async fn insert(&self, collection: &str, key: &str, fields: Fields) {
        self.inner.lock().await.write(collection, key, fields);
    }

    /// Current fields of every document in a collection, by key.
    pub async fn snapshot(&self, collection: &str) -> BTreeMap<String, Fields> {
        self.inner
            .lock()
            .await
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(key, stored)| (key.clone(), stored.fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every call made so far, in order.
    pub async fn journal(&self) -> Vec<StoreCall> {
        self.inner.lock().await.journal.clone()
    }

    /// Make an operation fail with `error` until faults are cleared.
    pub async fn fail(&self, fault: Fault, error: StoreError) {
        self.inner.lock().await.faults.insert(fault, error);
    }

    /// Remove all injected faults.
    pub async fn clear_faults(&self) {
        self.inner.lock().await.faults.clear();
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(StoreCall::List {
            collection: collection.to_owned(),
        });
        inner.check(&Fault::list(collection))?;

        Ok(inner
            .collections
            .get(collection)
            .map(|docs| docs.iter().map(|(k, s)| to_document(k, s)).collect())
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(StoreCall::Get {
            collection: collection.to_owned(),
            key: key.to_owned(),
        });
        inner.check(&Fault::get(collection, key))?;

        Ok(inner.stored(collection, key).map(|s| to_document(key, s)))
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        fields: &Fields,
        merge: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(StoreCall::Put {
            collection: collection.to_owned(),
            key: key.to_owned(),
            merge,
        });
        inner.check(&Fault::put(collection, key))?;

        let next = match (merge, inner.stored(collection, key)) {
            (true, Some(existing)) => overlay_fields(&existing.fields, fields),
            _ => fields.clone(),
        };
        inner.write(collection, key, next);
        Ok(())
    }

    async fn update(&self, collection: &str, key: &str, fields: &Fields) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(StoreCall::Update {
            collection: collection.to_owned(),
            key: key.to_owned(),
        });
        inner.check(&Fault::put(collection, key))?;

        let Some(existing) = inner.stored(collection, key) else {
            return Ok(false);
        };
        let next = overlay_fields(&existing.fields, fields);
        inner.write(collection, key, next);
        Ok(true)
    }

    async fn delete(
        &self,
        collection: &str,
        key: &str,
        expected_version: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(StoreCall::Delete {
            collection: collection.to_owned(),
            key: key.to_owned(),
        });
        inner.check(&Fault::delete(collection, key))?;

        if let Some(expected) = expected_version {
            let current = inner.stored(collection, key).map(|s| s.version.to_string());
            if current.as_deref() != Some(expected) {
                return Err(StoreError::PreconditionFailed(format!("{collection}/{key}")));
            }
        }

        if let Some(docs) = inner.collections.get_mut(collection) {
            docs.remove(key);
        }
        Ok(())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.journal.push(StoreCall::Query {
            collection: collection.to_owned(),
            field: field.to_owned(),
        });
        inner.check(&Fault::query(collection))?;

        Ok(inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, s)| s.fields.get(field) == Some(value))
                    .map(|(k, s)| to_document(k, s))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), FieldValue::from(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_merge_put_overlays() {
        let store = MemoryStore::new();
        store
            .insert("Users", "AUTH1", fields(&[("email", "a@x.com"), ("phone", "555")]))
            .await;

        store
            .put("Users", "AUTH1", &fields(&[("email", "b@x.com")]), true)
            .await
            .unwrap();

        let snapshot = store.snapshot("Users").await;
        assert_eq!(snapshot["AUTH1"], fields(&[("email", "b@x.com"), ("phone", "555")]));
    }

    #[tokio::test]
    async fn test_plain_put_replaces() {
        let store = MemoryStore::new();
        store.insert("Users", "u1", fields(&[("phone", "555")])).await;

        store
            .put("Users", "u1", &fields(&[("email", "a@x.com")]), false)
            .await
            .unwrap();

        assert_eq!(store.snapshot("Users").await["u1"], fields(&[("email", "a@x.com")]));
    }

    #[tokio::test]
    async fn test_update_never_creates() {
        let store = MemoryStore::new();
        store.insert("Orders", "o1", fields(&[("userRef", "u1"), ("status", "booked")])).await;

        assert!(store.update("Orders", "o1", &fields(&[("userRef", "AUTH1")])).await.unwrap());
        assert!(!store.update("Orders", "gone", &fields(&[("userRef", "AUTH1")])).await.unwrap());

        let orders = store.snapshot("Orders").await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders["o1"], fields(&[("userRef", "AUTH1"), ("status", "booked")]));
    }

    #[tokio::test]
    async fn test_versioned_delete() {
        let store = MemoryStore::new();
        store.insert("Users", "u1", fields(&[])).await;
        let version = store.get("Users", "u1").await.unwrap().unwrap().version.unwrap();

        store.put("Users", "u1", &fields(&[("x", "1")]), true).await.unwrap();
        let err = store.delete("Users", "u1", Some(&version)).await.unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed(_)));

        let fresh = store.get("Users", "u1").await.unwrap().unwrap().version.unwrap();
        store.delete("Users", "u1", Some(&fresh)).await.unwrap();
        assert!(store.snapshot("Users").await.is_empty());
    }

    #[tokio::test]
    async fn test_query_and_faults() {
        let store = MemoryStore::new();
        store.insert("Orders", "o1", fields(&[("userRef", "u1")])).await;
        store.insert("Orders", "o2", fields(&[("userRef", "u2")])).await;

        let hits = store
            .query_eq("Orders", "userRef", &FieldValue::from("u1"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "o1");

        store
            .fail(Fault::query("Orders"), StoreError::Unavailable("offline".into()))
            .await;
        let err = store
            .query_eq("Orders", "userRef", &FieldValue::from("u1"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        assert_eq!(store.journal().await.len(), 2);
    }
}
