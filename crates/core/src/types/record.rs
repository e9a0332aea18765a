//! User and order records as seen by the reconciliation tooling.
//!
//! A [`Document`] is whatever the store returned; [`UserRecord`] and
//! [`OrderRecord`] are read-only views that pull out the handful of fields
//! reconciliation cares about while keeping the full field map intact.

use serde::{Deserialize, Serialize};

use super::email::NormalizedEmail;
use super::field::{FieldValue, Fields};
use super::id::{AuthId, OrderKey, UserKey};

/// A raw document: its key within a collection, its fields, and the store's
/// version marker (update time) when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub fields: Fields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Document {
    /// Create a document with no version marker.
    #[must_use]
    pub fn new(key: impl Into<String>, fields: Fields) -> Self {
        Self {
            key: key.into(),
            fields,
            version: None,
        }
    }

    /// String value of a top-level field, ignoring other value types.
    #[must_use]
    pub fn string_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }
}

/// Field names used to interpret user and order documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// User field holding the auth provider's identifier.
    pub auth_id_field: String,
    /// User field holding the email address.
    pub email_field: String,
    /// User field holding the display name.
    pub display_name_field: String,
    /// Order field referencing the owning user's storage key.
    pub user_ref_field: String,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            auth_id_field: "authId".to_owned(),
            email_field: "email".to_owned(),
            display_name_field: "displayName".to_owned(),
            user_ref_field: "userRef".to_owned(),
        }
    }
}

/// A user document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub key: UserKey,
    pub auth_id: Option<AuthId>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Every stored field, including the ones above.
    #[serde(skip)]
    pub fields: Fields,
    #[serde(skip)]
    pub version: Option<String>,
}

impl UserRecord {
    /// Interpret a document from the users collection.
    ///
    /// Blank auth identifiers are treated as absent.
    #[must_use]
    pub fn from_document(doc: Document, layout: &RecordLayout) -> Self {
        let auth_id = doc
            .string_field(&layout.auth_id_field)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(AuthId::from);
        let email = doc.string_field(&layout.email_field).map(str::to_owned);
        let display_name = doc
            .string_field(&layout.display_name_field)
            .map(str::to_owned);

        Self {
            key: UserKey::from(doc.key),
            auth_id,
            email,
            display_name,
            fields: doc.fields,
            version: doc.version,
        }
    }

    /// Whether the record carries an auth identifier that differs from its key.
    #[must_use]
    pub fn is_mismatched(&self) -> bool {
        self.auth_id
            .as_ref()
            .is_some_and(|auth_id| !self.key.matches_auth_id(auth_id))
    }

    /// Whether the storage key is exactly the embedded auth identifier.
    #[must_use]
    pub fn is_keyed_by_auth_id(&self) -> bool {
        self.auth_id
            .as_ref()
            .is_some_and(|auth_id| self.key.matches_auth_id(auth_id))
    }

    /// The email in matching form, if the record has a non-blank one.
    #[must_use]
    pub fn normalized_email(&self) -> Option<NormalizedEmail> {
        self.email.as_deref().and_then(NormalizedEmail::new)
    }

    /// Short human-readable description for prompts and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} (authId: {}, email: {}, name: {})",
            self.key,
            self.auth_id.as_ref().map_or("-", AuthId::as_str),
            self.email.as_deref().unwrap_or("-"),
            self.display_name.as_deref().unwrap_or("-"),
        )
    }
}

/// An order document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub key: OrderKey,
    /// Owning user's storage key; `None` if the field is missing or not a string.
    pub user_ref: Option<UserKey>,
    #[serde(skip)]
    pub fields: Fields,
}

impl OrderRecord {
    /// Interpret a document from the orders collection.
    #[must_use]
    pub fn from_document(doc: Document, layout: &RecordLayout) -> Self {
        let user_ref = doc.string_field(&layout.user_ref_field).map(UserKey::from);
        Self {
            key: OrderKey::from(doc.key),
            user_ref,
            fields: doc.fields,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user_doc(key: &str, fields: &[(&str, &str)]) -> Document {
        Document::new(
            key,
            fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), FieldValue::from(*v)))
                .collect(),
        )
    }

    #[test]
    fn test_mismatch_classification() {
        let layout = RecordLayout::default();

        let aligned = UserRecord::from_document(user_doc("AUTH1", &[("authId", "AUTH1")]), &layout);
        assert!(!aligned.is_mismatched());
        assert!(aligned.is_keyed_by_auth_id());

        let mismatched = UserRecord::from_document(user_doc("u1", &[("authId", "AUTH1")]), &layout);
        assert!(mismatched.is_mismatched());

        let legacy = UserRecord::from_document(user_doc("u2", &[("email", "a@x.com")]), &layout);
        assert!(!legacy.is_mismatched());
        assert!(!legacy.is_keyed_by_auth_id());
    }

    #[test]
    fn test_blank_auth_id_is_absent() {
        let layout = RecordLayout::default();
        let user = UserRecord::from_document(user_doc("u1", &[("authId", "  ")]), &layout);
        assert!(user.auth_id.is_none());
    }

    #[test]
    fn test_custom_layout() {
        let layout = RecordLayout {
            auth_id_field: "uid".to_owned(),
            user_ref_field: "userId".to_owned(),
            ..RecordLayout::default()
        };

        let user = UserRecord::from_document(user_doc("u1", &[("uid", "AUTH9")]), &layout);
        assert_eq!(user.auth_id, Some(AuthId::new("AUTH9")));

        let order = OrderRecord::from_document(user_doc("o1", &[("userId", "u1")]), &layout);
        assert_eq!(order.user_ref, Some(UserKey::new("u1")));
    }

    #[test]
    fn test_order_without_string_ref() {
        let layout = RecordLayout::default();
        let mut doc = user_doc("o1", &[]);
        doc.fields
            .insert("userRef".to_owned(), FieldValue::IntegerValue(3));
        let order = OrderRecord::from_document(doc, &layout);
        assert!(order.user_ref.is_none());
    }
}
