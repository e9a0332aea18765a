//! Newtype keys for type-safe document references.
//!
//! Use the `define_key!` macro to create type-safe key wrappers that prevent
//! accidentally mixing a user's storage key with an order's storage key or
//! with an identifier issued by the auth provider.

/// Macro to define a type-safe, string-backed key wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `PartialOrd`, `Ord`, `Hash`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use freightdesk_core::define_key;
/// define_key!(ShipmentKey);
/// define_key!(InvoiceKey);
///
/// let shipment = ShipmentKey::new("s-1");
/// let invoice = InvoiceKey::new("s-1");
///
/// // These are different types, so this won't compile:
/// // let _: ShipmentKey = invoice;
/// # let _ = (shipment, invoice);
/// ```
#[macro_export]
macro_rules! define_key {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new key from anything string-like.
            #[must_use]
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Get the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the key and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key!(UserKey);
define_key!(OrderKey);
define_key!(AuthId);

impl UserKey {
    /// Whether this storage key is exactly the given auth identifier.
    #[must_use]
    pub fn matches_auth_id(&self, auth_id: &AuthId) -> bool {
        self.0 == auth_id.0
    }
}

impl From<AuthId> for UserKey {
    fn from(auth_id: AuthId) -> Self {
        Self(auth_id.0)
    }
}
