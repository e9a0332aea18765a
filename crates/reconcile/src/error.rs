//! Error types for the store, auth and reconciliation layers.

use freightdesk_core::UserKey;
use thiserror::Error;

/// Errors returned by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or refused the operator's credentials.
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// A conditional write found the document changed since it was read.
    #[error("document {0} was modified concurrently")]
    PreconditionFailed(String),

    /// The store rejected the request.
    #[error("document store rejected request ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the store.
        message: String,
    },

    /// The store's response could not be decoded.
    #[error("failed to decode document store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether this is a total failure of the store layer.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors from the auth provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials were rejected.
    #[error("operator sign-in failed: {0}")]
    SignInFailed(String),

    /// Refreshing the session token failed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// HTTP request failed.
    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider's response could not be understood.
    #[error("invalid auth response: {0}")]
    InvalidResponse(String),
}

/// Errors that abort a reconciliation command.
///
/// Per-candidate failures are reported in the run summary instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reading current state failed; nothing was changed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The repoint target does not exist as a user record.
    #[error("target user {0} does not exist")]
    TargetMissing(UserKey),

    /// Orders reference a user record that does not exist; needs manual review.
    #[error("user {0} does not exist; its orders are dangling references and need manual review")]
    DanglingSource(UserKey),

    /// Source and target keys are identical.
    #[error("source and target are both {0}")]
    SameKey(UserKey),
}
