//! CLI command implementations.
//!
//! Every command signs the operator in before touching the store.

pub mod detect;
pub mod fix;
pub mod lookup;
pub mod repoint;
pub mod whoami;

use std::fmt::Display;

use freightdesk_reconcile::{
    AuthError, FirebaseAuth, FirestoreClient, IdentityStore, KeyShape, OperatorSession,
    ReconcileConfig, ReconcileError, StoreError,
};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Operator sign-in failed.
    #[error("Sign-in failed: {0}")]
    Auth(#[from] AuthError),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store request failed outside a repair.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Reconciliation refused or aborted.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Report could not be encoded.
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A signed-in operator and a store acting on their behalf.
pub struct Connection {
    pub session: OperatorSession,
    pub identity: IdentityStore<FirestoreClient>,
    pub key_shape: KeyShape,
}

/// Sign the operator in and open the store.
///
/// Against a store emulator with no auth emulator, the emulator's owner
/// credentials are used instead of a real sign-in.
pub async fn connect(config: &ReconcileConfig) -> Result<Connection, CommandError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("fd-cli/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let auth = FirebaseAuth::new(client.clone(), &config.firebase);

    let session = if config.firebase.firestore_emulator_host.is_some()
        && config.firebase.auth_emulator_host.is_none()
    {
        warn!("Store emulator without auth emulator, using owner credentials");
        OperatorSession::emulator_owner()
    } else {
        auth.sign_in(&config.operator).await?
    };
    info!(uid = %session.uid, email = %session.email, "Operator signed in");

    let store = FirestoreClient::new(client, &config.firebase, Some(auth), session.clone())?;
    Ok(Connection {
        session,
        identity: IdentityStore::new(store, config.collections.clone()),
        key_shape: KeyShape::new(config.legacy_key_prefixes.clone()),
    })
}

/// Write a report to stdout.
#[allow(clippy::print_stdout)]
fn emit(report: impl Display) {
    print!("{report}");
}
