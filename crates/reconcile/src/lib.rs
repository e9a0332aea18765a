//! Freightdesk Reconcile - user/order identity repair.
//!
//! User records must be stored under the identifier issued by the auth
//! provider, and every order references its owner by that storage key.
//! Older records broke both rules. This crate finds and repairs them:
//!
//! - **mismatches**: a user stored under a key other than its auth identifier
//! - **duplicates**: several users sharing one normalized email
//! - **dangling references**: orders pointing at no user (reported only)
//!
//! Each repair copies the stale record to its target key, repoints its
//! orders, and only then deletes the stale record. The operator confirms
//! every repair through an [`Operator`].
//!
//! # Modules
//!
//! - [`config`] - Environment configuration
//! - [`auth`] - Operator sign-in against the auth provider
//! - [`store`] - Document store trait, Firestore REST client, in-memory store
//! - [`identity`] - Users/orders view over a document store
//! - [`detect`] / [`duplicates`] - Read-only scans
//! - [`migrate`] - Order reference repointing
//! - [`orchestrator`] - Per-candidate repair state machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod detect;
pub mod duplicates;
pub mod error;
pub mod identity;
pub mod migrate;
pub mod orchestrator;
pub mod prompt;
pub mod store;

pub use auth::{FirebaseAuth, OperatorSession};
pub use config::{CollectionConfig, ConfigError, FirebaseConfig, OperatorCredentials, ReconcileConfig};
pub use detect::DanglingReference;
pub use duplicates::{CanonicalRule, DuplicateGroups, KeyShape};
pub use error::{AuthError, ReconcileError, StoreError};
pub use identity::IdentityStore;
pub use migrate::{RepointFailure, RepointOutcome};
pub use orchestrator::{
    DetectionReport, Reconciler, RepairKind, RepairOutcome, RepairState, RunSummary,
};
pub use prompt::{AssumeYes, Operator, ScriptedOperator};
pub use store::{DocumentStore, FirestoreClient, MemoryStore};
