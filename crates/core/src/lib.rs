//! Freightdesk Core - Shared domain types.
//!
//! This crate provides the types shared by the reconciliation library and
//! the `fd-cli` administrative tool:
//! - typed storage keys for users, orders and auth-provider identifiers
//! - email addresses and their normalized matching form
//! - the hosted document store's typed field values
//! - `UserRecord` / `OrderRecord` views over raw documents
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no store
//! clients, no HTTP. Anything that talks to the network lives in
//! `freightdesk-reconcile`.
//!
//! # Modules
//!
//! - [`types`] - Newtype keys, emails, field values and records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
