//! Core types for Freightdesk.
//!
//! This module provides type-safe wrappers for the documents the
//! reconciliation tooling reads and repairs.

pub mod email;
pub mod field;
pub mod id;
pub mod record;

pub use email::{Email, EmailError, NormalizedEmail};
pub use field::{FieldValue, Fields, GeoPoint, overlay_fields};
pub use id::*;
pub use record::{Document, OrderRecord, RecordLayout, UserRecord};
