//! Duplicate detection by normalized email, and canonical record selection.

use std::collections::BTreeMap;

use freightdesk_core::{NormalizedEmail, UserKey, UserRecord};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::StoreError;
use crate::identity::IdentityStore;
use crate::store::DocumentStore;

/// Keys longer than this may have been issued by the auth provider.
const MIN_AUTH_KEY_LEN: usize = 20;

/// Duplicate groups keyed by normalized email. Every group has 2+ members.
pub type DuplicateGroups = BTreeMap<NormalizedEmail, Vec<UserRecord>>;

/// Why a record was chosen to survive a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalRule {
    /// Storage key equals the record's own auth identifier.
    KeyedByAuthId,
    /// Storage key looks auth-issued (long, no legacy prefix).
    AuthShapedKey,
    /// The operator picked it.
    OperatorChoice,
}

/// Outcome of automatic canonical selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalChoice {
    Selected { key: UserKey, rule: CanonicalRule },
    /// No rule singles out one record; the operator has to choose.
    NeedsOperator,
}

/// Heuristic for recognising auth-issued storage keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShape {
    legacy_prefixes: Vec<String>,
}

impl KeyShape {
    /// Treat keys starting with any of `legacy_prefixes` as locally generated.
    #[must_use]
    pub fn new(legacy_prefixes: Vec<String>) -> Self {
        Self { legacy_prefixes }
    }

    /// Whether `key` has the length and shape of an auth-issued identifier.
    #[must_use]
    pub fn looks_auth_issued(&self, key: &UserKey) -> bool {
        let key = key.as_str();
        key.chars().count() > MIN_AUTH_KEY_LEN
            && !self.legacy_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

impl Default for KeyShape {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_LEGACY_KEY_PREFIXES
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
        )
    }
}

/// Group users by normalized email, keeping only groups of two or more.
///
/// Users without a (non-blank) email are never grouped.
#[must_use]
pub fn group_duplicates(users: &[UserRecord]) -> DuplicateGroups {
    let mut groups: DuplicateGroups = BTreeMap::new();
    for user in users {
        if let Some(email) = user.normalized_email() {
            groups.entry(email).or_default().push(user.clone());
        }
    }
    groups.retain(|_, members| members.len() > 1);
    groups
}

/// Read all users and group duplicates.
///
/// # Errors
///
/// Returns the store error if the users collection cannot be read.
#[instrument(skip(identity))]
pub async fn find_duplicates<S: DocumentStore>(
    identity: &IdentityStore<S>,
) -> Result<DuplicateGroups, StoreError> {
    let users = identity.list_users().await?;
    let groups = group_duplicates(&users);
    info!(scanned = users.len(), groups = groups.len(), "Duplicate scan complete");
    Ok(groups)
}

/// Pick the record that survives a duplicate merge.
///
/// Rules in priority order; the first rule matched by exactly one member
/// decides. If the highest matching rule is matched by several members, or
/// no rule matches, the operator must choose.
#[must_use]
pub fn select_canonical(members: &[UserRecord], shape: &KeyShape) -> CanonicalChoice {
    let keyed: Vec<&UserRecord> = members.iter().filter(|u| u.is_keyed_by_auth_id()).collect();
    match keyed.as_slice() {
        [only] => {
            return CanonicalChoice::Selected {
                key: only.key.clone(),
                rule: CanonicalRule::KeyedByAuthId,
            };
        }
        [] => {}
        _ => return CanonicalChoice::NeedsOperator,
    }

    let shaped: Vec<&UserRecord> = members
        .iter()
        .filter(|u| shape.looks_auth_issued(&u.key))
        .collect();
    match shaped.as_slice() {
        [only] => CanonicalChoice::Selected {
            key: only.key.clone(),
            rule: CanonicalRule::AuthShapedKey,
        },
        _ => CanonicalChoice::NeedsOperator,
    }
}
