//! Reconciliation runs.
//!
//! Each candidate (a mismatched user, or one non-canonical member of a
//! duplicate group) is repaired on its own, strictly one after another:
//!
//! ```text
//! Detected -> ConfirmationPending -> Merging -> Repointing -> Deleting -> Done
//!                     |                  |            |            |
//!                     v                  +------------+------------+--> Failed
//!                  Skipped
//! ```
//!
//! The stale record is deleted only after its orders were repointed, and
//! only if it has not changed since it was copied. Once `Merging` starts the
//! candidate always runs to `Done` or `Failed`.
//!
//! Runs assume they are the only writer to the users and orders collections
//! while they execute. The versioned delete catches a concurrent edit of the
//! stale user record; nothing guards orders created or edited mid-run.

use std::fmt;

use freightdesk_core::{NormalizedEmail, UserKey, UserRecord};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::detect::{DanglingReference, find_dangling_references, find_mismatches};
use crate::duplicates::{
    CanonicalChoice, CanonicalRule, DuplicateGroups, KeyShape, find_duplicates, select_canonical,
};
use crate::error::{ReconcileError, StoreError};
use crate::identity::IdentityStore;
use crate::migrate::{RepointFailure, RepointOutcome, repoint_orders};
use crate::prompt::Operator;
use crate::store::DocumentStore;

/// Where a candidate is in its repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    Detected,
    ConfirmationPending,
    Merging,
    Repointing,
    Deleting,
    Done,
    Skipped,
    Failed,
}

impl RepairState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the repair state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Detected, Self::ConfirmationPending)
                | (Self::ConfirmationPending, Self::Merging | Self::Skipped)
                | (Self::Merging, Self::Repointing | Self::Failed)
                | (Self::Repointing, Self::Deleting | Self::Failed)
                | (Self::Deleting, Self::Done | Self::Failed)
        )
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::ConfirmationPending => "pending",
            Self::Merging => "merging",
            Self::Repointing => "repointing",
            Self::Deleting => "deleting",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// What kind of inconsistency a candidate repairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepairKind {
    /// Storage key differs from the embedded auth identifier.
    Mismatch,
    /// Non-canonical member of a duplicate email group.
    Duplicate {
        email: NormalizedEmail,
        rule: CanonicalRule,
    },
}

/// One planned move of a user record from `old_key` to `new_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairPlan {
    pub kind: RepairKind,
    pub old_key: UserKey,
    pub new_key: UserKey,
    /// Human-readable description of the stale record at detection time.
    pub description: String,
}

impl RepairPlan {
    fn question(&self) -> String {
        match &self.kind {
            RepairKind::Mismatch => format!(
                "User {} is stored under a key that differs from its auth identifier. \
                 Move it to {} and repoint its orders?",
                self.description, self.new_key
            ),
            RepairKind::Duplicate { email, .. } => format!(
                "User {} duplicates {} ({email}). Merge it into {} and repoint its orders?",
                self.description, self.new_key, self.new_key
            ),
        }
    }
}

/// Final report for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    #[serde(flatten)]
    pub kind: RepairKind,
    pub old_key: UserKey,
    pub new_key: UserKey,
    pub state: RepairState,
    /// Every state visited, in order.
    pub trail: Vec<RepairState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repoint: Option<RepointOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RepairOutcome {
    fn detected(plan: &RepairPlan) -> Self {
        Self {
            kind: plan.kind.clone(),
            old_key: plan.old_key.clone(),
            new_key: plan.new_key.clone(),
            state: RepairState::Detected,
            trail: vec![RepairState::Detected],
            repoint: None,
            note: None,
        }
    }

    fn advance(&mut self, next: RepairState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal repair transition {:?} -> {next:?}",
            self.state
        );
        debug!(old_key = %self.old_key, from = ?self.state, to = ?next, "Repair transition");
        self.state = next;
        self.trail.push(next);
    }

    fn skip(&mut self, note: impl Into<String>) {
        let note = note.into();
        info!(old_key = %self.old_key, new_key = %self.new_key, note = %note, "Repair skipped");
        self.note = Some(note);
        self.advance(RepairState::Skipped);
    }

    fn fail(&mut self, note: impl Into<String>) {
        let note = note.into();
        error!(
            old_key = %self.old_key,
            new_key = %self.new_key,
            during = ?self.state,
            note = %note,
            "Repair failed"
        );
        self.note = Some(note);
        self.advance(RepairState::Failed);
    }
}

impl fmt::Display for RepairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            RepairKind::Mismatch => "mismatch".to_owned(),
            RepairKind::Duplicate { email, .. } => format!("duplicate of {email}"),
        };
        write!(
            f,
            "[{:<7}] {} -> {} ({kind})",
            self.state.label(),
            self.old_key,
            self.new_key
        )?;
        if let Some(repoint) = &self.repoint {
            write!(f, ": {} order(s) repointed", repoint.updated.len())?;
            if !repoint.is_complete() {
                write!(f, ", {} failed", repoint.error_count())?;
            }
        }
        if let Some(note) = &self.note {
            write!(f, " - {note}")?;
        }
        Ok(())
    }
}

/// Everything a detection pass found. Nothing is modified.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub mismatches: Vec<UserRecord>,
    pub duplicates: DuplicateGroups,
    pub dangling: Vec<DanglingReference>,
}

impl fmt::Display for DetectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mismatched users: {}", self.mismatches.len())?;
        for user in &self.mismatches {
            writeln!(f, "  {}", user.describe())?;
        }
        writeln!(f, "Duplicate email groups: {}", self.duplicates.len())?;
        for (email, members) in &self.duplicates {
            writeln!(f, "  {email} ({} records)", members.len())?;
            for user in members {
                writeln!(f, "    {}", user.describe())?;
            }
        }
        write_dangling(f, &self.dangling)
    }
}

/// Result of a fix run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<RepairOutcome>,
    /// Duplicate groups left alone because no canonical record was chosen.
    pub unresolved_groups: Vec<NormalizedEmail>,
    pub dangling: Vec<DanglingReference>,
}

impl RunSummary {
    fn count(&self, state: RepairState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// Candidates repaired completely.
    #[must_use]
    pub fn fixed(&self) -> usize {
        self.count(RepairState::Done)
    }

    /// Candidates declined or left without a target.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(RepairState::Skipped) + self.unresolved_groups.len()
    }

    /// Candidates that ended in `Failed`.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(RepairState::Failed)
    }

    /// Every order that could not be repointed during the run.
    pub fn repoint_failures(&self) -> impl Iterator<Item = &RepointFailure> {
        self.outcomes
            .iter()
            .filter_map(|o| o.repoint.as_ref())
            .flat_map(|r| r.failures.iter())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Reconciliation summary: {} fixed, {} skipped, {} failed",
            self.fixed(),
            self.skipped(),
            self.failed()
        )?;
        for outcome in &self.outcomes {
            writeln!(f, "  {outcome}")?;
        }
        for email in &self.unresolved_groups {
            writeln!(f, "  [skipped] duplicates of {email} - no canonical record selected")?;
        }

        let failures: Vec<&RepointFailure> = self.repoint_failures().collect();
        if !failures.is_empty() {
            writeln!(f, "Order repoint errors: {}", failures.len())?;
            for failure in failures {
                writeln!(f, "  order {}: {}", failure.order, failure.error)?;
            }
        }
        write_dangling(f, &self.dangling)
    }
}

fn write_dangling(f: &mut fmt::Formatter<'_>, dangling: &[DanglingReference]) -> fmt::Result {
    if dangling.is_empty() {
        return writeln!(f, "Dangling order references: none");
    }
    writeln!(
        f,
        "Dangling order references: {} (manual review required)",
        dangling.len()
    )?;
    for reference in dangling {
        writeln!(f, "  {reference}")?;
    }
    Ok(())
}

/// Drives detection and repairs against one store, one candidate at a time.
#[derive(Debug)]
pub struct Reconciler<S, O> {
    identity: IdentityStore<S>,
    operator: O,
    key_shape: KeyShape,
}

impl<S: DocumentStore, O: Operator> Reconciler<S, O> {
    /// Create a reconciler.
    #[must_use]
    pub const fn new(identity: IdentityStore<S>, operator: O, key_shape: KeyShape) -> Self {
        Self {
            identity,
            operator,
            key_shape,
        }
    }

    /// The identity store this reconciler works against.
    #[must_use]
    pub const fn identity(&self) -> &IdentityStore<S> {
        &self.identity
    }

    /// The operator making decisions.
    #[must_use]
    pub const fn operator(&self) -> &O {
        &self.operator
    }

    /// Scan for mismatches, duplicates and dangling references.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Store` if any collection cannot be read.
    #[instrument(skip(self))]
    pub async fn detect(&self) -> Result<DetectionReport, ReconcileError> {
        Ok(DetectionReport {
            mismatches: find_mismatches(&self.identity).await?,
            duplicates: find_duplicates(&self.identity).await?,
            dangling: find_dangling_references(&self.identity).await?,
        })
    }

    /// Move every mismatched user to the key matching its auth identifier.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Store` if the detection scan fails; nothing
    /// has been modified in that case. Failures during individual repairs
    /// are reported in the summary.
    #[instrument(skip(self))]
    pub async fn fix_mismatches(&mut self) -> Result<RunSummary, ReconcileError> {
        let mismatched = find_mismatches(&self.identity).await?;
        let dangling = find_dangling_references(&self.identity).await?;

        let plans: Vec<RepairPlan> = mismatched
            .into_iter()
            .filter_map(|user| {
                let new_key = UserKey::from(user.auth_id.clone()?);
                Some(RepairPlan {
                    kind: RepairKind::Mismatch,
                    description: user.describe(),
                    old_key: user.key,
                    new_key,
                })
            })
            .collect();

        let mut summary = RunSummary {
            dangling,
            ..RunSummary::default()
        };
        for plan in plans {
            let outcome = self.repair(plan).await;
            summary.outcomes.push(outcome);
        }

        info!(
            fixed = summary.fixed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Mismatch run complete"
        );
        Ok(summary)
    }

    /// Merge every duplicate group into its canonical record.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Store` if the detection scan fails; nothing
    /// has been modified in that case.
    #[instrument(skip(self))]
    pub async fn fix_duplicates(&mut self) -> Result<RunSummary, ReconcileError> {
        let groups = find_duplicates(&self.identity).await?;
        let dangling = find_dangling_references(&self.identity).await?;

        let mut summary = RunSummary {
            dangling,
            ..RunSummary::default()
        };
        for (email, members) in groups {
            let Some((canonical, rule)) = self.resolve_canonical(&email, &members) else {
                summary.unresolved_groups.push(email);
                continue;
            };
            info!(email = %email, canonical = %canonical, ?rule, "Canonical record selected");

            for member in members.into_iter().filter(|m| m.key != canonical) {
                let plan = RepairPlan {
                    kind: RepairKind::Duplicate {
                        email: email.clone(),
                        rule,
                    },
                    description: member.describe(),
                    old_key: member.key,
                    new_key: canonical.clone(),
                };
                let outcome = self.repair(plan).await;
                summary.outcomes.push(outcome);
            }
        }

        info!(
            fixed = summary.fixed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Duplicate run complete"
        );
        Ok(summary)
    }

    /// Repoint all orders of `old_key` to `new_key` without touching users.
    ///
    /// Returns `None` if the operator declines.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::SameKey` for identical keys,
    /// `TargetMissing` if `new_key` is not a user, `DanglingSource` if
    /// `old_key` is not a user, or `Store` if the orders query fails.
    #[instrument(skip(self), fields(old_key = %old_key, new_key = %new_key))]
    pub async fn repoint(
        &mut self,
        old_key: &UserKey,
        new_key: &UserKey,
    ) -> Result<Option<RepointOutcome>, ReconcileError> {
        if old_key == new_key {
            return Err(ReconcileError::SameKey(old_key.clone()));
        }
        if !self.identity.user_exists(new_key).await? {
            return Err(ReconcileError::TargetMissing(new_key.clone()));
        }
        if !self.identity.user_exists(old_key).await? {
            return Err(ReconcileError::DanglingSource(old_key.clone()));
        }

        let question = format!("Repoint every order of {old_key} to {new_key}?");
        if !self.operator.confirm(&question) {
            info!("Repoint declined by operator");
            return Ok(None);
        }

        Ok(Some(repoint_orders(&self.identity, old_key, new_key).await?))
    }

    fn resolve_canonical(
        &mut self,
        email: &NormalizedEmail,
        members: &[UserRecord],
    ) -> Option<(UserKey, CanonicalRule)> {
        if let CanonicalChoice::Selected { key, rule } = select_canonical(members, &self.key_shape) {
            return Some((key, rule));
        }

        let mut question = format!("{} records share {email}:\n", members.len());
        for (i, member) in members.iter().enumerate() {
            question.push_str(&format!("  [{}] {}\n", i + 1, member.describe()));
        }
        question.push_str(&format!(
            "Select the record to keep (1-{}), or leave blank to skip",
            members.len()
        ));

        let answer = self.operator.ask(&question);
        let answer = answer.trim();
        if answer.is_empty() {
            info!(email = %email, "No canonical record selected");
            return None;
        }

        match answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| members.get(i))
        {
            Some(member) => Some((member.key.clone(), CanonicalRule::OperatorChoice)),
            None => {
                warn!(email = %email, answer, "Invalid canonical selection");
                None
            }
        }
    }

    /// Run one candidate through the state machine to a terminal state.
    async fn repair(&mut self, plan: RepairPlan) -> RepairOutcome {
        let mut outcome = RepairOutcome::detected(&plan);

        outcome.advance(RepairState::ConfirmationPending);
        if !self.operator.confirm(&plan.question()) {
            outcome.skip("declined by operator");
            return outcome;
        }

        outcome.advance(RepairState::Merging);
        let stale_version = match self.merge(&plan).await {
            Ok(version) => version,
            Err(note) => {
                outcome.fail(note);
                return outcome;
            }
        };

        outcome.advance(RepairState::Repointing);
        match repoint_orders(&self.identity, &plan.old_key, &plan.new_key).await {
            Ok(repoint) => {
                let failed = repoint.error_count();
                outcome.repoint = Some(repoint);
                if failed > 0 {
                    let question = format!(
                        "{failed} order(s) still reference {}. Delete {} anyway? \
                         Those orders will point at a missing user",
                        plan.old_key, plan.old_key
                    );
                    if !self.operator.confirm(&question) {
                        outcome.fail(format!(
                            "{failed} order(s) not repointed; {} kept, rerun to finish",
                            plan.old_key
                        ));
                        return outcome;
                    }
                    warn!(old_key = %plan.old_key, failed, "Partial repoint accepted by operator");
                }
            }
            Err(e) => {
                outcome.fail(format!("order lookup failed, {} kept: {e}", plan.old_key));
                return outcome;
            }
        }

        outcome.advance(RepairState::Deleting);
        match self
            .identity
            .delete_user(&plan.old_key, stale_version.as_deref())
            .await
        {
            Ok(()) => {
                outcome.advance(RepairState::Done);
                info!(old_key = %plan.old_key, new_key = %plan.new_key, "Repair complete");
            }
            Err(StoreError::PreconditionFailed(_)) => outcome.fail(format!(
                "{} changed during the repair and was not deleted; {} is live, review manually",
                plan.old_key, plan.new_key
            )),
            Err(e) => outcome.fail(format!(
                "could not delete {}: {e}; {} is live, {} needs manual cleanup",
                plan.old_key, plan.new_key, plan.old_key
            )),
        }
        outcome
    }

    /// Copy or overlay the stale record onto the target key.
    ///
    /// Returns the stale record's version for the conditional delete.
    async fn merge(&self, plan: &RepairPlan) -> Result<Option<String>, String> {
        let stale = self
            .identity
            .get_user(&plan.old_key)
            .await
            .map_err(|e| format!("could not read {}: {e}", plan.old_key))?
            .ok_or_else(|| format!("{} no longer exists", plan.old_key))?;

        let mut incoming = stale.fields.clone();
        match &plan.kind {
            RepairKind::Mismatch => {
                if stale.auth_id.clone().map(UserKey::from).as_ref() != Some(&plan.new_key) {
                    return Err(format!(
                        "auth identifier of {} changed since detection",
                        plan.old_key
                    ));
                }
            }
            RepairKind::Duplicate { .. } => {
                incoming.remove(&self.identity.collections().layout.auth_id_field);
            }
        }

        let target_exists = self
            .identity
            .user_exists(&plan.new_key)
            .await
            .map_err(|e| format!("could not read {}: {e}", plan.new_key))?;
        if !target_exists && matches!(plan.kind, RepairKind::Duplicate { .. }) {
            return Err(format!("canonical record {} no longer exists", plan.new_key));
        }

        self.identity
            .put_user(&plan.new_key, &incoming, target_exists)
            .await
            .map_err(|e| format!("could not write {}: {e}", plan.new_key))?;

        debug!(
            old_key = %plan.old_key,
            new_key = %plan.new_key,
            merged = target_exists,
            "Stale record copied to target"
        );
        Ok(stale.version)
    }
}
