//! Mismatch and duplicate repair runs.
//!
//! A run exits successfully even if some candidates failed; the summary
//! lists them. Only a failed detection scan aborts the command.

use freightdesk_reconcile::{AssumeYes, Operator, ReconcileConfig, Reconciler, RunSummary};
use tracing::info;

use super::{CommandError, Connection, connect, emit};
use crate::terminal::TerminalOperator;

#[derive(Clone, Copy)]
enum Run {
    Mismatches,
    Duplicates,
}

async fn execute<O: Operator>(conn: Connection, operator: O, run: Run) -> Result<RunSummary, CommandError> {
    let mut reconciler = Reconciler::new(conn.identity, operator, conn.key_shape);
    let summary = match run {
        Run::Mismatches => reconciler.fix_mismatches().await?,
        Run::Duplicates => reconciler.fix_duplicates().await?,
    };
    Ok(summary)
}

async fn fix(config: &ReconcileConfig, yes: bool, run: Run) -> Result<(), CommandError> {
    let conn = connect(config).await?;

    let summary = if yes {
        info!("Unattended run, every repair is approved");
        execute(conn, AssumeYes, run).await?
    } else {
        execute(conn, TerminalOperator::stdio(), run).await?
    };

    emit(&summary);
    Ok(())
}

/// Move every user stored under a key other than its auth identifier.
///
/// # Errors
///
/// Returns an error if sign-in or the detection scan fails.
pub async fn mismatches(config: &ReconcileConfig, yes: bool) -> Result<(), CommandError> {
    fix(config, yes, Run::Mismatches).await
}

/// Merge every group of users sharing a normalized email.
///
/// # Errors
///
/// Returns an error if sign-in or the detection scan fails.
pub async fn duplicates(config: &ReconcileConfig, yes: bool) -> Result<(), CommandError> {
    fix(config, yes, Run::Duplicates).await
}
