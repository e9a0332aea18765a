//! Manual order repointing between two existing users.

use freightdesk_core::UserKey;
use freightdesk_reconcile::{AssumeYes, Operator, ReconcileConfig, Reconciler};
use tracing::info;

use super::{CommandError, connect, emit};
use crate::terminal::TerminalOperator;

/// Repoint every order of `from` to `to`.
///
/// # Errors
///
/// Returns an error if the keys are equal, either user does not exist, or
/// the orders query fails.
pub async fn run(config: &ReconcileConfig, from: &str, to: &str, yes: bool) -> Result<(), CommandError> {
    let conn = connect(config).await?;
    let (from, to) = (UserKey::new(from.trim()), UserKey::new(to.trim()));

    let operator: Box<dyn Operator> = if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalOperator::stdio())
    };
    let mut reconciler = Reconciler::new(conn.identity, operator, conn.key_shape);

    let Some(outcome) = reconciler.repoint(&from, &to).await? else {
        info!("Nothing changed");
        return Ok(());
    };

    emit(format_args!(
        "Repointed {} order(s) from {from} to {to}\n",
        outcome.updated.len()
    ));
    for failure in &outcome.failures {
        emit(format_args!("  failed: order {}: {}\n", failure.order, failure.error));
    }
    Ok(())
}
