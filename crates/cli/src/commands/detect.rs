//! Read-only inconsistency report.

use freightdesk_reconcile::{AssumeYes, ReconcileConfig, Reconciler};

use super::{CommandError, connect, emit};

/// Print mismatches, duplicate groups and dangling references.
///
/// # Errors
///
/// Returns an error if sign-in or any collection read fails.
pub async fn run(config: &ReconcileConfig, json: bool) -> Result<(), CommandError> {
    let conn = connect(config).await?;
    let reconciler = Reconciler::new(conn.identity, AssumeYes, conn.key_shape);

    let report = reconciler.detect().await?;
    if json {
        emit(format_args!("{}\n", serde_json::to_string_pretty(&report)?));
    } else {
        emit(&report);
    }
    Ok(())
}
