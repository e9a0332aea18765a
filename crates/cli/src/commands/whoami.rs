//! Signed-in operator details.

use freightdesk_reconcile::ReconcileConfig;

use super::{CommandError, connect, emit};

/// Sign in and print the operator's identity.
///
/// # Errors
///
/// Returns an error if sign-in fails.
pub async fn run(config: &ReconcileConfig) -> Result<(), CommandError> {
    let conn = connect(config).await?;
    let session = &conn.session;

    let expires = chrono::DateTime::from_timestamp(session.expires_at, 0)
        .map_or_else(|| "never".to_owned(), |t| t.to_rfc3339());

    emit(format_args!(
        "uid:     {}\nemail:   {}\nproject: {}\nexpires: {expires}\n",
        session.uid, session.email, config.firebase.project_id
    ));
    Ok(())
}
