//! User lookup by email.

use freightdesk_reconcile::ReconcileConfig;

use super::{CommandError, connect, emit};

/// List every user record stored with `email`.
///
/// # Errors
///
/// Returns an error if sign-in or the query fails.
pub async fn run(config: &ReconcileConfig, email: &str) -> Result<(), CommandError> {
    let conn = connect(config).await?;
    let users = conn.identity.users_with_email(email).await?;

    if users.is_empty() {
        emit(format_args!("No users with email {}\n", email.trim()));
        return Ok(());
    }
    for user in &users {
        let mark = if user.is_mismatched() { " (key mismatch)" } else { "" };
        emit(format_args!("{}{mark}\n", user.describe()));
    }
    Ok(())
}
