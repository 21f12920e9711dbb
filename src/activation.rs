//! Account activation: `pending --activate(token)--> active`.

use crate::{
    error::{AppError, AppResult},
    models::User,
    repository::Repository,
};

/// activate
///
/// Flips the pending account holding `token` to active and burns the token. An unknown,
/// already-used or blank token is a lookup failure, never a silent no-op.
pub async fn activate(repo: &dyn Repository, token: &str) -> AppResult<User> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::not_found("Activation token", token));
    }

    match repo.activate_user(token).await? {
        Some(user) => {
            tracing::info!(user_id = %user.id, "account activated");
            Ok(user)
        }
        None => {
            tracing::warn!("activation attempted with an unknown or used token");
            Err(AppError::not_found("Activation token", "<redacted>"))
        }
    }
}
