use serde::Deserialize;
use tracing::{info, instrument};
use validator::Validate;

use crate::db::{authenticate_user, update_user_password};
use crate::error::AppError;

use super::User;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, HASH_COST)?)
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordChangeRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

/// Replaces the caller's password and clears any pending forced change in
/// the same write. This is the only transition out of the must-change state.
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn change_password(
    pool: &sqlx::SqlitePool,
    user: &User,
    request: &PasswordChangeRequest,
) -> Result<(), AppError> {
    if authenticate_user(pool, &user.username, &request.current_password)
        .await?
        .is_none()
    {
        return Err(AppError::validation(
            "current_password",
            "Current password is incorrect",
        ));
    }

    if request.current_password == request.new_password {
        return Err(AppError::validation(
            "new_password",
            "New password must differ from the current one",
        ));
    }

    update_user_password(pool, user.id, &request.new_password, false).await?;
    info!(username = %user.username, "Password changed");

    Ok(())
}
