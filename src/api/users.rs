use std::sync::Arc;

use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use validator::Validate;

use crate::auth::{Caller, NewAccount, ProvisionedAccount, Provisioning, Role, provision_account};
use crate::db::get_all_users;
use crate::env::AppConfig;
use crate::notify::Notifier;
use crate::validation::{ApiResult, JsonBody, JsonValidateExt, validate_not_blank};

use super::ADMIN_ONLY;
use super::auth::UserData;

#[derive(Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 1, max = 150, message = "Username must be between 1 and 150 characters"),
        custom(function = "validate_not_blank")
    )]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Option<Role>,
}

/// Outcome of an administrator-initiated account creation. The temporary
/// password is only echoed back when it could not be delivered.
#[derive(Serialize, Deserialize, Debug)]
pub struct CreatedAccountResponse {
    pub user: UserData,
    pub temporary_password: Option<String>,
    pub warning: Option<String>,
}

impl From<ProvisionedAccount> for CreatedAccountResponse {
    fn from(account: ProvisionedAccount) -> Self {
        let temporary_password = match account.notification_warning {
            Some(_) => account.temporary_password,
            None => None,
        };

        Self {
            user: UserData::from(&account.user),
            temporary_password,
            warning: account.notification_warning,
        }
    }
}

/// Shared by every admin create endpoint that results in a new login.
pub(crate) async fn provision_by_admin(
    db: &SqlitePool,
    config: &AppConfig,
    notifier: &State<Arc<dyn Notifier>>,
    account: NewAccount,
) -> ApiResult<ProvisionedAccount> {
    Ok(provision_account(
        db,
        notifier.inner().as_ref(),
        config,
        account,
        Provisioning::AdminInitiated,
    )
    .await?)
}

/// An account created together with its profile.
#[derive(Serialize, Deserialize, Debug)]
pub struct CreatedProfileResponse<T> {
    pub account: CreatedAccountResponse,
    pub profile: T,
}

#[get("/users")]
pub async fn api_list_users(
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<UserData>>> {
    caller.admit(ADMIN_ONLY)?;

    let users = get_all_users(db).await?;
    Ok(Json(users.iter().map(UserData::from).collect()))
}

#[post("/users", data = "<request>")]
pub async fn api_create_user(
    request: JsonBody<'_, CreateUserRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
    config: &State<AppConfig>,
    notifier: &State<Arc<dyn Notifier>>,
) -> ApiResult<Created<Json<CreatedAccountResponse>>> {
    let admin = caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    info!(created_by = %admin.username, username = %validated.username, role = ?validated.role, "Provisioning account");

    let account = NewAccount {
        username: validated.username,
        email: validated.email,
        first_name: validated.first_name,
        last_name: validated.last_name,
        role: validated.role,
        ..Default::default()
    };

    let provisioned = provision_by_admin(db, config, notifier, account).await?;
    Ok(Created::new("/api/users").body(Json(CreatedAccountResponse::from(provisioned))))
}

pub fn routes() -> Vec<Route> {
    routes![api_list_users, api_create_user]
}
