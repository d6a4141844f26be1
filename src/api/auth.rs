use std::sync::Arc;

use chrono::Utc;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::Redirect;
use rocket::response::status::{Created, Custom};
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};
use validator::Validate;

use crate::auth::{
    Caller, LOGIN_PATH, NO_PERMISSION_PATH, NewAccount, PASSWORD_CHANGE_PATH, PasswordChangeRequest,
    Provisioning, Role, SESSION_COOKIE, User, UserSession, change_password, provision_account,
};
use crate::db::{authenticate_user, create_user_session, invalidate_session};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::notify::Notifier;
use crate::validation::{
    ApiResult, JsonBody, JsonValidateExt, MessageResponse, ValidationResponse,
    validate_not_blank,
};

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub display_name: String,
    pub role: Option<Role>,
    pub is_superuser: bool,
    pub force_password_change: bool,
}

impl From<&User> for UserData {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            display_name: user.display_name(),
            role: user.role,
            is_superuser: user.is_superuser,
            force_password_change: user.force_password_change,
        }
    }
}

/// Where a signed-in user should land: the password change form while a
/// change is pending, otherwise their role's dashboard.
pub fn landing_path(user: &User) -> &'static str {
    if user.force_password_change {
        PASSWORD_CHANGE_PATH
    } else if user.is_admin_equivalent() {
        Role::Admin.dashboard_path()
    } else {
        match user.role {
            Some(role) => role.dashboard_path(),
            None => NO_PERMISSION_PATH,
        }
    }
}

async fn start_session(
    db: &SqlitePool,
    config: &AppConfig,
    cookies: &CookieJar<'_>,
    user: &User,
) -> Result<(), AppError> {
    let token = UserSession::generate_token();
    let expires_at = Utc::now() + chrono::Duration::hours(config.session_ttl_hours);

    create_user_session(db, user.id, &token, expires_at.naive_utc()).await?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .same_site(SameSite::Lax)
        .http_only(true)
        .max_age(rocket::time::Duration::hours(config.session_ttl_hours));
    cookies.add_private(cookie);

    Ok(())
}

#[get("/login")]
pub fn api_login_page(caller: Caller) -> Json<LoginResponse> {
    match caller.user {
        Some(user) => Json(LoginResponse {
            success: true,
            redirect_url: Some(landing_path(&user).to_string()),
            user: Some(UserData::from(&user)),
            error: None,
        }),
        None => Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Authentication required".to_string()),
            redirect_url: None,
        }),
    }
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: JsonBody<'_, LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<SqlitePool>,
    config: &State<AppConfig>,
) -> ApiResult<Custom<Json<LoginResponse>>> {
    let validated = login.validate_custom()?;

    match authenticate_user(db, validated.username.trim(), &validated.password).await? {
        Some(user) => {
            start_session(db, config, cookies, &user).await?;
            info!(username = %user.username, "User logged in");

            Ok(Custom(
                Status::Ok,
                Json(LoginResponse {
                    success: true,
                    redirect_url: Some(landing_path(&user).to_string()),
                    user: Some(UserData::from(&user)),
                    error: None,
                }),
            ))
        }
        None => {
            warn!(username = %validated.username, "Failed login attempt");
            Ok(Custom(
                Status::Unauthorized,
                Json(LoginResponse {
                    success: false,
                    user: None,
                    error: Some("Invalid username or password".to_string()),
                    redirect_url: None,
                }),
            ))
        }
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, db: &State<SqlitePool>) -> Redirect {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        if let Err(err) = invalidate_session(db, &token).await {
            warn!(error = %err, "Failed to invalidate session on logout");
        }
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));
    Redirect::found(LOGIN_PATH)
}

#[derive(Deserialize, Validate)]
pub struct RegistrationRequest {
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
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

/// Public sign-up. The new account has no role until an administrator
/// assigns one, and is signed in straight away.
#[post("/register", data = "<registration>")]
pub async fn api_register(
    registration: JsonBody<'_, RegistrationRequest>,
    cookies: &CookieJar<'_>,
    db: &State<SqlitePool>,
    config: &State<AppConfig>,
    notifier: &State<Arc<dyn Notifier>>,
) -> ApiResult<Created<Json<UserData>>> {
    let validated = registration.validate_custom()?;

    let account = NewAccount {
        username: validated.username,
        email: validated.email,
        first_name: validated.first_name,
        last_name: validated.last_name,
        ..Default::default()
    };

    let provisioned = provision_account(
        db,
        notifier.inner().as_ref(),
        config,
        account,
        Provisioning::SelfService {
            password: validated.password,
        },
    )
    .await?;

    start_session(db, config, cookies, &provisioned.user).await?;
    info!(username = %provisioned.user.username, "User registered");

    Ok(Created::new("/api/me").body(Json(UserData::from(&provisioned.user))))
}

#[get("/role-redirect")]
pub fn api_role_redirect(caller: Caller) -> ApiResult<Redirect> {
    let user = caller.admit_signed_in()?;
    Ok(Redirect::found(landing_path(user)))
}

#[derive(Serialize, Deserialize)]
pub struct PasswordChangeStatus {
    pub force_password_change: bool,
}

#[get("/force-password-change")]
pub fn api_password_change_status(caller: Caller) -> ApiResult<Json<PasswordChangeStatus>> {
    let user = caller.admit_signed_in()?;

    Ok(Json(PasswordChangeStatus {
        force_password_change: user.force_password_change,
    }))
}

#[post("/force-password-change", data = "<request>")]
pub async fn api_change_password(
    request: JsonBody<'_, PasswordChangeRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    let user = caller.admit_signed_in()?;
    let validated = request.validate_custom()?;

    change_password(db, user, &validated).await?;

    Ok(MessageResponse::success("Password changed successfully"))
}

#[get("/no-permission")]
pub fn api_no_permission() -> Custom<Json<ValidationResponse>> {
    Custom(
        Status::Forbidden,
        Json(ValidationResponse::with_error(
            "permission",
            "You don't have permission to perform this action",
        )),
    )
}

#[get("/me")]
pub fn api_me(caller: Caller) -> ApiResult<Json<UserData>> {
    let user = caller.admit_signed_in()?;
    Ok(Json(UserData::from(user)))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

pub fn routes() -> Vec<Route> {
    routes![
        api_login_page,
        api_login,
        api_logout,
        api_register,
        api_role_redirect,
        api_password_change_status,
        api_change_password,
        api_no_permission,
        api_me,
        health,
    ]
}
