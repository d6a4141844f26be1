use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::{get_session_by_token, get_user};
use crate::validation::{ApiError, ToValidationResponse, ValidationResponse};

use super::{LOGIN_PATH, Role, SESSION_COOKIE, User, authorize, signed_in};

/// The resolved identity behind a request, plus the path it asked for.
/// Anonymous requests still produce a `Caller`; the gate decides what to do
/// with them.
pub struct Caller {
    pub user: Option<User>,
    pub path: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("caller_guard");
        let _guard = auth_span.enter();

        let path = request.uri().path().as_str().to_string();

        let token = request
            .cookies()
            .get_private(SESSION_COOKIE)
            .map(|c| c.value().to_string());

        let Some(token) = token else {
            return Outcome::Success(Caller { user: None, path });
        };

        let db = match request.rocket().state::<SqlitePool>() {
            Some(pool) => pool,
            _ => {
                tracing::error!("Database pool not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        let session = match get_session_by_token(db, &token).await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = ?err, "Invalid session token");
                return Outcome::Success(Caller { user: None, path });
            }
        };

        if !session.is_valid() {
            warn!(user_id = %session.user_id, "Session token expired");
            return Outcome::Success(Caller { user: None, path });
        }

        match get_user(db, session.user_id).await {
            Ok(user) => {
                info!(username = %user.username, role = %user.role_str(), "Caller resolved from session");
                Outcome::Success(Caller {
                    user: Some(user),
                    path,
                })
            }
            Err(err) => {
                tracing::error!(user_id = %session.user_id, error = ?err, "Failed to fetch user for valid session");
                Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}

impl Caller {
    /// Runs the authorization gate for this request.
    pub fn admit(&self, permitted: &[Role]) -> Result<&User, ApiError> {
        authorize(self.user.as_ref(), permitted, &self.path).map_err(|denial| {
            warn!(
                path = %self.path,
                username = self.user.as_ref().map(|u| u.username.as_str()).unwrap_or("anonymous"),
                permitted = ?permitted,
                denial = ?denial,
                "Access denied"
            );
            ApiError::from(denial)
        })
    }

    /// Any signed-in caller, including accounts without a role.
    pub fn admit_signed_in(&self) -> Result<&User, ApiError> {
        signed_in(self.user.as_ref(), &self.path).map_err(|denial| {
            warn!(path = %self.path, denial = ?denial, "Access denied");
            ApiError::from(denial)
        })
    }
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Redirect {
    warn!("Unauthorized access attempt");
    Redirect::found(LOGIN_PATH)
}

#[catch(403)]
pub fn forbidden(_req: &Request) -> Custom<Json<ValidationResponse>> {
    warn!("Forbidden access attempt");
    Status::Forbidden.to_validation_response()
}
