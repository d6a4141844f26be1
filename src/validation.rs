use std::collections::HashMap;

use rocket::http::Status;
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::json::{self, Json};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use validator::{Validate, ValidationError};

use crate::auth::{Denial, LOGIN_PATH, NO_PERMISSION_PATH};
use crate::error::AppError;
use crate::models::{ATTENDANCE_STATUSES, DAYS_OF_WEEK, FEE_STATUSES, GENDERS};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

/// Body returned by successful mutations.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageResponse {
    pub status: String,
    pub message: String,
}

impl MessageResponse {
    pub fn success(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
            message: message.into(),
        })
    }
}

pub trait ToValidationResponse {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>>;
}

impl ToValidationResponse for AppError {
    #[instrument]
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>> {
        self.log_and_record("API Validation Error");
        let status = self.status_code();

        let (field, message) = match &self {
            AppError::Database(_) => ("database", "Database error".to_string()),
            AppError::Authentication(msg) => {
                ("authentication", format!("Authentication error: {}", msg))
            }
            AppError::Authorization(msg) => {
                ("authorization", format!("Permission denied: {}", msg))
            }
            AppError::NotFound(msg) => ("resource", format!("Not found: {}", msg)),
            AppError::Validation { field, message } => (field.as_str(), message.clone()),
            AppError::ExternalService(msg) => ("service", format!("Service error: {}", msg)),
            AppError::Internal(_) => ("server", "Internal server error".to_string()),
        };

        Custom(status, Json(ValidationResponse::with_error(field, &message)))
    }
}

impl ToValidationResponse for Status {
    #[instrument]
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>> {
        let (field, message) = match self.code {
            403 => (
                "permission",
                "You don't have permission to perform this action",
            ),
            401 => ("authentication", "Authentication required"),
            404 => ("resource", "Resource not found"),
            400 => ("request", "Bad request"),
            422 => ("validation", "Validation failed"),
            500 => ("server", "Internal server error"),
            503 => ("service", "Service unavailable"),
            _ => ("error", "An error occurred"),
        };

        Custom(self, Json(ValidationResponse::with_error(field, message)))
    }
}

#[derive(Debug)]
pub struct ValidationErrorWrapper(pub validator::ValidationErrors);

impl From<ValidationErrorWrapper> for Custom<Json<ValidationResponse>> {
    #[instrument]
    fn from(wrapper: ValidationErrorWrapper) -> Self {
        let errors = wrapper.0;
        let mut error_map = HashMap::new();

        for (field, field_errors) in errors.field_errors() {
            let error_messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), error_messages);
        }

        tracing::warn!(fields = ?error_map.keys().collect::<Vec<_>>(), "Request failed validation");

        Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::new(error_map)),
        )
    }
}

/// Every handler failure. Unauthenticated and forbidden outcomes become
/// redirects; everything else is a JSON error body.
#[derive(Debug, rocket::Responder)]
pub enum ApiError {
    Redirect(Redirect),
    Failure(Custom<Json<ValidationResponse>>),
}

impl From<Denial> for ApiError {
    fn from(denial: Denial) -> Self {
        ApiError::Redirect(Redirect::found(denial.location()))
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Authentication(_) => {
                err.log_and_record("Request rejected");
                ApiError::Redirect(Redirect::found(LOGIN_PATH))
            }
            AppError::Authorization(_) => {
                err.log_and_record("Request rejected");
                ApiError::Redirect(Redirect::found(NO_PERMISSION_PATH))
            }
            _ => ApiError::Failure(err.to_validation_response()),
        }
    }
}

impl From<ValidationErrorWrapper> for ApiError {
    fn from(wrapper: ValidationErrorWrapper) -> Self {
        ApiError::Failure(wrapper.into())
    }
}

impl From<Custom<Json<ValidationResponse>>> for ApiError {
    fn from(response: Custom<Json<ValidationResponse>>) -> Self {
        ApiError::Failure(response)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub trait JsonValidateExt<T> {
    /// Runs the `validator` rules on a JSON body and unwraps it.
    fn validate_custom(self) -> Result<T, ApiError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, ApiError> {
        let inner = self.into_inner();
        match inner.validate() {
            Ok(()) => Ok(inner),
            Err(errors) => Err(ValidationErrorWrapper(errors).into()),
        }
    }
}

/// A request body whose parse failure is held back until the handler has
/// admitted the caller.
pub type JsonBody<'r, T> = Result<Json<T>, json::Error<'r>>;

impl<T: Validate> JsonValidateExt<T> for JsonBody<'_, T> {
    fn validate_custom(self) -> Result<T, ApiError> {
        match self {
            Ok(body) => body.validate_custom(),
            Err(err) => {
                let detail = match &err {
                    json::Error::Io(io) => io.to_string(),
                    json::Error::Parse(_, parse) => parse.to_string(),
                };
                warn!(error = %detail, "Request body could not be parsed");

                Err(ApiError::Failure(Custom(
                    Status::UnprocessableEntity,
                    Json(ValidationResponse::with_error("body", &detail)),
                )))
            }
        }
    }
}

fn one_of(value: &str, choices: &[&str], code: &'static str) -> Result<(), ValidationError> {
    if choices.contains(&value) {
        Ok(())
    } else {
        let mut err = ValidationError::new(code);
        err.message = Some(format!("Must be one of: {}", choices.join(", ")).into());
        Err(err)
    }
}

pub fn validate_gender(value: &str) -> Result<(), ValidationError> {
    one_of(value, GENDERS, "gender")
}

pub fn validate_attendance_status(value: &str) -> Result<(), ValidationError> {
    one_of(value, ATTENDANCE_STATUSES, "attendance_status")
}

pub fn validate_fee_status(value: &str) -> Result<(), ValidationError> {
    one_of(value, FEE_STATUSES, "fee_status")
}

pub fn validate_day_of_week(value: &str) -> Result<(), ValidationError> {
    one_of(value, DAYS_OF_WEEK, "day_of_week")
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("This field is required".into());
        return Err(err);
    }
    Ok(())
}
