use std::sync::Arc;

use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::auth::{Caller, NewAccount, ProfileDetails, Role, TeacherDetails};
use crate::db::{
    TeacherUpdate, delete_teacher, get_teacher, list_teachers, teacher_id_for_user,
    teacher_visible, update_teacher,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::Teacher;
use crate::notify::Notifier;
use crate::scope::ensure_visible;
use crate::validation::{
    ApiResult, JsonBody, JsonValidateExt, MessageResponse, validate_gender, validate_not_blank,
};

use super::users::{CreatedAccountResponse, CreatedProfileResponse, provision_by_admin};
use super::{ADMIN_ONLY, ListParams, READERS, admit_scoped};

#[derive(Deserialize, Validate)]
pub struct CreateTeacherRequest {
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
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_gender"))]
    pub gender: Option<String>,
    #[validate(length(max = 15, message = "Contact must be at most 15 characters"))]
    pub contact: Option<String>,
    #[serde(default)]
    pub subject_ids: Vec<i64>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateTeacherRequest {
    #[validate(
        length(max = 100, message = "Name must be at most 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(custom(function = "validate_gender"))]
    pub gender: String,
    #[validate(length(max = 15, message = "Contact must be at most 15 characters"))]
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub subject_ids: Vec<i64>,
}

#[get("/teachers?<params..>")]
pub async fn api_list_teachers(
    params: ListParams,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<Teacher>>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;
    Ok(Json(list_teachers(db, &scope, &params.filter()).await?))
}

#[get("/teachers/<id>")]
pub async fn api_get_teacher(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Teacher>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;

    let teacher = get_teacher(db, id).await?;
    ensure_visible(teacher_visible(db, &scope, id).await?, "Teacher", id)?;

    Ok(Json(teacher))
}

/// Creates the login and the teacher profile in one step. Credentials go
/// out through the notifier.
#[post("/teachers", data = "<request>")]
pub async fn api_create_teacher(
    request: JsonBody<'_, CreateTeacherRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
    config: &State<AppConfig>,
    notifier: &State<Arc<dyn Notifier>>,
) -> ApiResult<Created<Json<CreatedProfileResponse<Teacher>>>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    let account = NewAccount {
        username: validated.username,
        email: validated.email,
        first_name: validated.first_name,
        last_name: validated.last_name,
        role: Some(Role::Teacher),
        profile: ProfileDetails::Teacher(TeacherDetails {
            name: validated.name,
            gender: validated.gender,
            contact: validated.contact,
            subject_ids: validated.subject_ids,
        }),
    };

    let provisioned = provision_by_admin(db, config, notifier, account).await?;
    let teacher_id = teacher_id_for_user(db, provisioned.user.id)
        .await?
        .ok_or_else(|| AppError::Internal("Teacher profile missing after provisioning".to_string()))?;
    let teacher = get_teacher(db, teacher_id).await?;

    Ok(
        Created::new(format!("/api/teachers/{}", teacher_id)).body(Json(CreatedProfileResponse {
            account: CreatedAccountResponse::from(provisioned),
            profile: teacher,
        })),
    )
}

#[put("/teachers/<id>", data = "<request>")]
pub async fn api_update_teacher(
    id: i64,
    request: JsonBody<'_, UpdateTeacherRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Teacher>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    update_teacher(
        db,
        id,
        &TeacherUpdate {
            name: validated.name.trim(),
            gender: &validated.gender,
            contact: validated.contact.trim(),
            subject_ids: &validated.subject_ids,
        },
    )
    .await?;

    Ok(Json(get_teacher(db, id).await?))
}

#[delete("/teachers/<id>")]
pub async fn api_delete_teacher(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    caller.admit(ADMIN_ONLY)?;

    delete_teacher(db, id).await?;

    Ok(MessageResponse::success("Teacher and linked account deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_teachers,
        api_get_teacher,
        api_create_teacher,
        api_update_teacher,
        api_delete_teacher,
    ]
}
