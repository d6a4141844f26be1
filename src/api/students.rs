use std::sync::Arc;

use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::auth::{Caller, NewAccount, ProfileDetails, Role, StudentDetails};
use crate::db::{
    StudentUpdate, delete_student, ensure_exists, get_student, list_students,
    student_id_for_user, student_visible, update_student,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::Student;
use crate::notify::Notifier;
use crate::scope::ensure_visible;
use crate::validation::{
    ApiResult, JsonBody, JsonValidateExt, MessageResponse, validate_gender, validate_not_blank,
};

use super::users::{CreatedAccountResponse, CreatedProfileResponse, provision_by_admin};
use super::{ADMIN_ONLY, ListParams, READERS, admit_scoped};

#[derive(Deserialize, Validate)]
pub struct CreateStudentRequest {
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
    #[validate(range(min = 3, max = 120, message = "Age must be between 3 and 120"))]
    pub age: Option<i64>,
    #[validate(custom(function = "validate_gender"))]
    pub gender: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 15, message = "Parent contact must be at most 15 characters"))]
    pub parent_contact: Option<String>,
    pub classroom_id: Option<i64>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateStudentRequest {
    #[validate(
        length(max = 100, message = "Name must be at most 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(range(min = 3, max = 120, message = "Age must be between 3 and 120"))]
    pub age: i64,
    #[validate(custom(function = "validate_gender"))]
    pub gender: String,
    pub address: Option<String>,
    #[validate(length(max = 15, message = "Parent contact must be at most 15 characters"))]
    pub parent_contact: Option<String>,
    pub classroom_id: i64,
}

#[get("/students?<params..>")]
pub async fn api_list_students(
    params: ListParams,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<Student>>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;
    Ok(Json(list_students(db, &scope, &params.filter()).await?))
}

#[get("/students/<id>")]
pub async fn api_get_student(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Student>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;

    let student = get_student(db, id).await?;
    ensure_visible(student_visible(db, &scope, id).await?, "Student", id)?;

    Ok(Json(student))
}

/// Creates the login and the student profile in one step. Without a
/// classroom the student lands in the default one.
#[post("/students", data = "<request>")]
pub async fn api_create_student(
    request: JsonBody<'_, CreateStudentRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
    config: &State<AppConfig>,
    notifier: &State<Arc<dyn Notifier>>,
) -> ApiResult<Created<Json<CreatedProfileResponse<Student>>>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    if let Some(classroom_id) = validated.classroom_id {
        ensure_exists(db, "classrooms", classroom_id, "classroom_id").await?;
    }

    let account = NewAccount {
        username: validated.username,
        email: validated.email,
        first_name: validated.first_name,
        last_name: validated.last_name,
        role: Some(Role::Student),
        profile: ProfileDetails::Student(StudentDetails {
            name: validated.name,
            age: validated.age,
            gender: validated.gender,
            address: validated.address,
            parent_contact: validated.parent_contact,
            classroom_id: validated.classroom_id,
        }),
    };

    let provisioned = provision_by_admin(db, config, notifier, account).await?;
    let student_id = student_id_for_user(db, provisioned.user.id)
        .await?
        .ok_or_else(|| AppError::Internal("Student profile missing after provisioning".to_string()))?;
    let student = get_student(db, student_id).await?;

    Ok(
        Created::new(format!("/api/students/{}", student_id)).body(Json(CreatedProfileResponse {
            account: CreatedAccountResponse::from(provisioned),
            profile: student,
        })),
    )
}

#[put("/students/<id>", data = "<request>")]
pub async fn api_update_student(
    id: i64,
    request: JsonBody<'_, UpdateStudentRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Student>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    ensure_exists(db, "classrooms", validated.classroom_id, "classroom_id").await?;

    update_student(
        db,
        id,
        &StudentUpdate {
            name: validated.name.trim(),
            age: validated.age,
            gender: &validated.gender,
            address: validated.address.as_deref(),
            parent_contact: validated.parent_contact.as_deref(),
            classroom_id: validated.classroom_id,
        },
    )
    .await?;

    Ok(Json(get_student(db, id).await?))
}

#[delete("/students/<id>")]
pub async fn api_delete_student(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    caller.admit(ADMIN_ONLY)?;

    delete_student(db, id).await?;

    Ok(MessageResponse::success("Student and linked account deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_students,
        api_get_student,
        api_create_student,
        api_update_student,
        api_delete_student,
    ]
}
