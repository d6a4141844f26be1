use chrono::NaiveDate;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{FromForm, Route, State};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::auth::{Caller, Role};
use crate::db::{
    AttendanceFilter, ListFilter, create_attendance, delete_attendance, ensure_exists,
    get_attendance, list_attendance, student_visible, update_attendance,
};
use crate::error::AppError;
use crate::models::Attendance;
use crate::scope::{Scope, ensure_visible};
use crate::validation::{ApiResult, JsonBody, JsonValidateExt, MessageResponse, validate_attendance_status};

use super::{READERS, admit_scoped};

const RECORDERS: &[Role] = &[Role::Teacher];

#[derive(Deserialize, Validate)]
pub struct AttendanceRequest {
    pub student_id: i64,
    pub date: NaiveDate,
    #[validate(custom(function = "validate_attendance_status"))]
    pub status: String,
}

#[derive(Debug, Default, FromForm)]
pub struct AttendanceParams {
    pub q: Option<String>,
    pub classroom: Option<i64>,
    pub student: Option<i64>,
    pub date: Option<String>,
}

impl AttendanceParams {
    fn filter(&self) -> Result<AttendanceFilter, AppError> {
        let date = match self.date.as_deref() {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| AppError::validation("date", "Dates must look like YYYY-MM-DD"))?,
            ),
            None => None,
        };

        Ok(AttendanceFilter {
            list: ListFilter {
                q: self.q.clone(),
                classroom_id: self.classroom,
            },
            student_id: self.student,
            date,
        })
    }
}

/// The student must exist and be reachable by the caller.
async fn check_student(db: &SqlitePool, scope: &Scope, student_id: i64) -> Result<(), AppError> {
    ensure_exists(db, "students", student_id, "student_id").await?;
    ensure_visible(student_visible(db, scope, student_id).await?, "Student", student_id)
}

#[get("/attendances?<params..>")]
pub async fn api_list_attendance(
    params: AttendanceParams,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<Attendance>>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;
    Ok(Json(list_attendance(db, &scope, &params.filter()?).await?))
}

#[get("/attendances/<id>")]
pub async fn api_get_attendance(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Attendance>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;

    let record = get_attendance(db, id).await?;
    ensure_visible(student_visible(db, &scope, record.student_id).await?, "Attendance", id)?;

    Ok(Json(record))
}

#[post("/attendances", data = "<request>")]
pub async fn api_create_attendance(
    request: JsonBody<'_, AttendanceRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Created<Json<Attendance>>> {
    let (_, scope) = admit_scoped(&caller, RECORDERS, db).await?;
    let validated = request.validate_custom()?;

    check_student(db, &scope, validated.student_id).await?;

    let id = create_attendance(db, validated.student_id, validated.date, &validated.status).await?;

    Ok(Created::new(format!("/api/attendances/{}", id)).body(Json(get_attendance(db, id).await?)))
}

#[put("/attendances/<id>", data = "<request>")]
pub async fn api_update_attendance(
    id: i64,
    request: JsonBody<'_, AttendanceRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Attendance>> {
    let (_, scope) = admit_scoped(&caller, RECORDERS, db).await?;
    let validated = request.validate_custom()?;

    let existing = get_attendance(db, id).await?;
    ensure_visible(student_visible(db, &scope, existing.student_id).await?, "Attendance", id)?;
    check_student(db, &scope, validated.student_id).await?;

    update_attendance(db, id, validated.student_id, validated.date, &validated.status).await?;

    Ok(Json(get_attendance(db, id).await?))
}

#[delete("/attendances/<id>")]
pub async fn api_delete_attendance(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    let (_, scope) = admit_scoped(&caller, RECORDERS, db).await?;

    let existing = get_attendance(db, id).await?;
    ensure_visible(student_visible(db, &scope, existing.student_id).await?, "Attendance", id)?;

    delete_attendance(db, id).await?;

    Ok(MessageResponse::success("Attendance deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_attendance,
        api_get_attendance,
        api_create_attendance,
        api_update_attendance,
        api_delete_attendance,
    ]
}
