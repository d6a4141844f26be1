use chrono::NaiveTime;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use validator::Validate;

use crate::auth::Caller;
use crate::db::{SlotInput, create_slot, delete_slot, ensure_exists, list_timetable};
use crate::error::AppError;
use crate::models::TimetableSlot;
use crate::validation::{ApiResult, JsonBody, JsonValidateExt, MessageResponse, validate_day_of_week};

use super::{ADMIN_ONLY, READERS, admit_scoped};

#[derive(Deserialize, Validate)]
pub struct SlotRequest {
    pub classroom_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    #[validate(custom(function = "validate_day_of_week"))]
    pub day_of_week: String,
    /// `HH:MM` or `HH:MM:SS`.
    pub period_time: String,
}

#[derive(Serialize, Deserialize)]
pub struct SlotCreated {
    pub id: i64,
}

fn parse_period(raw: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
        .map_err(|_| AppError::validation("period_time", "Period time must look like HH:MM"))
}

#[get("/timetable?<classroom>")]
pub async fn api_list_timetable(
    classroom: Option<i64>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<TimetableSlot>>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;
    Ok(Json(list_timetable(db, &scope, classroom).await?))
}

#[post("/timetable", data = "<request>")]
pub async fn api_create_slot(
    request: JsonBody<'_, SlotRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Created<Json<SlotCreated>>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;
    let period_time = parse_period(&validated.period_time)?;

    ensure_exists(db, "classrooms", validated.classroom_id, "classroom_id").await?;
    ensure_exists(db, "subjects", validated.subject_id, "subject_id").await?;
    ensure_exists(db, "teachers", validated.teacher_id, "teacher_id").await?;

    let id = create_slot(
        db,
        &SlotInput {
            classroom_id: validated.classroom_id,
            subject_id: validated.subject_id,
            teacher_id: validated.teacher_id,
            day_of_week: &validated.day_of_week,
            period_time,
        },
    )
    .await?;

    Ok(Created::new("/api/timetable").body(Json(SlotCreated { id })))
}

#[delete("/timetable/<id>")]
pub async fn api_delete_slot(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    caller.admit(ADMIN_ONLY)?;

    delete_slot(db, id).await?;

    Ok(MessageResponse::success("Timetable slot deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![api_list_timetable, api_create_slot, api_delete_slot]
}
