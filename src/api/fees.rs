use chrono::NaiveDate;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use validator::Validate;

use crate::auth::{Caller, Role};
use crate::db::{FeeInput, create_fee, delete_fee, ensure_exists, list_fees, update_fee};
use crate::models::Fee;
use crate::validation::{ApiResult, JsonBody, JsonValidateExt, MessageResponse, validate_fee_status};

use super::{ADMIN_ONLY, admit_scoped};

const FEE_READERS: &[Role] = &[Role::Student];

#[derive(Deserialize, Validate)]
pub struct FeeRequest {
    pub student_id: i64,
    #[validate(range(exclusive_min = 0.0, message = "Amount must be greater than zero"))]
    pub amount: f64,
    #[validate(custom(function = "validate_fee_status"))]
    pub status: String,
    pub due_date: Option<NaiveDate>,
}

impl FeeRequest {
    fn input(&self) -> FeeInput<'_> {
        FeeInput {
            student_id: self.student_id,
            amount: self.amount,
            status: &self.status,
            due_date: self.due_date,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct FeeCreated {
    pub id: i64,
}

#[get("/fees?<student>")]
pub async fn api_list_fees(
    student: Option<i64>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<Fee>>> {
    let (_, scope) = admit_scoped(&caller, FEE_READERS, db).await?;
    Ok(Json(list_fees(db, &scope, student).await?))
}

#[post("/fees", data = "<request>")]
pub async fn api_create_fee(
    request: JsonBody<'_, FeeRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Created<Json<FeeCreated>>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    ensure_exists(db, "students", validated.student_id, "student_id").await?;
    let id = create_fee(db, &validated.input()).await?;

    Ok(Created::new("/api/fees").body(Json(FeeCreated { id })))
}

#[put("/fees/<id>", data = "<request>")]
pub async fn api_update_fee(
    id: i64,
    request: JsonBody<'_, FeeRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    ensure_exists(db, "students", validated.student_id, "student_id").await?;
    update_fee(db, id, &validated.input()).await?;

    Ok(MessageResponse::success("Fee updated successfully"))
}

#[delete("/fees/<id>")]
pub async fn api_delete_fee(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    caller.admit(ADMIN_ONLY)?;

    delete_fee(db, id).await?;

    Ok(MessageResponse::success("Fee deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![api_list_fees, api_create_fee, api_update_fee, api_delete_fee]
}
