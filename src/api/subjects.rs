use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::auth::Caller;
use crate::db::{
    create_subject, delete_subject, get_subject, list_subjects, subject_visible, update_subject,
};
use crate::models::Subject;
use crate::scope::ensure_visible;
use crate::validation::{ApiResult, JsonBody, JsonValidateExt, MessageResponse, validate_not_blank};

use super::{ADMIN_ONLY, ListParams, READERS, admit_scoped};

#[derive(Deserialize, Validate)]
pub struct SubjectRequest {
    #[validate(
        length(max = 100, message = "Name must be at most 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(
        length(max = 20, message = "Code must be at most 20 characters"),
        custom(function = "validate_not_blank")
    )]
    pub code: String,
}

#[get("/subjects?<params..>")]
pub async fn api_list_subjects(
    params: ListParams,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<Subject>>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;
    Ok(Json(list_subjects(db, &scope, &params.filter()).await?))
}

#[get("/subjects/<id>")]
pub async fn api_get_subject(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Subject>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;

    let subject = get_subject(db, id).await?;
    ensure_visible(subject_visible(db, &scope, id).await?, "Subject", id)?;

    Ok(Json(subject))
}

#[post("/subjects", data = "<request>")]
pub async fn api_create_subject(
    request: JsonBody<'_, SubjectRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Created<Json<Subject>>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    let id = create_subject(db, validated.name.trim(), validated.code.trim()).await?;

    Ok(Created::new(format!("/api/subjects/{}", id)).body(Json(get_subject(db, id).await?)))
}

#[put("/subjects/<id>", data = "<request>")]
pub async fn api_update_subject(
    id: i64,
    request: JsonBody<'_, SubjectRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Subject>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    update_subject(db, id, validated.name.trim(), validated.code.trim()).await?;

    Ok(Json(get_subject(db, id).await?))
}

#[delete("/subjects/<id>")]
pub async fn api_delete_subject(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    caller.admit(ADMIN_ONLY)?;

    delete_subject(db, id).await?;

    Ok(MessageResponse::success("Subject deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_subjects,
        api_get_subject,
        api_create_subject,
        api_update_subject,
        api_delete_subject,
    ]
}
