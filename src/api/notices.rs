use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::warn;
use validator::Validate;

use crate::auth::{Caller, Role};
use crate::db::{create_notice, delete_notice, get_notice, list_notices};
use crate::error::AppError;
use crate::models::Notice;
use crate::validation::{ApiResult, JsonBody, JsonValidateExt, MessageResponse, validate_not_blank};

use super::READERS;

const POSTERS: &[Role] = &[Role::Teacher];

#[derive(Deserialize, Validate)]
pub struct NoticeRequest {
    #[validate(
        length(max = 200, message = "Title must be at most 200 characters"),
        custom(function = "validate_not_blank")
    )]
    pub title: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub content: String,
}

#[get("/notices?<limit>")]
pub async fn api_list_notices(
    limit: Option<i64>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<Notice>>> {
    caller.admit(READERS)?;
    Ok(Json(list_notices(db, limit).await?))
}

#[post("/notices", data = "<request>")]
pub async fn api_create_notice(
    request: JsonBody<'_, NoticeRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Created<Json<Notice>>> {
    let user = caller.admit(POSTERS)?;
    let validated = request.validate_custom()?;

    let id = create_notice(db, validated.title.trim(), &validated.content, user.id).await?;

    Ok(Created::new("/api/notices").body(Json(get_notice(db, id).await?)))
}

/// Only the poster or an administrator may take a notice down.
#[delete("/notices/<id>")]
pub async fn api_delete_notice(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    let user = caller.admit(POSTERS)?;

    let notice = get_notice(db, id).await?;
    if notice.posted_by != user.id && !user.is_admin_equivalent() {
        warn!(username = %user.username, notice_id = id, "Attempt to delete another user's notice");
        return Err(AppError::Authorization(format!("Notice {} was posted by someone else", id)).into());
    }

    delete_notice(db, id).await?;

    Ok(MessageResponse::success("Notice deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![api_list_notices, api_create_notice, api_delete_notice]
}
