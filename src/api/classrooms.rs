use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::auth::Caller;
use crate::db::{
    ClassRoomInput, classroom_visible, create_classroom, delete_classroom, get_classroom,
    list_classrooms, update_classroom,
};
use crate::models::ClassRoom;
use crate::scope::ensure_visible;
use crate::validation::{ApiResult, JsonBody, JsonValidateExt, MessageResponse, validate_not_blank};

use super::{ADMIN_ONLY, ListParams, READERS, admit_scoped};

#[derive(Deserialize, Validate)]
pub struct ClassRoomRequest {
    #[validate(
        length(max = 100, message = "Name must be at most 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(
        length(max = 10, message = "Section must be at most 10 characters"),
        custom(function = "validate_not_blank")
    )]
    pub section: String,
    #[serde(default)]
    pub subject_ids: Vec<i64>,
}

impl ClassRoomRequest {
    fn input(&self) -> ClassRoomInput<'_> {
        ClassRoomInput {
            name: self.name.trim(),
            section: self.section.trim(),
            subject_ids: &self.subject_ids,
        }
    }
}

#[get("/classrooms?<params..>")]
pub async fn api_list_classrooms(
    params: ListParams,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<ClassRoom>>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;
    Ok(Json(list_classrooms(db, &scope, &params.filter()).await?))
}

#[get("/classrooms/<id>")]
pub async fn api_get_classroom(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<ClassRoom>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;

    let classroom = get_classroom(db, id).await?;
    ensure_visible(classroom_visible(db, &scope, id).await?, "Classroom", id)?;

    Ok(Json(classroom))
}

#[post("/classrooms", data = "<request>")]
pub async fn api_create_classroom(
    request: JsonBody<'_, ClassRoomRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Created<Json<ClassRoom>>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    let id = create_classroom(db, &validated.input()).await?;
    let classroom = get_classroom(db, id).await?;

    Ok(Created::new(format!("/api/classrooms/{}", id)).body(Json(classroom)))
}

#[put("/classrooms/<id>", data = "<request>")]
pub async fn api_update_classroom(
    id: i64,
    request: JsonBody<'_, ClassRoomRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<ClassRoom>> {
    caller.admit(ADMIN_ONLY)?;
    let validated = request.validate_custom()?;

    update_classroom(db, id, &validated.input()).await?;

    Ok(Json(get_classroom(db, id).await?))
}

#[delete("/classrooms/<id>")]
pub async fn api_delete_classroom(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    caller.admit(ADMIN_ONLY)?;

    delete_classroom(db, id).await?;

    Ok(MessageResponse::success("Classroom deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_classrooms,
        api_get_classroom,
        api_create_classroom,
        api_update_classroom,
        api_delete_classroom,
    ]
}
