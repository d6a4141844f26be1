use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{FromForm, Route, State};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::auth::{Caller, Role};
use crate::db::{
    GradeFilter, GradeInput, ListFilter, create_grade, delete_grade, ensure_exists, get_grade,
    grade_visible, list_grades, student_visible, subject_visible, update_grade,
};
use crate::error::AppError;
use crate::models::{Grade, letter_grade};
use crate::scope::{Scope, ensure_visible};
use crate::validation::{ApiResult, JsonBody, JsonValidateExt, MessageResponse};

use super::{READERS, admit_scoped};

const GRADERS: &[Role] = &[Role::Teacher];

#[derive(Deserialize, Validate)]
pub struct GradeRequest {
    pub student_id: i64,
    pub subject_id: i64,
    #[validate(range(min = 0.0, max = 100.0, message = "Marks must be between 0 and 100"))]
    pub marks: f64,
    #[validate(length(min = 1, max = 2, message = "Grade must be one or two characters"))]
    pub grade: Option<String>,
}

impl GradeRequest {
    /// Explicit letter grade, or one derived from the marks.
    fn letter(&self) -> String {
        match self.grade.as_deref().map(str::trim) {
            Some(grade) if !grade.is_empty() => grade.to_uppercase(),
            _ => letter_grade(self.marks).to_string(),
        }
    }

    fn input<'a>(&self, letter: &'a str) -> GradeInput<'a> {
        GradeInput {
            student_id: self.student_id,
            subject_id: self.subject_id,
            marks: self.marks,
            grade: letter,
        }
    }
}

#[derive(Debug, Default, FromForm)]
pub struct GradeParams {
    pub q: Option<String>,
    pub classroom: Option<i64>,
    pub student: Option<i64>,
    pub subject: Option<i64>,
}

impl GradeParams {
    fn filter(&self) -> GradeFilter {
        GradeFilter {
            list: ListFilter {
                q: self.q.clone(),
                classroom_id: self.classroom,
            },
            student_id: self.student,
            subject_id: self.subject,
        }
    }
}

/// A grade may only be written for a reachable student in a subject the
/// caller can see (for teachers, one they teach).
async fn check_target(db: &SqlitePool, scope: &Scope, request: &GradeRequest) -> Result<(), AppError> {
    ensure_exists(db, "students", request.student_id, "student_id").await?;
    ensure_exists(db, "subjects", request.subject_id, "subject_id").await?;
    ensure_visible(
        student_visible(db, scope, request.student_id).await?,
        "Student",
        request.student_id,
    )?;
    ensure_visible(
        subject_visible(db, scope, request.subject_id).await?,
        "Subject",
        request.subject_id,
    )
}

#[get("/grades?<params..>")]
pub async fn api_list_grades(
    params: GradeParams,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Vec<Grade>>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;
    Ok(Json(list_grades(db, &scope, &params.filter()).await?))
}

#[get("/grades/<id>")]
pub async fn api_get_grade(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Grade>> {
    let (_, scope) = admit_scoped(&caller, READERS, db).await?;

    let grade = get_grade(db, id).await?;
    ensure_visible(grade_visible(db, &scope, id).await?, "Grade", id)?;

    Ok(Json(grade))
}

#[post("/grades", data = "<request>")]
pub async fn api_create_grade(
    request: JsonBody<'_, GradeRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Created<Json<Grade>>> {
    let (_, scope) = admit_scoped(&caller, GRADERS, db).await?;
    let validated = request.validate_custom()?;

    check_target(db, &scope, &validated).await?;

    let letter = validated.letter();
    let id = create_grade(db, &validated.input(&letter)).await?;

    Ok(Created::new(format!("/api/grades/{}", id)).body(Json(get_grade(db, id).await?)))
}

#[put("/grades/<id>", data = "<request>")]
pub async fn api_update_grade(
    id: i64,
    request: JsonBody<'_, GradeRequest>,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<Grade>> {
    let (_, scope) = admit_scoped(&caller, GRADERS, db).await?;
    let validated = request.validate_custom()?;

    get_grade(db, id).await?;
    ensure_visible(grade_visible(db, &scope, id).await?, "Grade", id)?;
    check_target(db, &scope, &validated).await?;

    let letter = validated.letter();
    update_grade(db, id, &validated.input(&letter)).await?;

    Ok(Json(get_grade(db, id).await?))
}

#[delete("/grades/<id>")]
pub async fn api_delete_grade(
    id: i64,
    caller: Caller,
    db: &State<SqlitePool>,
) -> ApiResult<Json<MessageResponse>> {
    let (_, scope) = admit_scoped(&caller, GRADERS, db).await?;

    get_grade(db, id).await?;
    ensure_visible(grade_visible(db, &scope, id).await?, "Grade", id)?;

    delete_grade(db, id).await?;

    Ok(MessageResponse::success("Grade deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_grades,
        api_get_grade,
        api_create_grade,
        api_update_grade,
        api_delete_grade,
    ]
}
