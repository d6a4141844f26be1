use rocket::{FromForm, Route};
use sqlx::SqlitePool;

use crate::auth::{Caller, Role, User};
use crate::db::ListFilter;
use crate::scope::Scope;
use crate::validation::ApiResult;

pub mod attendance;
pub mod auth;
pub mod classrooms;
pub mod dashboard;
pub mod fees;
pub mod grades;
pub mod notices;
pub mod students;
pub mod subjects;
pub mod teachers;
pub mod timetable;
pub mod users;

/// Read access shared by most resources.
pub const READERS: &[Role] = &[Role::Teacher, Role::Student];
/// Mutations restricted to admin-equivalent callers.
pub const ADMIN_ONLY: &[Role] = &[];

#[derive(Debug, Default, FromForm)]
pub struct ListParams {
    pub q: Option<String>,
    pub classroom: Option<i64>,
}

impl ListParams {
    pub fn filter(&self) -> ListFilter {
        ListFilter {
            q: self.q.clone(),
            classroom_id: self.classroom,
        }
    }
}

/// Runs the gate, then resolves what the admitted caller may see.
pub async fn admit_scoped<'c>(
    caller: &'c Caller,
    permitted: &[Role],
    db: &SqlitePool,
) -> ApiResult<(&'c User, Scope)> {
    let user = caller.admit(permitted)?;
    let scope = Scope::for_user(db, user).await?;
    Ok((user, scope))
}

pub fn routes() -> Vec<Route> {
    [
        auth::routes(),
        users::routes(),
        dashboard::routes(),
        classrooms::routes(),
        subjects::routes(),
        teachers::routes(),
        students::routes(),
        attendance::routes(),
        grades::routes(),
        timetable::routes(),
        fees::routes(),
        notices::routes(),
    ]
    .concat()
}
