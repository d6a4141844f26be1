mod attendance;
mod classrooms;
mod fees;
mod grades;
mod notices;
mod sessions;
mod students;
mod subjects;
mod teachers;
mod timetable;
mod users;

pub use attendance::*;
pub use classrooms::*;
pub use fees::*;
pub use grades::*;
pub use notices::*;
pub use sessions::*;
pub use students::*;
pub use subjects::*;
pub use teachers::*;
pub use timetable::*;
pub use users::*;

/// Optional filters shared by the list endpoints.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Case-insensitive substring match on the entity's name.
    pub q: Option<String>,
    /// Exact classroom match, where the entity has one.
    pub classroom_id: Option<i64>,
}

impl ListFilter {
    pub fn name_pattern(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q.to_lowercase()))
    }
}

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::AppError;

/// Checks a foreign key up front so the caller gets a field-level error
/// instead of a constraint failure. `table` is always a literal.
pub async fn ensure_exists(
    pool: &SqlitePool,
    table: &'static str,
    id: i64,
    field: &str,
) -> Result<(), AppError> {
    let found: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE id = ?", table))
        .bind(id)
        .fetch_one(pool)
        .await?;

    if found == 0 {
        return Err(AppError::validation(
            field,
            format!("Selected {} {} does not exist", field, id),
        ));
    }

    Ok(())
}

/// Rewrites the subject links of one owner row (`classroom_subjects` or
/// `teacher_subjects`).
pub(crate) async fn replace_subject_links(
    conn: &mut SqliteConnection,
    link_table: &'static str,
    owner_column: &'static str,
    owner_id: i64,
    subject_ids: &[i64],
) -> Result<(), AppError> {
    sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", link_table, owner_column))
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;

    for subject_id in subject_ids {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} ({}, subject_id) VALUES (?, ?)",
            link_table, owner_column
        ))
        .bind(owner_id)
        .bind(*subject_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::from_constraint(
                e,
                "subject_ids",
                &format!("Selected subject {} does not exist", subject_id),
            )
        })?;
    }

    Ok(())
}

pub(crate) async fn subject_links(
    pool: &SqlitePool,
    link_table: &'static str,
    owner_column: &'static str,
    owner_id: i64,
) -> Result<Vec<i64>, AppError> {
    Ok(sqlx::query_scalar(&format!(
        "SELECT subject_id FROM {} WHERE {} = ? ORDER BY subject_id",
        link_table, owner_column
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?)
}
