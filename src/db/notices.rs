use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Notice;

const NOTICE_COLUMNS: &str = "id, title, content, posted_by, posted_at";

/// Newest first. `limit` caps the result for dashboards.
#[instrument(skip(pool))]
pub async fn list_notices(pool: &SqlitePool, limit: Option<i64>) -> Result<Vec<Notice>, AppError> {
    let notices = sqlx::query_as::<_, Notice>(&format!(
        "SELECT {} FROM notices ORDER BY posted_at DESC, id DESC LIMIT ?",
        NOTICE_COLUMNS
    ))
    .bind(limit.unwrap_or(-1))
    .fetch_all(pool)
    .await?;

    Ok(notices)
}

#[instrument(skip(pool))]
pub async fn get_notice(pool: &SqlitePool, id: i64) -> Result<Notice, AppError> {
    let row = sqlx::query_as::<_, Notice>(&format!(
        "SELECT {} FROM notices WHERE id = ?",
        NOTICE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(notice) => Ok(notice),
        _ => Err(AppError::not_found("Notice", id)),
    }
}

#[instrument(skip(pool, content))]
pub async fn create_notice(
    pool: &SqlitePool,
    title: &str,
    content: &str,
    posted_by: i64,
) -> Result<i64, AppError> {
    info!("Posting notice");
    let res = sqlx::query("INSERT INTO notices (title, content, posted_by) VALUES (?, ?, ?)")
        .bind(title)
        .bind(content)
        .bind(posted_by)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn delete_notice(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    info!("Deleting notice");
    let res = sqlx::query("DELETE FROM notices WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Notice", id));
    }

    Ok(())
}
