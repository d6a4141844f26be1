use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Subject;
use crate::scope::Scope;

use super::ListFilter;

fn duplicate_code(err: sqlx::Error, code: &str) -> AppError {
    AppError::from_constraint(
        err,
        "code",
        &format!("Subject code '{}' is already in use", code),
    )
}

#[instrument(skip(pool))]
pub async fn list_subjects(
    pool: &SqlitePool,
    scope: &Scope,
    filter: &ListFilter,
) -> Result<Vec<Subject>, AppError> {
    info!("Listing subjects");
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT s.id, s.name, s.code FROM subjects s WHERE 1");

    if let Some(pattern) = filter.name_pattern() {
        qb.push(" AND (LOWER(s.name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(s.code) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(classroom_id) = filter.classroom_id {
        qb.push(" AND s.id IN (SELECT subject_id FROM classroom_subjects WHERE classroom_id = ")
            .push_bind(classroom_id)
            .push(")");
    }
    scope.restrict_subjects(&mut qb, "s.id");
    qb.push(" ORDER BY s.name");

    Ok(qb.build_query_as::<Subject>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_subject(pool: &SqlitePool, id: i64) -> Result<Subject, AppError> {
    let row = sqlx::query_as::<_, Subject>("SELECT id, name, code FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(subject) => Ok(subject),
        _ => Err(AppError::not_found("Subject", id)),
    }
}

pub async fn subject_visible(pool: &SqlitePool, scope: &Scope, id: i64) -> Result<bool, AppError> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM subjects s WHERE s.id = ");
    qb.push_bind(id);
    scope.restrict_subjects(&mut qb, "s.id");

    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count > 0)
}

#[instrument(skip(pool))]
pub async fn create_subject(pool: &SqlitePool, name: &str, code: &str) -> Result<i64, AppError> {
    info!("Creating subject");
    let res = sqlx::query("INSERT INTO subjects (name, code) VALUES (?, ?)")
        .bind(name)
        .bind(code)
        .execute(pool)
        .await
        .map_err(|e| duplicate_code(e, code))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn update_subject(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    code: &str,
) -> Result<(), AppError> {
    info!("Updating subject");
    let res = sqlx::query("UPDATE subjects SET name = ?, code = ? WHERE id = ?")
        .bind(name)
        .bind(code)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| duplicate_code(e, code))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Subject", id));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_subject(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    info!("Deleting subject");
    let res = sqlx::query("DELETE FROM subjects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Subject", id));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn count_subjects(pool: &SqlitePool, scope: &Scope) -> Result<i64, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM subjects s WHERE 1");
    scope.restrict_subjects(&mut qb, "s.id");
    Ok(qb.build_query_scalar().fetch_one(pool).await?)
}
