use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Fee;
use crate::scope::Scope;

pub struct FeeInput<'a> {
    pub student_id: i64,
    pub amount: f64,
    pub status: &'a str,
    pub due_date: Option<NaiveDate>,
}

#[instrument(skip(pool))]
pub async fn list_fees(
    pool: &SqlitePool,
    scope: &Scope,
    student_id: Option<i64>,
) -> Result<Vec<Fee>, AppError> {
    info!("Listing fees");
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT f.id, f.student_id, f.amount, f.status, f.due_date FROM fees f WHERE 1");

    if let Some(student_id) = student_id {
        qb.push(" AND f.student_id = ").push_bind(student_id);
    }
    scope.restrict_students(&mut qb, "f.student_id");
    qb.push(" ORDER BY f.due_date IS NULL, f.due_date, f.id");

    Ok(qb.build_query_as::<Fee>().fetch_all(pool).await?)
}

#[instrument(skip_all, fields(student_id = fee.student_id))]
pub async fn create_fee(pool: &SqlitePool, fee: &FeeInput<'_>) -> Result<i64, AppError> {
    info!("Creating fee");
    let res = sqlx::query("INSERT INTO fees (student_id, amount, status, due_date) VALUES (?, ?, ?, ?)")
        .bind(fee.student_id)
        .bind(fee.amount)
        .bind(fee.status)
        .bind(fee.due_date)
        .execute(pool)
        .await
        .map_err(|e| {
            AppError::from_constraint(e, "student_id", "Selected student does not exist")
        })?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(id = id, student_id = fee.student_id))]
pub async fn update_fee(pool: &SqlitePool, id: i64, fee: &FeeInput<'_>) -> Result<(), AppError> {
    info!("Updating fee");
    let res = sqlx::query(
        "UPDATE fees SET student_id = ?, amount = ?, status = ?, due_date = ? WHERE id = ?",
    )
    .bind(fee.student_id)
    .bind(fee.amount)
    .bind(fee.status)
    .bind(fee.due_date)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_constraint(e, "student_id", "Selected student does not exist"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Fee", id));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_fee(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    info!("Deleting fee");
    let res = sqlx::query("DELETE FROM fees WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Fee", id));
    }

    Ok(())
}

/// Outstanding fee total within scope (anything not yet Paid).
#[instrument(skip(pool))]
pub async fn outstanding_fees(pool: &SqlitePool, scope: &Scope) -> Result<f64, AppError> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COALESCE(SUM(f.amount), 0.0) FROM fees f WHERE f.status != 'Paid'");
    scope.restrict_students(&mut qb, "f.student_id");
    Ok(qb.build_query_scalar().fetch_one(pool).await?)
}
