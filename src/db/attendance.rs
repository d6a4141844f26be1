use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Attendance;
use crate::scope::Scope;

use super::ListFilter;

const ATTENDANCE_SELECT: &str = "SELECT a.id, a.student_id, st.name AS student_name, a.date, a.status
     FROM attendance a JOIN students st ON st.id = a.student_id";

fn duplicate_day(err: sqlx::Error, date: NaiveDate) -> AppError {
    AppError::from_constraint(
        err,
        "date",
        &format!("Attendance for this student on {} is already recorded", date),
    )
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub list: ListFilter,
    pub student_id: Option<i64>,
    pub date: Option<NaiveDate>,
}

#[instrument(skip(pool))]
pub async fn list_attendance(
    pool: &SqlitePool,
    scope: &Scope,
    filter: &AttendanceFilter,
) -> Result<Vec<Attendance>, AppError> {
    info!("Listing attendance");
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(ATTENDANCE_SELECT);
    qb.push(" WHERE 1");

    if let Some(pattern) = filter.list.name_pattern() {
        qb.push(" AND LOWER(st.name) LIKE ").push_bind(pattern);
    }
    if let Some(classroom_id) = filter.list.classroom_id {
        qb.push(" AND st.classroom_id = ").push_bind(classroom_id);
    }
    if let Some(student_id) = filter.student_id {
        qb.push(" AND a.student_id = ").push_bind(student_id);
    }
    if let Some(date) = filter.date {
        qb.push(" AND a.date = ").push_bind(date);
    }
    scope.restrict_students(&mut qb, "a.student_id");
    qb.push(" ORDER BY a.date DESC, st.name");

    Ok(qb.build_query_as::<Attendance>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_attendance(pool: &SqlitePool, id: i64) -> Result<Attendance, AppError> {
    let row = sqlx::query_as::<_, Attendance>(&format!("{} WHERE a.id = ?", ATTENDANCE_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(record) => Ok(record),
        _ => Err(AppError::not_found("Attendance", id)),
    }
}

#[instrument(skip(pool))]
pub async fn create_attendance(
    pool: &SqlitePool,
    student_id: i64,
    date: NaiveDate,
    status: &str,
) -> Result<i64, AppError> {
    info!("Recording attendance");
    let res = sqlx::query("INSERT INTO attendance (student_id, date, status) VALUES (?, ?, ?)")
        .bind(student_id)
        .bind(date)
        .bind(status)
        .execute(pool)
        .await
        .map_err(|e| duplicate_day(e, date))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn update_attendance(
    pool: &SqlitePool,
    id: i64,
    student_id: i64,
    date: NaiveDate,
    status: &str,
) -> Result<(), AppError> {
    info!("Updating attendance");
    let res = sqlx::query("UPDATE attendance SET student_id = ?, date = ?, status = ? WHERE id = ?")
        .bind(student_id)
        .bind(date)
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| duplicate_day(e, date))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Attendance", id));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_attendance(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    info!("Deleting attendance");
    let res = sqlx::query("DELETE FROM attendance WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Attendance", id));
    }

    Ok(())
}

/// Attendance counts within scope, as (present, absent).
#[instrument(skip(pool))]
pub async fn attendance_summary(pool: &SqlitePool, scope: &Scope) -> Result<(i64, i64), AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COALESCE(SUM(a.status = 'Present'), 0), COALESCE(SUM(a.status = 'Absent'), 0)
         FROM attendance a WHERE 1",
    );
    scope.restrict_students(&mut qb, "a.student_id");

    Ok(qb.build_query_as::<(i64, i64)>().fetch_one(pool).await?)
}
