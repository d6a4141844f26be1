use chrono::NaiveTime;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::TimetableSlot;
use crate::scope::Scope;

pub struct SlotInput<'a> {
    pub classroom_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub day_of_week: &'a str,
    pub period_time: NaiveTime,
}

#[instrument(skip(pool))]
pub async fn list_timetable(
    pool: &SqlitePool,
    scope: &Scope,
    classroom_id: Option<i64>,
) -> Result<Vec<TimetableSlot>, AppError> {
    info!("Listing timetable");
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT t.id, t.classroom_id, t.subject_id, t.teacher_id, t.day_of_week, t.period_time
         FROM timetable t WHERE 1",
    );

    if let Some(classroom_id) = classroom_id {
        qb.push(" AND t.classroom_id = ").push_bind(classroom_id);
    }
    scope.restrict_timetable(&mut qb, "t.teacher_id", "t.classroom_id");
    qb.push(
        " ORDER BY t.classroom_id, CASE t.day_of_week
           WHEN 'Monday' THEN 1 WHEN 'Tuesday' THEN 2 WHEN 'Wednesday' THEN 3
           WHEN 'Thursday' THEN 4 WHEN 'Friday' THEN 5 WHEN 'Saturday' THEN 6
           ELSE 7 END, t.period_time",
    );

    Ok(qb.build_query_as::<TimetableSlot>().fetch_all(pool).await?)
}

#[instrument(skip_all, fields(classroom_id = slot.classroom_id, day = %slot.day_of_week))]
pub async fn create_slot(pool: &SqlitePool, slot: &SlotInput<'_>) -> Result<i64, AppError> {
    info!("Creating timetable slot");
    let res = sqlx::query(
        "INSERT INTO timetable (classroom_id, subject_id, teacher_id, day_of_week, period_time)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(slot.classroom_id)
    .bind(slot.subject_id)
    .bind(slot.teacher_id)
    .bind(slot.day_of_week)
    .bind(slot.period_time)
    .execute(pool)
    .await
    .map_err(|e| {
        AppError::from_constraint(
            e,
            "period_time",
            &format!(
                "Classroom already has a lesson on {} at {}",
                slot.day_of_week,
                slot.period_time.format("%H:%M")
            ),
        )
    })?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn delete_slot(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    info!("Deleting timetable slot");
    let res = sqlx::query("DELETE FROM timetable WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Timetable slot", id));
    }

    Ok(())
}
