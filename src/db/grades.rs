use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Grade;
use crate::scope::Scope;

use super::ListFilter;

const GRADE_SELECT: &str = "SELECT g.id, g.student_id, st.name AS student_name, g.subject_id,
     s.name AS subject_name, g.marks, g.grade
     FROM grades g
     JOIN students st ON st.id = g.student_id
     JOIN subjects s ON s.id = g.subject_id";

pub struct GradeInput<'a> {
    pub student_id: i64,
    pub subject_id: i64,
    pub marks: f64,
    pub grade: &'a str,
}

fn duplicate_grade(err: sqlx::Error) -> AppError {
    AppError::from_constraint(
        err,
        "subject_id",
        "A grade for this student and subject already exists",
    )
}

#[derive(Debug, Clone, Default)]
pub struct GradeFilter {
    pub list: ListFilter,
    pub student_id: Option<i64>,
    pub subject_id: Option<i64>,
}

#[instrument(skip(pool))]
pub async fn list_grades(
    pool: &SqlitePool,
    scope: &Scope,
    filter: &GradeFilter,
) -> Result<Vec<Grade>, AppError> {
    info!("Listing grades");
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(GRADE_SELECT);
    qb.push(" WHERE 1");

    if let Some(pattern) = filter.list.name_pattern() {
        qb.push(" AND LOWER(st.name) LIKE ").push_bind(pattern);
    }
    if let Some(classroom_id) = filter.list.classroom_id {
        qb.push(" AND st.classroom_id = ").push_bind(classroom_id);
    }
    if let Some(student_id) = filter.student_id {
        qb.push(" AND g.student_id = ").push_bind(student_id);
    }
    if let Some(subject_id) = filter.subject_id {
        qb.push(" AND g.subject_id = ").push_bind(subject_id);
    }
    scope.restrict_grades(&mut qb, "g.student_id", "g.subject_id");
    qb.push(" ORDER BY st.name, s.name");

    Ok(qb.build_query_as::<Grade>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_grade(pool: &SqlitePool, id: i64) -> Result<Grade, AppError> {
    let row = sqlx::query_as::<_, Grade>(&format!("{} WHERE g.id = ?", GRADE_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(grade) => Ok(grade),
        _ => Err(AppError::not_found("Grade", id)),
    }
}

pub async fn grade_visible(pool: &SqlitePool, scope: &Scope, id: i64) -> Result<bool, AppError> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM grades g WHERE g.id = ");
    qb.push_bind(id);
    scope.restrict_grades(&mut qb, "g.student_id", "g.subject_id");

    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count > 0)
}

#[instrument(skip_all, fields(student_id = input.student_id, subject_id = input.subject_id))]
pub async fn create_grade(pool: &SqlitePool, input: &GradeInput<'_>) -> Result<i64, AppError> {
    info!("Recording grade");
    let res = sqlx::query(
        "INSERT INTO grades (student_id, subject_id, marks, grade) VALUES (?, ?, ?, ?)",
    )
    .bind(input.student_id)
    .bind(input.subject_id)
    .bind(input.marks)
    .bind(input.grade)
    .execute(pool)
    .await
    .map_err(duplicate_grade)?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(id = id, student_id = input.student_id, subject_id = input.subject_id))]
pub async fn update_grade(
    pool: &SqlitePool,
    id: i64,
    input: &GradeInput<'_>,
) -> Result<(), AppError> {
    info!("Updating grade");
    let res = sqlx::query(
        "UPDATE grades SET student_id = ?, subject_id = ?, marks = ?, grade = ? WHERE id = ?",
    )
    .bind(input.student_id)
    .bind(input.subject_id)
    .bind(input.marks)
    .bind(input.grade)
    .bind(id)
    .execute(pool)
    .await
    .map_err(duplicate_grade)?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Grade", id));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_grade(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    info!("Deleting grade");
    let res = sqlx::query("DELETE FROM grades WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Grade", id));
    }

    Ok(())
}

/// Average mark within scope, `None` when there are no grades.
#[instrument(skip(pool))]
pub async fn average_marks(pool: &SqlitePool, scope: &Scope) -> Result<Option<f64>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT AVG(g.marks) FROM grades g WHERE 1");
    scope.restrict_grades(&mut qb, "g.student_id", "g.subject_id");
    Ok(qb.build_query_scalar().fetch_one(pool).await?)
}
