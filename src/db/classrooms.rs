use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::ClassRoom;
use crate::scope::Scope;

use super::{ListFilter, replace_subject_links, subject_links};

pub struct ClassRoomInput<'a> {
    pub name: &'a str,
    pub section: &'a str,
    pub subject_ids: &'a [i64],
}

fn duplicate_classroom(err: sqlx::Error, input: &ClassRoomInput<'_>) -> AppError {
    AppError::from_constraint(
        err,
        "name",
        &format!(
            "Classroom {} section {} already exists",
            input.name, input.section
        ),
    )
}

async fn with_subjects(pool: &SqlitePool, mut classroom: ClassRoom) -> Result<ClassRoom, AppError> {
    classroom.subject_ids =
        subject_links(pool, "classroom_subjects", "classroom_id", classroom.id).await?;
    Ok(classroom)
}

#[instrument(skip(pool))]
pub async fn list_classrooms(
    pool: &SqlitePool,
    scope: &Scope,
    filter: &ListFilter,
) -> Result<Vec<ClassRoom>, AppError> {
    info!("Listing classrooms");
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT c.id, c.name, c.section FROM classrooms c WHERE 1");

    if let Some(pattern) = filter.name_pattern() {
        qb.push(" AND LOWER(c.name) LIKE ").push_bind(pattern);
    }
    scope.restrict_classrooms(&mut qb, "c.id");
    qb.push(" ORDER BY c.name, c.section");

    let rows = qb.build_query_as::<ClassRoom>().fetch_all(pool).await?;

    let mut classrooms = Vec::with_capacity(rows.len());
    for row in rows {
        classrooms.push(with_subjects(pool, row).await?);
    }
    Ok(classrooms)
}

#[instrument(skip(pool))]
pub async fn get_classroom(pool: &SqlitePool, id: i64) -> Result<ClassRoom, AppError> {
    let row = sqlx::query_as::<_, ClassRoom>(
        "SELECT id, name, section FROM classrooms WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(classroom) => with_subjects(pool, classroom).await,
        _ => Err(AppError::not_found("Classroom", id)),
    }
}

pub async fn classroom_visible(pool: &SqlitePool, scope: &Scope, id: i64) -> Result<bool, AppError> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM classrooms c WHERE c.id = ");
    qb.push_bind(id);
    scope.restrict_classrooms(&mut qb, "c.id");

    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count > 0)
}

#[instrument(skip_all, fields(name = %input.name, section = %input.section))]
pub async fn create_classroom(pool: &SqlitePool, input: &ClassRoomInput<'_>) -> Result<i64, AppError> {
    info!("Creating classroom");
    let mut tx = pool.begin().await?;

    let res = sqlx::query("INSERT INTO classrooms (name, section) VALUES (?, ?)")
        .bind(input.name)
        .bind(input.section)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_classroom(e, input))?;
    let id = res.last_insert_rowid();

    replace_subject_links(&mut tx, "classroom_subjects", "classroom_id", id, input.subject_ids)
        .await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip_all, fields(id = id, name = %input.name))]
pub async fn update_classroom(
    pool: &SqlitePool,
    id: i64,
    input: &ClassRoomInput<'_>,
) -> Result<(), AppError> {
    info!("Updating classroom");
    let mut tx = pool.begin().await?;

    let res = sqlx::query("UPDATE classrooms SET name = ?, section = ? WHERE id = ?")
        .bind(input.name)
        .bind(input.section)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_classroom(e, input))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Classroom", id));
    }

    replace_subject_links(&mut tx, "classroom_subjects", "classroom_id", id, input.subject_ids)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Deletes a classroom. Refused while students are still enrolled, since
/// every student must belong to exactly one classroom.
#[instrument(skip(pool))]
pub async fn delete_classroom(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    info!("Deleting classroom");

    let enrolled: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE classroom_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;

    if enrolled > 0 {
        return Err(AppError::validation(
            "classroom",
            format!("Classroom still has {} enrolled student(s)", enrolled),
        ));
    }

    let res = sqlx::query("DELETE FROM classrooms WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Classroom", id));
    }

    Ok(())
}

/// Looks up a classroom by name and section, creating it when missing.
pub async fn default_classroom_id(
    conn: &mut SqliteConnection,
    name: &str,
    section: &str,
) -> Result<i64, AppError> {
    sqlx::query("INSERT OR IGNORE INTO classrooms (name, section) VALUES (?, ?)")
        .bind(name)
        .bind(section)
        .execute(&mut *conn)
        .await?;

    let id = sqlx::query_scalar("SELECT id FROM classrooms WHERE name = ? AND section = ?")
        .bind(name)
        .bind(section)
        .fetch_one(&mut *conn)
        .await?;

    Ok(id)
}

#[instrument(skip(pool))]
pub async fn count_classrooms(pool: &SqlitePool, scope: &Scope) -> Result<i64, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM classrooms c WHERE 1");
    scope.restrict_classrooms(&mut qb, "c.id");
    Ok(qb.build_query_scalar().fetch_one(pool).await?)
}
