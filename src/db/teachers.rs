use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Teacher;
use crate::scope::Scope;

use super::{ListFilter, delete_user, replace_subject_links, subject_links};

const TEACHER_COLUMNS: &str = "t.id, t.user_id, t.name, t.gender, t.contact";

pub struct NewTeacher<'a> {
    pub user_id: i64,
    pub name: &'a str,
    pub gender: &'a str,
    pub contact: &'a str,
    pub subject_ids: &'a [i64],
}

pub struct TeacherUpdate<'a> {
    pub name: &'a str,
    pub gender: &'a str,
    pub contact: &'a str,
    pub subject_ids: &'a [i64],
}

async fn with_subjects(pool: &SqlitePool, mut teacher: Teacher) -> Result<Teacher, AppError> {
    teacher.subject_ids = subject_links(pool, "teacher_subjects", "teacher_id", teacher.id).await?;
    Ok(teacher)
}

/// Inserts the profile row of a TEACHER account. Runs inside the
/// provisioning transaction.
#[instrument(skip_all, fields(user_id = teacher.user_id))]
pub async fn insert_teacher(
    conn: &mut SqliteConnection,
    teacher: &NewTeacher<'_>,
) -> Result<i64, AppError> {
    let res = sqlx::query("INSERT INTO teachers (user_id, name, gender, contact) VALUES (?, ?, ?, ?)")
        .bind(teacher.user_id)
        .bind(teacher.name)
        .bind(teacher.gender)
        .bind(teacher.contact)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::from_constraint(e, "user_id", "User already has a teacher profile")
        })?;
    let id = res.last_insert_rowid();

    replace_subject_links(conn, "teacher_subjects", "teacher_id", id, teacher.subject_ids).await?;

    Ok(id)
}

#[instrument(skip(pool))]
pub async fn list_teachers(
    pool: &SqlitePool,
    scope: &Scope,
    filter: &ListFilter,
) -> Result<Vec<Teacher>, AppError> {
    info!("Listing teachers");
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM teachers t WHERE 1",
        TEACHER_COLUMNS
    ));

    if let Some(pattern) = filter.name_pattern() {
        qb.push(" AND LOWER(t.name) LIKE ").push_bind(pattern);
    }
    scope.restrict_teachers(&mut qb, "t.id");
    qb.push(" ORDER BY t.name");

    let rows = qb.build_query_as::<Teacher>().fetch_all(pool).await?;

    let mut teachers = Vec::with_capacity(rows.len());
    for row in rows {
        teachers.push(with_subjects(pool, row).await?);
    }
    Ok(teachers)
}

#[instrument(skip(pool))]
pub async fn get_teacher(pool: &SqlitePool, id: i64) -> Result<Teacher, AppError> {
    let row = sqlx::query_as::<_, Teacher>(&format!(
        "SELECT {} FROM teachers t WHERE t.id = ?",
        TEACHER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(teacher) => with_subjects(pool, teacher).await,
        _ => Err(AppError::not_found("Teacher", id)),
    }
}

pub async fn teacher_visible(pool: &SqlitePool, scope: &Scope, id: i64) -> Result<bool, AppError> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM teachers t WHERE t.id = ");
    qb.push_bind(id);
    scope.restrict_teachers(&mut qb, "t.id");

    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count > 0)
}

#[instrument(skip_all, fields(id = id, name = %update.name))]
pub async fn update_teacher(
    pool: &SqlitePool,
    id: i64,
    update: &TeacherUpdate<'_>,
) -> Result<(), AppError> {
    info!("Updating teacher");
    let mut tx = pool.begin().await?;

    let res = sqlx::query("UPDATE teachers SET name = ?, gender = ?, contact = ? WHERE id = ?")
        .bind(update.name)
        .bind(update.gender)
        .bind(update.contact)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Teacher", id));
    }

    replace_subject_links(&mut tx, "teacher_subjects", "teacher_id", id, update.subject_ids).await?;

    tx.commit().await?;
    Ok(())
}

/// Removes a teacher together with the account that owns the profile.
#[instrument(skip(pool))]
pub async fn delete_teacher(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    info!("Deleting teacher");
    let teacher = get_teacher(pool, id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM teachers WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    delete_user(&mut tx, teacher.user_id).await?;
    tx.commit().await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn count_teachers(pool: &SqlitePool, scope: &Scope) -> Result<i64, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM teachers t WHERE 1");
    scope.restrict_teachers(&mut qb, "t.id");
    Ok(qb.build_query_scalar().fetch_one(pool).await?)
}

/// Profile id of the teacher account, if it has one.
pub async fn teacher_id_for_user(pool: &SqlitePool, user_id: i64) -> Result<Option<i64>, AppError> {
    Ok(
        sqlx::query_scalar("SELECT id FROM teachers WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?,
    )
}
