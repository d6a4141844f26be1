use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Student;
use crate::scope::Scope;

use super::{ListFilter, delete_user};

const STUDENT_SELECT: &str = "SELECT st.id, st.user_id, st.name, st.age, st.gender, st.address,
     st.parent_contact, st.classroom_id, c.name || ' ' || c.section AS classroom_name
     FROM students st JOIN classrooms c ON c.id = st.classroom_id";

pub struct NewStudent<'a> {
    pub user_id: i64,
    pub name: &'a str,
    pub age: i64,
    pub gender: &'a str,
    pub address: Option<&'a str>,
    pub parent_contact: Option<&'a str>,
    pub classroom_id: i64,
}

pub struct StudentUpdate<'a> {
    pub name: &'a str,
    pub age: i64,
    pub gender: &'a str,
    pub address: Option<&'a str>,
    pub parent_contact: Option<&'a str>,
    pub classroom_id: i64,
}

fn unknown_classroom(err: sqlx::Error, classroom_id: i64) -> AppError {
    AppError::from_constraint(
        err,
        "classroom_id",
        &format!("Selected classroom {} does not exist", classroom_id),
    )
}

/// Inserts the profile row of a STUDENT account. Runs inside the
/// provisioning transaction.
#[instrument(skip_all, fields(user_id = student.user_id, classroom_id = student.classroom_id))]
pub async fn insert_student(
    conn: &mut SqliteConnection,
    student: &NewStudent<'_>,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO students (user_id, name, age, gender, address, parent_contact, classroom_id)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(student.user_id)
    .bind(student.name)
    .bind(student.age)
    .bind(student.gender)
    .bind(student.address)
    .bind(student.parent_contact)
    .bind(student.classroom_id)
    .execute(conn)
    .await
    .map_err(|e| unknown_classroom(e, student.classroom_id))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_students(
    pool: &SqlitePool,
    scope: &Scope,
    filter: &ListFilter,
) -> Result<Vec<Student>, AppError> {
    info!("Listing students");
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(STUDENT_SELECT);
    qb.push(" WHERE 1");

    if let Some(pattern) = filter.name_pattern() {
        qb.push(" AND LOWER(st.name) LIKE ").push_bind(pattern);
    }
    if let Some(classroom_id) = filter.classroom_id {
        qb.push(" AND st.classroom_id = ").push_bind(classroom_id);
    }
    scope.restrict_students(&mut qb, "st.id");
    qb.push(" ORDER BY st.name");

    Ok(qb.build_query_as::<Student>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_student(pool: &SqlitePool, id: i64) -> Result<Student, AppError> {
    let row = sqlx::query_as::<_, Student>(&format!("{} WHERE st.id = ?", STUDENT_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(student) => Ok(student),
        _ => Err(AppError::not_found("Student", id)),
    }
}

pub async fn student_visible(pool: &SqlitePool, scope: &Scope, id: i64) -> Result<bool, AppError> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM students st WHERE st.id = ");
    qb.push_bind(id);
    scope.restrict_students(&mut qb, "st.id");

    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count > 0)
}

#[instrument(skip_all, fields(id = id, classroom_id = update.classroom_id))]
pub async fn update_student(
    pool: &SqlitePool,
    id: i64,
    update: &StudentUpdate<'_>,
) -> Result<(), AppError> {
    info!("Updating student");
    let res = sqlx::query(
        "UPDATE students SET name = ?, age = ?, gender = ?, address = ?, parent_contact = ?,
         classroom_id = ? WHERE id = ?",
    )
    .bind(update.name)
    .bind(update.age)
    .bind(update.gender)
    .bind(update.address)
    .bind(update.parent_contact)
    .bind(update.classroom_id)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| unknown_classroom(e, update.classroom_id))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Student", id));
    }

    Ok(())
}

/// Removes a student together with the account that owns the profile.
/// Attendance, grades and fees go with it.
#[instrument(skip(pool))]
pub async fn delete_student(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    info!("Deleting student");
    let student = get_student(pool, id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    delete_user(&mut tx, student.user_id).await?;
    tx.commit().await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn count_students(pool: &SqlitePool, scope: &Scope) -> Result<i64, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM students st WHERE 1");
    scope.restrict_students(&mut qb, "st.id");
    Ok(qb.build_query_scalar().fetch_one(pool).await?)
}

/// Profile id of the student account, if it has one.
pub async fn student_id_for_user(pool: &SqlitePool, user_id: i64) -> Result<Option<i64>, AppError> {
    Ok(
        sqlx::query_scalar("SELECT id FROM students WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?,
    )
}
