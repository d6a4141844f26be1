use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, instrument};

use crate::auth::{DbUser, Role, User, hash_password};
use crate::env::BootstrapAdmin;
use crate::error::AppError;

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, role, is_superuser, force_password_change";

pub struct NewUserRow<'a> {
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub role: Option<Role>,
    pub is_superuser: bool,
    pub force_password_change: bool,
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::not_found("User", id)),
    }
}

#[instrument(skip(pool))]
pub async fn find_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument(skip(pool))]
pub async fn get_all_users(pool: &SqlitePool) -> Result<Vec<User>, AppError> {
    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users ORDER BY username",
        USER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

#[instrument(skip_all, fields(username = %user.username, role = ?user.role))]
pub async fn insert_user(
    conn: &mut SqliteConnection,
    user: &NewUserRow<'_>,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let res = sqlx::query(
        "INSERT INTO users
         (username, email, password, first_name, last_name, role, is_superuser, force_password_change)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.username)
    .bind(user.email.filter(|e| !e.is_empty()))
    .bind(user.password_hash)
    .bind(user.first_name)
    .bind(user.last_name)
    .bind(user.role.map(|r| r.as_str()))
    .bind(user.is_superuser)
    .bind(user.force_password_change)
    .execute(conn)
    .await
    .map_err(|e| {
        AppError::from_constraint(
            e,
            "username",
            &format!("Username '{}' already exists", user.username),
        )
    })?;

    Ok(res.last_insert_rowid())
}

/// Returns the user when the password matches, `None` otherwise.
#[instrument(skip_all, fields(username = %username))]
pub async fn authenticate_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");

    let hash: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    match hash {
        Some((id, hash)) => match bcrypt::verify(password, &hash) {
            Ok(true) => Ok(Some(get_user(pool, id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument(skip(pool, new_password))]
pub async fn update_user_password(
    pool: &SqlitePool,
    user_id: i64,
    new_password: &str,
    force_password_change: bool,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = hash_password(new_password)?;

    let res = sqlx::query(
        "UPDATE users SET password = ?, force_password_change = ? WHERE id = ?",
    )
    .bind(hashed_password)
    .bind(force_password_change)
    .bind(user_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("User", user_id));
    }

    Ok(())
}

/// Sets or clears the forced password change flag. Setting it twice is a
/// no-op.
#[instrument(skip(pool))]
pub async fn set_force_password_change(
    pool: &SqlitePool,
    user_id: i64,
    force: bool,
) -> Result<(), AppError> {
    let res = sqlx::query("UPDATE users SET force_password_change = ? WHERE id = ?")
        .bind(force)
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("User", user_id));
    }

    Ok(())
}

#[instrument(skip(conn))]
pub async fn delete_user(conn: &mut SqliteConnection, user_id: i64) -> Result<(), AppError> {
    info!("Deleting user");
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct UserCounts {
    pub admins: i64,
    pub teachers: i64,
    pub students: i64,
    pub without_role: i64,
}

#[instrument(skip(pool))]
pub async fn count_users_by_role(pool: &SqlitePool) -> Result<UserCounts, AppError> {
    let rows: Vec<(Option<String>, i64)> =
        sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
            .fetch_all(pool)
            .await?;

    let mut counts = UserCounts::default();
    for (role, count) in rows {
        match role.as_deref().map(str::parse::<Role>) {
            Some(Ok(Role::Admin)) => counts.admins += count,
            Some(Ok(Role::Teacher)) => counts.teachers += count,
            Some(Ok(Role::Student)) => counts.students += count,
            _ => counts.without_role += count,
        }
    }

    Ok(counts)
}

/// Creates the configured superuser unless an account with that username
/// already exists. Returns whether a user was created.
#[instrument(skip_all, fields(username = %admin.username))]
pub async fn ensure_superuser(pool: &SqlitePool, admin: &BootstrapAdmin) -> Result<bool, AppError> {
    if find_user_by_username(pool, &admin.username).await?.is_some() {
        return Ok(false);
    }

    let hash = hash_password(&admin.password)?;
    let mut conn = pool.acquire().await?;
    insert_user(
        &mut conn,
        &NewUserRow {
            username: &admin.username,
            email: admin.email.as_deref(),
            password_hash: &hash,
            first_name: "",
            last_name: "",
            role: Some(Role::Admin),
            is_superuser: true,
            force_password_change: false,
        },
    )
    .await?;

    info!("Bootstrap superuser created");
    Ok(true)
}
