#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod database;
mod db;
mod env;
mod error;
mod models;
mod notify;
mod scope;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::str::FromStr;
use std::sync::Arc;

use auth::{forbidden, unauthorized};
use database::{CURRENT_SCHEMA, SchemaMigrator, migrate_database_declaratively};
use db::{clean_expired_sessions, ensure_superuser};
use env::{AppConfig, load_environment};
use error::AppError;
use notify::{LogNotifier, Notifier};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket, tokio};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::{error, info, warn};
use validation::{ToValidationResponse, ValidationResponse};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

const SESSION_SWEEP_INTERVAL_SECS: u64 = 3600;

async fn connect(config: &AppConfig) -> Result<SqlitePool, Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    Ok(SqlitePool::connect_with(options).await?)
}

async fn prepare_database(pool: &SqlitePool, config: &AppConfig) -> Result<(), Error> {
    let plan = SchemaMigrator::new(
        pool.clone(),
        CURRENT_SCHEMA,
        config.allow_destructive_migrations,
    )
    .plan()
    .await?;

    if !plan.dropped_tables.is_empty() || !plan.changed_tables.is_empty() {
        warn!(
            dropped = ?plan.dropped_tables,
            rebuilt = ?plan.changed_tables,
            "Schema migration will rebuild or drop tables"
        );
    }

    info!("Running database migrations...");
    if migrate_database_declaratively(
        pool.clone(),
        CURRENT_SCHEMA,
        config.allow_destructive_migrations,
    )
    .await?
    {
        info!("Migrations completed successfully");
    }

    if let Some(admin) = &config.bootstrap_admin {
        if ensure_superuser(pool, admin).await? {
            info!(username = %admin.username, "Created bootstrap superuser");
        }
    }

    Ok(())
}

fn spawn_session_sweeper(pool: SqlitePool) {
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS))
                .await;
        }
    });
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    let otel_guard = init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            panic!("Invalid configuration: {}", e);
        }
    };

    let pool = match connect(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to SQLite database: {}", e);
            panic!("Failed to connect to SQLite database: {}", e);
        }
    };

    if let Err(e) = prepare_database(&pool, &config).await {
        error!("Failed to prepare database: {}", e);
        panic!("Database migration failed: {}", e);
    }

    spawn_session_sweeper(pool.clone());

    init_rocket(pool, config, Arc::new(LogNotifier)).manage(otel_guard)
}

#[catch(404)]
fn not_found(req: &Request) -> Custom<Json<ValidationResponse>> {
    info!(path = %req.uri().path(), "No route matched");
    Status::NotFound.to_validation_response()
}

#[catch(422)]
fn unprocessable(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::UnprocessableEntity.to_validation_response()
}

pub fn init_rocket(
    pool: SqlitePool,
    config: AppConfig,
    notifier: Arc<dyn Notifier>,
) -> Rocket<Build> {
    info!("Starting school administration service");

    rocket::build()
        .manage(pool)
        .manage(config)
        .manage(notifier)
        .mount("/api", api::routes())
        .register(
            "/api",
            catchers![unauthorized, forbidden, not_found, unprocessable],
        )
        .attach(TelemetryFairing)
}
