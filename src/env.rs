use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;
pub const DEFAULT_TEMP_PASSWORD_LENGTH: usize = 10;
pub const DEFAULT_MAIL_FROM: &str = "noreply@school-system.local";

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// Credentials for the superuser created at startup when none exists yet.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

/// Application settings that live outside of Rocket's own figment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub session_ttl_hours: i64,
    pub temp_password_length: usize,
    pub mail_from: String,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub allow_destructive_migrations: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            temp_password_length: DEFAULT_TEMP_PASSWORD_LENGTH,
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            bootstrap_admin: None,
            allow_destructive_migrations: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let database_url = dotenvy::var("DATABASE_URL").unwrap_or(defaults.database_url);
        let session_ttl_hours = parse_var("SESSION_TTL_HOURS", defaults.session_ttl_hours)?;
        let temp_password_length =
            parse_var("TEMP_PASSWORD_LENGTH", defaults.temp_password_length)?;
        let mail_from = dotenvy::var("MAIL_FROM").unwrap_or(defaults.mail_from);
        let allow_destructive_migrations = parse_var(
            "ALLOW_DESTRUCTIVE_MIGRATIONS",
            defaults.allow_destructive_migrations,
        )?;

        if session_ttl_hours <= 0 {
            return Err(AppError::Internal(
                "SESSION_TTL_HOURS must be positive".to_string(),
            ));
        }

        if !(8..=64).contains(&temp_password_length) {
            return Err(AppError::Internal(format!(
                "TEMP_PASSWORD_LENGTH must be between 8 and 64, got {}",
                temp_password_length
            )));
        }

        let bootstrap_admin = match (
            dotenvy::var("ADMIN_USERNAME").ok(),
            dotenvy::var("ADMIN_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(BootstrapAdmin {
                    username,
                    password,
                    email: dotenvy::var("ADMIN_EMAIL").ok().filter(|e| !e.is_empty()),
                })
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            session_ttl_hours,
            temp_password_length,
            mail_from,
            bootstrap_admin,
            allow_destructive_migrations,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match dotenvy::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|_| {
            AppError::Internal(format!("Environment variable {} has invalid value '{}'", name, raw))
        }),
        _ => Ok(default),
    }
}
