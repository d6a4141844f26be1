#[cfg(test)]
mod tests {
    use crate::env::{
        AppConfig, DEFAULT_MAIL_FROM, DEFAULT_SESSION_TTL_HOURS, DEFAULT_TEMP_PASSWORD_LENGTH,
    };
    use serial_test::serial;

    const ALL_VARS: [&str; 9] = [
        "DATABASE_URL",
        "SESSION_TTL_HOURS",
        "TEMP_PASSWORD_LENGTH",
        "MAIL_FROM",
        "ADMIN_USERNAME",
        "ADMIN_PASSWORD",
        "ADMIN_EMAIL",
        "ALLOW_DESTRUCTIVE_MIGRATIONS",
        "ROCKET_PROFILE",
    ];

    fn with_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let kvs: Vec<(&str, Option<&str>)> = ALL_VARS
            .iter()
            .map(|name| {
                let value = vars.iter().find(|(k, _)| k == name).map(|(_, v)| *v);
                (*name, value)
            })
            .collect();
        temp_env::with_vars(kvs, f)
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        let config = with_env(&[], AppConfig::from_env).expect("Defaults should load");

        assert_eq!(config.session_ttl_hours, DEFAULT_SESSION_TTL_HOURS);
        assert_eq!(config.temp_password_length, DEFAULT_TEMP_PASSWORD_LENGTH);
        assert_eq!(config.mail_from, DEFAULT_MAIL_FROM);
        assert!(config.bootstrap_admin.is_none());
        assert!(!config.allow_destructive_migrations);
    }

    #[test]
    #[serial]
    fn test_reads_overrides() {
        let config = with_env(
            &[
                ("DATABASE_URL", "sqlite://school.db"),
                ("SESSION_TTL_HOURS", "24"),
                ("TEMP_PASSWORD_LENGTH", "16"),
                ("MAIL_FROM", "office@school.example"),
                ("ALLOW_DESTRUCTIVE_MIGRATIONS", "true"),
            ],
            AppConfig::from_env,
        )
        .expect("Overrides should load");

        assert_eq!(config.database_url, "sqlite://school.db");
        assert_eq!(config.session_ttl_hours, 24);
        assert_eq!(config.temp_password_length, 16);
        assert_eq!(config.mail_from, "office@school.example");
        assert!(config.allow_destructive_migrations);
    }

    #[test]
    #[serial]
    fn test_bootstrap_admin_needs_username_and_password() {
        let partial = with_env(&[("ADMIN_USERNAME", "head")], AppConfig::from_env).unwrap();
        assert!(partial.bootstrap_admin.is_none());

        let full = with_env(
            &[
                ("ADMIN_USERNAME", "head"),
                ("ADMIN_PASSWORD", "s3cret-pass"),
                ("ADMIN_EMAIL", "head@school.example"),
            ],
            AppConfig::from_env,
        )
        .unwrap();
        let admin = full.bootstrap_admin.expect("Admin should be configured");
        assert_eq!(admin.username, "head");
        assert_eq!(admin.email.as_deref(), Some("head@school.example"));
    }

    #[test]
    #[serial]
    fn test_rejects_invalid_values() {
        assert!(with_env(&[("SESSION_TTL_HOURS", "soon")], AppConfig::from_env).is_err());
        assert!(with_env(&[("SESSION_TTL_HOURS", "0")], AppConfig::from_env).is_err());
        assert!(with_env(&[("TEMP_PASSWORD_LENGTH", "4")], AppConfig::from_env).is_err());
        assert!(
            with_env(&[("ALLOW_DESTRUCTIVE_MIGRATIONS", "maybe")], AppConfig::from_env).is_err()
        );
    }
}
