use serde::{Deserialize, Serialize};

use super::Role;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<Role>,
    pub is_superuser: bool,
    pub force_password_change: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub is_superuser: bool,
    pub force_password_change: bool,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        // An unrecognised role string leaves the account role-less rather
        // than failing the whole lookup.
        let role = user.role.as_deref().and_then(|r| r.parse::<Role>().ok());

        Self {
            id: user.id,
            username: user.username,
            email: user.email.filter(|e| !e.is_empty()),
            first_name: user.first_name.unwrap_or_default(),
            last_name: user.last_name.unwrap_or_default(),
            role,
            is_superuser: user.is_superuser,
            force_password_change: user.force_password_change,
        }
    }
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    pub fn is_admin_equivalent(&self) -> bool {
        self.is_superuser || self.role == Some(Role::Admin)
    }

    pub fn role_str(&self) -> &'static str {
        self.role.map(|r| r.as_str()).unwrap_or("")
    }
}
