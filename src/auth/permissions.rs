use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::error::AppError;

use super::User;

pub const LOGIN_PATH: &str = "/api/login";
pub const PASSWORD_CHANGE_PATH: &str = "/api/force-password-change";
pub const NO_PERMISSION_PATH: &str = "/api/no-permission";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Student => "STUDENT",
        }
    }

    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Admin => "/api/admin-dashboard",
            Role::Teacher => "/api/teacher-dashboard",
            Role::Student => "/api/student-dashboard",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "TEACHER" => Ok(Role::Teacher),
            "STUDENT" => Ok(Role::Student),
            _ => Err(AppError::validation("role", format!("Unknown role: {}", s))),
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|_| de::Error::custom(format!("unknown role '{}'", raw)))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a caller was turned away. Each denial maps to a fixed destination
/// rather than a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Login,
    PasswordChange,
    NoPermission,
}

impl Denial {
    pub fn location(&self) -> &'static str {
        match self {
            Denial::Login => LOGIN_PATH,
            Denial::PasswordChange => PASSWORD_CHANGE_PATH,
            Denial::NoPermission => NO_PERMISSION_PATH,
        }
    }
}

pub fn must_change_password(user: &User, path: &str) -> bool {
    user.force_password_change && path.trim_end_matches('/') != PASSWORD_CHANGE_PATH
}

/// Decides whether `caller` may reach `path` given the roles the operation
/// permits. The forced password change check runs before any role check so
/// a flagged account never learns whether it would have been allowed.
///
/// An empty `permitted` slice admits nobody except admin-equivalent callers.
pub fn authorize<'a>(
    caller: Option<&'a User>,
    permitted: &[Role],
    path: &str,
) -> Result<&'a User, Denial> {
    let user = signed_in(caller, path)?;

    if user.is_admin_equivalent() {
        return Ok(user);
    }

    match user.role {
        Some(role) if permitted.contains(&role) => Ok(user),
        _ => Err(Denial::NoPermission),
    }
}

/// The first two gate steps: a session must exist and no forced password
/// change may be pending for any path other than the change form itself.
pub fn signed_in<'a>(caller: Option<&'a User>, path: &str) -> Result<&'a User, Denial> {
    let user = caller.ok_or(Denial::Login)?;

    if must_change_password(user, path) {
        return Err(Denial::PasswordChange);
    }

    Ok(user)
}
