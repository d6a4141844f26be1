use rand::Rng;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, instrument, warn};

use crate::db::{
    NewStudent, NewTeacher, NewUserRow, default_classroom_id, get_user, insert_student,
    insert_teacher, insert_user,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::notify::{Message, Notifier};

use super::{Role, User, hash_password};

/// Characters used for temporary passwords. Look-alikes (0/O, 1/l/I) are
/// left out so the password survives being read off a screen.
const TEMP_PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const PLACEHOLDER_GENDER: &str = "Male";
pub const PLACEHOLDER_AGE: i64 = 18;
pub const DEFAULT_CLASSROOM: (&str, &str) = ("Default", "A");

#[derive(Debug, Clone, Default)]
pub struct TeacherDetails {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub contact: Option<String>,
    pub subject_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentDetails {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub parent_contact: Option<String>,
    pub classroom_id: Option<i64>,
}

/// Profile fields known at account creation time. Anything left out gets a
/// placeholder that an administrator is expected to correct later.
#[derive(Debug, Clone, Default)]
pub enum ProfileDetails {
    #[default]
    Placeholder,
    Teacher(TeacherDetails),
    Student(StudentDetails),
}

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<Role>,
    pub profile: ProfileDetails,
}

#[derive(Debug, Clone)]
pub enum Provisioning {
    /// Public registration: the user picked their own password.
    SelfService { password: String },
    /// Created by an administrator: a temporary password is generated, a
    /// change is forced on first use and the credentials are sent out.
    AdminInitiated,
}

#[derive(Debug, Clone)]
pub struct ProvisionedAccount {
    pub user: User,
    pub temporary_password: Option<String>,
    pub notification_warning: Option<String>,
}

pub fn generate_temporary_password(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| TEMP_PASSWORD_ALPHABET[rng.random_range(0..TEMP_PASSWORD_ALPHABET.len())] as char)
        .collect()
}

/// Creates a user together with the profile its role requires.
///
/// The user row and the profile row are written in one transaction, so a
/// TEACHER or STUDENT account never exists without its profile. Credential
/// delivery happens after commit and can only downgrade the outcome to a
/// warning.
#[instrument(skip_all, fields(username = %account.username, role = ?account.role))]
pub async fn provision_account(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    config: &AppConfig,
    account: NewAccount,
    mode: Provisioning,
) -> Result<ProvisionedAccount, AppError> {
    let username = account.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::validation("username", "Username is required"));
    }

    match (&account.role, &account.profile) {
        (Some(Role::Teacher), ProfileDetails::Student(_))
        | (Some(Role::Student), ProfileDetails::Teacher(_)) => {
            return Err(AppError::validation(
                "role",
                "Profile details do not match the requested role",
            ));
        }
        (None | Some(Role::Admin), ProfileDetails::Teacher(_) | ProfileDetails::Student(_)) => {
            return Err(AppError::validation(
                "role",
                "Only teacher and student accounts carry a profile",
            ));
        }
        _ => {}
    }

    let (password, force_password_change) = match mode {
        Provisioning::SelfService { password } => (password, false),
        Provisioning::AdminInitiated => (
            generate_temporary_password(config.temp_password_length),
            true,
        ),
    };
    let password_hash = hash_password(&password)?;

    let display_name = {
        let full = format!("{} {}", account.first_name.trim(), account.last_name.trim());
        let full = full.trim().to_string();
        if full.is_empty() { username.clone() } else { full }
    };

    let mut tx = pool.begin().await?;

    let user_id = insert_user(
        &mut tx,
        &NewUserRow {
            username: &username,
            email: account.email.as_deref(),
            password_hash: &password_hash,
            first_name: account.first_name.trim(),
            last_name: account.last_name.trim(),
            role: account.role,
            is_superuser: false,
            force_password_change,
        },
    )
    .await?;

    if let Some(role) = account.role {
        create_profile(&mut tx, user_id, role, &display_name, account.profile).await?;
    }

    tx.commit().await?;

    let user = get_user(pool, user_id).await?;
    info!(user_id = user.id, force_password_change, "Account provisioned");

    if !force_password_change {
        return Ok(ProvisionedAccount {
            user,
            temporary_password: None,
            notification_warning: None,
        });
    }

    let notification_warning = match deliver_credentials(notifier, config, &user, &password).await
    {
        Ok(()) => None,
        Err(err) => {
            warn!(username = %user.username, error = %err, "Account created but credentials were not delivered");
            Some(format!(
                "Account created, but the credentials email could not be sent: {}",
                err
            ))
        }
    };

    Ok(ProvisionedAccount {
        user,
        temporary_password: Some(password),
        notification_warning,
    })
}

async fn create_profile(
    conn: &mut SqliteConnection,
    user_id: i64,
    role: Role,
    display_name: &str,
    details: ProfileDetails,
) -> Result<(), AppError> {
    match role {
        Role::Admin => Ok(()),
        Role::Teacher => {
            let details = match details {
                ProfileDetails::Teacher(details) => details,
                _ => TeacherDetails::default(),
            };
            let name = non_blank(details.name).unwrap_or_else(|| display_name.to_string());
            let gender =
                non_blank(details.gender).unwrap_or_else(|| PLACEHOLDER_GENDER.to_string());

            insert_teacher(
                conn,
                &NewTeacher {
                    user_id,
                    name: &name,
                    gender: &gender,
                    contact: details.contact.as_deref().unwrap_or(""),
                    subject_ids: &details.subject_ids,
                },
            )
            .await?;
            Ok(())
        }
        Role::Student => {
            let details = match details {
                ProfileDetails::Student(details) => details,
                _ => StudentDetails::default(),
            };
            let name = non_blank(details.name).unwrap_or_else(|| display_name.to_string());
            let gender =
                non_blank(details.gender).unwrap_or_else(|| PLACEHOLDER_GENDER.to_string());
            let classroom_id = match details.classroom_id {
                Some(id) => id,
                None => default_classroom_id(conn, DEFAULT_CLASSROOM.0, DEFAULT_CLASSROOM.1).await?,
            };

            insert_student(
                conn,
                &NewStudent {
                    user_id,
                    name: &name,
                    age: details.age.unwrap_or(PLACEHOLDER_AGE),
                    gender: &gender,
                    address: details.address.as_deref(),
                    parent_contact: details.parent_contact.as_deref(),
                    classroom_id,
                },
            )
            .await?;
            Ok(())
        }
    }
}

async fn deliver_credentials(
    notifier: &dyn Notifier,
    config: &AppConfig,
    user: &User,
    password: &str,
) -> Result<(), AppError> {
    let recipient = user
        .email
        .clone()
        .ok_or_else(|| AppError::ExternalService("Account has no email address".to_string()))?;

    let message = Message {
        subject: "Your school account".to_string(),
        body: format!(
            "Hello {},\n\nAn account has been created for you.\n\nUsername: {}\nTemporary password: {}\n\nYou will be asked to choose a new password when you first sign in.",
            user.display_name(),
            user.username,
            password
        ),
        sender: config.mail_from.clone(),
        recipient,
    };

    notifier.send(&message).await
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
