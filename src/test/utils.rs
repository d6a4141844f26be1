#[cfg(test)]
pub mod test_db {
    use crate::auth::{
        NewAccount, ProfileDetails, Provisioning, Role, StudentDetails, TeacherDetails,
        provision_account,
    };
    use crate::database::{CURRENT_SCHEMA, migrate_database_declaratively};
    use crate::db::{
        ClassRoomInput, create_classroom, create_subject, ensure_superuser, student_id_for_user,
        teacher_id_for_user,
    };
    use crate::env::{AppConfig, BootstrapAdmin};
    use crate::error::AppError;
    use crate::notify::LogNotifier;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::collections::HashMap;
    use std::sync::Once;
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    /// A single connection keeps every query on the same in-memory database.
    pub async fn memory_pool() -> Result<SqlitePool, AppError> {
        Ok(SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?)
    }

    pub async fn migrated_pool() -> Result<SqlitePool, AppError> {
        let pool = memory_pool().await?;
        migrate_database_declaratively(pool.clone(), CURRENT_SCHEMA, false).await?;
        Ok(pool)
    }

    enum TestAccount {
        Superuser,
        Admin,
        Teacher { subject_codes: Vec<String> },
        Student { classroom: String },
        RoleLess,
    }

    struct TestUser {
        username: String,
        account: TestAccount,
    }

    struct TestClassRoom {
        name: String,
        section: String,
        subject_codes: Vec<String>,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        subjects: Vec<(String, String)>,
        classrooms: Vec<TestClassRoom>,
        users: Vec<TestUser>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn subject(mut self, name: &str, code: &str) -> Self {
            self.subjects.push((name.to_string(), code.to_string()));
            self
        }

        /// Classrooms are referred to later as `"{name} {section}"`.
        pub fn classroom(mut self, name: &str, section: &str, subject_codes: &[&str]) -> Self {
            self.classrooms.push(TestClassRoom {
                name: name.to_string(),
                section: section.to_string(),
                subject_codes: subject_codes.iter().map(|c| c.to_string()).collect(),
            });
            self
        }

        pub fn superuser(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                account: TestAccount::Superuser,
            });
            self
        }

        pub fn admin(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                account: TestAccount::Admin,
            });
            self
        }

        pub fn teacher(mut self, username: &str, subject_codes: &[&str]) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                account: TestAccount::Teacher {
                    subject_codes: subject_codes.iter().map(|c| c.to_string()).collect(),
                },
            });
            self
        }

        pub fn student(mut self, username: &str, classroom: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                account: TestAccount::Student {
                    classroom: classroom.to_string(),
                },
            });
            self
        }

        pub fn role_less(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                account: TestAccount::RoleLess,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            let pool = migrated_pool().await?;
            let config = AppConfig::default();

            let mut db = TestDb {
                pool,
                user_id_map: HashMap::new(),
                teacher_id_map: HashMap::new(),
                student_id_map: HashMap::new(),
                classroom_id_map: HashMap::new(),
                subject_id_map: HashMap::new(),
            };

            for (name, code) in &self.subjects {
                let id = create_subject(&db.pool, name, code).await?;
                db.subject_id_map.insert(code.clone(), id);
            }

            for classroom in &self.classrooms {
                let subject_ids = db.subject_ids(&classroom.subject_codes);
                let id = create_classroom(
                    &db.pool,
                    &ClassRoomInput {
                        name: &classroom.name,
                        section: &classroom.section,
                        subject_ids: &subject_ids,
                    },
                )
                .await?;
                db.classroom_id_map
                    .insert(format!("{} {}", classroom.name, classroom.section), id);
            }

            for user in self.users {
                let (role, profile) = match &user.account {
                    TestAccount::Superuser => {
                        ensure_superuser(
                            &db.pool,
                            &BootstrapAdmin {
                                username: user.username.clone(),
                                password: STANDARD_PASSWORD.to_string(),
                                email: None,
                            },
                        )
                        .await?;
                        let id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
                            .bind(&user.username)
                            .fetch_one(&db.pool)
                            .await?;
                        db.user_id_map.insert(user.username, id);
                        continue;
                    }
                    TestAccount::Admin => (Some(Role::Admin), ProfileDetails::Placeholder),
                    TestAccount::Teacher { subject_codes } => (
                        Some(Role::Teacher),
                        ProfileDetails::Teacher(TeacherDetails {
                            subject_ids: db.subject_ids(subject_codes),
                            ..Default::default()
                        }),
                    ),
                    TestAccount::Student { classroom } => (
                        Some(Role::Student),
                        ProfileDetails::Student(StudentDetails {
                            classroom_id: db.classroom_id_map.get(classroom).copied(),
                            ..Default::default()
                        }),
                    ),
                    TestAccount::RoleLess => (None, ProfileDetails::Placeholder),
                };

                let provisioned = provision_account(
                    &db.pool,
                    &LogNotifier,
                    &config,
                    NewAccount {
                        username: user.username.clone(),
                        email: Some(format!("{}@example.com", user.username)),
                        role,
                        profile,
                        ..Default::default()
                    },
                    Provisioning::SelfService {
                        password: STANDARD_PASSWORD.to_string(),
                    },
                )
                .await?;
                let user_id = provisioned.user.id;

                if let Some(teacher_id) = teacher_id_for_user(&db.pool, user_id).await? {
                    db.teacher_id_map.insert(user.username.clone(), teacher_id);
                }
                if let Some(student_id) = student_id_for_user(&db.pool, user_id).await? {
                    db.student_id_map.insert(user.username.clone(), student_id);
                }
                db.user_id_map.insert(user.username, user_id);
            }

            Ok(db)
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub teacher_id_map: HashMap<String, i64>,
        pub student_id_map: HashMap<String, i64>,
        pub classroom_id_map: HashMap<String, i64>,
        pub subject_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn teacher_id(&self, username: &str) -> Option<i64> {
            self.teacher_id_map.get(username).copied()
        }

        pub fn student_id(&self, username: &str) -> Option<i64> {
            self.student_id_map.get(username).copied()
        }

        pub fn classroom_id(&self, key: &str) -> Option<i64> {
            self.classroom_id_map.get(key).copied()
        }

        pub fn subject_id(&self, code: &str) -> Option<i64> {
            self.subject_id_map.get(code).copied()
        }

        fn subject_ids(&self, codes: &[String]) -> Vec<i64> {
            codes
                .iter()
                .filter_map(|code| self.subject_id_map.get(code).copied())
                .collect()
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use std::sync::{Arc, Mutex};

    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use serde::de::DeserializeOwned;
    use serde_json::json;

    use super::test_db::{TestDb, TestDbBuilder};
    use crate::api::auth::LoginResponse;
    use crate::env::AppConfig;
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::notify::{LogNotifier, Message, Notifier};

    pub use super::test_db::STANDARD_PASSWORD;

    /// Keeps every message instead of sending it.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Message>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<Message> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[rocket::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &Message) -> Result<(), AppError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    pub struct FailingNotifier;

    #[rocket::async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _message: &Message) -> Result<(), AppError> {
            Err(AppError::ExternalService("SMTP relay unreachable".to_string()))
        }
    }

    /// Two classrooms sharing no subjects, a teacher for each, a student in
    /// each, an admin and a superuser.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .subject("Mathematics", "MATH")
            .subject("History", "HIST")
            .classroom("Grade 5", "A", &["MATH"])
            .classroom("Grade 6", "B", &["HIST"])
            .superuser("root")
            .admin("admin_user")
            .teacher("math_teacher", &["MATH"])
            .teacher("history_teacher", &["HIST"])
            .student("alice", "Grade 5 A")
            .student("bob", "Grade 6 B")
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub async fn setup_test_client(test_db: &TestDb) -> Client {
        setup_test_client_with(test_db, Arc::new(LogNotifier)).await
    }

    pub async fn setup_test_client_with(test_db: &TestDb, notifier: Arc<dyn Notifier>) -> Client {
        let rocket = init_rocket(test_db.pool.clone(), AppConfig::default(), notifier);
        Client::tracked(rocket)
            .await
            .expect("Failed to create test client")
    }

    /// Signs in on a tracked client, so later requests carry the session.
    pub async fn login_test_user(client: &Client, username: &str, password: &str) -> LoginResponse {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "username": username, "password": password }).to_string())
            .dispatch()
            .await;

        let status = response.status();
        let body: LoginResponse = read_json(response).await;
        assert!(
            status == Status::Ok && body.success,
            "Login failed for {}: {:?}",
            username,
            body.error
        );
        body
    }

    pub async fn client_for(test_db: &TestDb, username: &str) -> Client {
        let client = setup_test_client(test_db).await;
        login_test_user(&client, username, STANDARD_PASSWORD).await;
        client
    }

    pub async fn read_json<T: DeserializeOwned>(response: LocalResponse<'_>) -> T {
        let body = response.into_string().await.expect("Response has no body");
        serde_json::from_str(&body)
            .unwrap_or_else(|e| panic!("Unexpected response body {}: {}", body, e))
    }

    pub fn location(response: &LocalResponse<'_>) -> Option<String> {
        response.headers().get_one("Location").map(String::from)
    }
}
