#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::auth::{LoginResponse, PasswordChangeStatus, UserData};
    use crate::api::dashboard::{StudentDashboard, TeacherDashboard};
    use crate::api::users::{CreatedAccountResponse, CreatedProfileResponse};
    use crate::auth::{LOGIN_PATH, NO_PERMISSION_PATH, PASSWORD_CHANGE_PATH, Role};
    use crate::db::{get_user, set_force_password_change};
    use crate::models::{Attendance, Grade, Student, Teacher};
    use crate::test::test_utils::{
        FailingNotifier, RecordingNotifier, STANDARD_PASSWORD, client_for,
        create_standard_test_db, location, login_test_user, read_json, setup_test_client,
        setup_test_client_with,
    };
    use crate::validation::{ToValidationResponse, ValidationResponse};
    use rocket::http::{ContentType, Cookie, Status};
    use serde_json::json;

    #[rocket::async_test]
    async fn test_login_api() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        let login = login_test_user(&client, "math_teacher", STANDARD_PASSWORD).await;
        assert_eq!(login.user.unwrap().role, Some(Role::Teacher));
        assert_eq!(login.redirect_url.as_deref(), Some("/api/teacher-dashboard"));

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "username": "math_teacher", "password": "wrong_password" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);
        let body: LoginResponse = read_json(response).await;
        assert!(!body.success);
        assert!(body.error.is_some());
    }

    #[rocket::async_test]
    async fn test_anonymous_requests_redirect_to_login() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        for endpoint in ["/api/me", "/api/students", "/api/classrooms/1", "/api/teacher-dashboard"] {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(response.status(), Status::Found, "{} was not gated", endpoint);
            assert_eq!(location(&response).as_deref(), Some(LOGIN_PATH));
        }

        let health = client.get("/api/health").dispatch().await;
        assert_eq!(health.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_forged_session_is_anonymous() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        let response = client
            .get("/api/me")
            .private_cookie(Cookie::new("session_token", "fake_token"))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Found);
        assert_eq!(location(&response).as_deref(), Some(LOGIN_PATH));
    }

    #[rocket::async_test]
    async fn test_logout_ends_session() {
        let test_db = create_standard_test_db().await;
        let client = client_for(&test_db, "alice").await;

        assert_eq!(client.get("/api/me").dispatch().await.status(), Status::Ok);

        let response = client.post("/api/logout").dispatch().await;
        assert_eq!(response.status(), Status::Found);
        assert_eq!(location(&response).as_deref(), Some(LOGIN_PATH));

        assert_eq!(client.get("/api/me").dispatch().await.status(), Status::Found);
    }

    #[rocket::async_test]
    async fn test_role_redirect() {
        let test_db = create_standard_test_db().await;

        for (username, target) in [
            ("root", "/api/admin-dashboard"),
            ("admin_user", "/api/admin-dashboard"),
            ("math_teacher", "/api/teacher-dashboard"),
            ("alice", "/api/student-dashboard"),
        ] {
            let client = client_for(&test_db, username).await;
            let response = client.get("/api/role-redirect").dispatch().await;
            assert_eq!(response.status(), Status::Found);
            assert_eq!(location(&response).as_deref(), Some(target), "{}", username);
        }
    }

    #[rocket::async_test]
    async fn test_wrong_role_goes_to_no_permission() {
        let test_db = create_standard_test_db().await;
        let client = client_for(&test_db, "math_teacher").await;

        let response = client
            .post("/api/subjects")
            .header(ContentType::JSON)
            .body(json!({ "name": "Chemistry", "code": "CHEM" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Found);
        assert_eq!(location(&response).as_deref(), Some(NO_PERMISSION_PATH));

        let response = client.get("/api/student-dashboard").dispatch().await;
        assert_eq!(location(&response).as_deref(), Some(NO_PERMISSION_PATH));

        let response = client.get(NO_PERMISSION_PATH).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
        let body: ValidationResponse = read_json(response).await;
        assert!(body.errors.contains_key("permission"));
    }

    #[rocket::async_test]
    async fn test_student_list_is_scoped_per_caller() {
        let test_db = create_standard_test_db().await;

        let teacher = client_for(&test_db, "math_teacher").await;
        let students: Vec<Student> = read_json(teacher.get("/api/students").dispatch().await).await;
        let names: Vec<_> = students.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alice"]);

        let student = client_for(&test_db, "bob").await;
        let students: Vec<Student> = read_json(student.get("/api/students").dispatch().await).await;
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "bob");

        let admin = client_for(&test_db, "admin_user").await;
        let students: Vec<Student> =
            read_json(admin.get("/api/students?q=BO").dispatch().await).await;
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "bob");
    }

    #[rocket::async_test]
    async fn test_out_of_scope_detail_is_forbidden() {
        let test_db = create_standard_test_db().await;
        let client = client_for(&test_db, "alice").await;
        let bob = test_db.student_id("bob").unwrap();

        let response = client.get(format!("/api/students/{}", bob)).dispatch().await;
        assert_eq!(response.status(), Status::Found);
        assert_eq!(location(&response).as_deref(), Some(NO_PERMISSION_PATH));

        let response = client.get("/api/students/9999").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_admin_provisioning_flow_with_forced_change() {
        let test_db = create_standard_test_db().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let admin = setup_test_client_with(&test_db, notifier.clone()).await;
        login_test_user(&admin, "admin_user", STANDARD_PASSWORD).await;

        let response = admin
            .post("/api/users")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "t1",
                    "email": "t1@school.example",
                    "role": "teacher",
                    "password": "ignored-by-server"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let created: CreatedAccountResponse = read_json(response).await;
        assert!(created.user.force_password_change);
        assert!(created.temporary_password.is_none());
        assert!(created.warning.is_none());

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        let temporary = messages[0]
            .body
            .lines()
            .find_map(|line| line.strip_prefix("Temporary password: "))
            .expect("Credentials missing from message")
            .to_string();
        assert_ne!(temporary, "ignored-by-server");

        let teacher = setup_test_client(&test_db).await;
        let login = login_test_user(&teacher, "t1", &temporary).await;
        assert_eq!(login.redirect_url.as_deref(), Some(PASSWORD_CHANGE_PATH));

        for endpoint in ["/api/students", "/api/me", "/api/teacher-dashboard"] {
            let response = teacher.get(endpoint).dispatch().await;
            assert_eq!(response.status(), Status::Found);
            assert_eq!(location(&response).as_deref(), Some(PASSWORD_CHANGE_PATH));
        }

        let status: PasswordChangeStatus =
            read_json(teacher.get(PASSWORD_CHANGE_PATH).dispatch().await).await;
        assert!(status.force_password_change);

        let mismatch = teacher
            .post(PASSWORD_CHANGE_PATH)
            .header(ContentType::JSON)
            .body(
                json!({
                    "current_password": temporary,
                    "new_password": "chalkboard-42",
                    "confirm_password": "chalkboard-43"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(mismatch.status(), Status::UnprocessableEntity);

        let response = teacher
            .post(PASSWORD_CHANGE_PATH)
            .header(ContentType::JSON)
            .body(
                json!({
                    "current_password": temporary,
                    "new_password": "chalkboard-42",
                    "confirm_password": "chalkboard-42"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = teacher.get("/api/students").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let dashboard: TeacherDashboard =
            read_json(teacher.get("/api/teacher-dashboard").dispatch().await).await;
        assert_eq!(dashboard.teacher.map(|t| t.name).as_deref(), Some("t1"));
    }

    #[rocket::async_test]
    async fn test_undelivered_credentials_are_returned_with_warning() {
        let test_db = create_standard_test_db().await;
        let admin = setup_test_client_with(&test_db, Arc::new(FailingNotifier)).await;
        login_test_user(&admin, "root", STANDARD_PASSWORD).await;

        let response = admin
            .post("/api/students")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "dana",
                    "email": "dana@school.example",
                    "name": "Dana Scully",
                    "age": 11,
                    "gender": "Female",
                    "classroom_id": test_db.classroom_id("Grade 5 A")
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let created: CreatedProfileResponse<Student> = read_json(response).await;
        assert!(created.account.warning.is_some());
        assert!(created.account.temporary_password.is_some());
        assert_eq!(created.profile.name, "Dana Scully");
        assert_eq!(created.profile.classroom_name, "Grade 5 A");

        let user = get_user(&test_db.pool, created.account.user.id).await.unwrap();
        assert!(user.force_password_change);
    }

    #[rocket::async_test]
    async fn test_create_teacher_with_subjects() {
        let test_db = create_standard_test_db().await;
        let admin = client_for(&test_db, "admin_user").await;
        let math = test_db.subject_id("MATH").unwrap();

        let response = admin
            .post("/api/teachers")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "fox",
                    "email": "fox@school.example",
                    "gender": "Male",
                    "subject_ids": [math]
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let created: CreatedProfileResponse<Teacher> = read_json(response).await;
        assert_eq!(created.profile.subject_ids, vec![math]);
        assert_eq!(created.profile.name, "fox");
    }

    #[rocket::async_test]
    async fn test_invalid_student_is_rejected() {
        let test_db = create_standard_test_db().await;
        let admin = client_for(&test_db, "admin_user").await;

        let response = admin
            .post("/api/students")
            .header(ContentType::JSON)
            .body(json!({ "username": "tiny", "age": 1, "gender": "Robot" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        let body: ValidationResponse = read_json(response).await;
        assert!(body.errors.contains_key("age"));
        assert!(body.errors.contains_key("gender"));

        let response = admin
            .post("/api/students")
            .header(ContentType::JSON)
            .body(json!({ "username": "lost", "classroom_id": 9999 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: ValidationResponse = read_json(response).await;
        assert!(body.errors.contains_key("classroom_id"));
    }

    #[rocket::async_test]
    async fn test_duplicate_attendance_over_http() {
        let test_db = create_standard_test_db().await;
        let teacher = client_for(&test_db, "math_teacher").await;
        let alice = test_db.student_id("alice").unwrap();

        let record = |status: &str| {
            json!({ "student_id": alice, "date": "2024-01-01", "status": status }).to_string()
        };

        let response = teacher
            .post("/api/attendances")
            .header(ContentType::JSON)
            .body(record("Present"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let created: Attendance = read_json(response).await;
        assert_eq!(created.student_name, "alice");

        let response = teacher
            .post("/api/attendances")
            .header(ContentType::JSON)
            .body(record("Absent"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: ValidationResponse = read_json(response).await;
        assert!(body.errors.contains_key("date"));

        let listed: Vec<Attendance> = read_json(
            teacher
                .get("/api/attendances?date=2024-01-01")
                .dispatch()
                .await,
        )
        .await;
        assert_eq!(listed.len(), 1);
    }

    #[rocket::async_test]
    async fn test_teacher_cannot_record_outside_reach() {
        let test_db = create_standard_test_db().await;
        let teacher = client_for(&test_db, "math_teacher").await;
        let bob = test_db.student_id("bob").unwrap();

        let response = teacher
            .post("/api/attendances")
            .header(ContentType::JSON)
            .body(json!({ "student_id": bob, "date": "2024-01-01", "status": "Present" }).to_string())
            .dispatch()
            .await;
        assert_eq!(location(&response).as_deref(), Some(NO_PERMISSION_PATH));

        let response = teacher
            .post("/api/grades")
            .header(ContentType::JSON)
            .body(
                json!({
                    "student_id": test_db.student_id("alice").unwrap(),
                    "subject_id": test_db.subject_id("HIST").unwrap(),
                    "marks": 70.0
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(location(&response).as_deref(), Some(NO_PERMISSION_PATH));

        let student = client_for(&test_db, "alice").await;
        let response = student
            .post("/api/attendances")
            .header(ContentType::JSON)
            .body(json!({ "student_id": bob, "date": "2024-01-01", "status": "Present" }).to_string())
            .dispatch()
            .await;
        assert_eq!(location(&response).as_deref(), Some(NO_PERMISSION_PATH));
    }

    #[rocket::async_test]
    async fn test_grade_letter_is_derived_and_visible_to_student() {
        let test_db = create_standard_test_db().await;
        let teacher = client_for(&test_db, "math_teacher").await;

        let response = teacher
            .post("/api/grades")
            .header(ContentType::JSON)
            .body(
                json!({
                    "student_id": test_db.student_id("alice").unwrap(),
                    "subject_id": test_db.subject_id("MATH").unwrap(),
                    "marks": 84.5
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let grade: Grade = read_json(response).await;
        assert_eq!(grade.grade, "B");

        let response = teacher
            .post("/api/grades")
            .header(ContentType::JSON)
            .body(
                json!({
                    "student_id": test_db.student_id("alice").unwrap(),
                    "subject_id": test_db.subject_id("MATH").unwrap(),
                    "marks": 101.0
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        let student = client_for(&test_db, "alice").await;
        let dashboard: StudentDashboard =
            read_json(student.get("/api/student-dashboard").dispatch().await).await;
        assert_eq!(dashboard.grades.len(), 1);
        assert_eq!(dashboard.student.map(|s| s.name).as_deref(), Some("alice"));
    }

    #[rocket::async_test]
    async fn test_register_creates_role_less_account() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "newcomer",
                    "email": "newcomer@example.com",
                    "password": "long-enough",
                    "confirm_password": "long-enough"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let user: UserData = read_json(response).await;
        assert_eq!(user.role, None);
        assert!(!user.force_password_change);

        let me: UserData = read_json(client.get("/api/me").dispatch().await).await;
        assert_eq!(me.username, "newcomer");

        let response = client.get("/api/classrooms").dispatch().await;
        assert_eq!(location(&response).as_deref(), Some(NO_PERMISSION_PATH));

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "newcomer",
                    "password": "long-enough",
                    "confirm_password": "long-enough"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[rocket::async_test]
    async fn test_notice_delete_limited_to_poster() {
        let test_db = create_standard_test_db().await;
        let poster = client_for(&test_db, "math_teacher").await;

        let response = poster
            .post("/api/notices")
            .header(ContentType::JSON)
            .body(json!({ "title": "Quiz", "content": "Friday, room 4" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let id = read_json::<serde_json::Value>(response).await["id"]
            .as_i64()
            .unwrap();

        let other = client_for(&test_db, "history_teacher").await;
        let response = other.delete(format!("/api/notices/{}", id)).dispatch().await;
        assert_eq!(location(&response).as_deref(), Some(NO_PERMISSION_PATH));

        let response = poster.delete(format!("/api/notices/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_gate_runs_before_body_parsing() {
        let test_db = create_standard_test_db().await;

        let anonymous = setup_test_client(&test_db).await;
        for endpoint in ["/api/grades", "/api/attendances", "/api/users"] {
            let response = anonymous
                .post(endpoint)
                .header(ContentType::JSON)
                .body("{}")
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Found, "{}", endpoint);
            assert_eq!(location(&response).as_deref(), Some(LOGIN_PATH));
        }

        let teacher = client_for(&test_db, "math_teacher").await;
        set_force_password_change(&test_db.pool, test_db.user_id("math_teacher").unwrap(), true)
            .await
            .unwrap();

        let response = teacher
            .post("/api/attendances")
            .header(ContentType::JSON)
            .body("{}")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Found);
        assert_eq!(location(&response).as_deref(), Some(PASSWORD_CHANGE_PATH));

        let student = client_for(&test_db, "alice").await;
        let response = student
            .post("/api/subjects")
            .header(ContentType::JSON)
            .body("not json")
            .dispatch()
            .await;
        assert_eq!(location(&response).as_deref(), Some(NO_PERMISSION_PATH));
    }

    #[rocket::async_test]
    async fn test_unparseable_body_is_unprocessable_once_admitted() {
        let test_db = create_standard_test_db().await;
        let teacher = client_for(&test_db, "math_teacher").await;

        let response = teacher
            .post("/api/attendances")
            .header(ContentType::JSON)
            .body("{}")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: ValidationResponse = read_json(response).await;
        assert!(body.errors.contains_key("body"));
    }

    #[rocket::async_test]
    async fn test_short_usernames_are_accepted() {
        let test_db = create_standard_test_db().await;
        let admin = client_for(&test_db, "admin_user").await;

        for (username, role) in [("t2", "TEACHER"), ("s", "STUDENT")] {
            let response = admin
                .post("/api/users")
                .header(ContentType::JSON)
                .body(json!({ "username": username, "role": role }).to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Created, "{}", username);

            let created: CreatedAccountResponse = read_json(response).await;
            assert_eq!(created.user.username, username);
            assert!(created.user.force_password_change);
        }

        let teachers: Vec<Teacher> = read_json(admin.get("/api/teachers?q=t2").dispatch().await).await;
        assert_eq!(teachers.len(), 1);
        assert_eq!(teachers[0].name, "t2");
    }

    #[rocket::async_test]
    async fn test_error_catchers_answer_with_field_errors() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        let response = client.get("/api/nowhere").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        let body: ValidationResponse = read_json(response).await;
        assert!(body.errors.contains_key("resource"));

        let forbidden = Status::Forbidden.to_validation_response();
        assert_eq!(forbidden.0, Status::Forbidden);
        assert!(forbidden.1.errors.contains_key("permission"));

        let teapot = Status::ImATeapot.to_validation_response();
        assert!(teapot.1.errors.contains_key("error"));
    }
}
