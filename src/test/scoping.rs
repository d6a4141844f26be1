#[cfg(test)]
mod tests {
    use crate::db::{
        GradeFilter, GradeInput, ListFilter, SlotInput, create_grade, create_slot, get_user,
        list_classrooms, list_grades, list_students, list_subjects, list_teachers,
        list_timetable, student_visible,
    };
    use crate::scope::Scope;
    use crate::test::test_db::{TestDb, TestDbBuilder};
    use chrono::NaiveTime;
    use rocket::tokio;

    /// Two classrooms. MATH is taught in both, HIST only in 6B.
    async fn school() -> TestDb {
        TestDbBuilder::new()
            .subject("Mathematics", "MATH")
            .subject("History", "HIST")
            .subject("Music", "MUS")
            .classroom("Grade 5", "A", &["MATH"])
            .classroom("Grade 6", "B", &["MATH", "HIST"])
            .classroom("Grade 7", "C", &["MUS"])
            .superuser("root")
            .teacher("math_teacher", &["MATH"])
            .teacher("history_teacher", &["HIST"])
            .teacher("idle_teacher", &[])
            .student("alice", "Grade 5 A")
            .student("bob", "Grade 6 B")
            .student("carol", "Grade 7 C")
            .role_less("visitor")
            .build()
            .await
            .expect("Failed to build test database")
    }

    async fn scope_of(db: &TestDb, username: &str) -> Scope {
        let user = get_user(&db.pool, db.user_id(username).unwrap()).await.unwrap();
        Scope::for_user(&db.pool, &user).await.unwrap()
    }

    async fn student_names(db: &TestDb, scope: &Scope, filter: &ListFilter) -> Vec<String> {
        let mut names: Vec<String> = list_students(&db.pool, scope, filter)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_scope_resolution() {
        let db = school().await;

        assert_eq!(scope_of(&db, "root").await, Scope::All);
        assert_eq!(
            scope_of(&db, "math_teacher").await,
            Scope::Teacher {
                teacher_id: db.teacher_id("math_teacher").unwrap()
            }
        );
        assert_eq!(
            scope_of(&db, "alice").await,
            Scope::Student {
                student_id: db.student_id("alice").unwrap(),
                classroom_id: db.classroom_id("Grade 5 A").unwrap(),
            }
        );
        assert_eq!(scope_of(&db, "visitor").await, Scope::Nothing);
    }

    #[tokio::test]
    async fn test_teacher_sees_students_reachable_through_subjects() {
        let db = school().await;
        let all = ListFilter::default();

        let math = scope_of(&db, "math_teacher").await;
        assert_eq!(student_names(&db, &math, &all).await, vec!["alice", "bob"]);

        let history = scope_of(&db, "history_teacher").await;
        assert_eq!(student_names(&db, &history, &all).await, vec!["bob"]);

        let idle = scope_of(&db, "idle_teacher").await;
        assert!(student_names(&db, &idle, &all).await.is_empty());

        assert!(
            !student_visible(&db.pool, &history, db.student_id("alice").unwrap())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_student_sees_only_themselves() {
        let db = school().await;
        let scope = scope_of(&db, "bob").await;

        assert_eq!(
            student_names(&db, &scope, &ListFilter::default()).await,
            vec!["bob"]
        );
        assert!(
            !student_visible(&db.pool, &scope, db.student_id("alice").unwrap())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_role_less_sees_nothing() {
        let db = school().await;
        let scope = scope_of(&db, "visitor").await;
        let all = ListFilter::default();

        assert!(student_names(&db, &scope, &all).await.is_empty());
        assert!(list_classrooms(&db.pool, &scope, &all).await.unwrap().is_empty());
        assert!(list_subjects(&db.pool, &scope, &all).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filters_combine_with_scope() {
        let db = school().await;
        let scope = scope_of(&db, "root").await;

        let by_name = ListFilter {
            q: Some("AL".to_string()),
            classroom_id: None,
        };
        assert_eq!(student_names(&db, &scope, &by_name).await, vec!["alice"]);

        let by_classroom = ListFilter {
            q: None,
            classroom_id: db.classroom_id("Grade 7 C"),
        };
        assert_eq!(student_names(&db, &scope, &by_classroom).await, vec!["carol"]);

        let math = scope_of(&db, "math_teacher").await;
        assert!(student_names(&db, &math, &by_classroom).await.is_empty());
    }

    #[tokio::test]
    async fn test_teacher_sees_own_subjects_classrooms_and_record() {
        let db = school().await;
        let scope = scope_of(&db, "history_teacher").await;
        let all = ListFilter::default();

        let subjects: Vec<_> = list_subjects(&db.pool, &scope, &all)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.code)
            .collect();
        assert_eq!(subjects, vec!["HIST"]);

        let classrooms: Vec<_> = list_classrooms(&db.pool, &scope, &all)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(classrooms, vec![db.classroom_id("Grade 6 B").unwrap()]);

        let teachers = list_teachers(&db.pool, &scope, &all).await.unwrap();
        assert_eq!(teachers.len(), 1);
        assert_eq!(teachers[0].id, db.teacher_id("history_teacher").unwrap());
    }

    #[tokio::test]
    async fn test_student_sees_teachers_of_their_classroom() {
        let db = school().await;
        let scope = scope_of(&db, "bob").await;

        let mut teachers: Vec<_> = list_teachers(&db.pool, &scope, &ListFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        teachers.sort();

        let mut expected = vec![
            db.teacher_id("math_teacher").unwrap(),
            db.teacher_id("history_teacher").unwrap(),
        ];
        expected.sort();
        assert_eq!(teachers, expected);
    }

    #[tokio::test]
    async fn test_teacher_grades_limited_to_own_subjects() {
        let db = school().await;
        let bob = db.student_id("bob").unwrap();

        for (code, marks) in [("MATH", 82.0), ("HIST", 67.0)] {
            create_grade(
                &db.pool,
                &GradeInput {
                    student_id: bob,
                    subject_id: db.subject_id(code).unwrap(),
                    marks,
                    grade: "B",
                },
            )
            .await
            .unwrap();
        }

        let history = scope_of(&db, "history_teacher").await;
        let grades = list_grades(&db.pool, &history, &GradeFilter::default())
            .await
            .unwrap();
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].subject_name, "History");

        let own = scope_of(&db, "bob").await;
        assert_eq!(
            list_grades(&db.pool, &own, &GradeFilter::default())
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_timetable_scoping() {
        let db = school().await;
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        for (classroom, code, teacher, day) in [
            ("Grade 5 A", "MATH", "math_teacher", "Monday"),
            ("Grade 6 B", "HIST", "history_teacher", "Tuesday"),
        ] {
            create_slot(
                &db.pool,
                &SlotInput {
                    classroom_id: db.classroom_id(classroom).unwrap(),
                    subject_id: db.subject_id(code).unwrap(),
                    teacher_id: db.teacher_id(teacher).unwrap(),
                    day_of_week: day,
                    period_time: nine,
                },
            )
            .await
            .unwrap();
        }

        let alice = scope_of(&db, "alice").await;
        let slots = list_timetable(&db.pool, &alice, None).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].day_of_week, "Monday");

        let math = scope_of(&db, "math_teacher").await;
        assert_eq!(list_timetable(&db.pool, &math, None).await.unwrap().len(), 2);

        let history = scope_of(&db, "history_teacher").await;
        assert_eq!(list_timetable(&db.pool, &history, None).await.unwrap().len(), 1);
    }
}
