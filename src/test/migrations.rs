#[cfg(test)]
mod tests {
    use crate::database::{
        CURRENT_SCHEMA, SchemaMigrator, migrate_database_declaratively, normalize_sql,
    };
    use crate::test::test_db::memory_pool;
    use rocket::tokio;
    use sqlx::{Row, SqlitePool};

    const CLASSROOMS_ONLY: &str = r#"
        CREATE TABLE classrooms (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );
    "#;

    const CLASSROOMS_AND_STUDENTS: &str = r#"
        CREATE TABLE classrooms (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE students (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            classroom_id INTEGER,
            FOREIGN KEY (classroom_id) REFERENCES classrooms (id)
        );
    "#;

    const CLASSROOMS_WITH_SECTION: &str = r#"
        CREATE TABLE classrooms (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            section TEXT NOT NULL DEFAULT 'A'
        );

        CREATE TABLE students (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            classroom_id INTEGER,
            FOREIGN KEY (classroom_id) REFERENCES classrooms (id)
        );
    "#;

    const CLASSROOMS_WITHOUT_NAME: &str = r#"
        CREATE TABLE classrooms (
            id INTEGER PRIMARY KEY
        );
    "#;

    const WITH_INDEX: &str = r#"
        CREATE TABLE classrooms (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );
        CREATE INDEX idx_classroom_name ON classrooms (name);
    "#;

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("Failed to fetch table names")
        .into_iter()
        .map(|row| row.get::<String, _>(0))
        .collect()
    }

    async fn column_names(pool: &SqlitePool, table: &str) -> Vec<String> {
        sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(pool)
            .await
            .expect("Failed to read table info")
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect()
    }

    async fn index_exists(pool: &SqlitePool, name: &str) -> bool {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?")
                .bind(name)
                .fetch_one(pool)
                .await
                .expect("Failed to query indices");
        count > 0
    }

    async fn seeded(schema: &str) -> SqlitePool {
        let pool = memory_pool().await.expect("Failed to create database");
        sqlx::raw_sql(schema).execute(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled_by_default() {
        let pool = memory_pool().await.unwrap();

        let pragma: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(pragma, 1);
    }

    #[tokio::test]
    async fn test_empty_schema_is_a_no_op() {
        let pool = memory_pool().await.unwrap();

        let changed = migrate_database_declaratively(pool.clone(), "", false)
            .await
            .unwrap();

        assert!(!changed);
        assert!(table_names(&pool).await.is_empty());
    }

    #[tokio::test]
    async fn test_creates_tables_then_settles() {
        let pool = memory_pool().await.unwrap();

        assert!(
            migrate_database_declaratively(pool.clone(), CLASSROOMS_ONLY, false)
                .await
                .unwrap()
        );
        assert_eq!(table_names(&pool).await, vec!["classrooms"]);

        assert!(
            !migrate_database_declaratively(pool.clone(), CLASSROOMS_ONLY, false)
                .await
                .unwrap(),
            "Re-running the same schema should change nothing"
        );
    }

    #[tokio::test]
    async fn test_current_schema_is_idempotent() {
        let pool = memory_pool().await.unwrap();

        assert!(
            migrate_database_declaratively(pool.clone(), CURRENT_SCHEMA, false)
                .await
                .unwrap()
        );
        let tables = table_names(&pool).await;
        for table in ["users", "students", "attendance", "grades", "timetable", "notices"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }

        let plan = SchemaMigrator::new(pool.clone(), CURRENT_SCHEMA, false)
            .plan()
            .await
            .unwrap();
        assert!(plan.is_empty(), "unexpected drift: {:?}", plan);
    }

    #[tokio::test]
    async fn test_plan_reports_without_applying() {
        let pool = seeded(CLASSROOMS_ONLY).await;

        let plan = SchemaMigrator::new(pool.clone(), CLASSROOMS_WITH_SECTION, false)
            .plan()
            .await
            .unwrap();

        assert_eq!(plan.new_tables, vec!["students"]);
        assert_eq!(plan.changed_tables, vec!["classrooms"]);
        assert!(plan.dropped_tables.is_empty());
        assert_eq!(table_names(&pool).await, vec!["classrooms"]);
    }

    #[tokio::test]
    async fn test_added_column_keeps_rows() {
        let pool = seeded(CLASSROOMS_AND_STUDENTS).await;
        sqlx::query("INSERT INTO classrooms (name) VALUES ('Grade 3')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO students (name, classroom_id) VALUES ('Ada', 1)")
            .execute(&pool)
            .await
            .unwrap();

        assert!(
            migrate_database_declaratively(pool.clone(), CLASSROOMS_WITH_SECTION, false)
                .await
                .unwrap()
        );

        assert!(column_names(&pool, "classrooms").await.contains(&"section".to_string()));

        let row = sqlx::query("SELECT name, section FROM classrooms WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("name"), "Grade 3");
        assert_eq!(row.get::<String, _>("section"), "A");

        let student_classroom: i64 =
            sqlx::query_scalar("SELECT classroom_id FROM students WHERE name = 'Ada'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(student_classroom, 1);
    }

    #[tokio::test]
    async fn test_dropping_table_needs_permission() {
        let pool = seeded(CLASSROOMS_AND_STUDENTS).await;

        let err = migrate_database_declaratively(pool.clone(), CLASSROOMS_ONLY, false)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("students"), "{}", message);
        assert!(message.contains("allow_deletions=true"), "{}", message);
        assert_eq!(table_names(&pool).await, vec!["classrooms", "students"]);

        assert!(
            migrate_database_declaratively(pool.clone(), CLASSROOMS_ONLY, true)
                .await
                .unwrap()
        );
        assert_eq!(table_names(&pool).await, vec!["classrooms"]);
    }

    #[tokio::test]
    async fn test_dropping_column_needs_permission() {
        let pool = seeded(CLASSROOMS_ONLY).await;
        sqlx::query("INSERT INTO classrooms (name) VALUES ('Grade 1')")
            .execute(&pool)
            .await
            .unwrap();

        let err = migrate_database_declaratively(pool.clone(), CLASSROOMS_WITHOUT_NAME, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("name"));
        assert!(column_names(&pool, "classrooms").await.contains(&"name".to_string()));

        migrate_database_declaratively(pool.clone(), CLASSROOMS_WITHOUT_NAME, true)
            .await
            .unwrap();
        assert_eq!(column_names(&pool, "classrooms").await, vec!["id"]);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classrooms")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1, "Rows survive the rebuild");
    }

    #[tokio::test]
    async fn test_dropping_index_needs_permission() {
        let pool = seeded(WITH_INDEX).await;

        let err = migrate_database_declaratively(pool.clone(), CLASSROOMS_ONLY, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("idx_classroom_name"));
        assert!(index_exists(&pool, "idx_classroom_name").await);

        migrate_database_declaratively(pool.clone(), CLASSROOMS_ONLY, true)
            .await
            .unwrap();
        assert!(!index_exists(&pool, "idx_classroom_name").await);
    }

    #[tokio::test]
    async fn test_adding_index() {
        let pool = seeded(CLASSROOMS_ONLY).await;

        assert!(
            migrate_database_declaratively(pool.clone(), WITH_INDEX, false)
                .await
                .unwrap()
        );
        assert!(index_exists(&pool, "idx_classroom_name").await);
    }

    #[test]
    fn test_normalize_sql() {
        assert_eq!(
            normalize_sql("CREATE TABLE fees( -- amount owed\n  id INTEGER )"),
            "CREATE TABLE fees(id INTEGER)"
        );
        assert_eq!(
            normalize_sql("CREATE TABLE \"notices\"(id INTEGER,\n title TEXT)"),
            "CREATE TABLE notices(id INTEGER,title TEXT)"
        );
    }
}
