use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Connection, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{info, instrument, warn};

use crate::error::AppError;

static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*(\n|$)").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r" *([(),]) *").unwrap());
static QUOTED_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r#""(\w+)""#).unwrap());

/// Schema objects keyed by name, holding their normalised `CREATE` SQL.
type Objects = BTreeMap<String, String>;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub new_tables: Vec<String>,
    pub changed_tables: Vec<String>,
    pub dropped_tables: Vec<String>,
    pub new_indices: Vec<String>,
    pub changed_indices: Vec<String>,
    pub dropped_indices: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.new_tables.is_empty()
            && self.changed_tables.is_empty()
            && self.dropped_tables.is_empty()
            && self.new_indices.is_empty()
            && self.changed_indices.is_empty()
            && self.dropped_indices.is_empty()
    }
}

/// Brings a live SQLite database in line with a schema script by building
/// the script in a scratch in-memory database and replaying the difference.
///
/// Changed tables are rebuilt (create new, copy shared columns, swap). Any
/// change that would lose data is refused unless `allow_deletions` is set.
pub struct SchemaMigrator {
    pool: SqlitePool,
    target_schema: String,
    allow_deletions: bool,
    statements_run: u32,
}

impl SchemaMigrator {
    pub fn new(pool: SqlitePool, target_schema: &str, allow_deletions: bool) -> Self {
        Self {
            pool,
            target_schema: target_schema.to_string(),
            allow_deletions,
            statements_run: 0,
        }
    }

    #[instrument(skip(self))]
    pub async fn migrate(&mut self) -> Result<bool, AppError> {
        info!("Starting declarative database migration");

        let pristine = self.pristine().await?;
        let target_tables = objects(&pristine, "table").await?;
        let target_indices = objects(&pristine, "index").await?;

        // Foreign keys stay off while tables are rebuilt so that dropping a
        // parent table does not cascade into its children.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await?;

        let result = self
            .migrate_on(&mut conn, &pristine, &target_tables, &target_indices)
            .await;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await?;

        result
    }

    async fn migrate_on(
        &mut self,
        conn: &mut SqliteConnection,
        pristine: &SqlitePool,
        target_tables: &Objects,
        target_indices: &Objects,
    ) -> Result<bool, AppError> {
        let mut tx = conn.begin().await?;

        let current_tables = objects(&mut *tx, "table").await?;
        let current_indices = objects(&mut *tx, "index").await?;
        let diff = diff(&current_tables, target_tables, &current_indices, target_indices);

        if diff.is_empty() {
            tx.commit().await?;
            info!("No schema changes needed");
            return Ok(false);
        }

        if let Err(e) = self.apply(&mut tx, pristine, &diff).await {
            tx.rollback().await?;
            return Err(e);
        }

        let violations = sqlx::query("PRAGMA foreign_key_check")
            .fetch_all(&mut *tx)
            .await?;
        if !violations.is_empty() {
            tx.rollback().await?;
            return Err(AppError::Internal(format!(
                "Migration would leave {} foreign key violations",
                violations.len()
            )));
        }

        tx.commit().await?;

        info!(statements = self.statements_run, "Migration completed");
        Ok(self.statements_run > 0)
    }

    /// Reports what `migrate` would do without touching the live database.
    pub async fn plan(&self) -> Result<SchemaDiff, AppError> {
        let pristine = self.pristine().await?;
        let current_tables = objects(&self.pool, "table").await?;
        let target_tables = objects(&pristine, "table").await?;
        let current_indices = objects(&self.pool, "index").await?;
        let target_indices = objects(&pristine, "index").await?;
        Ok(diff(&current_tables, &target_tables, &current_indices, &target_indices))
    }

    async fn pristine(&self) -> Result<SqlitePool, AppError> {
        let pristine = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        if !self.target_schema.trim().is_empty() {
            sqlx::raw_sql(&self.target_schema)
                .execute(&pristine)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to build target schema: {}", e)))?;
        }
        Ok(pristine)
    }

    async fn apply(
        &mut self,
        tx: &mut Transaction<'_, Sqlite>,
        pristine: &SqlitePool,
        diff: &SchemaDiff,
    ) -> Result<(), AppError> {
        if !self.allow_deletions && !diff.dropped_tables.is_empty() {
            return Err(AppError::Internal(format!(
                "Refusing to drop tables {:?}. Set allow_deletions=true to permit this.",
                diff.dropped_tables
            )));
        }

        if !self.allow_deletions && !diff.dropped_indices.is_empty() {
            return Err(AppError::Internal(format!(
                "Refusing to drop indices {:?}. Set allow_deletions=true to permit this.",
                diff.dropped_indices
            )));
        }

        let target_sql = raw_objects(pristine, "table").await?;
        let target_index_sql = raw_objects(pristine, "index").await?;

        for name in &diff.new_tables {
            self.run(tx, &format!("create table {}", name), &target_sql[name])
                .await?;
        }

        for name in &diff.changed_tables {
            self.rebuild_table(tx, pristine, name, &target_sql[name])
                .await?;
        }

        for name in &diff.dropped_tables {
            self.run(tx, &format!("drop table {}", name), &format!("DROP TABLE {}", name))
                .await?;
        }

        for name in diff.dropped_indices.iter().chain(&diff.changed_indices) {
            self.run(tx, &format!("drop index {}", name), &format!("DROP INDEX IF EXISTS {}", name))
                .await?;
        }

        for name in diff.new_indices.iter().chain(&diff.changed_indices) {
            self.run(tx, &format!("create index {}", name), &target_index_sql[name])
                .await?;
        }

        Ok(())
    }

    async fn rebuild_table(
        &mut self,
        tx: &mut Transaction<'_, Sqlite>,
        pristine: &SqlitePool,
        table: &str,
        target_sql: &str,
    ) -> Result<(), AppError> {
        let current = columns(&mut **tx, table).await?;
        let target = columns(pristine, table).await?;

        let lost: Vec<_> = current.difference(&target).cloned().collect();
        if !lost.is_empty() && !self.allow_deletions {
            return Err(AppError::Internal(format!(
                "Refusing to remove columns {:?} from table {}. Set allow_deletions=true to permit this.",
                lost, table
            )));
        }

        let staging = format!("{}_migration_new", table);
        let staging_sql = target_sql.replacen(
            &format!("CREATE TABLE {}", table),
            &format!("CREATE TABLE {}", staging),
            1,
        );
        self.run(tx, &format!("stage {}", table), &staging_sql).await?;

        let shared: Vec<_> = current.intersection(&target).cloned().collect();
        if !shared.is_empty() {
            let cols = shared.join(", ");
            self.run(
                tx,
                &format!("copy rows into {}", staging),
                &format!("INSERT INTO {} ({}) SELECT {} FROM {}", staging, cols, cols, table),
            )
            .await?;
        }

        self.run(tx, &format!("drop old {}", table), &format!("DROP TABLE {}", table))
            .await?;
        self.run(
            tx,
            &format!("rename {}", staging),
            &format!("ALTER TABLE {} RENAME TO {}", staging, table),
        )
        .await
    }

    async fn run(
        &mut self,
        conn: &mut SqliteConnection,
        description: &str,
        sql: &str,
    ) -> Result<(), AppError> {
        info!("Database migration: {} with SQL:\n{}", description, sql);
        sqlx::query(sql).execute(conn).await?;
        self.statements_run += 1;
        Ok(())
    }
}

fn diff(
    current_tables: &Objects,
    target_tables: &Objects,
    current_indices: &Objects,
    target_indices: &Objects,
) -> SchemaDiff {
    let (new_tables, changed_tables, dropped_tables) = compare(current_tables, target_tables);
    let (new_indices, changed_indices, dropped_indices) = compare(current_indices, target_indices);

    if !changed_tables.is_empty() {
        warn!(tables = ?changed_tables, "Tables differ from the target schema and will be rebuilt");
    }

    SchemaDiff {
        new_tables,
        changed_tables,
        dropped_tables,
        new_indices,
        changed_indices,
        dropped_indices,
    }
}

fn compare(current: &Objects, target: &Objects) -> (Vec<String>, Vec<String>, Vec<String>) {
    let added = target
        .keys()
        .filter(|name| !current.contains_key(*name))
        .cloned()
        .collect();
    let changed = target
        .iter()
        .filter(|(name, sql)| current.get(*name).is_some_and(|cur| cur != *sql))
        .map(|(name, _)| name.clone())
        .collect();
    let removed = current
        .keys()
        .filter(|name| !target.contains_key(*name))
        .cloned()
        .collect();
    (added, changed, removed)
}

async fn raw_objects(
    executor: impl sqlx::Executor<'_, Database = Sqlite>,
    kind: &str,
) -> Result<Objects, AppError> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master
         WHERE type = ? AND sql IS NOT NULL AND name NOT LIKE 'sqlite_%'",
    )
    .bind(kind)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
        .collect())
}

async fn objects(
    executor: impl sqlx::Executor<'_, Database = Sqlite>,
    kind: &str,
) -> Result<Objects, AppError> {
    Ok(raw_objects(executor, kind)
        .await?
        .into_iter()
        .map(|(name, sql)| (name, normalize_sql(&sql)))
        .collect())
}

async fn columns(
    executor: impl sqlx::Executor<'_, Database = Sqlite>,
    table: &str,
) -> Result<BTreeSet<String>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(|row| row.get::<String, _>(1)).collect())
}

pub fn normalize_sql(sql: &str) -> String {
    let sql = COMMENTS.replace_all(sql, " ");
    let sql = WHITESPACE.replace_all(&sql, " ");
    let sql = PUNCTUATION.replace_all(&sql, "$1");
    let sql = QUOTED_IDENT.replace_all(&sql, "$1");
    sql.trim().to_string()
}

#[instrument(skip(pool, target_schema))]
pub async fn migrate_database_declaratively(
    pool: SqlitePool,
    target_schema: &str,
    allow_deletions: bool,
) -> Result<bool, AppError> {
    SchemaMigrator::new(pool, target_schema, allow_deletions)
        .migrate()
        .await
}
