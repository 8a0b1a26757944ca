//! SQLite database adapter implementation

use crate::database::adapter::{
    DatabaseAdapter, PoolStatus, QueryResult, Row, TransactionAdapter, TxOptions,
};
use crate::database::config::DatabaseConnectionConfig;
use crate::database::types::{SqlValue, SqliteTypeConverter, TypeConverter};
use crate::error::{Error, Result};
use crate::models::query_builder::DatabaseBackend;
use super::describe_columns;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteQueryResult, SqliteRow};
use sqlx::Sqlite;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// SQLite database adapter
#[derive(Clone)]
pub struct SqliteAdapter {
    name: String,
    pool: Arc<SqlitePool>,
    converter: SqliteTypeConverter,
    max_idle: Arc<AtomicU32>,
}

/// Turn a legacy `sqlite3` argument ("test.db", ":memory:") into a sqlx URL
pub fn normalize_sqlite_url(url: &str) -> String {
    if url.starts_with("sqlite:") {
        url.to_string()
    } else if url == ":memory:" {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite://{}", url)
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

impl SqliteAdapter {
    /// Create a new SQLite adapter, creating the database file if missing
    pub async fn new(
        name: impl Into<String>,
        connection_url: &str,
        config: &DatabaseConnectionConfig,
    ) -> Result<Self> {
        let url = normalize_sqlite_url(connection_url);
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| Error::database_connection(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true);

        // Every connection to :memory: is a separate database
        let pool_options = if is_memory_url(&url) {
            config
                .pool_options::<Sqlite>()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            config.pool_options::<Sqlite>()
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| Error::database_connection(format!("Failed to connect to SQLite: {}", e)))?;

        Ok(Self::from_pool(name, pool, config.min_connections))
    }

    /// Create adapter from existing pool
    pub fn from_pool(name: impl Into<String>, pool: SqlitePool, max_idle: u32) -> Self {
        Self {
            name: name.into(),
            pool: Arc::new(pool),
            converter: SqliteTypeConverter::new(),
            max_idle: Arc::new(AtomicU32::new(max_idle)),
        }
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn execute_on<'c, E>(executor: E, sql: &str, params: Vec<SqlValue>) -> Result<SqliteQueryResult>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    // Log SQL in development mode
    #[cfg(debug_assertions)]
    {
        log::debug!("SQLite EXECUTE: {}", sql);
        log::debug!("  Parameters: {:?}", params);
    }

    let mut query = sqlx::query(sql);
    for param in params {
        query = SqliteTypeConverter::bind_param(query, param);
    }

    query.execute(executor).await.map_err(Error::from)
}

async fn fetch_on<'c, E>(executor: E, sql: &str, params: Vec<SqlValue>) -> Result<Vec<SqliteRow>>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    #[cfg(debug_assertions)]
    {
        log::debug!("SQLite FETCH_ALL: {}", sql);
        log::debug!("  Parameters: {:?}", params);
    }

    let mut query = sqlx::query(sql);
    for param in params {
        query = SqliteTypeConverter::bind_param(query, param);
    }

    query.fetch_all(executor).await.map_err(Error::from)
}

/// CREATE, ALTER and DROP statements
fn is_schema_change(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or_default();
    ["CREATE", "ALTER", "DROP"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

fn to_query_result(result: SqliteQueryResult) -> QueryResult {
    QueryResult {
        rows_affected: result.rows_affected(),
        last_insert_id: Some(result.last_insert_rowid()),
    }
}

fn convert_rows(converter: &SqliteTypeConverter, rows: Vec<SqliteRow>) -> Result<Vec<Row>> {
    rows.iter().map(|row| converter.convert_row(row)).collect()
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::SQLite
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult> {
        if !is_schema_change(sql) {
            return execute_on(&*self.pool, sql, params).await.map(to_query_result);
        }

        // A pooled connection keeps the schema it last parsed until a read
        // makes it check the schema cookie, so DDL from another connection
        // (a renamed column) is invisible to ALTER without this.
        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        sqlx::query("PRAGMA schema_version")
            .fetch_one(&mut *conn)
            .await
            .map_err(Error::from)?;
        execute_on(&mut *conn, sql, params).await.map(to_query_result)
    }

    async fn fetch_all(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        let rows = fetch_on(&*self.pool, sql, params).await?;
        convert_rows(&self.converter, rows)
    }

    async fn columns(&self, sql: &str) -> Result<Vec<String>> {
        describe_columns(&*self.pool, sql).await
    }

    async fn ping(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&*self.pool)
            .await
            .map(|_| true)
            .map_err(|e| Error::database_connection(format!("SQLite ping failed: {}", e)))
    }

    async fn begin(&self, options: Option<TxOptions>) -> Result<Box<dyn TransactionAdapter>> {
        if options.is_some_and(|o| !o.is_default()) {
            log::warn!("SQLite ignores transaction isolation and read-only options");
        }

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::CantStartTransaction(e.to_string()))?;

        Ok(Box::new(SqliteTransaction {
            tx,
            converter: self.converter.clone(),
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn set_max_idle_conns(&self, n: u32) {
        self.max_idle.store(n, Ordering::Relaxed);
    }

    fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_idle: self.max_idle.load(Ordering::Relaxed),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn DatabaseAdapter> {
        Box::new(self.clone())
    }
}

/// Transaction on a SQLite connection
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
    converter: SqliteTypeConverter,
}

#[async_trait]
impl TransactionAdapter for SqliteTransaction {
    async fn execute(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult> {
        execute_on(&mut *self.tx, sql, params).await.map(to_query_result)
    }

    async fn fetch_all(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        let rows = fetch_on(&mut *self.tx, sql, params).await?;
        convert_rows(&self.converter, rows)
    }

    async fn columns(&mut self, sql: &str) -> Result<Vec<String>> {
        describe_columns(&mut *self.tx, sql).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| Error::database_transaction(format!("commit failed: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| Error::database_transaction(format!("rollback failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sqlite_url() {
        assert_eq!(normalize_sqlite_url("test.db"), "sqlite://test.db");
        assert_eq!(normalize_sqlite_url(":memory:"), "sqlite::memory:");
        assert_eq!(normalize_sqlite_url("sqlite://./app.db"), "sqlite://./app.db");
    }

    #[test]
    fn test_schema_change_detection() {
        assert!(is_schema_change("CREATE TABLE t (id INTEGER)"));
        assert!(is_schema_change("  alter table t drop column x"));
        assert!(is_schema_change("DROP INDEX idx_t"));
        assert!(!is_schema_change("SELECT * FROM t"));
        assert!(!is_schema_change("INSERT INTO t (id) VALUES (1)"));
        assert!(!is_schema_change(""));
    }

    #[tokio::test]
    async fn test_alter_sees_schema_from_other_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ddl.db");
        let config = DatabaseConnectionConfig::default();
        let adapter = SqliteAdapter::new("test", path.to_str().unwrap(), &config)
            .await
            .unwrap();
        adapter
            .execute("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)", vec![])
            .await
            .unwrap();
        // Parse the original schema on several pooled connections.
        for _ in 0..4 {
            adapter.fetch_all("SELECT name, age FROM people", vec![]).await.unwrap();
        }

        adapter
            .execute("ALTER TABLE people RENAME COLUMN name TO full_name", vec![])
            .await
            .unwrap();
        for _ in 0..4 {
            adapter
                .execute("ALTER TABLE people ADD COLUMN extra TEXT", vec![])
                .await
                .unwrap();
            adapter
                .execute("ALTER TABLE people DROP COLUMN full_name", vec![])
                .await
                .unwrap();
            adapter
                .execute("ALTER TABLE people ADD COLUMN full_name TEXT", vec![])
                .await
                .unwrap();
            adapter
                .execute("ALTER TABLE people DROP COLUMN extra", vec![])
                .await
                .unwrap();
        }

        let rows = adapter.fetch_all("SELECT full_name, age FROM people", vec![]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_rows() {
        let config = DatabaseConnectionConfig::default();
        let adapter = SqliteAdapter::new("test", ":memory:", &config).await.unwrap();
        adapter
            .execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)", vec![])
            .await
            .unwrap();

        let mut tx = adapter.begin(None).await.unwrap();
        tx.execute("INSERT INTO items (name) VALUES (?)", vec!["a".into()])
            .await
            .unwrap();
        let inside = tx.fetch_all("SELECT name FROM items", vec![]).await.unwrap();
        assert_eq!(inside.len(), 1);
        tx.rollback().await.unwrap();

        let rows = adapter.fetch_all("SELECT name FROM items", vec![]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_storage_class_extraction() {
        let config = DatabaseConnectionConfig::default();
        let adapter = SqliteAdapter::new("test", ":memory:", &config).await.unwrap();
        adapter
            .execute(
                "CREATE TABLE flags (id INTEGER PRIMARY KEY, active BOOLEAN, score REAL)",
                vec![],
            )
            .await
            .unwrap();
        adapter
            .execute(
                "INSERT INTO flags (active, score) VALUES (?, ?)",
                vec![true.into(), 2.5f64.into()],
            )
            .await
            .unwrap();

        let rows = adapter
            .fetch_all("SELECT id, active, score, COUNT(*) AS n FROM flags", vec![])
            .await
            .unwrap();
        let row = &rows[0];
        assert_eq!(row.get("id"), Some(&SqlValue::BigInt(1)));
        assert_eq!(row.get("active"), Some(&SqlValue::Bool(true)));
        assert_eq!(row.get("score"), Some(&SqlValue::Double(2.5)));
        assert_eq!(row.get("n"), Some(&SqlValue::BigInt(1)));
    }
}
