//! PostgreSQL database adapter implementation

use crate::database::adapter::{
    DatabaseAdapter, PoolStatus, QueryResult, Row, TransactionAdapter, TxOptions,
};
use crate::database::config::DatabaseConnectionConfig;
use crate::database::types::{PostgresTypeConverter, SqlValue, TypeConverter};
use crate::error::{Error, Result};
use crate::models::query_builder::DatabaseBackend;
use super::describe_columns;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgQueryResult, PgRow};
use sqlx::Postgres;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// PostgreSQL database adapter
#[derive(Clone)]
pub struct PostgresAdapter {
    name: String,
    pool: Arc<PgPool>,
    converter: PostgresTypeConverter,
    max_idle: Arc<AtomicU32>,
}

impl PostgresAdapter {
    /// Create a new PostgreSQL adapter
    pub async fn new(
        name: impl Into<String>,
        connection_url: &str,
        config: &DatabaseConnectionConfig,
    ) -> Result<Self> {
        let pool = config
            .pool_options::<Postgres>()
            .connect(connection_url)
            .await
            .map_err(|e| {
                Error::database_connection(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        Ok(Self::from_pool(name, pool, config.min_connections))
    }

    /// Create adapter from existing pool
    pub fn from_pool(name: impl Into<String>, pool: PgPool, max_idle: u32) -> Self {
        Self {
            name: name.into(),
            pool: Arc::new(pool),
            converter: PostgresTypeConverter::new(),
            max_idle: Arc::new(AtomicU32::new(max_idle)),
        }
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn execute_on<'c, E>(executor: E, sql: &str, params: Vec<SqlValue>) -> Result<PgQueryResult>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    // Log SQL in development mode
    #[cfg(debug_assertions)]
    {
        log::debug!("PostgreSQL EXECUTE: {}", sql);
        log::debug!("  Parameters: {:?}", params);
    }

    let mut query = sqlx::query(sql);
    for param in params {
        query = PostgresTypeConverter::bind_param(query, param);
    }

    query.execute(executor).await.map_err(Error::from)
}

async fn fetch_on<'c, E>(executor: E, sql: &str, params: Vec<SqlValue>) -> Result<Vec<PgRow>>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    #[cfg(debug_assertions)]
    {
        log::debug!("PostgreSQL FETCH_ALL: {}", sql);
        log::debug!("  Parameters: {:?}", params);
    }

    let mut query = sqlx::query(sql);
    for param in params {
        query = PostgresTypeConverter::bind_param(query, param);
    }

    query.fetch_all(executor).await.map_err(Error::from)
}

fn to_query_result(result: PgQueryResult) -> QueryResult {
    // PostgreSQL has no last insert id; inserts use RETURNING instead
    QueryResult {
        rows_affected: result.rows_affected(),
        last_insert_id: None,
    }
}

fn convert_rows(converter: &PostgresTypeConverter, rows: Vec<PgRow>) -> Result<Vec<Row>> {
    rows.iter().map(|row| converter.convert_row(row)).collect()
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult> {
        execute_on(&*self.pool, sql, params).await.map(to_query_result)
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
            .map_err(|e| Error::database_connection(format!("PostgreSQL ping failed: {}", e)))
    }

    async fn begin(&self, options: Option<TxOptions>) -> Result<Box<dyn TransactionAdapter>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::CantStartTransaction(e.to_string()))?;

        // SET TRANSACTION must run before the first query of the transaction
        if let Some(options) = options {
            if let Some(level) = options.isolation {
                let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
                execute_on(&mut *tx, &sql, Vec::new()).await?;
            }
            if options.read_only {
                execute_on(&mut *tx, "SET TRANSACTION READ ONLY", Vec::new()).await?;
            }
        }

        Ok(Box::new(PostgresTransaction {
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

/// Transaction on a PostgreSQL connection
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    converter: PostgresTypeConverter,
}

#[async_trait]
impl TransactionAdapter for PostgresTransaction {
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
