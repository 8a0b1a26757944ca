//! Database adapter traits
//!
//! This module provides a unified interface for the sqlx backends, plus the
//! transaction handle the engine threads through a chain of calls.

use crate::database::types::SqlValue;
use crate::error::Result;
use crate::models::query_builder::{create_dialect, DatabaseBackend, SqlDialect};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Result type for database query operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Number of rows affected by the query
    pub rows_affected: u64,
    /// Last inserted ID (if applicable)
    pub last_insert_id: Option<i64>,
}

/// One result row: column names plus positional values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the first column with this name
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Row as a JSON object keyed by column name
    ///
    /// Duplicate column names (joins without aliases) keep the first value.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::with_capacity(self.columns.len());
        for (column, value) in self.columns.iter().zip(&self.values) {
            if !obj.contains_key(column) {
                obj.insert(column.clone(), value.to_json());
            }
        }
        JsonValue::Object(obj)
    }
}

/// Transaction isolation levels understood by the adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options for starting a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
}

impl TxOptions {
    pub fn is_default(&self) -> bool {
        self.isolation.is_none() && !self.read_only
    }
}

/// Snapshot of the connection pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: u32,
    pub idle: usize,
    pub max_idle: u32,
}

/// Unified database adapter trait
///
/// This trait provides a common interface for all database backends,
/// enabling the engine to work with PostgreSQL, MySQL, and SQLite through
/// the same API.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Get the name of this database connection
    fn name(&self) -> &str;

    /// Get the database backend type
    fn backend(&self) -> DatabaseBackend;

    /// Execute a query that modifies data (INSERT, UPDATE, DELETE, DDL)
    ///
    /// # Returns
    /// * `Ok(QueryResult)` - Result with affected rows and last insert ID
    /// * `Err(Error)` - If the query fails
    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult>;

    /// Fetch all rows from a SELECT query
    async fn fetch_all(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>>;

    /// Column names a SELECT would return, without running it
    async fn columns(&self, sql: &str) -> Result<Vec<String>>;

    /// Fetch the first row from a SELECT query
    async fn fetch_one(&self, sql: &str, params: Vec<SqlValue>) -> Result<Option<Row>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    /// Test database connectivity
    async fn ping(&self) -> Result<bool>;

    /// Start a transaction on a dedicated pooled connection
    async fn begin(&self, options: Option<TxOptions>) -> Result<Box<dyn TransactionAdapter>>;

    /// Close the pool; pending connections finish first
    async fn close(&self);

    /// Record the number of idle connections the pool should keep
    ///
    /// sqlx pools cannot be resized while open, so the value is only
    /// recorded and reported by `pool_status`.
    fn set_max_idle_conns(&self, n: u32);

    fn pool_status(&self) -> PoolStatus;

    /// SQL dialect matching this backend
    fn dialect(&self) -> Arc<dyn SqlDialect> {
        create_dialect(self.backend())
    }

    /// Get the underlying adapter as Any for downcasting
    ///
    /// This allows code that knows the specific database type to access
    /// the underlying sqlx pool directly when needed.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Clone the adapter into a boxed trait object
    fn clone_box(&self) -> Box<dyn DatabaseAdapter>;
}

impl Clone for Box<dyn DatabaseAdapter> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// An open transaction
///
/// Consumed by `commit` or `rollback`; dropping it without either rolls
/// back when the connection returns to the pool.
#[async_trait]
pub trait TransactionAdapter: Send {
    async fn execute(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult>;

    async fn fetch_all(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>>;

    async fn columns(&mut self, sql: &str) -> Result<Vec<String>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row::new(
            vec!["id".into(), "name".into(), "name".into()],
            vec![SqlValue::BigInt(1), SqlValue::from("first"), SqlValue::from("second")],
        )
    }

    #[test]
    fn test_row_lookup() {
        let row = sample_row();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get("id"), Some(&SqlValue::BigInt(1)));
        assert_eq!(row.get_index(2), Some(&SqlValue::from("second")));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_row_to_json_keeps_first_duplicate() {
        let json = sample_row().to_json();
        assert_eq!(json, serde_json::json!({"id": 1, "name": "first"}));
    }

    #[test]
    fn test_tx_options_default() {
        assert!(TxOptions::default().is_default());
        let opts = TxOptions {
            isolation: Some(IsolationLevel::Serializable),
            read_only: false,
        };
        assert!(!opts.is_default());
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
    }
}
