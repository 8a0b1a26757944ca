//! Database dialect implementations
//!
//! This module contains database-specific SQL generation logic, separated
//! by database type for better maintainability and extensibility.

use crate::models::schema::DataType;
use std::sync::Arc;

/// Database backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackend {
    Postgres,
    MySQL,
    MariaDB,
    SQLite,
    /// Statement generation and metadata only; there is no driver
    SqlServer,
}

impl DatabaseBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseBackend::Postgres => "postgres",
            DatabaseBackend::MySQL => "mysql",
            DatabaseBackend::MariaDB => "mariadb",
            DatabaseBackend::SQLite => "sqlite",
            DatabaseBackend::SqlServer => "sqlserver",
        }
    }
}

/// Unified error type for query building
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Missing required clause: {clause}")]
    MissingClause { clause: String },

    #[error("WHERE conditions required")]
    MissingWhere,

    #[error("Feature not supported in {backend:?}: {feature}")]
    UnsupportedFeature {
        backend: DatabaseBackend,
        feature: String,
    },

    #[error("Invalid syntax for {backend:?}: {message}")]
    InvalidSyntax {
        backend: DatabaseBackend,
        message: String,
    },

    #[error("Not found")]
    NotFound,
}

/// Trait for database-specific SQL generation
pub trait SqlDialect: Send + Sync {
    fn backend(&self) -> DatabaseBackend;

    /// Quote an identifier (table name, column name) for this database
    fn quote_identifier(&self, identifier: &str) -> String;

    /// Generate a parameter placeholder for the given position
    fn placeholder(&self, position: usize) -> String;

    /// Generate LIMIT/OFFSET syntax for this database
    fn limit_syntax(&self, limit: Option<i64>, offset: Option<i64>) -> String;

    /// Generate RETURNING clause syntax (if supported)
    fn returning_syntax(&self, columns: &[String]) -> Option<String>;

    /// Get the current timestamp expression for this database
    fn current_timestamp(&self) -> &'static str;

    /// Column definition of an auto-incrementing primary key
    fn auto_increment_syntax(&self) -> &'static str;

    /// Get the boolean type name for this database
    fn boolean_type(&self) -> &'static str;

    /// Column type for a schema data type
    fn column_type(&self, data_type: DataType, size: Option<usize>) -> String;

    /// Count query for a table; binds the table name
    fn has_table_sql(&self) -> &'static str;

    /// Count query for a column; binds table then column
    fn has_column_sql(&self) -> &'static str;

    /// Count query for an index; binds table then index name
    fn has_index_sql(&self) -> &'static str;

    fn current_database_sql(&self) -> &'static str;

    fn drop_index_sql(&self, table: &str, index: &str) -> String {
        let _ = table;
        format!("DROP INDEX {}", self.quote_identifier(index))
    }

    /// `None` when the database cannot change a column type in place
    fn alter_column_sql(&self, table: &str, column: &str, column_type: &str) -> Option<String>;

    fn rename_column_sql(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(from),
            self.quote_identifier(to)
        )
    }

    /// Whether constraints can be added to an existing table
    fn supports_alter_constraints(&self) -> bool {
        true
    }

    /// Support for downcasting to specific dialect implementations
    fn as_any(&self) -> &dyn std::any::Any;
}

pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;

pub use mysql::MySQLDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SQLiteDialect;
pub use sqlserver::SqlServerDialect;

/// Factory function to create the appropriate dialect for a database backend
pub fn create_dialect(backend: DatabaseBackend) -> Arc<dyn SqlDialect> {
    match backend {
        DatabaseBackend::Postgres => Arc::new(PostgresDialect::new()),
        DatabaseBackend::MySQL | DatabaseBackend::MariaDB => Arc::new(MySQLDialect::new()),
        DatabaseBackend::SQLite => Arc::new(SQLiteDialect::new()),
        DatabaseBackend::SqlServer => Arc::new(SqlServerDialect::new()),
    }
}

/// Quote each dot-separated part of an identifier, leaving `*` alone
pub(crate) fn quote_parts(identifier: &str, quote: impl Fn(&str) -> String) -> String {
    identifier
        .split('.')
        .map(|part| if part == "*" { part.to_string() } else { quote(part) })
        .collect::<Vec<_>>()
        .join(".")
}
