//! Multi-database query builder
//!
//! This module provides a unified interface for building SQL statements
//! across database backends while handling syntax differences
//! (quoting, placeholders, LIMIT/OFFSET, RETURNING) through the dialects.

pub mod args;
pub mod core;
pub mod dialects;
pub mod schema;

pub use args::{columns, Arg, SqlExpr};
pub use dialects::{create_dialect, DatabaseBackend, QueryError, SqlDialect};
pub use dialects::{MySQLDialect, PostgresDialect, SQLiteDialect, SqlServerDialect};
pub use schema::{ColumnDefinition, CreateTableBuilder, SchemaBuilder};

pub use core::{
    explain, Condition, OrderByClause, OrderDirection, QueryBuilder, WhereCondition,
    WhereConnector,
};

// Re-export SqlValue from the unified type system
pub use crate::database::types::SqlValue;
