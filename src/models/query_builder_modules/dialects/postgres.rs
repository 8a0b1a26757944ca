//! PostgreSQL dialect implementation
//!
//! This module contains PostgreSQL-specific SQL generation logic.

use super::{quote_parts, DatabaseBackend, SqlDialect};
use crate::models::schema::DataType;

/// PostgreSQL dialect
#[derive(Debug, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect
    pub fn new() -> Self {
        Self
    }
}

impl SqlDialect for PostgresDialect {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_parts(identifier, |part| format!("\"{}\"", part.replace('"', "\"\"")))
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position)
    }

    fn limit_syntax(&self, limit: Option<i64>, offset: Option<i64>) -> String {
        let mut sql = String::new();
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    fn returning_syntax(&self, columns: &[String]) -> Option<String> {
        Some(format!(" RETURNING {}", columns.join(", ")))
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn auto_increment_syntax(&self) -> &'static str {
        "BIGSERIAL PRIMARY KEY"
    }

    fn boolean_type(&self) -> &'static str {
        "BOOLEAN"
    }

    fn column_type(&self, data_type: DataType, size: Option<usize>) -> String {
        match (data_type, size) {
            (DataType::Bool, _) => self.boolean_type().to_string(),
            (DataType::Int, _) => "INTEGER".to_string(),
            (DataType::UInt | DataType::BigInt, _) => "BIGINT".to_string(),
            (DataType::Float, _) => "DOUBLE PRECISION".to_string(),
            (DataType::String, Some(n)) if n > 0 => format!("VARCHAR({})", n),
            (DataType::String | DataType::Text | DataType::Association, _) => "TEXT".to_string(),
            (DataType::Time, _) => "TIMESTAMPTZ".to_string(),
            (DataType::Bytes, _) => "BYTEA".to_string(),
            (DataType::Json, _) => "JSONB".to_string(),
        }
    }

    fn has_table_sql(&self) -> &'static str {
        "SELECT count(*) FROM information_schema.tables \
         WHERE table_schema = CURRENT_SCHEMA() AND table_name = $1 AND table_type = 'BASE TABLE'"
    }

    fn has_column_sql(&self) -> &'static str {
        "SELECT count(*) FROM information_schema.columns \
         WHERE table_schema = CURRENT_SCHEMA() AND table_name = $1 AND column_name = $2"
    }

    fn has_index_sql(&self) -> &'static str {
        "SELECT count(*) FROM pg_indexes \
         WHERE schemaname = CURRENT_SCHEMA() AND tablename = $1 AND indexname = $2"
    }

    fn current_database_sql(&self) -> &'static str {
        "SELECT CURRENT_DATABASE()"
    }

    fn alter_column_sql(&self, table: &str, column: &str, column_type: &str) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            column_type
        ))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
