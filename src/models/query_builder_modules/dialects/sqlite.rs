//! SQLite dialect implementation
//!
//! This module contains SQLite-specific SQL generation logic,
//! handling SQLite's specific syntax and capabilities.

use super::{quote_parts, DatabaseBackend, SqlDialect};
use crate::models::schema::DataType;

/// SQLite dialect
#[derive(Debug, Default)]
pub struct SQLiteDialect;

impl SQLiteDialect {
    /// Create a new SQLite dialect
    pub fn new() -> Self {
        Self
    }
}

impl SqlDialect for SQLiteDialect {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::SQLite
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_parts(identifier, |part| format!("\"{}\"", part.replace('"', "\"\"")))
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn limit_syntax(&self, limit: Option<i64>, offset: Option<i64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            // OFFSET is only valid after LIMIT
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET {}", offset),
            (None, None) => String::new(),
        }
    }

    fn returning_syntax(&self, columns: &[String]) -> Option<String> {
        Some(format!(" RETURNING {}", columns.join(", ")))
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn auto_increment_syntax(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn boolean_type(&self) -> &'static str {
        // Declared BOOLEAN so rows can tell booleans from integers
        "BOOLEAN"
    }

    fn column_type(&self, data_type: DataType, _size: Option<usize>) -> String {
        match data_type {
            DataType::Bool => self.boolean_type(),
            DataType::Int | DataType::UInt | DataType::BigInt => "INTEGER",
            DataType::Float => "REAL",
            DataType::String | DataType::Text | DataType::Json | DataType::Association => "TEXT",
            DataType::Time => "DATETIME",
            DataType::Bytes => "BLOB",
        }
        .to_string()
    }

    fn has_table_sql(&self) -> &'static str {
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?"
    }

    fn has_column_sql(&self) -> &'static str {
        "SELECT count(*) FROM pragma_table_info(?) WHERE name = ?"
    }

    fn has_index_sql(&self) -> &'static str {
        "SELECT count(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = ? AND name = ?"
    }

    fn current_database_sql(&self) -> &'static str {
        "SELECT name FROM pragma_database_list WHERE seq = 0"
    }

    fn alter_column_sql(&self, _table: &str, _column: &str, _column_type: &str) -> Option<String> {
        None
    }

    fn supports_alter_constraints(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_without_limit() {
        assert_eq!(SQLiteDialect::new().limit_syntax(None, Some(5)), " LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_cannot_alter_columns() {
        assert!(SQLiteDialect::new().alter_column_sql("t", "c", "TEXT").is_none());
    }
}
