//! MySQL/MariaDB dialect implementation
//!
//! This module contains MySQL and MariaDB-specific SQL generation logic,
//! including handling of MySQL's specific syntax and limitations.

use super::{quote_parts, DatabaseBackend, SqlDialect};
use crate::models::schema::DataType;

/// MySQL/MariaDB dialect
#[derive(Debug, Default)]
pub struct MySQLDialect;

impl MySQLDialect {
    /// Create a new MySQL dialect
    pub fn new() -> Self {
        Self
    }
}

impl SqlDialect for MySQLDialect {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::MySQL
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_parts(identifier, |part| format!("`{}`", part.replace('`', "``")))
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn limit_syntax(&self, limit: Option<i64>, offset: Option<i64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            // MySQL requires LIMIT when using OFFSET
            (None, Some(offset)) => format!(" LIMIT 18446744073709551615 OFFSET {}", offset),
            (None, None) => String::new(),
        }
    }

    fn returning_syntax(&self, _columns: &[String]) -> Option<String> {
        None // MySQL doesn't support RETURNING
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn auto_increment_syntax(&self) -> &'static str {
        "BIGINT AUTO_INCREMENT PRIMARY KEY"
    }

    fn boolean_type(&self) -> &'static str {
        "BOOLEAN"
    }

    fn column_type(&self, data_type: DataType, size: Option<usize>) -> String {
        match (data_type, size) {
            (DataType::Bool, _) => self.boolean_type().to_string(),
            (DataType::Int, _) => "INT".to_string(),
            (DataType::UInt, _) => "BIGINT UNSIGNED".to_string(),
            (DataType::BigInt, _) => "BIGINT".to_string(),
            (DataType::Float, _) => "DOUBLE".to_string(),
            (DataType::String, Some(n)) if n > 0 && n < 65536 => format!("VARCHAR({})", n),
            (DataType::String, None) => "VARCHAR(255)".to_string(),
            (DataType::String | DataType::Text | DataType::Association, _) => {
                "LONGTEXT".to_string()
            }
            (DataType::Time, _) => "DATETIME(3)".to_string(),
            (DataType::Bytes, _) => "LONGBLOB".to_string(),
            (DataType::Json, _) => "JSON".to_string(),
        }
    }

    fn has_table_sql(&self) -> &'static str {
        "SELECT count(*) FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_name = ? AND table_type = 'BASE TABLE'"
    }

    fn has_column_sql(&self) -> &'static str {
        "SELECT count(*) FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?"
    }

    fn has_index_sql(&self) -> &'static str {
        "SELECT count(*) FROM information_schema.statistics \
         WHERE table_schema = DATABASE() AND table_name = ? AND index_name = ?"
    }

    fn current_database_sql(&self) -> &'static str {
        "SELECT DATABASE()"
    }

    fn drop_index_sql(&self, table: &str, index: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(index),
            self.quote_identifier(table)
        )
    }

    fn alter_column_sql(&self, table: &str, column: &str, column_type: &str) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} MODIFY COLUMN {} {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            column_type
        ))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
