//! SQL Server dialect
//!
//! Used for statement rendering and dialect metadata. sqlx has no SQL
//! Server driver, so nothing built here is ever executed by this crate.

use super::{quote_parts, DatabaseBackend, SqlDialect};
use crate::models::schema::DataType;

#[derive(Debug, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    pub fn new() -> Self {
        Self
    }
}

impl SqlDialect for SqlServerDialect {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::SqlServer
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_parts(identifier, |part| format!("[{}]", part.replace(']', "]]")))
    }

    fn placeholder(&self, position: usize) -> String {
        format!("@p{}", position)
    }

    /// OFFSET/FETCH needs an ORDER BY; the builder supplies one when missing
    fn limit_syntax(&self, limit: Option<i64>, offset: Option<i64>) -> String {
        match (limit, offset) {
            (None, None) => String::new(),
            (limit, offset) => {
                let mut sql = format!(" OFFSET {} ROWS", offset.unwrap_or(0));
                if let Some(limit) = limit {
                    sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
                }
                sql
            }
        }
    }

    fn returning_syntax(&self, _columns: &[String]) -> Option<String> {
        None
    }

    fn current_timestamp(&self) -> &'static str {
        "GETDATE()"
    }

    fn auto_increment_syntax(&self) -> &'static str {
        "BIGINT IDENTITY(1,1) PRIMARY KEY"
    }

    fn boolean_type(&self) -> &'static str {
        "BIT"
    }

    fn column_type(&self, data_type: DataType, size: Option<usize>) -> String {
        match (data_type, size) {
            (DataType::Bool, _) => self.boolean_type().to_string(),
            (DataType::Int, _) => "INT".to_string(),
            (DataType::UInt | DataType::BigInt, _) => "BIGINT".to_string(),
            (DataType::Float, _) => "FLOAT".to_string(),
            (DataType::String, Some(n)) if n > 0 && n <= 4000 => format!("NVARCHAR({})", n),
            (DataType::String, None) => "NVARCHAR(255)".to_string(),
            (DataType::String | DataType::Text | DataType::Json | DataType::Association, _) => {
                "NVARCHAR(MAX)".to_string()
            }
            (DataType::Time, _) => "DATETIMEOFFSET".to_string(),
            (DataType::Bytes, _) => "VARBINARY(MAX)".to_string(),
        }
    }

    fn has_table_sql(&self) -> &'static str {
        "SELECT count(*) FROM INFORMATION_SCHEMA.TABLES WHERE table_name = @p1 AND table_type = 'BASE TABLE'"
    }

    fn has_column_sql(&self) -> &'static str {
        "SELECT count(*) FROM INFORMATION_SCHEMA.COLUMNS WHERE table_name = @p1 AND column_name = @p2"
    }

    fn has_index_sql(&self) -> &'static str {
        "SELECT count(*) FROM sys.indexes WHERE object_id = OBJECT_ID(@p1) AND name = @p2"
    }

    fn current_database_sql(&self) -> &'static str {
        "SELECT DB_NAME()"
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
            "ALTER TABLE {} ALTER COLUMN {} {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            column_type
        ))
    }

    fn rename_column_sql(&self, table: &str, from: &str, to: &str) -> String {
        format!("EXEC sp_rename '{}.{}', '{}', 'COLUMN'", table, from, to)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
