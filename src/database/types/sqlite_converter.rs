//! SQLite-specific type converter implementation

use super::converter::{ConversionUtils, DatabaseBackend, TypeConverter};
use super::value::SqlValue;
use crate::database::adapter::Row;
use crate::error::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

/// SQLite type converter
#[derive(Clone, Default)]
pub struct SqliteTypeConverter;

impl SqliteTypeConverter {
    /// Create a new SQLite type converter
    pub fn new() -> Self {
        SqliteTypeConverter
    }

    /// Extract a value using the storage class of the stored value
    ///
    /// SQLite is dynamically typed: a column declared INTEGER may hold text,
    /// and expressions like `COUNT(*)` have no declared type at all. The
    /// declared type is only consulted to recover booleans and timestamps.
    fn extract_by_storage_class(
        row: &SqliteRow,
        index: usize,
        storage_class: &str,
        declared_type: &str,
    ) -> Result<SqlValue> {
        let declared = declared_type.to_uppercase();
        let failed =
            |e: sqlx::Error| Error::database_query(format!("SQLite column {}: {}", index, e));

        match storage_class {
            "NULL" => Ok(SqlValue::Null),
            "INTEGER" => {
                let val: i64 = row.try_get_unchecked(index).map_err(failed)?;
                if declared.contains("BOOL") {
                    Ok(SqlValue::Bool(val != 0))
                } else {
                    Ok(SqlValue::BigInt(val))
                }
            }
            "REAL" => {
                let val: f64 = row.try_get_unchecked(index).map_err(failed)?;
                Ok(SqlValue::Double(val))
            }
            "BLOB" => {
                let val: Vec<u8> = row.try_get_unchecked(index).map_err(failed)?;
                Ok(SqlValue::Bytes(val))
            }
            _ => {
                let val: String = row.try_get_unchecked(index).map_err(failed)?;
                if declared.contains("DATE") || declared.contains("TIME") {
                    if let Some(ts) = ConversionUtils::normalize_timestamp(&val) {
                        return Ok(SqlValue::DateTime(ts));
                    }
                }
                if declared.contains("BOOL") {
                    if let Some(b) = ConversionUtils::parse_bool_string(&val) {
                        return Ok(SqlValue::Bool(b));
                    }
                }
                Ok(SqlValue::String(val))
            }
        }
    }

    /// Bind a SqlValue to a SQLite query
    pub fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        value: SqlValue,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match value {
            // DEFAULT never reaches binding; the builder renders it inline
            SqlValue::Null | SqlValue::Default => query.bind(None::<i64>),
            SqlValue::Bool(b) => query.bind(b),

            // Integer types - SQLite stores all as INTEGER
            SqlValue::TinyInt(i) => query.bind(i as i64),
            SqlValue::SmallInt(i) => query.bind(i as i64),
            SqlValue::Int(i) => query.bind(i as i64),
            SqlValue::BigInt(i) => query.bind(i),
            SqlValue::UnsignedTinyInt(i) => query.bind(i as i64),
            SqlValue::UnsignedSmallInt(i) => query.bind(i as i64),
            SqlValue::UnsignedInt(i) => query.bind(i as i64),
            SqlValue::UnsignedBigInt(i) => {
                // SQLite INTEGER is signed 64-bit
                if i > i64::MAX as u64 {
                    query.bind(i.to_string())
                } else {
                    query.bind(i as i64)
                }
            }

            SqlValue::Float(f) => query.bind(f as f64),
            SqlValue::Double(f) => query.bind(f),
            #[cfg(feature = "decimal")]
            SqlValue::Decimal(d) => query.bind(d.to_string()),
            #[cfg(not(feature = "decimal"))]
            SqlValue::Decimal(s) => query.bind(s),

            SqlValue::String(s) | SqlValue::Text(s) => query.bind(s),
            SqlValue::Bytes(b) => query.bind(b),

            // Semantic types are stored as text
            SqlValue::Uuid(s) | SqlValue::Date(s) | SqlValue::Time(s) | SqlValue::DateTime(s) => {
                query.bind(s)
            }
            SqlValue::Json(j) => query.bind(j.to_string()),
        }
    }
}

impl TypeConverter for SqliteTypeConverter {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::SQLite
    }

    fn extract_column_value(
        &self,
        row: &dyn std::any::Any,
        column_index: usize,
    ) -> Result<SqlValue> {
        let sqlite_row: &SqliteRow = ConversionUtils::downcast_row(row, "SQLite")?;

        let column = sqlite_row.columns().get(column_index).ok_or_else(|| {
            Error::database_query(format!("Column index {} out of bounds", column_index))
        })?;
        let declared_type = column.type_info().name().to_string();

        let raw = sqlite_row.try_get_raw(column_index).map_err(|e| {
            Error::database_query(format!(
                "Failed to get raw value at column {}: {}",
                column_index, e
            ))
        })?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let storage_class = raw.type_info().name().to_string();

        Self::extract_by_storage_class(sqlite_row, column_index, &storage_class, &declared_type)
    }

    fn convert_row(&self, row: &dyn std::any::Any) -> Result<Row> {
        let sqlite_row: &SqliteRow = ConversionUtils::downcast_row(row, "SQLite")?;

        let columns: Vec<String> = sqlite_row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let values = (0..columns.len())
            .map(|i| self.extract_column_value(row, i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Row::new(columns, values))
    }

    fn is_null(&self, row: &dyn std::any::Any, column_index: usize) -> Result<bool> {
        let sqlite_row: &SqliteRow = ConversionUtils::downcast_row(row, "SQLite")?;

        Ok(sqlite_row
            .try_get_raw(column_index)
            .map(|raw| raw.is_null())
            .unwrap_or(true))
    }

    fn parameter_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}
