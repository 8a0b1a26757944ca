//! MySQL-specific type converter implementation

use super::converter::{ConversionUtils, DatabaseBackend, TypeConverter};
use super::value::SqlValue;
use crate::database::adapter::Row;
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

/// MySQL type converter
#[derive(Clone, Default)]
pub struct MySqlTypeConverter;

impl MySqlTypeConverter {
    /// Create a new MySQL type converter
    pub fn new() -> Self {
        MySqlTypeConverter
    }

    /// Extract a boolean value from MySQL
    ///
    /// BOOLEAN is an alias of TINYINT(1); newer drivers decode it as bool,
    /// older schemas hand back the integer.
    fn extract_boolean(row: &MySqlRow, index: usize) -> Result<SqlValue> {
        if let Ok(val) = row.try_get::<bool, _>(index) {
            return Ok(SqlValue::Bool(val));
        }

        if let Ok(val) = row.try_get::<i8, _>(index) {
            return Ok(SqlValue::Bool(val != 0));
        }

        log::warn!("Could not extract BOOLEAN at index {}, defaulting to false", index);
        Ok(SqlValue::Bool(false))
    }

    /// Extract a timestamp/datetime value from MySQL
    fn extract_datetime(row: &MySqlRow, index: usize, column_name: &str) -> Result<SqlValue> {
        // TIMESTAMP
        if let Ok(dt) = row.try_get::<DateTime<Utc>, _>(index) {
            return Ok(SqlValue::DateTime(dt.to_rfc3339()));
        }

        // DATETIME
        if let Ok(ndt) = row.try_get::<NaiveDateTime, _>(index) {
            let dt = DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc);
            return Ok(SqlValue::DateTime(dt.to_rfc3339()));
        }

        if let Ok(s) = row.try_get::<String, _>(index) {
            let normalized = ConversionUtils::normalize_timestamp(&s).unwrap_or(s);
            return Ok(SqlValue::DateTime(normalized));
        }

        Err(Error::database_query(format!(
            "Failed to extract datetime from column '{}'",
            column_name
        )))
    }

    fn extract_decimal(row: &MySqlRow, index: usize, column_name: &str) -> Result<SqlValue> {
        #[cfg(feature = "decimal")]
        {
            if let Ok(d) = row.try_get::<rust_decimal::Decimal, _>(index) {
                return Ok(SqlValue::Decimal(d));
            }
        }

        if let Ok(s) = row.try_get_unchecked::<String, _>(index) {
            #[cfg(feature = "decimal")]
            {
                if let Ok(d) = s.parse::<rust_decimal::Decimal>() {
                    return Ok(SqlValue::Decimal(d));
                }
                return Ok(SqlValue::String(s));
            }
            #[cfg(not(feature = "decimal"))]
            return Ok(SqlValue::Decimal(s));
        }

        Err(Error::database_query(format!(
            "Failed to extract decimal from column '{}'",
            column_name
        )))
    }

    /// Bind a SqlValue to a MySQL query
    pub fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
        value: SqlValue,
    ) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
        match value {
            SqlValue::Null | SqlValue::Default => query.bind(None::<i64>),
            SqlValue::Bool(b) => query.bind(b),

            SqlValue::TinyInt(i) => query.bind(i),
            SqlValue::SmallInt(i) => query.bind(i),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::BigInt(i) => query.bind(i),

            // MySQL has native unsigned integers
            SqlValue::UnsignedTinyInt(i) => query.bind(i),
            SqlValue::UnsignedSmallInt(i) => query.bind(i),
            SqlValue::UnsignedInt(i) => query.bind(i),
            SqlValue::UnsignedBigInt(i) => query.bind(i),

            SqlValue::Float(f) => query.bind(f),
            SqlValue::Double(f) => query.bind(f),
            #[cfg(feature = "decimal")]
            SqlValue::Decimal(d) => query.bind(d),
            #[cfg(not(feature = "decimal"))]
            SqlValue::Decimal(s) => query.bind(s),

            SqlValue::String(s) | SqlValue::Text(s) | SqlValue::Uuid(s) => query.bind(s),
            SqlValue::Bytes(b) => query.bind(b),
            SqlValue::Json(j) => query.bind(j),

            SqlValue::Date(s) => {
                if let Ok(date) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                    query.bind(date)
                } else {
                    query.bind(s)
                }
            }
            SqlValue::Time(s) => {
                if let Ok(time) = NaiveTime::parse_from_str(&s, "%H:%M:%S%.f") {
                    query.bind(time)
                } else {
                    query.bind(s)
                }
            }
            SqlValue::DateTime(s) => {
                // DATETIME columns take naive values; strip the offset
                if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                    query.bind(dt.with_timezone(&Utc).naive_utc())
                } else {
                    query.bind(s)
                }
            }
        }
    }
}

impl TypeConverter for MySqlTypeConverter {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::MySQL
    }

    fn extract_column_value(
        &self,
        row: &dyn std::any::Any,
        column_index: usize,
    ) -> Result<SqlValue> {
        let mysql_row: &MySqlRow = ConversionUtils::downcast_row(row, "MySQL")?;

        let column = mysql_row.columns().get(column_index).ok_or_else(|| {
            Error::database_query(format!("Column index {} out of bounds", column_index))
        })?;
        let column_name = column.name();
        let type_name = column.type_info().name();

        if mysql_row
            .try_get_raw(column_index)
            .map_err(|e| {
                Error::database_query(format!(
                    "Failed to get raw value at column {}: {}",
                    column_index, e
                ))
            })?
            .is_null()
        {
            return Ok(SqlValue::Null);
        }

        let failed = |e: sqlx::Error| {
            Error::database_query(format!("Failed to extract column '{}': {}", column_name, e))
        };

        match type_name {
            "BOOLEAN" | "BOOL" => Self::extract_boolean(mysql_row, column_index),
            "TINYINT" => Ok(SqlValue::TinyInt(mysql_row.try_get(column_index).map_err(failed)?)),
            "SMALLINT" => Ok(SqlValue::SmallInt(mysql_row.try_get(column_index).map_err(failed)?)),
            "MEDIUMINT" | "INT" | "INTEGER" => {
                Ok(SqlValue::Int(mysql_row.try_get(column_index).map_err(failed)?))
            }
            "BIGINT" => Ok(SqlValue::BigInt(mysql_row.try_get(column_index).map_err(failed)?)),
            "TINYINT UNSIGNED" => Ok(SqlValue::UnsignedTinyInt(
                mysql_row.try_get(column_index).map_err(failed)?,
            )),
            "SMALLINT UNSIGNED" => Ok(SqlValue::UnsignedSmallInt(
                mysql_row.try_get(column_index).map_err(failed)?,
            )),
            "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => Ok(SqlValue::UnsignedInt(
                mysql_row.try_get(column_index).map_err(failed)?,
            )),
            "BIGINT UNSIGNED" => Ok(SqlValue::UnsignedBigInt(
                mysql_row.try_get(column_index).map_err(failed)?,
            )),
            "FLOAT" => Ok(SqlValue::Float(mysql_row.try_get(column_index).map_err(failed)?)),
            "DOUBLE" | "REAL" => Ok(SqlValue::Double(mysql_row.try_get(column_index).map_err(failed)?)),
            "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" => Ok(SqlValue::String(
                mysql_row.try_get_unchecked(column_index).map_err(failed)?,
            )),
            "JSON" => {
                let val: JsonValue = mysql_row.try_get(column_index).map_err(failed)?;
                Ok(SqlValue::Json(val))
            }
            "DATE" => {
                let date: NaiveDate = mysql_row.try_get(column_index).map_err(failed)?;
                Ok(SqlValue::Date(date.to_string()))
            }
            "TIME" => {
                let time: NaiveTime = mysql_row.try_get(column_index).map_err(failed)?;
                Ok(SqlValue::Time(time.to_string()))
            }
            "DATETIME" | "TIMESTAMP" => {
                Self::extract_datetime(mysql_row, column_index, column_name)
            }
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                Ok(SqlValue::Bytes(mysql_row.try_get(column_index).map_err(failed)?))
            }
            "DECIMAL" | "NUMERIC" => Self::extract_decimal(mysql_row, column_index, column_name),
            _ => {
                if let Ok(val) = mysql_row.try_get_unchecked::<String, _>(column_index) {
                    return Ok(SqlValue::String(val));
                }

                log::error!(
                    "Failed to extract value for column '{}' with type '{}'",
                    column_name,
                    type_name
                );
                Err(Error::database_query(format!(
                    "Unsupported MySQL type '{}' for column '{}'",
                    type_name, column_name
                )))
            }
        }
    }

    fn convert_row(&self, row: &dyn std::any::Any) -> Result<Row> {
        let mysql_row: &MySqlRow = ConversionUtils::downcast_row(row, "MySQL")?;

        let columns: Vec<String> = mysql_row
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
        let mysql_row: &MySqlRow = ConversionUtils::downcast_row(row, "MySQL")?;

        Ok(mysql_row
            .try_get_raw(column_index)
            .map(|raw| raw.is_null())
            .unwrap_or(true))
    }

    fn parameter_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}
