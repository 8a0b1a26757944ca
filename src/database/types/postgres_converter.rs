//! PostgreSQL-specific type converter implementation

use super::converter::{ConversionUtils, DatabaseBackend, TypeConverter};
use super::value::SqlValue;
use crate::database::adapter::Row;
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

/// PostgreSQL type converter
#[derive(Clone, Default)]
pub struct PostgresTypeConverter;

impl PostgresTypeConverter {
    /// Create a new PostgreSQL type converter
    pub fn new() -> Self {
        PostgresTypeConverter
    }

    /// Extract a boolean value from PostgreSQL
    ///
    /// Views and casts sometimes hand back 't'/'f' text instead of BOOL.
    fn extract_boolean(row: &PgRow, index: usize, column_name: &str) -> Result<SqlValue> {
        if let Ok(val) = row.try_get::<bool, _>(index) {
            return Ok(SqlValue::Bool(val));
        }

        if let Ok(s) = row.try_get::<String, _>(index) {
            if let Some(b) = ConversionUtils::parse_bool_string(&s) {
                return Ok(SqlValue::Bool(b));
            }
            log::warn!("Unexpected boolean value '{}' for column '{}'", s, column_name);
        }

        if let Ok(i) = row.try_get::<i32, _>(index) {
            return Ok(SqlValue::Bool(i != 0));
        }

        log::error!("Failed to extract boolean value for column '{}'", column_name);
        Ok(SqlValue::Null)
    }

    /// Extract a timestamp value from PostgreSQL
    /// Note: This is only called for non-NULL values
    fn extract_timestamp(row: &PgRow, index: usize, column_name: &str) -> Result<SqlValue> {
        // TIMESTAMPTZ
        if let Ok(dt) = row.try_get::<DateTime<Utc>, _>(index) {
            return Ok(SqlValue::DateTime(dt.to_rfc3339()));
        }

        // TIMESTAMP
        if let Ok(ndt) = row.try_get::<NaiveDateTime, _>(index) {
            let dt = DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc);
            return Ok(SqlValue::DateTime(dt.to_rfc3339()));
        }

        if let Ok(s) = row.try_get::<String, _>(index) {
            return Ok(SqlValue::DateTime(s));
        }

        Err(Error::database_query(format!(
            "Failed to extract timestamp from column '{}'",
            column_name
        )))
    }

    fn extract_numeric(row: &PgRow, index: usize, column_name: &str) -> Result<SqlValue> {
        #[cfg(feature = "decimal")]
        {
            if let Ok(d) = row.try_get::<rust_decimal::Decimal, _>(index) {
                return Ok(SqlValue::Decimal(d));
            }
        }

        if let Ok(f) = row.try_get::<f64, _>(index) {
            return Ok(SqlValue::Double(f));
        }

        if let Ok(s) = row.try_get::<String, _>(index) {
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
            "Failed to extract numeric from column '{}'",
            column_name
        )))
    }

    /// Bind a SqlValue to a PostgreSQL query
    pub fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        value: SqlValue,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        match value {
            // PostgreSQL requires typed NULLs; bytea casts implicitly
            SqlValue::Null | SqlValue::Default => query.bind(None::<Vec<u8>>),
            SqlValue::Bool(b) => query.bind(b),

            // PostgreSQL has no TINYINT
            SqlValue::TinyInt(i) => query.bind(i as i16),
            SqlValue::SmallInt(i) => query.bind(i),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::BigInt(i) => query.bind(i),

            // No unsigned types, upcast to the next signed width
            SqlValue::UnsignedTinyInt(i) => query.bind(i as i16),
            SqlValue::UnsignedSmallInt(i) => query.bind(i as i32),
            SqlValue::UnsignedInt(i) => query.bind(i as i64),
            SqlValue::UnsignedBigInt(i) => {
                if i > i64::MAX as u64 {
                    query.bind(i.to_string())
                } else {
                    query.bind(i as i64)
                }
            }

            SqlValue::Float(f) => query.bind(f),
            SqlValue::Double(f) => query.bind(f),
            #[cfg(feature = "decimal")]
            SqlValue::Decimal(d) => query.bind(d),
            #[cfg(not(feature = "decimal"))]
            SqlValue::Decimal(s) => {
                if let Ok(parsed) = s.parse::<f64>() {
                    query.bind(parsed)
                } else {
                    query.bind(s)
                }
            }

            SqlValue::String(s) | SqlValue::Text(s) => query.bind(s),
            SqlValue::Bytes(b) => query.bind(b),

            SqlValue::Uuid(s) => {
                if let Ok(uuid) = sqlx::types::Uuid::parse_str(&s) {
                    query.bind(uuid)
                } else {
                    query.bind(s)
                }
            }
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
                if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                    query.bind(dt.with_timezone(&Utc))
                } else if let Ok(ndt) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
                    query.bind(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
                } else {
                    query.bind(s)
                }
            }
        }
    }
}

impl TypeConverter for PostgresTypeConverter {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    fn extract_column_value(
        &self,
        row: &dyn std::any::Any,
        column_index: usize,
    ) -> Result<SqlValue> {
        let pg_row: &PgRow = ConversionUtils::downcast_row(row, "PostgreSQL")?;

        let column = pg_row.columns().get(column_index).ok_or_else(|| {
            Error::database_query(format!("Column index {} out of bounds", column_index))
        })?;
        let column_name = column.name();
        let type_name = column.type_info().name();

        if pg_row
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
            "BOOL" => Self::extract_boolean(pg_row, column_index, column_name),
            "INT2" => Ok(SqlValue::SmallInt(pg_row.try_get(column_index).map_err(failed)?)),
            "INT4" => Ok(SqlValue::Int(pg_row.try_get(column_index).map_err(failed)?)),
            "INT8" => Ok(SqlValue::BigInt(pg_row.try_get(column_index).map_err(failed)?)),
            "FLOAT4" => Ok(SqlValue::Float(pg_row.try_get(column_index).map_err(failed)?)),
            "FLOAT8" => Ok(SqlValue::Double(pg_row.try_get(column_index).map_err(failed)?)),
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
                Ok(SqlValue::String(pg_row.try_get(column_index).map_err(failed)?))
            }
            "JSON" | "JSONB" => {
                let val: JsonValue = pg_row.try_get(column_index).map_err(failed)?;
                Ok(SqlValue::Json(val))
            }
            "TIMESTAMP" | "TIMESTAMPTZ" => Self::extract_timestamp(pg_row, column_index, column_name),
            "DATE" => {
                let date: NaiveDate = pg_row.try_get(column_index).map_err(failed)?;
                Ok(SqlValue::Date(date.to_string()))
            }
            "TIME" => {
                let time: NaiveTime = pg_row.try_get(column_index).map_err(failed)?;
                Ok(SqlValue::Time(time.to_string()))
            }
            "UUID" => {
                let uuid: sqlx::types::Uuid = pg_row.try_get(column_index).map_err(failed)?;
                Ok(SqlValue::Uuid(uuid.to_string()))
            }
            "BYTEA" => Ok(SqlValue::Bytes(pg_row.try_get(column_index).map_err(failed)?)),
            "NUMERIC" => Self::extract_numeric(pg_row, column_index, column_name),
            _ => {
                // Enums and other custom types come back as text
                if let Ok(val) = pg_row.try_get_unchecked::<String, _>(column_index) {
                    return Ok(SqlValue::String(val));
                }

                log::error!(
                    "Failed to extract value for column '{}' with type '{}'",
                    column_name,
                    type_name
                );
                Err(Error::database_query(format!(
                    "Unsupported PostgreSQL type '{}' for column '{}'",
                    type_name, column_name
                )))
            }
        }
    }

    fn convert_row(&self, row: &dyn std::any::Any) -> Result<Row> {
        let pg_row: &PgRow = ConversionUtils::downcast_row(row, "PostgreSQL")?;

        let columns: Vec<String> = pg_row
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
        let pg_row: &PgRow = ConversionUtils::downcast_row(row, "PostgreSQL")?;

        Ok(pg_row
            .try_get_raw(column_index)
            .map(|raw| raw.is_null())
            .unwrap_or(true))
    }

    fn parameter_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }
}
