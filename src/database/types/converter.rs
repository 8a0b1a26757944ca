//! Type conversion trait and base utilities
//!
//! Every backend converter turns a driver row into the positional `Row`
//! used by the engine, and binds `SqlValue` parameters onto sqlx queries.

use super::value::SqlValue;
use crate::database::adapter::Row;
use crate::error::{Error, Result};

pub use crate::models::query_builder::DatabaseBackend;

/// Trait for database-specific type conversion
///
/// Each database adapter implements this trait to handle its specific
/// type conversion requirements while maintaining a unified interface.
pub trait TypeConverter: Send + Sync {
    /// Get the database backend this converter is for
    fn backend(&self) -> DatabaseBackend;

    /// Extract a column value from a database row and convert to SqlValue
    fn extract_column_value(&self, row: &dyn std::any::Any, column_index: usize)
        -> Result<SqlValue>;

    /// Convert a driver row into column names plus positional values
    fn convert_row(&self, row: &dyn std::any::Any) -> Result<Row>;

    /// Check if a value is NULL in the database-specific way
    fn is_null(&self, row: &dyn std::any::Any, column_index: usize) -> Result<bool>;

    /// Get the parameter placeholder for this database (e.g., $1 for Postgres, ? for MySQL)
    fn parameter_placeholder(&self, index: usize) -> String;
}

/// Common conversion utilities used by all database converters
pub struct ConversionUtils;

impl ConversionUtils {
    /// Parse a boolean from various string representations
    pub fn parse_bool_string(s: &str) -> Option<bool> {
        match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        }
    }

    /// Normalise a stored timestamp to RFC 3339
    ///
    /// SQLite and MySQL hand timestamps back as text in whatever layout they
    /// were written; records deserialize more reliably from one format.
    pub fn normalize_timestamp(s: &str) -> Option<String> {
        use chrono::{DateTime, NaiveDateTime, Utc};

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc).to_rfc3339());
        }

        for layout in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(s, layout) {
                return Some(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc).to_rfc3339());
            }
        }

        None
    }

    /// Downcast helper shared by the converters
    pub fn downcast_row<'a, R: 'static>(row: &'a dyn std::any::Any, backend: &str) -> Result<&'a R> {
        row.downcast_ref::<R>().ok_or_else(|| {
            Error::database_query(format!("Invalid row type for {} converter", backend))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_string() {
        assert_eq!(ConversionUtils::parse_bool_string("Yes"), Some(true));
        assert_eq!(ConversionUtils::parse_bool_string("f"), Some(false));
        assert_eq!(ConversionUtils::parse_bool_string("maybe"), None);
    }

    #[test]
    fn test_normalize_timestamp_layouts() {
        assert_eq!(
            ConversionUtils::normalize_timestamp("2024-01-15 14:30:00").as_deref(),
            Some("2024-01-15T14:30:00+00:00")
        );
        assert_eq!(
            ConversionUtils::normalize_timestamp("2024-01-15T14:30:00+02:00").as_deref(),
            Some("2024-01-15T12:30:00+00:00")
        );
        assert!(ConversionUtils::normalize_timestamp("yesterday").is_none());
    }
}
