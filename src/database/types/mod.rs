//! Unified type system for database operations
//!
//! This module provides a single point of truth for value conversions
//! across PostgreSQL, MySQL, and SQLite.

pub mod converter;
pub mod mysql_converter;
pub mod postgres_converter;
pub mod sqlite_converter;
pub mod value;

// Re-export the main types
pub use converter::{ConversionUtils, DatabaseBackend, TypeConverter};
pub use mysql_converter::MySqlTypeConverter;
pub use postgres_converter::PostgresTypeConverter;
pub use sqlite_converter::SqliteTypeConverter;
pub use value::SqlValue;

