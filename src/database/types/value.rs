//! Unified SQL value type for all database operations
//!
//! This module provides the single source of truth for SQL values
//! across all database adapters and the query builder.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Generic SQL value type for parameter binding and result extraction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    // Null
    Null,

    // Default - for INSERT statements to use column's DEFAULT value
    Default,

    // Boolean
    Bool(bool),

    // Integer variants (for precise type mapping)
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),

    // Unsigned integers (important for MySQL)
    UnsignedTinyInt(u8),
    UnsignedSmallInt(u16),
    UnsignedInt(u32),
    UnsignedBigInt(u64),

    // Floating point
    Float(f32),
    Double(f64),
    #[cfg(feature = "decimal")]
    Decimal(rust_decimal::Decimal),
    #[cfg(not(feature = "decimal"))]
    Decimal(String),

    // Text types
    String(String),
    Text(String),

    // Binary
    Bytes(Vec<u8>),

    // Semantic types
    Uuid(String),
    Json(JsonValue),
    Date(String),     // ISO date: "2024-01-15"
    Time(String),     // ISO time: "14:30:00"
    DateTime(String), // RFC 3339 datetime
}

impl SqlValue {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Check if this value is DEFAULT
    pub fn is_default(&self) -> bool {
        matches!(self, SqlValue::Default)
    }

    /// Whether the value is the zero value of its type (0, "", false, NULL)
    ///
    /// Record updates skip zero values and primary keys are considered
    /// unset while zero.
    pub fn is_zero(&self) -> bool {
        match self {
            SqlValue::Null | SqlValue::Default => true,
            SqlValue::Bool(b) => !*b,
            SqlValue::TinyInt(i) => *i == 0,
            SqlValue::SmallInt(i) => *i == 0,
            SqlValue::Int(i) => *i == 0,
            SqlValue::BigInt(i) => *i == 0,
            SqlValue::UnsignedTinyInt(i) => *i == 0,
            SqlValue::UnsignedSmallInt(i) => *i == 0,
            SqlValue::UnsignedInt(i) => *i == 0,
            SqlValue::UnsignedBigInt(i) => *i == 0,
            SqlValue::Float(f) => *f == 0.0,
            SqlValue::Double(f) => *f == 0.0,
            #[cfg(feature = "decimal")]
            SqlValue::Decimal(d) => d.is_zero(),
            #[cfg(not(feature = "decimal"))]
            SqlValue::Decimal(s) => s.is_empty() || s.parse::<f64>().map(|f| f == 0.0).unwrap_or(false),
            SqlValue::String(s)
            | SqlValue::Text(s)
            | SqlValue::Uuid(s)
            | SqlValue::Date(s)
            | SqlValue::Time(s)
            | SqlValue::DateTime(s) => s.is_empty(),
            SqlValue::Bytes(b) => b.is_empty(),
            SqlValue::Json(j) => j.is_null(),
        }
    }

    /// Convert to a boolean if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::String(s) | SqlValue::Text(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Some(true),
                "false" | "f" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
            other => other.as_i64().map(|i| i != 0),
        }
    }

    /// Convert to an i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::TinyInt(i) => Some(*i as i64),
            SqlValue::SmallInt(i) => Some(*i as i64),
            SqlValue::Int(i) => Some(*i as i64),
            SqlValue::BigInt(i) => Some(*i),
            SqlValue::UnsignedTinyInt(i) => Some(*i as i64),
            SqlValue::UnsignedSmallInt(i) => Some(*i as i64),
            SqlValue::UnsignedInt(i) => Some(*i as i64),
            SqlValue::UnsignedBigInt(i) if *i <= i64::MAX as u64 => Some(*i as i64),
            SqlValue::Bool(b) => Some(*b as i64),
            SqlValue::String(s) | SqlValue::Text(s) => s.parse().ok(),
            #[cfg(feature = "decimal")]
            SqlValue::Decimal(d) => {
                use rust_decimal::prelude::ToPrimitive;
                if d.fract().is_zero() {
                    d.to_i64()
                } else {
                    None
                }
            }
            #[cfg(not(feature = "decimal"))]
            SqlValue::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Convert to a String
    pub fn as_string(&self) -> Option<String> {
        match self {
            SqlValue::Null | SqlValue::Default | SqlValue::Bytes(_) => None,
            SqlValue::String(s)
            | SqlValue::Text(s)
            | SqlValue::Uuid(s)
            | SqlValue::Date(s)
            | SqlValue::Time(s)
            | SqlValue::DateTime(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Default => JsonValue::String("DEFAULT".to_string()),
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::TinyInt(i) => JsonValue::Number((*i).into()),
            SqlValue::SmallInt(i) => JsonValue::Number((*i).into()),
            SqlValue::Int(i) => JsonValue::Number((*i).into()),
            SqlValue::BigInt(i) => JsonValue::Number((*i).into()),
            SqlValue::UnsignedTinyInt(i) => JsonValue::Number((*i).into()),
            SqlValue::UnsignedSmallInt(i) => JsonValue::Number((*i).into()),
            SqlValue::UnsignedInt(i) => JsonValue::Number((*i).into()),
            SqlValue::UnsignedBigInt(i) => JsonValue::Number((*i).into()),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f as f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::Double(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            #[cfg(feature = "decimal")]
            SqlValue::Decimal(d) => JsonValue::String(d.to_string()),
            #[cfg(not(feature = "decimal"))]
            SqlValue::Decimal(s) => JsonValue::String(s.clone()),
            SqlValue::String(s) | SqlValue::Text(s) | SqlValue::Uuid(s) => {
                JsonValue::String(s.clone())
            }
            SqlValue::Date(s) | SqlValue::Time(s) | SqlValue::DateTime(s) => {
                JsonValue::String(s.clone())
            }
            SqlValue::Json(j) => j.clone(),
            SqlValue::Bytes(bytes) => JsonValue::String(base64_encode(bytes)),
        }
    }

    /// Best-effort conversion from an untyped JSON value
    pub fn from_json(value: &JsonValue) -> SqlValue {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::BigInt(i)
                } else if let Some(u) = n.as_u64() {
                    SqlValue::UnsignedBigInt(u)
                } else {
                    SqlValue::Double(n.as_f64().unwrap_or_default())
                }
            }
            JsonValue::String(s) => SqlValue::String(s.clone()),
            other => SqlValue::Json(other.clone()),
        }
    }

    /// Convert to SQL literal representation (for logging and dry runs, not binding)
    pub fn to_sql_string(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Default => "DEFAULT".to_string(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::String(s) | SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Bytes(bytes) => format!("X'{}'", hex_encode(bytes)),
            SqlValue::Uuid(s) | SqlValue::Date(s) | SqlValue::Time(s) | SqlValue::DateTime(s) => {
                format!("'{}'", s)
            }
            SqlValue::Json(json) => format!("'{}'", json.to_string().replace('\'', "''")),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Default => write!(f, "DEFAULT"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::TinyInt(i) => write!(f, "{}", i),
            SqlValue::SmallInt(i) => write!(f, "{}", i),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::BigInt(i) => write!(f, "{}", i),
            SqlValue::UnsignedTinyInt(i) => write!(f, "{}", i),
            SqlValue::UnsignedSmallInt(i) => write!(f, "{}", i),
            SqlValue::UnsignedInt(i) => write!(f, "{}", i),
            SqlValue::UnsignedBigInt(i) => write!(f, "{}", i),
            SqlValue::Float(fl) => write!(f, "{}", fl),
            SqlValue::Double(d) => write!(f, "{}", d),
            #[cfg(feature = "decimal")]
            SqlValue::Decimal(d) => write!(f, "{}", d),
            #[cfg(not(feature = "decimal"))]
            SqlValue::Decimal(s) => write!(f, "{}", s),
            SqlValue::String(s) | SqlValue::Text(s) | SqlValue::Uuid(s) => write!(f, "{}", s),
            SqlValue::Date(s) | SqlValue::Time(s) | SqlValue::DateTime(s) => write!(f, "{}", s),
            SqlValue::Json(j) => write!(f, "{}", j),
            SqlValue::Bytes(b) => write!(f, "<binary:{} bytes>", b.len()),
        }
    }
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

macro_rules! sql_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(v)
                }
            }

            impl From<&$ty> for SqlValue {
                fn from(v: &$ty) -> Self {
                    SqlValue::$variant(v.clone())
                }
            }
        )*
    };
}

sql_value_from! {
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u8 => UnsignedTinyInt,
    u16 => UnsignedSmallInt,
    u32 => UnsignedInt,
    u64 => UnsignedBigInt,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<u8> => Bytes,
    JsonValue => Json,
}

impl From<isize> for SqlValue {
    fn from(v: isize) -> Self {
        SqlValue::BigInt(v as i64)
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        SqlValue::UnsignedBigInt(v as u64)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::String(s.to_string())
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => SqlValue::Null,
        }
    }
}

// Date/Time type conversions
impl From<chrono::DateTime<chrono::Utc>> for SqlValue {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        SqlValue::DateTime(dt.to_rfc3339())
    }
}

impl From<chrono::NaiveDate> for SqlValue {
    fn from(date: chrono::NaiveDate) -> Self {
        SqlValue::Date(date.to_string())
    }
}

impl From<chrono::NaiveTime> for SqlValue {
    fn from(time: chrono::NaiveTime) -> Self {
        SqlValue::Time(time.to_string())
    }
}

impl From<chrono::NaiveDateTime> for SqlValue {
    fn from(dt: chrono::NaiveDateTime) -> Self {
        let utc_dt = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc);
        SqlValue::DateTime(utc_dt.to_rfc3339())
    }
}

#[cfg(feature = "uuid")]
impl From<uuid::Uuid> for SqlValue {
    fn from(uuid: uuid::Uuid) -> Self {
        SqlValue::Uuid(uuid.to_string())
    }
}

#[cfg(feature = "decimal")]
impl From<rust_decimal::Decimal> for SqlValue {
    fn from(d: rust_decimal::Decimal) -> Self {
        SqlValue::Decimal(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values() {
        assert!(SqlValue::from(0u32).is_zero());
        assert!(SqlValue::from("").is_zero());
        assert!(SqlValue::from(false).is_zero());
        assert!(SqlValue::Null.is_zero());
        assert!(!SqlValue::from(7i64).is_zero());
        assert!(!SqlValue::from("x").is_zero());
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(SqlValue::from_json(&serde_json::json!(42)), SqlValue::BigInt(42));
        assert_eq!(
            SqlValue::from_json(&serde_json::json!(u64::MAX)),
            SqlValue::UnsignedBigInt(u64::MAX)
        );
        assert_eq!(SqlValue::from_json(&serde_json::json!(1.5)), SqlValue::Double(1.5));
    }

    #[test]
    fn test_sql_string_escapes_quotes() {
        assert_eq!(SqlValue::from("O'Brien").to_sql_string(), "'O''Brien'");
        assert_eq!(SqlValue::Null.to_sql_string(), "NULL");
    }

    #[test]
    fn test_reference_conversions() {
        let name = String::from("test");
        assert_eq!(SqlValue::from(&name), SqlValue::String("test".into()));
        assert_eq!(SqlValue::from(&7i32), SqlValue::Int(7));
        assert_eq!(SqlValue::from(Some(3u8)), SqlValue::UnsignedTinyInt(3));
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
    }
}
