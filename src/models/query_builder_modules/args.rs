//! Argument shapes for conditions and raw SQL
//!
//! Legacy callers pass loosely typed arguments (a value, a list of values,
//! a column map or a nested expression). `Arg` closes that set so the
//! builder can dispatch on shape without runtime type inspection.

use crate::database::types::SqlValue;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// One argument of a condition or raw statement
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Scalar(SqlValue),
    /// Expanded to a parenthesized list
    Slice(Vec<SqlValue>),
    /// Inlined SQL fragment with its own arguments
    Expr(SqlExpr),
    /// Column/value pairs, ANDed together as equalities
    Columns(IndexMap<String, SqlValue>),
}

impl Arg {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Arg::Scalar(_))
    }

    /// The scalar's text when it is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Scalar(SqlValue::String(s)) | Arg::Scalar(SqlValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}

/// A raw SQL fragment with `?` placeholders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlExpr {
    pub sql: String,
    pub args: Vec<Arg>,
}

impl SqlExpr {
    pub fn new(sql: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Build a column map argument
pub fn columns<K, V, I>(pairs: I) -> Arg
where
    K: Into<String>,
    V: Into<SqlValue>,
    I: IntoIterator<Item = (K, V)>,
{
    Arg::Columns(
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

/// `From` for scalars plus vectors and slices of them
macro_rules! arg_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(v: $ty) -> Self {
                    Arg::Scalar(v.into())
                }
            }

            impl From<&$ty> for Arg {
                fn from(v: &$ty) -> Self {
                    Arg::Scalar(v.clone().into())
                }
            }

            impl From<Vec<$ty>> for Arg {
                fn from(v: Vec<$ty>) -> Self {
                    Arg::Slice(v.into_iter().map(SqlValue::from).collect())
                }
            }

            impl From<&[$ty]> for Arg {
                fn from(v: &[$ty]) -> Self {
                    Arg::Slice(v.iter().cloned().map(SqlValue::from).collect())
                }
            }

            impl From<Option<$ty>> for Arg {
                fn from(v: Option<$ty>) -> Self {
                    Arg::Scalar(v.into())
                }
            }
        )*
    };
}

arg_from!(
    bool,
    i8,
    i16,
    i32,
    i64,
    isize,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    String,
    chrono::DateTime<chrono::Utc>,
    chrono::NaiveDate,
    chrono::NaiveDateTime,
);

#[cfg(feature = "uuid")]
arg_from!(uuid::Uuid);

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Scalar(v.into())
    }
}

impl From<Vec<&str>> for Arg {
    fn from(v: Vec<&str>) -> Self {
        Arg::Slice(v.into_iter().map(SqlValue::from).collect())
    }
}

impl From<&[&str]> for Arg {
    fn from(v: &[&str]) -> Self {
        Arg::Slice(v.iter().map(|s| SqlValue::from(*s)).collect())
    }
}

impl From<u8> for Arg {
    fn from(v: u8) -> Self {
        Arg::Scalar(v.into())
    }
}

/// Bytes bind as one binary value
impl From<Vec<u8>> for Arg {
    fn from(v: Vec<u8>) -> Self {
        Arg::Scalar(SqlValue::Bytes(v))
    }
}

impl From<JsonValue> for Arg {
    fn from(v: JsonValue) -> Self {
        Arg::Scalar(SqlValue::Json(v))
    }
}

impl From<SqlValue> for Arg {
    fn from(v: SqlValue) -> Self {
        Arg::Scalar(v)
    }
}

impl From<Vec<SqlValue>> for Arg {
    fn from(v: Vec<SqlValue>) -> Self {
        Arg::Slice(v)
    }
}

impl From<SqlExpr> for Arg {
    fn from(v: SqlExpr) -> Self {
        Arg::Expr(v)
    }
}

impl From<IndexMap<String, SqlValue>> for Arg {
    fn from(v: IndexMap<String, SqlValue>) -> Self {
        Arg::Columns(v)
    }
}

/// Keys are sorted so the generated SQL is stable
impl From<HashMap<String, SqlValue>> for Arg {
    fn from(v: HashMap<String, SqlValue>) -> Self {
        let mut pairs: Vec<(String, SqlValue)> = v.into_iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Arg::Columns(pairs.into_iter().collect())
    }
}

/// Build a `Vec<Arg>` from heterogeneous values
///
/// ```ignore
/// db.where_("name = ? AND id IN (?)", args!["a", vec![1, 2]]);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::models::query_builder::Arg>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::models::query_builder::Arg::from($value)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_and_slice_shapes() {
        assert_eq!(Arg::from(5), Arg::Scalar(SqlValue::Int(5)));
        assert_eq!(Arg::from("x").as_str(), Some("x"));
        assert_eq!(
            Arg::from(vec![1i64, 2]),
            Arg::Slice(vec![SqlValue::BigInt(1), SqlValue::BigInt(2)])
        );
        assert_eq!(Arg::from(vec![1u8, 2]), Arg::Scalar(SqlValue::Bytes(vec![1, 2])));
        assert_eq!(Arg::from(None::<i32>), Arg::Scalar(SqlValue::Null));
    }

    #[test]
    fn test_hash_map_columns_are_sorted() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), SqlValue::Int(2));
        map.insert("a".to_string(), SqlValue::Int(1));
        let Arg::Columns(cols) = Arg::from(map) else {
            panic!("expected columns");
        };
        assert_eq!(cols.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_args_macro() {
        let args = crate::args!["name", vec![1, 2], SqlExpr::raw("NOW()")];
        assert_eq!(args.len(), 3);
        assert!(matches!(args[1], Arg::Slice(_)));
        assert!(matches!(args[2], Arg::Expr(_)));
        assert!(crate::args![].is_empty());
    }
}
