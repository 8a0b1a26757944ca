//! Legacy facade
//!
//! `DB` keeps the call shapes of the old chainable API (results carried
//! on the returned value, loosely typed arguments, dialect objects) and
//! runs everything through the [`Session`](crate::session::Session)
//! engine.

pub mod association;
pub mod convert;
pub mod db;
pub mod dialect;
pub mod expr;
pub mod open;
pub mod rows;
pub mod statement;

pub use association::Association;
pub use convert::{convert_to_int, NumericArg};
pub use db::{ScopeFn, TableRef, DB};
pub use dialect::{build_key_name, CommonDialect, Dialect};
pub use expr::{expr, SqlExpr};
pub use open::{open, open_with_config};
pub use rows::{RowResult, Rows};
pub use statement::{Field, Relationship, RelationshipKind, Statement, StructField};
