//! RustF Compat - the legacy chainable ORM API on a modern engine
//!
//! Two layers:
//! - [`session::Session`]: the engine. Immutable query chains, sqlx pools,
//!   explicit `Result` returns, transactions, migrator and associations.
//! - [`compat::DB`]: the legacy facade. Every call returns a new `DB`
//!   carrying `error`, `rows_affected` and `committed`, the way old
//!   callers expect.
//!
//! ```ignore
//! use rustf_compat::prelude::*;
//!
//! let db = open("sqlite3", &["shop.db"]).await?;
//! db.auto_migrate(&[Product::schema()]).await;
//! let mut product = Product::default();
//! if db.first(&mut product, args!["code = ?", "L1212"]).await.record_not_found() {
//!     // ...
//! }
//! ```

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod compat;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod session;

// Re-export main types for public API
pub use compat::{open, open_with_config, DB};
pub use config::OrmConfig;
pub use error::{Error, Result};
pub use models::{Arg, DataType, FieldSchema, Model, ModelSchema, SqlExpr, SqlValue};
pub use session::{Session, TxContext, Values};

// Re-export commonly used external types
pub use serde::{Deserialize, Serialize};
pub use serde_json::{json, Value};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::args;
    pub use crate::compat::{expr, open, open_with_config, Association, TableRef, DB};
    pub use crate::config::OrmConfig;
    pub use crate::error::{Error, Result};
    pub use crate::models::query_builder::columns;
    pub use crate::models::{
        Arg, DataType, FieldSchema, Model, ModelSchema, RelationshipSchema, SqlValue,
    };
    pub use crate::session::{Session, TxContext, Values};
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::json;
}
