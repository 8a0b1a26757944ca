//! Database adapter implementations for different database backends

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::{MySqlAdapter, MySqlTransaction};
pub use postgres::{PostgresAdapter, PostgresTransaction};
pub use sqlite::{SqliteAdapter, SqliteTransaction};

use crate::error::{Error, Result};

/// Column names of a statement, read from its prepared form without running it
pub(crate) async fn describe_columns<'c, DB, E>(executor: E, sql: &str) -> Result<Vec<String>>
where
    DB: sqlx::Database,
    E: sqlx::Executor<'c, Database = DB>,
{
    use sqlx::Column;

    let described = executor.describe(sql).await.map_err(Error::from)?;
    Ok(described
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect())
}
