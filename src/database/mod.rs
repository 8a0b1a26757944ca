//! Connection layer
//!
//! Adapters for the sqlx backends, the unified value type and pool
//! configuration. `connect` picks the adapter from the URL scheme.

pub mod adapter;
pub mod adapters;
pub mod config;
pub mod types;

use crate::error::{Error, Result};
use crate::models::query_builder::DatabaseBackend;
use std::sync::Arc;

// Re-export main types for convenience
pub use adapter::{
    DatabaseAdapter, IsolationLevel, PoolStatus, QueryResult, Row, TransactionAdapter, TxOptions,
};
pub use adapters::{MySqlAdapter, PostgresAdapter, SqliteAdapter};
pub use config::{DatabaseConnectionConfig, DatabaseConnectionConfigBuilder};
pub use types::{SqlValue, TypeConverter};

/// Backend implied by a connection URL's scheme
pub fn backend_from_url(url: &str) -> Option<DatabaseBackend> {
    if url.starts_with("postgresql://") || url.starts_with("postgres://") {
        Some(DatabaseBackend::Postgres)
    } else if url.starts_with("mysql://") {
        Some(DatabaseBackend::MySQL)
    } else if url.starts_with("mariadb://") {
        Some(DatabaseBackend::MariaDB)
    } else if url.starts_with("sqlite:") {
        Some(DatabaseBackend::SQLite)
    } else if url.starts_with("sqlserver://") || url.starts_with("mssql://") {
        Some(DatabaseBackend::SqlServer)
    } else {
        None
    }
}

/// Open a pool for `backend` and wrap it in the matching adapter
pub async fn connect_backend(
    backend: DatabaseBackend,
    url: &str,
    config: &DatabaseConnectionConfig,
) -> Result<Arc<dyn DatabaseAdapter>> {
    log::info!(
        "Opening {} connection to {}",
        backend.as_str(),
        config::sanitize_url(url)
    );

    let adapter: Arc<dyn DatabaseAdapter> = match backend {
        DatabaseBackend::Postgres => Arc::new(PostgresAdapter::new("default", url, config).await?),
        DatabaseBackend::MySQL | DatabaseBackend::MariaDB => {
            Arc::new(MySqlAdapter::new("default", url, config).await?)
        }
        DatabaseBackend::SQLite => Arc::new(SqliteAdapter::new("default", url, config).await?),
        DatabaseBackend::SqlServer => {
            return Err(Error::database_connection(
                "no SQL Server driver is available; use postgres, mysql or sqlite3",
            ))
        }
    };

    Ok(adapter)
}

/// Connect to database based on URL scheme
pub async fn connect(url: &str, config: &DatabaseConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
    let backend = backend_from_url(url)
        .ok_or_else(|| Error::database_connection("Unsupported database URL scheme"))?;
    connect_backend(backend, url, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_url() {
        assert_eq!(backend_from_url("postgres://localhost/db"), Some(DatabaseBackend::Postgres));
        assert_eq!(backend_from_url("mysql://localhost/db"), Some(DatabaseBackend::MySQL));
        assert_eq!(backend_from_url("sqlite::memory:"), Some(DatabaseBackend::SQLite));
        assert_eq!(backend_from_url("oracle://db"), None);
    }

    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let adapter = connect("sqlite::memory:", &DatabaseConnectionConfig::default())
            .await
            .unwrap();
        assert_eq!(adapter.backend(), DatabaseBackend::SQLite);
        assert!(adapter.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_sql_server_has_no_driver() {
        let result = connect("sqlserver://localhost", &DatabaseConnectionConfig::default()).await;
        assert!(matches!(result, Err(Error::DatabaseConnection(_))));
    }
}
