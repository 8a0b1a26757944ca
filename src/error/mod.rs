use thiserror::Error;

pub mod context;

pub type Result<T> = std::result::Result<T, Error>;

pub use context::{ErrorChain, ErrorContext, OptionExt};

/// Main error type for the compatibility layer
///
/// Errors are stored inside the legacy result wrapper and travel with every
/// chained value, so the type is `Clone` and carries owned messages only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("record not found")]
    RecordNotFound,

    #[error("invalid SQL")]
    InvalidSql,

    #[error("invalid transaction")]
    InvalidTransaction,

    #[error("can't start transaction: {0}")]
    CantStartTransaction(String),

    #[error("using unaddressable value")]
    Unaddressable,

    #[error("{0}")]
    Conversion(String),

    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("{0}")]
    TypeMismatch(String),

    #[error("WHERE conditions required")]
    MissingWhereClause,

    // Database-specific errors
    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    #[error("Database query error: {0}")]
    DatabaseQuery(String),

    #[error("Database transaction error: {0}")]
    DatabaseTransaction(String),

    #[error("Database migration error: {0}")]
    DatabaseMigration(String),

    #[error("Database pool error: {0}")]
    DatabasePool(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Error with context chain
    #[error("{message}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::RecordNotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::DatabasePool(err.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Configuration(_) => {
                Self::DatabaseConnection(err.to_string())
            }
            other => Self::DatabaseQuery(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<crate::models::query_builder::QueryError> for Error {
    fn from(err: crate::models::query_builder::QueryError) -> Self {
        use crate::models::query_builder::QueryError;
        match err {
            QueryError::NotFound => Self::RecordNotFound,
            QueryError::MissingWhere => Self::MissingWhereClause,
            other => Self::DatabaseQuery(other.to_string()),
        }
    }
}

impl Error {
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    // Database error constructors
    pub fn database_connection(msg: impl Into<String>) -> Self {
        Self::DatabaseConnection(msg.into())
    }

    pub fn database_query(msg: impl Into<String>) -> Self {
        Self::DatabaseQuery(msg.into())
    }

    pub fn database_transaction(msg: impl Into<String>) -> Self {
        Self::DatabaseTransaction(msg.into())
    }

    pub fn database_migration(msg: impl Into<String>) -> Self {
        Self::DatabaseMigration(msg.into())
    }

    pub fn database_pool(msg: impl Into<String>) -> Self {
        Self::DatabasePool(msg.into())
    }

    // Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error once every context layer is peeled off
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Error::WithContext { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether this error means a lookup produced no rows
    pub fn is_record_not_found(&self) -> bool {
        matches!(self.root_cause(), Error::RecordNotFound)
    }

    /// Get a stable error code for logs and callers that match on strings
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::RecordNotFound => "E_RECORD_NOT_FOUND",
            Error::InvalidSql => "E_INVALID_SQL",
            Error::InvalidTransaction => "E_INVALID_TRANSACTION",
            Error::CantStartTransaction(_) => "E_CANT_START_TRANSACTION",
            Error::Unaddressable => "E_UNADDRESSABLE",
            Error::Conversion(_) => "E_CONVERSION",
            Error::UnsupportedDialect(_) => "E_UNSUPPORTED_DIALECT",
            Error::TypeMismatch(_) => "E_TYPE_MISMATCH",
            Error::MissingWhereClause => "E_MISSING_WHERE",
            Error::DatabaseConnection(_) => "E_DB_CONNECTION",
            Error::DatabaseQuery(_) => "E_DB_QUERY",
            Error::DatabaseTransaction(_) => "E_DB_TRANSACTION",
            Error::DatabaseMigration(_) => "E_DB_MIGRATION",
            Error::DatabasePool(_) => "E_DB_POOL",
            Error::Json(_) => "E_JSON",
            Error::Config(_) => "E_CONFIG",
            Error::InvalidInput(_) => "E_INVALID_INPUT",
            Error::WithContext { source, .. } => source.error_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_record_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert_eq!(err, Error::RecordNotFound);
        assert!(err.is_record_not_found());
    }

    #[test]
    fn test_record_not_found_through_context() {
        let err = Error::RecordNotFound.with_context("loading user 7");
        assert!(err.is_record_not_found());
        assert_eq!(err.error_code(), "E_RECORD_NOT_FOUND");
        assert_eq!(err.to_string(), "loading user 7");
    }

    #[test]
    fn test_other_errors_are_not_record_not_found() {
        assert!(!Error::InvalidSql.is_record_not_found());
        assert!(!Error::database_query("boom").is_record_not_found());
    }

    #[test]
    fn test_legacy_messages() {
        assert_eq!(
            Error::UnsupportedDialect("oracle".into()).to_string(),
            "unsupported dialect: oracle"
        );
        assert_eq!(
            Error::type_mismatch("value must be a pointer to int or int64").to_string(),
            "value must be a pointer to int or int64"
        );
    }
}
