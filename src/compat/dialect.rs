//! Legacy dialect descriptor
//!
//! `CommonDialect` answers the naming and quoting questions from the
//! engine dialect. The catalog operations of the legacy interface are not
//! carried over; use the migrator (`DB::has_table`, `DB::add_index`, ...)
//! for those. Calling them aborts.

use crate::models::query_builder::{
    MySQLDialect, PostgresDialect, SQLiteDialect, SqlDialect, SqlServerDialect,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::Any;
use std::sync::Arc;

#[allow(clippy::expect_used)]
static KEY_NAME_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("CommonDialect: invalid key name regex"));

/// Behaviour that differs across SQL databases
pub trait Dialect: Send + Sync {
    fn get_name(&self) -> &'static str;

    /// Placeholder for the `i`-th bound value
    fn bind_var(&self, i: usize) -> String;

    fn quote(&self, key: &str) -> String;

    fn has_index(&self, table_name: &str, index_name: &str) -> bool;

    fn has_foreign_key(&self, table_name: &str, foreign_key_name: &str) -> bool;

    fn remove_index(&self, table_name: &str, index_name: &str) -> crate::error::Result<()>;

    fn has_table(&self, table_name: &str) -> bool;

    fn has_column(&self, table_name: &str, column_name: &str) -> bool;

    fn modify_column(
        &self,
        table_name: &str,
        column_name: &str,
        column_type: &str,
    ) -> crate::error::Result<()>;

    fn limit_and_offset_sql(&self, limit: i64, offset: i64) -> crate::error::Result<String>;

    fn select_from_dummy_table(&self) -> String;

    fn last_insert_id_output_interstitial(
        &self,
        table_name: &str,
        column_name: &str,
        columns: &[&str],
    ) -> String;

    fn last_insert_id_returning_suffix(&self, table_name: &str, column_name: &str) -> String;

    fn default_value_str(&self) -> String;

    /// Valid key name (foreign key, index) for a table and its fields
    fn build_key_name(&self, kind: &str, table_name: &str, fields: &[&str]) -> String;

    fn normalize_index_and_column(&self, index_name: &str, column_name: &str) -> (String, String);

    fn current_database(&self) -> String;
}

/// Key name with every run of non-alphanumerics collapsed to `_`
pub fn build_key_name(kind: &str, table_name: &str, fields: &[&str]) -> String {
    let key = format!("{}_{}_{}", kind, table_name, fields.join("_"));
    KEY_NAME_SEPARATORS.replace_all(&key, "_").into_owned()
}

/// Legacy name of an engine dialect
fn dialect_name(dialect: &dyn Any) -> &'static str {
    if dialect.is::<MySQLDialect>() {
        "mysql"
    } else if dialect.is::<PostgresDialect>() {
        "postgres"
    } else if dialect.is::<SQLiteDialect>() {
        "sqlite"
    } else if dialect.is::<SqlServerDialect>() {
        "sqlserver"
    } else {
        "unknown"
    }
}

#[derive(Clone)]
pub struct CommonDialect {
    dialect: Arc<dyn SqlDialect>,
}

impl CommonDialect {
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        Self { dialect }
    }

    /// The engine dialect behind this descriptor
    pub fn inner(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    #[allow(clippy::panic)]
    fn unsupported(&self, operation: &str) -> ! {
        panic!(
            "{} is not supported by the {} compatibility dialect; use the migrator",
            operation,
            self.get_name()
        )
    }
}

impl std::fmt::Debug for CommonDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommonDialect")
            .field("name", &self.get_name())
            .finish()
    }
}

impl Dialect for CommonDialect {
    fn get_name(&self) -> &'static str {
        dialect_name(self.dialect.as_any())
    }

    fn bind_var(&self, i: usize) -> String {
        self.dialect.placeholder(i)
    }

    fn quote(&self, key: &str) -> String {
        self.dialect.quote_identifier(key)
    }

    fn has_index(&self, _table_name: &str, _index_name: &str) -> bool {
        self.unsupported("HasIndex")
    }

    fn has_foreign_key(&self, _table_name: &str, _foreign_key_name: &str) -> bool {
        self.unsupported("HasForeignKey")
    }

    fn remove_index(&self, _table_name: &str, _index_name: &str) -> crate::error::Result<()> {
        self.unsupported("RemoveIndex")
    }

    fn has_table(&self, _table_name: &str) -> bool {
        self.unsupported("HasTable")
    }

    fn has_column(&self, _table_name: &str, _column_name: &str) -> bool {
        self.unsupported("HasColumn")
    }

    fn modify_column(
        &self,
        _table_name: &str,
        _column_name: &str,
        _column_type: &str,
    ) -> crate::error::Result<()> {
        self.unsupported("ModifyColumn")
    }

    fn limit_and_offset_sql(&self, _limit: i64, _offset: i64) -> crate::error::Result<String> {
        self.unsupported("LimitAndOffsetSQL")
    }

    fn select_from_dummy_table(&self) -> String {
        String::new()
    }

    fn last_insert_id_output_interstitial(
        &self,
        _table_name: &str,
        _column_name: &str,
        _columns: &[&str],
    ) -> String {
        String::new()
    }

    fn last_insert_id_returning_suffix(&self, _table_name: &str, _column_name: &str) -> String {
        String::new()
    }

    fn default_value_str(&self) -> String {
        "DEFAULT VALUES".to_string()
    }

    fn build_key_name(&self, kind: &str, table_name: &str, fields: &[&str]) -> String {
        build_key_name(kind, table_name, fields)
    }

    fn normalize_index_and_column(&self, index_name: &str, column_name: &str) -> (String, String) {
        (index_name.to_string(), column_name.to_string())
    }

    fn current_database(&self) -> String {
        self.unsupported("CurrentDatabase")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query_builder::{create_dialect, DatabaseBackend};

    fn dialect(backend: DatabaseBackend) -> CommonDialect {
        CommonDialect::new(create_dialect(backend))
    }

    #[test]
    fn test_names() {
        assert_eq!(dialect(DatabaseBackend::MySQL).get_name(), "mysql");
        assert_eq!(dialect(DatabaseBackend::MariaDB).get_name(), "mysql");
        assert_eq!(dialect(DatabaseBackend::Postgres).get_name(), "postgres");
        assert_eq!(dialect(DatabaseBackend::SQLite).get_name(), "sqlite");
        assert_eq!(dialect(DatabaseBackend::SqlServer).get_name(), "sqlserver");
        assert_eq!(dialect_name(&"not a dialect"), "unknown");
    }

    #[test]
    fn test_build_key_name() {
        let d = dialect(DatabaseBackend::SQLite);
        assert_eq!(d.build_key_name("fk", "orders", &["customer_id"]), "fk_orders_customer_id");
        assert_eq!(
            d.build_key_name("idx", "public.user accounts", &["first name", "last-name"]),
            "idx_public_user_accounts_first_name_last_name"
        );
        assert_eq!(build_key_name("uix", "a  b", &[]), "uix_a_b_");
    }

    #[test]
    fn test_static_answers() {
        let d = dialect(DatabaseBackend::Postgres);
        assert_eq!(d.select_from_dummy_table(), "");
        assert_eq!(d.last_insert_id_returning_suffix("users", "id"), "");
        assert_eq!(d.last_insert_id_output_interstitial("users", "id", &["id"]), "");
        assert_eq!(d.default_value_str(), "DEFAULT VALUES");
        assert_eq!(
            d.normalize_index_and_column("idx_x", "x"),
            ("idx_x".to_string(), "x".to_string())
        );
        assert_eq!(d.bind_var(2), "$2");
        assert_eq!(d.quote("name"), "\"name\"");
        assert_eq!(dialect(DatabaseBackend::MySQL).quote("name"), "`name`");
    }

    #[test]
    #[should_panic(expected = "HasTable is not supported")]
    fn test_catalog_operations_abort() {
        dialect(DatabaseBackend::SQLite).has_table("users");
    }
}
