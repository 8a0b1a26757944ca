//! Schema migration helpers
//!
//! DDL comes from `SchemaBuilder`; metadata lookups use the dialect's
//! catalog queries bound with positional parameters.

use super::Session;
use crate::database::SqlValue;
use crate::error::{Error, ErrorContext, Result};
use crate::models::query_builder::{ColumnDefinition, SchemaBuilder};
use crate::models::{DatabaseBackend, FieldSchema, ModelSchema};

pub struct Migrator {
    session: Session,
}

impl Session {
    pub fn migrator(&self) -> Migrator {
        Migrator {
            session: self.new_session(),
        }
    }
}

impl Migrator {
    fn schema_builder(&self) -> SchemaBuilder {
        SchemaBuilder::new(self.session.dialect())
    }

    async fn exec_ddl(&self, sql: &str) -> Result<()> {
        self.session
            .execute_sql(sql, Vec::new())
            .await
            .map(|_| ())
            .map_err(|e| Error::database_migration(e.to_string()))
    }

    async fn count(&self, sql: &str, params: Vec<SqlValue>) -> Result<i64> {
        let rows = self.session.fetch_sql(sql, params).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_index(0))
            .and_then(SqlValue::as_i64)
            .unwrap_or(0))
    }

    fn table_of(&self, schema: &ModelSchema) -> String {
        schema.table_name(self.session.naming())
    }

    /// Create missing tables and add missing columns; nothing is dropped
    pub async fn auto_migrate(&self, schemas: &[&ModelSchema]) -> Result<()> {
        for schema in schemas {
            let table = self.table_of(schema);
            if !self.has_table(&table).await? {
                self.create_table(schema)
                    .await
                    .with_context(|| format!("creating {}", table))?;
                continue;
            }
            for field in schema.column_fields() {
                if !self.has_column(&table, &field.db_name).await? {
                    log::info!("Adding column {}.{}", table, field.db_name);
                    self.add_column(&table, field)
                        .await
                        .with_context(|| format!("adding column {}.{}", table, field.db_name))?;
                }
            }
        }
        Ok(())
    }

    pub async fn create_table(&self, schema: &ModelSchema) -> Result<()> {
        let sql = self
            .schema_builder()
            .create_table_for(schema, self.session.naming());
        log::info!("Creating table {}", self.table_of(schema));
        self.exec_ddl(&sql).await
    }

    pub async fn create_table_if_not_exists(&self, schema: &ModelSchema) -> Result<()> {
        if self.has_table(&self.table_of(schema)).await? {
            return Ok(());
        }
        self.create_table(schema).await
    }

    pub async fn drop_table(&self, table: &str) -> Result<()> {
        self.exec_ddl(&self.schema_builder().drop_table(table, false))
            .await
    }

    pub async fn drop_table_if_exists(&self, table: &str) -> Result<()> {
        self.exec_ddl(&self.schema_builder().drop_table(table, true))
            .await
    }

    pub async fn has_table(&self, table: &str) -> Result<bool> {
        let sql = self.session.dialect().has_table_sql();
        Ok(self.count(sql, vec![SqlValue::from(table)]).await? > 0)
    }

    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let sql = self.session.dialect().has_column_sql();
        let params = vec![SqlValue::from(table), SqlValue::from(column)];
        Ok(self.count(sql, params).await? > 0)
    }

    pub async fn add_column(&self, table: &str, field: &FieldSchema) -> Result<()> {
        let builder = self.schema_builder();
        let column: ColumnDefinition = builder.column_definition(field);
        self.exec_ddl(&builder.add_column(table, &column)).await
    }

    pub async fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        self.exec_ddl(&self.schema_builder().drop_column(table, column))
            .await
            .with_context(|| format!("dropping column {}", column))
    }

    /// Change a column's type to match `field`
    pub async fn alter_column(&self, table: &str, field: &FieldSchema) -> Result<()> {
        let column_type = self.schema_builder().column_type(field);
        self.modify_column(table, &field.db_name, &column_type).await
    }

    /// Change a column's type to a dialect type name
    pub async fn modify_column(&self, table: &str, column: &str, column_type: &str) -> Result<()> {
        let dialect = self.session.dialect();
        match dialect.alter_column_sql(table, column, column_type) {
            Some(sql) => self.exec_ddl(&sql).await,
            None => Err(Error::database_migration(format!(
                "{} cannot alter column types",
                dialect.backend().as_str()
            ))),
        }
    }

    pub async fn rename_column(&self, table: &str, from: &str, to: &str) -> Result<()> {
        let sql = self.session.dialect().rename_column_sql(table, from, to);
        self.exec_ddl(&sql)
            .await
            .with_context(|| format!("renaming column {} to {}", from, to))
    }

    pub async fn has_index(&self, table: &str, name: &str) -> Result<bool> {
        let sql = self.session.dialect().has_index_sql();
        let params = vec![SqlValue::from(table), SqlValue::from(name)];
        Ok(self.count(sql, params).await? > 0)
    }

    pub async fn create_index(
        &self,
        name: &str,
        table: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<()> {
        let sql = self
            .schema_builder()
            .create_index(name, table, columns, unique);
        self.exec_ddl(&sql).await
    }

    pub async fn drop_index(&self, table: &str, name: &str) -> Result<()> {
        let sql = self.session.dialect().drop_index_sql(table, name);
        self.exec_ddl(&sql).await
    }

    /// Add a foreign key constraint; a no-op where the backend cannot
    /// alter constraints of existing tables
    pub async fn create_foreign_key(
        &self,
        name: &str,
        table: &str,
        column: &str,
        references: &str,
        on_delete: &str,
        on_update: &str,
    ) -> Result<()> {
        let sql = self.schema_builder().add_foreign_key(
            name, table, column, references, on_delete, on_update,
        );
        match sql {
            Some(sql) => self.exec_ddl(&sql).await,
            None => {
                log::debug!(
                    "Skipping foreign key {} on {}",
                    name,
                    self.session.dialect().backend().as_str()
                );
                Ok(())
            }
        }
    }

    pub async fn current_database(&self) -> Result<String> {
        let sql = self.session.dialect().current_database_sql();
        let rows = self.session.fetch_sql(sql, Vec::new()).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_index(0))
            .and_then(SqlValue::as_string)
            .unwrap_or_default())
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.session.dialect().backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrmConfig;
    use crate::database::SqliteAdapter;
    use crate::error::ErrorChain;
    use crate::models::DataType;
    use std::sync::Arc;

    async fn session() -> Session {
        let config = OrmConfig::with_url("sqlite::memory:");
        let adapter = SqliteAdapter::new("test", "sqlite::memory:", &config.database)
            .await
            .unwrap();
        Session::new(Arc::new(adapter), config)
    }

    fn widget() -> ModelSchema {
        ModelSchema::builder("Widget")
            .id()
            .field(FieldSchema::new("Name", DataType::String))
            .build()
    }

    #[tokio::test]
    async fn test_auto_migrate_adds_missing_columns() {
        let db = session().await;
        let migrator = db.migrator();

        migrator.auto_migrate(&[&widget()]).await.unwrap();
        assert!(migrator.has_table("widgets").await.unwrap());
        assert!(!migrator.has_column("widgets", "weight").await.unwrap());

        let wider = ModelSchema::builder("Widget")
            .id()
            .field(FieldSchema::new("Name", DataType::String))
            .field(FieldSchema::new("Weight", DataType::Float))
            .build();
        migrator.auto_migrate(&[&wider]).await.unwrap();
        assert!(migrator.has_column("widgets", "weight").await.unwrap());
    }

    #[tokio::test]
    async fn test_indexes_and_drop() {
        let db = session().await;
        let migrator = db.migrator();
        migrator.create_table(&widget()).await.unwrap();

        migrator
            .create_index("idx_widgets_name", "widgets", &["name"], false)
            .await
            .unwrap();
        assert!(migrator.has_index("widgets", "idx_widgets_name").await.unwrap());
        migrator.drop_index("widgets", "idx_widgets_name").await.unwrap();
        assert!(!migrator.has_index("widgets", "idx_widgets_name").await.unwrap());

        migrator.drop_table_if_exists("widgets").await.unwrap();
        assert!(!migrator.has_table("widgets").await.unwrap());
        migrator.drop_table_if_exists("widgets").await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_cannot_alter_columns() {
        let db = session().await;
        let migrator = db.migrator();
        migrator.create_table(&widget()).await.unwrap();
        let err = migrator
            .modify_column("widgets", "name", "INTEGER")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "E_DB_MIGRATION");
        assert_eq!(migrator.current_database().await.unwrap(), "main");
    }

    #[tokio::test]
    async fn test_failed_ddl_names_the_operation() {
        let db = session().await;
        let migrator = db.migrator();
        migrator.create_table(&widget()).await.unwrap();

        let err = migrator.drop_column("widgets", "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "dropping column nope");
        assert_eq!(err.error_code(), "E_DB_MIGRATION");
        assert!(matches!(err.root_cause(), Error::DatabaseMigration(_)));

        let chain = ErrorChain::new(&err);
        assert_eq!(chain.chain().len(), 2);
        assert!(chain.format_for_log().starts_with("dropping column nope -> "));
    }
}
