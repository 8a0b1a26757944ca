//! Schema building
//!
//! This module provides database-agnostic DDL generation for creating
//! tables, columns, indexes and constraints from model schemas.

use crate::models::naming::NamingStrategy;
use crate::models::query_builder::dialects::SqlDialect;
use crate::models::schema::{FieldSchema, ModelSchema};
use std::sync::Arc;

/// Schema builder that generates dialect-specific DDL
#[derive(Clone)]
pub struct SchemaBuilder {
    dialect: Arc<dyn SqlDialect>,
}

impl SchemaBuilder {
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        SchemaBuilder { dialect }
    }

    /// Create a CREATE TABLE statement
    pub fn create_table(&self, table_name: &str) -> CreateTableBuilder<'_> {
        CreateTableBuilder {
            dialect: self.dialect.as_ref(),
            table_name: table_name.to_string(),
            if_not_exists: false,
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// CREATE TABLE for every column field of a model
    pub fn create_table_for(&self, schema: &ModelSchema, naming: &NamingStrategy) -> String {
        let table = schema.table_name(naming);
        schema
            .column_fields()
            .fold(self.create_table(&table), |builder, field| {
                builder.column(self.column_definition(field))
            })
            .build()
    }

    /// Column definition for a field
    pub fn column_definition(&self, field: &FieldSchema) -> ColumnDefinition {
        if field.primary_key && field.auto_increment {
            return ColumnDefinition {
                name: field.db_name.clone(),
                data_type: self.dialect.auto_increment_syntax().to_string(),
                nullable: true,
                default: None,
                constraints: Vec::new(),
            };
        }

        let mut constraints = Vec::new();
        if field.primary_key {
            constraints.push("PRIMARY KEY".to_string());
        }
        if field.unique {
            constraints.push("UNIQUE".to_string());
        }

        ColumnDefinition {
            name: field.db_name.clone(),
            data_type: self.dialect.column_type(field.data_type, field.size),
            nullable: !field.primary_key,
            default: field.default.clone(),
            constraints,
        }
    }

    /// Column type of a field for this dialect
    pub fn column_type(&self, field: &FieldSchema) -> String {
        self.dialect.column_type(field.data_type, field.size)
    }

    pub fn drop_table(&self, table: &str, if_exists: bool) -> String {
        format!(
            "DROP TABLE {}{}",
            if if_exists { "IF EXISTS " } else { "" },
            self.dialect.quote_identifier(table)
        )
    }

    pub fn add_column(&self, table: &str, column: &ColumnDefinition) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.dialect.quote_identifier(table),
            column.render(self.dialect.as_ref())
        )
    }

    pub fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.dialect.quote_identifier(table),
            self.dialect.quote_identifier(column)
        )
    }

    pub fn create_index(&self, name: &str, table: &str, columns: &[&str], unique: bool) -> String {
        let quoted: Vec<String> = columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.dialect.quote_identifier(name),
            self.dialect.quote_identifier(table),
            quoted.join(", ")
        )
    }

    /// `None` when constraints cannot be added to an existing table
    pub fn add_foreign_key(
        &self,
        name: &str,
        table: &str,
        column: &str,
        references: &str,
        on_delete: &str,
        on_update: &str,
    ) -> Option<String> {
        if !self.dialect.supports_alter_constraints() {
            return None;
        }
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}",
            self.dialect.quote_identifier(table),
            self.dialect.quote_identifier(name),
            self.dialect.quote_identifier(column),
            references
        );
        if !on_delete.is_empty() {
            sql.push_str(&format!(" ON DELETE {}", on_delete));
        }
        if !on_update.is_empty() {
            sql.push_str(&format!(" ON UPDATE {}", on_update));
        }
        Some(sql)
    }
}

pub struct CreateTableBuilder<'a> {
    dialect: &'a dyn SqlDialect,
    table_name: String,
    if_not_exists: bool,
    columns: Vec<ColumnDefinition>,
    constraints: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub constraints: Vec<String>,
}

impl ColumnDefinition {
    fn render(&self, dialect: &dyn SqlDialect) -> String {
        let mut def = format!("{} {}", dialect.quote_identifier(&self.name), self.data_type);

        if !self.nullable {
            def.push_str(" NOT NULL");
        }

        if let Some(default) = &self.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }

        for constraint in &self.constraints {
            def.push(' ');
            def.push_str(constraint);
        }

        def
    }
}

impl<'a> CreateTableBuilder<'a> {
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a table-level constraint (`UNIQUE (a, b)`)
    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    /// Build the CREATE TABLE statement
    pub fn build(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE {}{} (\n",
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            self.dialect.quote_identifier(&self.table_name)
        );

        let column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("  {}", col.render(self.dialect)))
            .collect();

        sql.push_str(&column_defs.join(",\n"));

        if !self.constraints.is_empty() {
            sql.push_str(",\n  ");
            sql.push_str(&self.constraints.join(",\n  "));
        }

        sql.push_str("\n)");
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query_builder::{create_dialect, DatabaseBackend};
    use crate::models::schema::DataType;

    fn schema() -> ModelSchema {
        ModelSchema::builder("TestModel")
            .id()
            .field(FieldSchema::new("Name", DataType::String).size(100))
            .field(FieldSchema::new("Code", DataType::String).unique())
            .build()
    }

    #[test]
    fn test_create_table_for_model() {
        let builder = SchemaBuilder::new(create_dialect(DatabaseBackend::SQLite));
        let sql = builder.create_table_for(&schema(), &NamingStrategy::default());
        assert_eq!(
            sql,
            "CREATE TABLE \"test_models\" (\n  \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \
             \"name\" TEXT,\n  \"code\" TEXT UNIQUE\n)"
        );
    }

    #[test]
    fn test_postgres_column_types() {
        let builder = SchemaBuilder::new(create_dialect(DatabaseBackend::Postgres));
        let sql = builder
            .create_table("t")
            .if_not_exists()
            .column(builder.column_definition(&FieldSchema::new("ID", DataType::BigInt).primary_key()))
            .column(builder.column_definition(&FieldSchema::new("Name", DataType::String).size(100)))
            .build();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"t\" (\n  \"id\" BIGSERIAL PRIMARY KEY,\n  \"name\" VARCHAR(100)\n)"
        );
    }

    #[test]
    fn test_foreign_key_not_supported_on_sqlite() {
        let sqlite = SchemaBuilder::new(create_dialect(DatabaseBackend::SQLite));
        assert!(sqlite
            .add_foreign_key("fk", "orders", "user_id", "users(id)", "CASCADE", "")
            .is_none());

        let mysql = SchemaBuilder::new(create_dialect(DatabaseBackend::MySQL));
        assert_eq!(
            mysql
                .add_foreign_key("fk_orders_user_id", "orders", "user_id", "users(id)", "CASCADE", "")
                .unwrap(),
            "ALTER TABLE `orders` ADD CONSTRAINT `fk_orders_user_id` FOREIGN KEY (`user_id`) \
             REFERENCES users(id) ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_index_ddl() {
        let builder = SchemaBuilder::new(create_dialect(DatabaseBackend::Postgres));
        assert_eq!(
            builder.create_index("idx_t_a_b", "t", &["a", "b"], true),
            "CREATE UNIQUE INDEX \"idx_t_a_b\" ON \"t\" (\"a\", \"b\")"
        );
        assert_eq!(builder.drop_table("t", true), "DROP TABLE IF EXISTS \"t\"");
    }
}
