//! Legacy schema reflection
//!
//! `Statement`, `Field` and `Relationship` present a model's schema in the
//! shape older callers inspect. Descriptors are rebuilt on every lookup.

use super::dialect::CommonDialect;
use crate::models::{FieldSchema, ModelSchema, RelationshipSchema, RelationshipType};
use crate::session::Session;
use indexmap::IndexMap;

/// A model bound to an engine session, as returned by `DB::new_scope`
#[derive(Clone)]
pub struct Statement {
    pub engine: Session,
    pub schema: Option<&'static ModelSchema>,
}

/// Kind of a relationship, in legacy spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
    Unknown,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::BelongsTo => "belongs_to",
            RelationshipKind::HasOne => "has_one",
            RelationshipKind::HasMany => "has_many",
            RelationshipKind::ManyToMany => "many_to_many",
            RelationshipKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub kind: RelationshipKind,
    /// Foreign key columns
    pub foreign_field_names: Vec<String>,
    /// Columns the foreign keys point at
    pub association_foreign_field_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub db_name: String,
    pub names: Vec<String>,
    pub is_primary_key: bool,
    pub is_normal: bool,
    pub is_ignored: bool,
    pub has_default_value: bool,
    /// Upper-case setting keys (`PRIMARY_KEY`, `SIZE`, ...) as tags spell them
    pub tag_settings: IndexMap<String, String>,
}

impl StructField {
    fn from_schema(field: &FieldSchema) -> Self {
        let mut tag_settings = IndexMap::new();
        tag_settings.insert("COLUMN".to_string(), field.db_name.clone());
        if field.primary_key {
            tag_settings.insert("PRIMARY_KEY".to_string(), "PRIMARY_KEY".to_string());
        }
        if field.auto_increment {
            tag_settings.insert("AUTO_INCREMENT".to_string(), "AUTO_INCREMENT".to_string());
        }
        if !field.nullable && !field.primary_key && field.is_column() {
            tag_settings.insert("NOT NULL".to_string(), "NOT NULL".to_string());
        }
        if field.unique {
            tag_settings.insert("UNIQUE".to_string(), "UNIQUE".to_string());
        }
        if let Some(size) = field.size {
            tag_settings.insert("SIZE".to_string(), size.to_string());
        }
        if let Some(default) = &field.default {
            tag_settings.insert("DEFAULT".to_string(), default.clone());
        }
        if field.ignored {
            tag_settings.insert("-".to_string(), "-".to_string());
        }

        Self {
            name: field.name.clone(),
            db_name: field.db_name.clone(),
            names: vec![field.name.clone()],
            is_primary_key: field.primary_key,
            is_normal: field.is_column(),
            is_ignored: field.ignored,
            has_default_value: field.has_default_value(),
            tag_settings,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub schema: FieldSchema,
    pub struct_field: StructField,
    pub relationship: Option<Relationship>,
    pub is_foreign_key: bool,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn db_name(&self) -> &str {
        &self.schema.db_name
    }
}

impl Statement {
    pub fn new(engine: Session, schema: Option<&'static ModelSchema>) -> Self {
        Self { engine, schema }
    }

    pub fn dialect(&self) -> CommonDialect {
        CommonDialect::new(self.engine.dialect())
    }

    /// Table chosen on the session, else the model's table
    pub fn table_name(&self) -> String {
        if let Some(table) = self.engine.statement().table() {
            return table.to_string();
        }
        self.schema
            .map(|schema| schema.table_name(self.engine.naming()))
            .unwrap_or_default()
    }

    /// Field by field name or column name
    pub fn field_by_name(&self, name: &str) -> Option<Field> {
        let schema = self.schema?;
        let field = schema.field(name)?;
        Some(self.describe(schema, field))
    }

    /// Every field of the model in declaration order
    pub fn get_struct_fields(&self) -> Vec<Field> {
        let Some(schema) = self.schema else {
            return Vec::new();
        };
        schema
            .fields
            .iter()
            .map(|field| self.describe(schema, field))
            .collect()
    }

    fn describe(&self, schema: &'static ModelSchema, field: &FieldSchema) -> Field {
        let relationship = schema
            .relationships
            .iter()
            .find(|r| r.name == field.name)
            .map(|r| self.extract_relationship(schema, r));

        Field {
            schema: field.clone(),
            struct_field: StructField::from_schema(field),
            relationship,
            is_foreign_key: self.is_field_foreign_key(schema, field),
        }
    }

    /// Whether any relationship of the model uses `field` as its foreign key
    fn is_field_foreign_key(&self, schema: &ModelSchema, field: &FieldSchema) -> bool {
        schema.relationships.iter().any(|relationship| {
            relationship
                .references(schema, self.engine.naming())
                .iter()
                .any(|reference| reference.foreign_key.name == field.name)
        })
    }

    fn extract_relationship(
        &self,
        owner: &ModelSchema,
        relationship: &RelationshipSchema,
    ) -> Relationship {
        let references = relationship.references(owner, self.engine.naming());
        let kind = if references.is_empty() {
            RelationshipKind::Unknown
        } else {
            match relationship.kind {
                RelationshipType::BelongsTo => RelationshipKind::BelongsTo,
                RelationshipType::HasOne => RelationshipKind::HasOne,
                RelationshipType::HasMany => RelationshipKind::HasMany,
                RelationshipType::ManyToMany => RelationshipKind::ManyToMany,
            }
        };

        Relationship {
            kind,
            foreign_field_names: references
                .iter()
                .map(|r| r.foreign_key.db_name.clone())
                .collect(),
            association_foreign_field_names: references
                .iter()
                .map(|r| r.primary_key.db_name.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataType;

    #[test]
    fn test_kind_names() {
        assert_eq!(RelationshipKind::BelongsTo.as_str(), "belongs_to");
        assert_eq!(RelationshipKind::ManyToMany.to_string(), "many_to_many");
        assert_eq!(RelationshipKind::Unknown.as_str(), "unknown");
    }

    #[test]
    fn test_tag_settings() {
        let field = FieldSchema::new("Code", DataType::String).size(20).unique();
        let tags = StructField::from_schema(&field).tag_settings;
        assert_eq!(tags.get("COLUMN").map(String::as_str), Some("code"));
        assert_eq!(tags.get("SIZE").map(String::as_str), Some("20"));
        assert!(tags.contains_key("UNIQUE"));
        assert!(tags.contains_key("NOT NULL"));
        assert!(!tags.contains_key("PRIMARY_KEY"));

        let id = StructField::from_schema(&FieldSchema::new("ID", DataType::BigInt).primary_key());
        assert!(id.is_primary_key);
        assert!(id.has_default_value);
        assert!(id.tag_settings.contains_key("AUTO_INCREMENT"));
    }
}
