//! Model schema reflection
//!
//! A `ModelSchema` describes how a Rust struct maps onto a table: the
//! column fields, the primary key and the relationships to other models.
//! Records travel between Rust values and rows as JSON objects keyed by
//! column name, so a model's serde field names must match its column names.

use crate::database::{Row, SqlValue};
use crate::error::{Error, Result};
use crate::models::naming::NamingStrategy;
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

/// Storage class of a field, used for DDL and value coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int,
    UInt,
    BigInt,
    Float,
    String,
    Text,
    Time,
    Bytes,
    Json,
    /// Related records; never a column
    Association,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int | DataType::UInt | DataType::BigInt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// Field name as the legacy API spells it (`TestModelID`)
    pub name: String,
    /// Column name; also the serde key of the field
    pub db_name: String,
    pub data_type: DataType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    pub unique: bool,
    pub size: Option<usize>,
    /// SQL default expression
    pub default: Option<String>,
    pub ignored: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            db_name: NamingStrategy::column_name(&name),
            name,
            data_type,
            primary_key: false,
            auto_increment: false,
            nullable: false,
            unique: false,
            size: None,
            default: None,
            ignored: false,
        }
    }

    pub fn column(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = db_name.into();
        self
    }

    /// Integer primary keys auto-increment
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.auto_increment = self.data_type.is_integer();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Present on the struct but not stored
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn is_column(&self) -> bool {
        !self.ignored && self.data_type != DataType::Association
    }

    pub fn has_default_value(&self) -> bool {
        self.default.is_some() || self.auto_increment
    }

    /// Whether `name` refers to this field by field or column name
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.db_name == name
    }

    /// Coerce a serialized field value into a bind value
    pub fn to_sql(&self, value: &JsonValue) -> SqlValue {
        if value.is_null() {
            return SqlValue::Null;
        }
        match self.data_type {
            DataType::Bool => match value {
                JsonValue::Bool(b) => SqlValue::Bool(*b),
                JsonValue::Number(n) => SqlValue::Bool(n.as_i64().unwrap_or_default() != 0),
                other => SqlValue::from_json(other),
            },
            DataType::Int | DataType::BigInt => match value.as_i64() {
                Some(i) => SqlValue::BigInt(i),
                None => SqlValue::from_json(value),
            },
            DataType::UInt => match value.as_u64() {
                Some(u) => SqlValue::UnsignedBigInt(u),
                None => SqlValue::from_json(value),
            },
            DataType::Float => match value.as_f64() {
                Some(f) => SqlValue::Double(f),
                None => SqlValue::from_json(value),
            },
            DataType::Time => match value {
                JsonValue::String(s) => SqlValue::DateTime(s.clone()),
                other => SqlValue::from_json(other),
            },
            DataType::Bytes => match value {
                JsonValue::Array(items) => SqlValue::Bytes(
                    items
                        .iter()
                        .filter_map(|b| b.as_u64().map(|b| b as u8))
                        .collect(),
                ),
                other => SqlValue::from_json(other),
            },
            DataType::Json => SqlValue::Json(value.clone()),
            DataType::String | DataType::Text | DataType::Association => {
                SqlValue::from_json(value)
            }
        }
    }

    /// Coerce a fetched value into the shape serde expects for this field
    pub fn to_json(&self, value: &SqlValue) -> JsonValue {
        if value.is_null() {
            return JsonValue::Null;
        }
        match self.data_type {
            DataType::Bool => value
                .as_bool()
                .map(JsonValue::Bool)
                .unwrap_or_else(|| value.to_json()),
            DataType::Int | DataType::UInt | DataType::BigInt => match value {
                SqlValue::UnsignedBigInt(u) => JsonValue::from(*u),
                other => other.as_i64().map(JsonValue::from).unwrap_or_else(|| other.to_json()),
            },
            DataType::Float => match value {
                SqlValue::Float(f) => JsonValue::from(*f as f64),
                SqlValue::Double(f) => JsonValue::from(*f),
                other => other
                    .as_string()
                    .and_then(|s| s.parse::<f64>().ok())
                    .map(JsonValue::from)
                    .unwrap_or_else(|| other.to_json()),
            },
            DataType::String | DataType::Text => value
                .as_string()
                .map(JsonValue::String)
                .unwrap_or_else(|| value.to_json()),
            DataType::Bytes => match value {
                SqlValue::Bytes(bytes) => JsonValue::from(bytes.clone()),
                SqlValue::String(s) | SqlValue::Text(s) => JsonValue::from(s.as_bytes().to_vec()),
                other => other.to_json(),
            },
            DataType::Json => match value {
                SqlValue::String(s) | SqlValue::Text(s) => {
                    serde_json::from_str(s).unwrap_or_else(|_| JsonValue::String(s.clone()))
                }
                other => other.to_json(),
            },
            DataType::Time | DataType::Association => value.to_json(),
        }
    }

    /// Value serde sees when a row does not carry this field
    pub fn zero_json(&self) -> JsonValue {
        if self.nullable {
            return JsonValue::Null;
        }
        match self.data_type {
            DataType::Bool => JsonValue::Bool(false),
            DataType::Int | DataType::UInt | DataType::BigInt => JsonValue::from(0),
            DataType::Float => JsonValue::from(0.0),
            DataType::String | DataType::Text => JsonValue::String(String::new()),
            DataType::Bytes => JsonValue::Array(Vec::new()),
            DataType::Time | DataType::Json | DataType::Association => JsonValue::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipType {
    HasOne,
    HasMany,
    BelongsTo,
    ManyToMany,
}

/// A field of some table, as seen from a relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    pub db_name: String,
    pub table: String,
}

/// One key pairing of a relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub primary_key: FieldRef,
    pub foreign_key: FieldRef,
    /// The primary key belongs to the model declaring the relationship
    pub own_primary_key: bool,
}

#[derive(Debug, Clone)]
pub struct RelationshipSchema {
    /// Name of the association field
    pub name: String,
    pub kind: RelationshipType,
    pub related: fn() -> &'static ModelSchema,
    /// Foreign key field name when it does not follow the naming convention
    pub foreign_key: Option<String>,
    pub join_table: Option<String>,
}

impl RelationshipSchema {
    pub fn new(
        name: impl Into<String>,
        kind: RelationshipType,
        related: fn() -> &'static ModelSchema,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            related,
            foreign_key: None,
            join_table: None,
        }
    }

    pub fn has_one(name: impl Into<String>, related: fn() -> &'static ModelSchema) -> Self {
        Self::new(name, RelationshipType::HasOne, related)
    }

    pub fn has_many(name: impl Into<String>, related: fn() -> &'static ModelSchema) -> Self {
        Self::new(name, RelationshipType::HasMany, related)
    }

    pub fn belongs_to(name: impl Into<String>, related: fn() -> &'static ModelSchema) -> Self {
        Self::new(name, RelationshipType::BelongsTo, related)
    }

    pub fn many_to_many(
        name: impl Into<String>,
        related: fn() -> &'static ModelSchema,
        join_table: impl Into<String>,
    ) -> Self {
        let mut rel = Self::new(name, RelationshipType::ManyToMany, related);
        rel.join_table = Some(join_table.into());
        rel
    }

    pub fn foreign_key(mut self, field: impl Into<String>) -> Self {
        self.foreign_key = Some(field.into());
        self
    }

    pub fn related_schema(&self) -> &'static ModelSchema {
        (self.related)()
    }

    /// Key pairings of this relationship, derived on every call
    ///
    /// Empty when the foreign key field cannot be found on the model that
    /// should carry it.
    pub fn references(&self, owner: &ModelSchema, naming: &NamingStrategy) -> Vec<Reference> {
        let related = self.related_schema();

        match self.kind {
            RelationshipType::HasOne | RelationshipType::HasMany => {
                let Some(pk) = owner.primary_key() else {
                    return Vec::new();
                };
                let fk_name = self
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}{}", owner.name, pk.name));
                let Some(fk) = related.field(&fk_name) else {
                    return Vec::new();
                };
                vec![Reference {
                    primary_key: field_ref(pk, owner.table_name(naming)),
                    foreign_key: field_ref(fk, related.table_name(naming)),
                    own_primary_key: true,
                }]
            }
            RelationshipType::BelongsTo => {
                let Some(pk) = related.primary_key() else {
                    return Vec::new();
                };
                let fk_name = self
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}{}", self.name, pk.name));
                let Some(fk) = owner.field(&fk_name) else {
                    return Vec::new();
                };
                vec![Reference {
                    primary_key: field_ref(pk, related.table_name(naming)),
                    foreign_key: field_ref(fk, owner.table_name(naming)),
                    own_primary_key: false,
                }]
            }
            RelationshipType::ManyToMany => {
                let (Some(own_pk), Some(rel_pk), Some(join)) =
                    (owner.primary_key(), related.primary_key(), self.join_table.as_ref())
                else {
                    return Vec::new();
                };
                let join_ref = |model: &ModelSchema, pk: &FieldSchema| {
                    let name = format!("{}{}", model.name, pk.name);
                    FieldRef {
                        db_name: NamingStrategy::column_name(&name),
                        name,
                        table: join.clone(),
                    }
                };
                vec![
                    Reference {
                        primary_key: field_ref(own_pk, owner.table_name(naming)),
                        foreign_key: join_ref(owner, own_pk),
                        own_primary_key: true,
                    },
                    Reference {
                        primary_key: field_ref(rel_pk, related.table_name(naming)),
                        foreign_key: join_ref(related, rel_pk),
                        own_primary_key: false,
                    },
                ]
            }
        }
    }
}

fn field_ref(field: &FieldSchema, table: String) -> FieldRef {
    FieldRef {
        name: field.name.clone(),
        db_name: field.db_name.clone(),
        table,
    }
}

#[derive(Debug, Clone)]
pub struct ModelSchema {
    /// Model name in legacy spelling (`TestModel`)
    pub name: String,
    /// Explicit table name; derived from `name` when unset
    pub table: Option<String>,
    pub fields: Vec<FieldSchema>,
    pub relationships: Vec<RelationshipSchema>,
}

impl ModelSchema {
    pub fn builder(name: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            schema: ModelSchema {
                name: name.into(),
                table: None,
                fields: Vec::new(),
                relationships: Vec::new(),
            },
        }
    }

    pub fn table_name(&self, naming: &NamingStrategy) -> String {
        match &self.table {
            Some(table) => table.clone(),
            None => naming.table_name(&self.name),
        }
    }

    pub fn primary_key(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Field by field name or column name
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|f| f.matches(name))
            .or_else(|| {
                let column = NamingStrategy::column_name(name);
                self.fields.iter().find(|f| f.db_name == column)
            })
    }

    pub fn column_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.is_column())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.column_fields().map(|f| f.db_name.clone()).collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_fields().any(|f| f.db_name == column)
    }

    /// Column of a field, when the model has it as a column
    pub fn column_of(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == field && f.is_column())
            .map(|f| f.db_name.as_str())
    }

    pub fn soft_delete_column(&self) -> Option<&str> {
        self.column_of("DeletedAt")
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipSchema> {
        self.relationships
            .iter()
            .find(|r| r.name == name || NamingStrategy::column_name(&r.name) == name)
    }

    /// Column values of a serialized record, in declaration order
    pub fn record_values(&self, record: &JsonValue) -> Result<IndexMap<String, SqlValue>> {
        let object = record.as_object().ok_or(Error::Unaddressable)?;
        Ok(self
            .column_fields()
            .map(|f| {
                let value = object.get(&f.db_name).unwrap_or(&JsonValue::Null);
                (f.db_name.clone(), f.to_sql(value))
            })
            .collect())
    }

    /// Primary key value of a serialized record
    pub fn primary_key_value(&self, record: &JsonValue) -> Option<SqlValue> {
        let pk = self.primary_key()?;
        let value = record.get(&pk.db_name)?;
        Some(pk.to_sql(value))
    }

    /// Build a serialized record from a row
    ///
    /// Columns the schema knows are coerced to the field's type; unknown
    /// columns are kept as-is. Fields the row lacks get their zero value so
    /// partial selects still deserialize.
    pub fn row_to_json(&self, row: &Row) -> JsonValue {
        let mut object = Map::with_capacity(self.fields.len());

        for (column, value) in row.columns().iter().zip(row.values()) {
            if object.contains_key(column) {
                continue;
            }
            let json = match self.column_fields().find(|f| &f.db_name == column) {
                Some(field) => field.to_json(value),
                None => value.to_json(),
            };
            object.insert(column.clone(), json);
        }

        for field in &self.fields {
            if object.contains_key(&field.db_name) {
                continue;
            }
            let zero = match self.relationship(&field.name).map(|r| r.kind) {
                Some(RelationshipType::HasMany | RelationshipType::ManyToMany) => {
                    JsonValue::Array(Vec::new())
                }
                Some(_) => JsonValue::Null,
                None => field.zero_json(),
            };
            object.insert(field.db_name.clone(), zero);
        }

        JsonValue::Object(object)
    }

    /// Overwrite columns of a serialized record with fetched values
    pub fn assign_values(&self, record: &mut JsonValue, values: &IndexMap<String, SqlValue>) {
        let Some(object) = record.as_object_mut() else {
            return;
        };
        for (column, value) in values {
            let json = match self.column_fields().find(|f| &f.db_name == column) {
                Some(field) => field.to_json(value),
                None => value.to_json(),
            };
            object.insert(column.clone(), json);
        }
    }
}

pub struct ModelSchemaBuilder {
    schema: ModelSchema,
}

impl ModelSchemaBuilder {
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.schema.table = Some(table.into());
        self
    }

    /// `ID` big integer auto-increment primary key
    pub fn id(self) -> Self {
        self.field(FieldSchema::new("ID", DataType::BigInt).primary_key())
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.schema.fields.push(field);
        self
    }

    /// `CreatedAt` and `UpdatedAt`, filled on create and update
    pub fn timestamps(self) -> Self {
        self.field(FieldSchema::new("CreatedAt", DataType::Time).nullable())
            .field(FieldSchema::new("UpdatedAt", DataType::Time).nullable())
    }

    /// `DeletedAt`; deletes become updates and reads skip deleted rows
    pub fn soft_delete(self) -> Self {
        self.field(FieldSchema::new("DeletedAt", DataType::Time).nullable())
    }

    pub fn has_one(self, name: &str, related: fn() -> &'static ModelSchema) -> Self {
        self.relationship(RelationshipSchema::has_one(name, related))
    }

    pub fn has_many(self, name: &str, related: fn() -> &'static ModelSchema) -> Self {
        self.relationship(RelationshipSchema::has_many(name, related))
    }

    pub fn belongs_to(self, name: &str, related: fn() -> &'static ModelSchema) -> Self {
        self.relationship(RelationshipSchema::belongs_to(name, related))
    }

    pub fn many_to_many(
        self,
        name: &str,
        related: fn() -> &'static ModelSchema,
        join_table: &str,
    ) -> Self {
        self.relationship(RelationshipSchema::many_to_many(name, related, join_table))
    }

    /// Add a relationship and its association field
    pub fn relationship(mut self, relationship: RelationshipSchema) -> Self {
        if self.schema.field(&relationship.name).is_none() {
            self.schema
                .fields
                .push(FieldSchema::new(relationship.name.clone(), DataType::Association));
        }
        self.schema.relationships.push(relationship);
        self
    }

    pub fn build(self) -> ModelSchema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use serde_json::json;

    static PARENT: Lazy<ModelSchema> = Lazy::new(|| {
        ModelSchema::builder("TestModel")
            .id()
            .field(FieldSchema::new("Name", DataType::String).size(100))
            .field(FieldSchema::new("Active", DataType::Bool))
            .has_many("RelatedModels", child)
            .build()
    });

    static CHILD: Lazy<ModelSchema> = Lazy::new(|| {
        ModelSchema::builder("RelatedModel")
            .id()
            .field(FieldSchema::new("TestModelID", DataType::BigInt))
            .field(FieldSchema::new("Description", DataType::Text))
            .belongs_to("TestModel", parent)
            .build()
    });

    fn parent() -> &'static ModelSchema {
        &PARENT
    }

    fn child() -> &'static ModelSchema {
        &CHILD
    }

    #[test]
    fn test_field_naming() {
        let fk = child().field("TestModelID").unwrap();
        assert_eq!(fk.db_name, "test_model_id");
        assert!(child().field("test_model_id").is_some());
        assert!(parent().primary_key().unwrap().auto_increment);
        assert!(!parent().has_column("related_models"));
    }

    #[test]
    fn test_has_many_references() {
        let naming = NamingStrategy::default();
        let rel = parent().relationship("RelatedModels").unwrap();
        let refs = rel.references(parent(), &naming);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].primary_key.db_name, "id");
        assert_eq!(refs[0].primary_key.table, "test_models");
        assert_eq!(refs[0].foreign_key.name, "TestModelID");
        assert_eq!(refs[0].foreign_key.table, "related_models");
        assert!(refs[0].own_primary_key);
    }

    #[test]
    fn test_belongs_to_references() {
        let naming = NamingStrategy::default();
        let rel = child().relationship("TestModel").unwrap();
        let refs = rel.references(child(), &naming);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].foreign_key.db_name, "test_model_id");
        assert!(!refs[0].own_primary_key);
    }

    #[test]
    fn test_unresolved_foreign_key_has_no_references() {
        let rel = RelationshipSchema::has_one("Other", child).foreign_key("MissingID");
        assert!(rel.references(parent(), &NamingStrategy::default()).is_empty());
    }

    #[test]
    fn test_row_to_json_fills_missing_fields() {
        let row = Row::new(
            vec!["name".into(), "active".into()],
            vec![SqlValue::from("widget"), SqlValue::BigInt(1)],
        );
        let json = parent().row_to_json(&row);
        assert_eq!(
            json,
            json!({"name": "widget", "active": true, "id": 0, "related_models": []})
        );
    }

    #[test]
    fn test_record_values_coerce_types() {
        let values = parent()
            .record_values(&json!({"id": 3, "name": "a", "active": false, "related_models": []}))
            .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values["id"], SqlValue::BigInt(3));
        assert_eq!(values["active"], SqlValue::Bool(false));
        assert!(parent().record_values(&json!([1, 2])).is_err());
    }
}
