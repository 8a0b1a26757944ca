//! Model reflection and statement building

use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod naming;
pub mod query_builder;
pub mod scan;
pub mod schema;

pub use naming::NamingStrategy;
pub use scan::{ModelDest, ScanDest};
pub use schema::{
    DataType, FieldRef, FieldSchema, ModelSchema, ModelSchemaBuilder, Reference,
    RelationshipSchema, RelationshipType,
};

// Re-export query builder components
pub use query_builder::{
    Arg, DatabaseBackend, OrderDirection, QueryBuilder, QueryError, SchemaBuilder, SqlDialect,
    SqlExpr, SqlValue,
};

/// A struct stored in a table
///
/// The schema is usually kept in a `once_cell::sync::Lazy` static:
///
/// ```ignore
/// static USER: Lazy<ModelSchema> = Lazy::new(|| {
///     ModelSchema::builder("User")
///         .id()
///         .field(FieldSchema::new("Name", DataType::String).size(100))
///         .build()
/// });
///
/// impl Model for User {
///     fn schema() -> &'static ModelSchema {
///         &USER
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn schema() -> &'static ModelSchema;
}
