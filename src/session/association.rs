//! Association mode: query and modify one relationship of a model value

use super::{Session, Values};
use crate::database::SqlValue;
use crate::error::{Error, Result};
use crate::models::query_builder::{Arg, QueryBuilder, SqlExpr};
use crate::models::{ModelDest, ModelSchema, Reference, RelationshipSchema, RelationshipType};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

pub struct Association {
    session: Session,
    owner: &'static ModelSchema,
    record: JsonValue,
    relationship: Option<RelationshipSchema>,
    error: Option<Error>,
}

impl Session {
    /// Association `name` of the value passed to `model`
    pub fn association(&self, name: &str) -> Association {
        let session = self.new_session();
        let (Some(owner), Some(record)) = (self.schema, self.model_record.clone()) else {
            return Association {
                session,
                owner: empty_schema(),
                record: JsonValue::Null,
                relationship: None,
                error: Some(Error::invalid_input("association requires a model value")),
            };
        };
        let relationship = owner.relationship(name).cloned();
        let error = match (&self.error, &relationship) {
            (Some(err), _) => Some(err.clone()),
            (None, None) => Some(Error::invalid_input(format!("unsupported relations: {}", name))),
            (None, Some(_)) => None,
        };
        Association {
            session,
            owner,
            record,
            relationship,
            error,
        }
    }
}

fn empty_schema() -> &'static ModelSchema {
    static EMPTY: once_cell::sync::Lazy<ModelSchema> =
        once_cell::sync::Lazy::new(|| ModelSchema::builder("").build());
    &EMPTY
}

impl Association {
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    fn parts(&self) -> Result<(&RelationshipSchema, Vec<Reference>)> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let relationship = self
            .relationship
            .as_ref()
            .ok_or_else(|| Error::invalid_input("unsupported relations"))?;
        let references = relationship.references(self.owner, self.session.naming());
        if references.is_empty() {
            return Err(Error::invalid_input(format!(
                "invalid association {}: no foreign key found",
                relationship.name
            )));
        }
        Ok((relationship, references))
    }

    fn owner_value(&self, column: &str) -> SqlValue {
        self.record
            .get(column)
            .map(SqlValue::from_json)
            .unwrap_or(SqlValue::Null)
    }

    /// Query over the related table restricted to this owner
    fn related_query(&self) -> Result<Session> {
        let (relationship, references) = self.parts()?;
        let related = relationship.related_schema();
        let base = self.session.new_session().apply_schema(related);
        let reference = &references[0];

        Ok(match relationship.kind {
            RelationshipType::HasOne | RelationshipType::HasMany => base.where_(
                reference.foreign_key.db_name.as_str(),
                vec![Arg::Scalar(self.owner_value(&reference.primary_key.db_name))],
            ),
            RelationshipType::BelongsTo => base.where_(
                reference.primary_key.db_name.as_str(),
                vec![Arg::Scalar(self.owner_value(&reference.foreign_key.db_name))],
            ),
            RelationshipType::ManyToMany => {
                let other = &references[1];
                let dialect = self.session.dialect();
                let q = |table: &str, column: &str| {
                    format!(
                        "{}.{}",
                        dialect.quote_identifier(table),
                        dialect.quote_identifier(column)
                    )
                };
                let join_table = &reference.foreign_key.table;
                let related_table = &other.primary_key.table;
                base.select(&format!("{}.*", dialect.quote_identifier(related_table)), Vec::new())
                    .joins(
                        &format!(
                            "INNER JOIN {} ON {} = {}",
                            dialect.quote_identifier(join_table),
                            q(join_table, &other.foreign_key.db_name),
                            q(related_table, &other.primary_key.db_name)
                        ),
                        Vec::new(),
                    )
                    .where_(
                        SqlExpr::new(
                            format!("{} = ?", q(join_table, &reference.foreign_key.db_name)),
                            vec![Arg::Scalar(self.owner_value(&reference.primary_key.db_name))],
                        ),
                        Vec::new(),
                    )
            }
        })
    }

    /// Load the associated records into `dest`
    pub async fn find<T: ModelDest>(&self, dest: &mut T) -> Result<u64> {
        self.related_query()?.find(dest).await
    }

    pub async fn count(&self) -> Result<i64> {
        self.related_query()?.count().await
    }

    /// Save `values` and link them to the owner
    pub async fn append<T: ModelDest>(&self, values: &mut T) -> Result<()> {
        let (relationship, references) = self.parts()?;
        let related = relationship.related_schema();
        let writer = self.session.new_session().apply_schema(related);
        let reference = &references[0];
        let mut records = values.records()?;

        match relationship.kind {
            RelationshipType::HasOne | RelationshipType::HasMany => {
                let key = self.owner_value(&reference.primary_key.db_name);
                let mut link = IndexMap::new();
                link.insert(reference.foreign_key.db_name.clone(), key);
                for record in records.iter_mut() {
                    related.assign_values(record, &link);
                    writer.save_record(related, record).await?;
                }
            }
            RelationshipType::BelongsTo => {
                let Some(record) = records.first_mut() else {
                    return Ok(());
                };
                writer.save_record(related, record).await?;
                let target = related.primary_key_value(record).unwrap_or(SqlValue::Null);
                self.owner_update(&reference.foreign_key.db_name, target).await?;
            }
            RelationshipType::ManyToMany => {
                let other = &references[1];
                let owner_key = self.owner_value(&reference.primary_key.db_name);
                for record in records.iter_mut() {
                    writer.save_record(related, record).await?;
                    let target = related.primary_key_value(record).unwrap_or(SqlValue::Null);
                    self.link(reference, other, owner_key.clone(), target).await?;
                }
            }
        }

        values.set_records(records)
    }

    /// Unlink every associated record without deleting it
    pub async fn clear(&self) -> Result<u64> {
        let (relationship, references) = self.parts()?;
        let reference = &references[0];

        match relationship.kind {
            RelationshipType::HasOne | RelationshipType::HasMany => {
                let related = relationship.related_schema();
                self.session
                    .new_session()
                    .apply_schema(related)
                    .where_(
                        reference.foreign_key.db_name.as_str(),
                        vec![Arg::Scalar(self.owner_value(&reference.primary_key.db_name))],
                    )
                    .update_columns(Values::new().set(
                        reference.foreign_key.db_name.as_str(),
                        SqlValue::Null,
                    ))
                    .await
            }
            RelationshipType::BelongsTo => {
                self.owner_update(&reference.foreign_key.db_name, SqlValue::Null)
                    .await
            }
            RelationshipType::ManyToMany => {
                let statement = QueryBuilder::new(self.session.dialect())
                    .from(reference.foreign_key.table.clone())
                    .where_eq(
                        reference.foreign_key.db_name.clone(),
                        self.owner_value(&reference.primary_key.db_name),
                    );
                let (sql, params) = statement.build_delete()?;
                Ok(self.session.execute_sql(&sql, params).await?.rows_affected)
            }
        }
    }

    async fn owner_update(&self, column: &str, value: SqlValue) -> Result<u64> {
        let pk = self
            .owner
            .primary_key()
            .ok_or_else(|| Error::invalid_input(format!("{} has no primary key", self.owner.name)))?;
        self.session
            .new_session()
            .apply_schema(self.owner)
            .where_(
                pk.db_name.as_str(),
                vec![Arg::Scalar(self.owner_value(&pk.db_name))],
            )
            .update_columns(Values::new().set(column, value))
            .await
    }

    /// Insert a join row unless it exists
    async fn link(
        &self,
        own: &Reference,
        other: &Reference,
        owner_key: SqlValue,
        target: SqlValue,
    ) -> Result<()> {
        let join = QueryBuilder::new(self.session.dialect())
            .from(own.foreign_key.table.clone())
            .where_eq(own.foreign_key.db_name.clone(), owner_key.clone())
            .where_eq(other.foreign_key.db_name.clone(), target.clone());
        let (sql, params) = join.build_count()?;
        let existing = self.session.fetch_sql(&sql, params).await?;
        let linked = existing
            .first()
            .and_then(|row| row.get_index(0))
            .and_then(SqlValue::as_i64)
            .unwrap_or(0);
        if linked > 0 {
            return Ok(());
        }

        let mut row = IndexMap::new();
        row.insert(own.foreign_key.db_name.clone(), owner_key);
        row.insert(other.foreign_key.db_name.clone(), target);
        let (sql, params) = join.build_insert(&row, &[])?;
        self.session.execute_sql(&sql, params).await?;
        Ok(())
    }
}
