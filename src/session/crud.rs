//! Finishers: statements that run the accumulated query

use super::{preload, Session};
use crate::database::{Row, SqlValue};
use crate::error::{Error, Result};
use crate::models::query_builder::{
    Arg, Condition, DatabaseBackend, OrderDirection, SqlExpr, WhereConnector,
};
use crate::models::scan::rows_to_records;
use crate::models::{Model, ModelDest, ModelSchema, ScanDest};
use chrono::Utc;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Column assignments for `updates`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values(pub IndexMap<String, Arg>);

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn columns<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Arg>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Non-zero columns of a model, primary key excluded
    pub fn from_model<T: Model>(value: &T) -> Result<Self> {
        let schema = T::schema();
        let pk = schema.primary_key().map(|f| f.db_name.as_str());
        let record = serde_json::to_value(value)?;
        Ok(Self(
            schema
                .record_values(&record)?
                .into_iter()
                .filter(|(column, value)| Some(column.as_str()) != pk && !value.is_zero())
                .map(|(column, value)| (column, Arg::Scalar(value)))
                .collect(),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<IndexMap<String, Arg>> for Values {
    fn from(map: IndexMap<String, Arg>) -> Self {
        Self(map)
    }
}

impl From<IndexMap<String, SqlValue>> for Values {
    fn from(map: IndexMap<String, SqlValue>) -> Self {
        Self(map.into_iter().map(|(k, v)| (k, Arg::Scalar(v))).collect())
    }
}

/// Keys are sorted so the generated SQL is stable
impl From<HashMap<String, SqlValue>> for Values {
    fn from(map: HashMap<String, SqlValue>) -> Self {
        let mut pairs: Vec<(String, SqlValue)> = map.into_iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Self(pairs.into_iter().map(|(k, v)| (k, Arg::Scalar(v))).collect())
    }
}

fn now() -> SqlValue {
    SqlValue::DateTime(Utc::now().to_rfc3339())
}

/// Unset timestamps serialize as null or as one of the zero instants
fn is_zero_time(value: &SqlValue) -> bool {
    match value {
        SqlValue::DateTime(s) | SqlValue::String(s) => {
            s.is_empty() || s.starts_with("0001-01-01") || s.starts_with("1970-01-01T00:00:00")
        }
        other => other.is_zero(),
    }
}

impl Session {
    /// Insert one record or a vector of records
    ///
    /// Generated keys and timestamps are written back into `value`.
    pub async fn create<T: ModelDest>(&self, value: &mut T) -> Result<u64> {
        self.check()?;
        let schema = value.schema();
        let session = self.clone().apply_schema(schema);

        let mut records = value.records()?;
        let mut affected = 0;
        for record in records.iter_mut() {
            affected += session.insert_record(schema, record).await?;
        }
        value.set_records(records)?;
        Ok(affected)
    }

    /// Update every column by primary key, inserting when nothing matched
    pub async fn save<T: ModelDest>(&self, value: &mut T) -> Result<u64> {
        self.check()?;
        let schema = value.schema();
        let session = self.clone().apply_schema(schema);

        let mut records = value.records()?;
        let mut affected = 0;
        for record in records.iter_mut() {
            affected += session.save_record(schema, record).await?;
        }
        value.set_records(records)?;
        Ok(affected)
    }

    pub(crate) async fn save_record(
        &self,
        schema: &'static ModelSchema,
        record: &mut JsonValue,
    ) -> Result<u64> {
        match schema.primary_key_value(record).filter(|v| !v.is_zero()) {
            None => self.insert_record(schema, record).await,
            Some(id) => match self.update_record(schema, record, id).await? {
                0 => self.insert_record(schema, record).await,
                n => Ok(n),
            },
        }
    }

    pub(crate) async fn insert_record(
        &self,
        schema: &'static ModelSchema,
        record: &mut JsonValue,
    ) -> Result<u64> {
        let mut values = schema.record_values(record)?;
        let mut assigned = IndexMap::new();

        for field in ["CreatedAt", "UpdatedAt"] {
            if let Some(column) = schema.column_of(field) {
                if let Some(value) = values.get_mut(column) {
                    if is_zero_time(value) {
                        *value = now();
                        assigned.insert(column.to_string(), value.clone());
                    }
                }
            }
        }

        // Zero auto-increment keys are left to the database
        let generated = schema
            .primary_key()
            .filter(|pk| pk.auto_increment)
            .filter(|pk| values.get(&pk.db_name).map_or(true, SqlValue::is_zero));
        if let Some(pk) = generated {
            values.shift_remove(&pk.db_name);
        }

        // Postgres reports no last insert id
        let returning = match generated {
            Some(pk) if self.statement.backend() == DatabaseBackend::Postgres => {
                vec![pk.db_name.clone()]
            }
            _ => Vec::new(),
        };

        let (sql, params) = self.statement.build_insert(&values, &returning)?;

        let (affected, id) = if returning.is_empty() {
            let result = self.execute_sql(&sql, params).await?;
            (result.rows_affected, result.last_insert_id.map(SqlValue::BigInt))
        } else {
            let rows = self.fetch_sql(&sql, params).await?;
            let id = rows.first().and_then(|row| row.get_index(0)).cloned();
            (rows.len() as u64, id)
        };

        if let (Some(pk), Some(id)) = (generated, id) {
            assigned.insert(pk.db_name.clone(), id);
        }
        schema.assign_values(record, &assigned);
        Ok(affected)
    }

    async fn update_record(
        &self,
        schema: &'static ModelSchema,
        record: &mut JsonValue,
        id: SqlValue,
    ) -> Result<u64> {
        let Some(pk) = schema.primary_key() else {
            return Ok(0);
        };

        let mut values = schema.record_values(record)?;
        values.shift_remove(&pk.db_name);

        if let Some(column) = schema.column_of("CreatedAt") {
            if values.get(column).is_some_and(is_zero_time) {
                values.shift_remove(column);
            }
        }
        let mut assigned = IndexMap::new();
        if let Some(column) = schema.column_of("UpdatedAt") {
            values.insert(column.to_string(), now());
            assigned.insert(column.to_string(), now());
        }
        if values.is_empty() {
            return Ok(0);
        }

        let data: IndexMap<String, Arg> = values
            .into_iter()
            .map(|(column, value)| (column, Arg::Scalar(value)))
            .collect();
        let statement = self.statement.clone().where_eq(pk.db_name.clone(), id);
        let (sql, params) = statement.build_update(&data)?;
        let result = self.execute_sql(&sql, params).await?;

        if result.rows_affected > 0 {
            schema.assign_values(record, &assigned);
        }
        Ok(result.rows_affected)
    }

    /// Delete by the value's primary keys plus the chained conditions
    ///
    /// Models with a `DeletedAt` column are soft deleted unless the chain
    /// is unscoped.
    pub async fn delete<T: ModelDest>(&self, value: &T) -> Result<u64> {
        self.check()?;
        let schema = value.schema();
        let mut session = self.clone().apply_schema(schema);

        if let Some(pk) = schema.primary_key() {
            let mut ids: Vec<SqlValue> = value
                .records()?
                .iter()
                .filter_map(|record| schema.primary_key_value(record))
                .filter(|id| !id.is_zero())
                .collect();
            session.statement = match ids.len() {
                0 => session.statement,
                1 => session.statement.where_eq(pk.db_name.clone(), ids.remove(0)),
                _ => session.statement.where_in(pk.db_name.clone(), ids),
            };
        }

        let (sql, params) = match schema.soft_delete_column() {
            Some(column) if !session.statement.unscoped => {
                let mut data = IndexMap::new();
                data.insert(column.to_string(), Arg::Scalar(now()));
                session.statement.build_update(&data)?
            }
            _ => session.statement.build_delete()?,
        };

        Ok(session.execute_sql(&sql, params).await?.rows_affected)
    }

    /// Update columns of the matched rows, touching `UpdatedAt`
    pub async fn updates(&self, values: impl Into<Values>) -> Result<u64> {
        self.update_with(values.into(), true).await
    }

    pub async fn update(&self, column: &str, value: impl Into<Arg>) -> Result<u64> {
        self.updates(Values::new().set(column, value)).await
    }

    /// Update columns without touching `UpdatedAt`
    pub async fn update_columns(&self, values: impl Into<Values>) -> Result<u64> {
        self.update_with(values.into(), false).await
    }

    pub async fn update_column(&self, column: &str, value: impl Into<Arg>) -> Result<u64> {
        self.update_columns(Values::new().set(column, value)).await
    }

    async fn update_with(&self, values: Values, touch: bool) -> Result<u64> {
        self.check()?;

        let mut data: IndexMap<String, Arg> = values
            .0
            .into_iter()
            .map(|(column, value)| (self.column_name(&column), value))
            .collect();

        let mut statement = self.statement.clone();
        if let Some(schema) = self.schema {
            let id = self
                .model_record
                .as_ref()
                .and_then(|record| schema.primary_key_value(record))
                .filter(|id| !id.is_zero());
            if let (Some(pk), Some(id)) = (schema.primary_key(), id) {
                statement = statement.where_eq(pk.db_name.clone(), id);
            }
            if touch {
                if let Some(column) = schema.column_of("UpdatedAt") {
                    if !data.contains_key(column) {
                        data.insert(column.to_string(), Arg::Scalar(now()));
                    }
                }
            }
        }

        let (sql, params) = statement.build_update(&data)?;
        Ok(self.execute_sql(&sql, params).await?.rows_affected)
    }

    /// First record by primary key
    pub async fn first<T: ModelDest>(&self, dest: &mut T) -> Result<()> {
        self.find_one(dest, Some(OrderDirection::Asc)).await
    }

    /// First record in no particular order
    pub async fn take<T: ModelDest>(&self, dest: &mut T) -> Result<()> {
        self.find_one(dest, None).await
    }

    /// Last record by primary key
    pub async fn last<T: ModelDest>(&self, dest: &mut T) -> Result<()> {
        self.find_one(dest, Some(OrderDirection::Desc)).await
    }

    async fn find_one<T: ModelDest>(
        &self,
        dest: &mut T,
        direction: Option<OrderDirection>,
    ) -> Result<()> {
        self.check()?;
        let schema = dest.schema();
        let mut session = self.clone().apply_schema(schema);
        if let Some(direction) = direction {
            session = session.order_by_key(schema, direction);
        }
        session.statement = session.statement.limit(1);

        let (sql, params) = session.statement.build()?;
        let rows = session.fetch_sql(&sql, params).await?;
        if rows.is_empty() {
            return Err(Error::RecordNotFound);
        }

        let mut records = rows_to_records(schema, &rows);
        session.preload_into(schema, &mut records).await?;
        dest.set_records(records)
    }

    /// Every matching record
    ///
    /// A single-model destination takes the first row and is left
    /// untouched when nothing matches.
    pub async fn find<T: ModelDest>(&self, dest: &mut T) -> Result<u64> {
        self.check()?;
        let schema = dest.schema();
        let session = self.clone().apply_schema(schema);

        let (sql, params) = session.statement.build()?;
        let rows = session.fetch_sql(&sql, params).await?;
        let mut records = rows_to_records(schema, &rows);
        session.preload_into(schema, &mut records).await?;

        let found = records.len() as u64;
        dest.set_records(records)?;
        Ok(found)
    }

    async fn preload_into(&self, schema: &'static ModelSchema, records: &mut [JsonValue]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        for name in &self.preloads {
            preload::preload(self, schema, records, name).await?;
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        self.check()?;
        let (sql, params) = self.statement.build_count()?;
        let rows = self.fetch_sql(&sql, params).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_index(0))
            .and_then(SqlValue::as_i64)
            .unwrap_or(0))
    }

    /// Values of one column
    pub async fn pluck<T: DeserializeOwned>(&self, column: &str) -> Result<Vec<T>> {
        self.check()?;
        let statement = self.statement.clone().clear_select().select_columns([column]);
        let (sql, params) = statement.build()?;
        let rows = self.fetch_sql(&sql, params).await?;
        rows.iter()
            .map(|row| {
                let value = row.get_index(0).map(SqlValue::to_json).unwrap_or_default();
                serde_json::from_value(value).map_err(Error::from)
            })
            .collect()
    }

    /// Run the SELECT (or raw statement) into an arbitrary destination
    pub async fn scan<D: ScanDest>(&self, dest: &mut D) -> Result<usize> {
        let rows = self.rows().await?;
        dest.load_rows(rows)
    }

    pub async fn rows(&self) -> Result<Vec<Row>> {
        self.check()?;
        let (sql, params) = self.statement.build()?;
        self.fetch_sql(&sql, params).await
    }

    /// Column names of the built query, without running it
    pub async fn columns(&self) -> Result<Vec<String>> {
        self.check()?;
        let (sql, _) = self.statement.build()?;
        self.describe_sql(&sql).await
    }

    pub async fn row(&self) -> Result<Option<Row>> {
        Ok(self.rows().await?.into_iter().next())
    }

    /// Execute raw SQL; returns the affected row count
    pub async fn exec(&self, sql: &str, args: Vec<Arg>) -> Result<u64> {
        self.check()?;
        let statement = self.statement.clone().raw(SqlExpr::new(sql, args));
        let (sql, params) = statement.build()?;
        Ok(self.execute_sql(&sql, params).await?.rows_affected)
    }

    /// Find the first match or insert one built from the equality
    /// conditions and assigned attributes; returns whether it inserted
    pub async fn first_or_create<T: Model>(&self, value: &mut T) -> Result<bool> {
        let schema = T::schema();
        match self.first(value).await {
            Ok(()) => {
                if !self.assigns.is_empty() {
                    let mut record = serde_json::to_value(&*value)?;
                    if let (Some(pk), Some(id)) =
                        (schema.primary_key(), schema.primary_key_value(&record))
                    {
                        self.new_session()
                            .apply_schema(schema)
                            .where_(pk.db_name.as_str(), vec![Arg::Scalar(id)])
                            .update_columns(IndexMap::clone(&self.assigns))
                            .await?;
                    }
                    schema.assign_values(&mut record, &self.assigns);
                    *value = serde_json::from_value(record)?;
                }
                Ok(false)
            }
            Err(err) if err.is_record_not_found() => {
                let mut attrs = self.equality_conditions();
                attrs.extend(self.assigns.clone());

                let mut record = serde_json::to_value(&*value)?;
                schema.assign_values(&mut record, &attrs);
                let session = self.new_session().apply_schema(schema);
                session.insert_record(schema, &mut record).await?;
                *value = serde_json::from_value(record)?;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// `column = value` pairs among the top-level AND conditions
    fn equality_conditions(&self) -> IndexMap<String, SqlValue> {
        let mut attrs = IndexMap::new();
        let mut collect = |condition: &Condition| {
            if let Condition::Eq { column, value } = condition {
                let column = column.rsplit('.').next().unwrap_or(column);
                attrs.insert(column.to_string(), value.clone());
            }
        };
        for wc in &self.statement.where_conditions {
            if wc.negate || wc.connector == WhereConnector::Or {
                continue;
            }
            match &wc.condition {
                Condition::Group(inner) => inner.iter().for_each(|c| collect(&c.condition)),
                other => collect(other),
            }
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_times() {
        assert!(is_zero_time(&SqlValue::Null));
        assert!(is_zero_time(&SqlValue::DateTime("0001-01-01T00:00:00Z".into())));
        assert!(is_zero_time(&SqlValue::DateTime("1970-01-01T00:00:00+00:00".into())));
        assert!(!is_zero_time(&SqlValue::DateTime("2024-05-01T10:00:00Z".into())));
    }

    #[test]
    fn test_values_builders() {
        let values = Values::new().set("name", "x").set("age", 3);
        assert_eq!(values.0.len(), 2);

        let mut map = HashMap::new();
        map.insert("b".to_string(), SqlValue::Int(1));
        map.insert("a".to_string(), SqlValue::Int(2));
        let values = Values::from(map);
        assert_eq!(values.0.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
