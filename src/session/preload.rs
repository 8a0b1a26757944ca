//! Eager loading of associations
//!
//! One extra query per association and level, keyed by the values the
//! parent records already hold.

use super::Session;
use crate::database::{Row, SqlValue};
use crate::error::{Error, OptionExt, Result};
use crate::models::query_builder::{Arg, SqlExpr};
use crate::models::scan::rows_to_records;
use crate::models::{ModelSchema, Reference, RelationshipSchema, RelationshipType};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Column holding the owner key in many-to-many preload rows
const OWNER_KEY: &str = "__owner_key";

/// Fill association `name` on every record
pub(crate) async fn preload(
    session: &Session,
    owner: &'static ModelSchema,
    records: &mut [JsonValue],
    name: &str,
) -> Result<()> {
    let relationship = owner
        .relationship(name)
        .context(format!("unsupported relations: {}", name))?;
    let references = relationship.references(owner, session.naming());
    let Some(reference) = references.first() else {
        return Err(Error::invalid_input(format!(
            "invalid association {}: no foreign key found",
            name
        )));
    };
    let field = owner
        .field(&relationship.name)
        .map(|f| f.db_name.clone())
        .unwrap_or_else(|| relationship.name.clone());

    #[cfg(debug_assertions)]
    log::debug!("Preloading {}.{} for {} records", owner.name, name, records.len());

    match relationship.kind {
        RelationshipType::HasOne | RelationshipType::HasMany => {
            let keys = distinct_keys(records, &reference.primary_key.db_name);
            let related = relationship.related_schema();
            let rows = fetch_related(session, related, &reference.foreign_key.db_name, keys).await?;
            let grouped = group_by_column(related, &rows, &reference.foreign_key.db_name);
            assign(records, &field, &reference.primary_key.db_name, &grouped, relationship.kind);
        }
        RelationshipType::BelongsTo => {
            let keys = distinct_keys(records, &reference.foreign_key.db_name);
            let related = relationship.related_schema();
            let rows = fetch_related(session, related, &reference.primary_key.db_name, keys).await?;
            let grouped = group_by_column(related, &rows, &reference.primary_key.db_name);
            assign(records, &field, &reference.foreign_key.db_name, &grouped, relationship.kind);
        }
        RelationshipType::ManyToMany => {
            let grouped = fetch_many_to_many(session, relationship, &references, records).await?;
            assign(records, &field, &reference.primary_key.db_name, &grouped, relationship.kind);
        }
    }

    Ok(())
}

/// Hashable form of a JSON key
fn key_of(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn distinct_keys(records: &[JsonValue], column: &str) -> Vec<SqlValue> {
    let mut seen = std::collections::HashSet::new();
    records
        .iter()
        .filter_map(|record| record.get(column))
        .filter(|value| key_of(value).is_some_and(|k| seen.insert(k)))
        .map(SqlValue::from_json)
        .collect()
}

async fn fetch_related(
    session: &Session,
    related: &'static ModelSchema,
    column: &str,
    keys: Vec<SqlValue>,
) -> Result<Vec<Row>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let lookup = session
        .new_session()
        .apply_schema(related)
        .where_(column, vec![Arg::Slice(keys)]);
    lookup.rows().await
}

fn group_by_column(
    schema: &ModelSchema,
    rows: &[Row],
    column: &str,
) -> HashMap<String, Vec<JsonValue>> {
    let mut grouped: HashMap<String, Vec<JsonValue>> = HashMap::new();
    for (row, record) in rows.iter().zip(rows_to_records(schema, rows)) {
        if let Some(key) = row.get(column).map(SqlValue::to_json).as_ref().and_then(key_of) {
            grouped.entry(key).or_default().push(record);
        }
    }
    grouped
}

fn assign(
    records: &mut [JsonValue],
    field: &str,
    key_column: &str,
    grouped: &HashMap<String, Vec<JsonValue>>,
    kind: RelationshipType,
) {
    for record in records.iter_mut() {
        let matches = record
            .get(key_column)
            .and_then(key_of)
            .and_then(|key| grouped.get(&key).cloned())
            .unwrap_or_default();
        let value = match kind {
            RelationshipType::HasMany | RelationshipType::ManyToMany => JsonValue::Array(matches),
            RelationshipType::HasOne | RelationshipType::BelongsTo => {
                matches.into_iter().next().unwrap_or(JsonValue::Null)
            }
        };
        if let Some(object) = record.as_object_mut() {
            object.insert(field.to_string(), value);
        }
    }
}

async fn fetch_many_to_many(
    session: &Session,
    relationship: &RelationshipSchema,
    references: &[Reference],
    records: &[JsonValue],
) -> Result<HashMap<String, Vec<JsonValue>>> {
    let (Some(own), Some(other)) = (references.first(), references.get(1)) else {
        return Err(Error::invalid_input(format!(
            "invalid association {}: join keys missing",
            relationship.name
        )));
    };
    let keys = distinct_keys(records, &own.primary_key.db_name);
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let dialect = session.dialect();
    let related = relationship.related_schema();
    let related_table = other.primary_key.table.clone();
    let join_table = own.foreign_key.table.clone();
    let quoted = |table: &str, column: &str| {
        format!(
            "{}.{}",
            dialect.quote_identifier(table),
            dialect.quote_identifier(column)
        )
    };

    let lookup = session
        .new_session()
        .apply_schema(related)
        .select(
            &format!(
                "{}.*, {} AS {}",
                dialect.quote_identifier(&related_table),
                quoted(&join_table, &own.foreign_key.db_name),
                OWNER_KEY
            ),
            Vec::new(),
        )
        .joins(
            &format!(
                "INNER JOIN {} ON {} = {}",
                dialect.quote_identifier(&join_table),
                quoted(&join_table, &other.foreign_key.db_name),
                quoted(&related_table, &other.primary_key.db_name)
            ),
            Vec::new(),
        )
        .where_(
            SqlExpr::new(
                format!("{} IN (?)", quoted(&join_table, &own.foreign_key.db_name)),
                vec![Arg::Slice(keys)],
            ),
            Vec::new(),
        );
    let rows = lookup.rows().await?;

    let mut grouped: HashMap<String, Vec<JsonValue>> = HashMap::new();
    for (row, mut record) in rows.iter().zip(rows_to_records(related, &rows)) {
        if let Some(object) = record.as_object_mut() {
            object.remove(OWNER_KEY);
        }
        if let Some(key) = row.get(OWNER_KEY).map(SqlValue::to_json).as_ref().and_then(key_of) {
            grouped.entry(key).or_default().push(record);
        }
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_distinct_keys_skip_nulls_and_duplicates() {
        let records = vec![
            json!({"id": 1, "owner_id": 7}),
            json!({"id": 2, "owner_id": 7}),
            json!({"id": 3, "owner_id": null}),
        ];
        let keys = distinct_keys(&records, "owner_id");
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_assign_by_kind() {
        let mut grouped = HashMap::new();
        grouped.insert("1".to_string(), vec![json!({"id": 10}), json!({"id": 11})]);

        let mut records = vec![json!({"id": 1}), json!({"id": 2})];
        assign(&mut records, "items", "id", &grouped, RelationshipType::HasMany);
        assert_eq!(records[0]["items"].as_array().map(Vec::len), Some(2));
        assert_eq!(records[1]["items"], json!([]));

        assign(&mut records, "item", "id", &grouped, RelationshipType::HasOne);
        assert_eq!(records[0]["item"], json!({"id": 10}));
        assert_eq!(records[1]["item"], JsonValue::Null);
    }
}
