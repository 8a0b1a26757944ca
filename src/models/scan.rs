//! Destinations for fetched rows
//!
//! `ModelDest` is what the CRUD finishers write into: a single model or a
//! vector of models. `ScanDest` is looser and also accepts plain
//! deserializable structs for ad-hoc selects.

use crate::database::Row;
use crate::error::{Error, Result};
use crate::models::{Model, ModelSchema};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

pub trait ModelDest: Send {
    fn schema(&self) -> &'static ModelSchema;

    fn is_slice(&self) -> bool;

    /// Serialized records held by the destination
    fn records(&self) -> Result<Vec<JsonValue>>;

    /// Replace the destination's contents
    ///
    /// A single model keeps its current value when `records` is empty.
    fn set_records(&mut self, records: Vec<JsonValue>) -> Result<()>;
}

impl<T: Model> ModelDest for T {
    fn schema(&self) -> &'static ModelSchema {
        T::schema()
    }

    fn is_slice(&self) -> bool {
        false
    }

    fn records(&self) -> Result<Vec<JsonValue>> {
        Ok(vec![serde_json::to_value(self)?])
    }

    fn set_records(&mut self, records: Vec<JsonValue>) -> Result<()> {
        if let Some(record) = records.into_iter().next() {
            *self = serde_json::from_value(record)?;
        }
        Ok(())
    }
}

impl<T: Model> ModelDest for Vec<T> {
    fn schema(&self) -> &'static ModelSchema {
        T::schema()
    }

    fn is_slice(&self) -> bool {
        true
    }

    fn records(&self) -> Result<Vec<JsonValue>> {
        self.iter()
            .map(|item| serde_json::to_value(item).map_err(Error::from))
            .collect()
    }

    fn set_records(&mut self, records: Vec<JsonValue>) -> Result<()> {
        *self = records
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>()?;
        Ok(())
    }
}

pub trait ScanDest: Send {
    /// Load rows; returns how many were consumed
    fn load_rows(&mut self, rows: Vec<Row>) -> Result<usize>;
}

impl<T: Model> ScanDest for T {
    fn load_rows(&mut self, rows: Vec<Row>) -> Result<usize> {
        match rows.first() {
            Some(row) => {
                *self = serde_json::from_value(T::schema().row_to_json(row))?;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

impl<T: DeserializeOwned + Send> ScanDest for Vec<T> {
    fn load_rows(&mut self, rows: Vec<Row>) -> Result<usize> {
        let count = rows.len();
        *self = rows
            .iter()
            .map(|row| serde_json::from_value(row.to_json()))
            .collect::<std::result::Result<Vec<T>, _>>()?;
        Ok(count)
    }
}

impl<T: DeserializeOwned + Send> ScanDest for Option<T> {
    fn load_rows(&mut self, rows: Vec<Row>) -> Result<usize> {
        match rows.first() {
            Some(row) => {
                *self = Some(serde_json::from_value(row.to_json())?);
                Ok(1)
            }
            None => {
                *self = None;
                Ok(0)
            }
        }
    }
}

/// Rows decoded through a model schema
pub fn rows_to_records(schema: &ModelSchema, rows: &[Row]) -> Vec<JsonValue> {
    rows.iter().map(|row| schema.row_to_json(row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqlValue;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Summary {
        category: String,
        count: i64,
    }

    fn summary_row(category: &str, count: i64) -> Row {
        Row::new(
            vec!["category".into(), "count".into()],
            vec![SqlValue::from(category), SqlValue::BigInt(count)],
        )
    }

    #[test]
    fn test_scan_into_vec_of_structs() {
        let mut out: Vec<Summary> = Vec::new();
        let n = out
            .load_rows(vec![summary_row("A", 2), summary_row("B", 1)])
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(out[1], Summary { category: "B".into(), count: 1 });
    }

    #[test]
    fn test_scan_into_option() {
        let mut out: Option<Summary> = None;
        assert_eq!(out.load_rows(vec![summary_row("A", 2)]).unwrap(), 1);
        assert!(out.is_some());
        assert_eq!(out.load_rows(Vec::new()).unwrap(), 0);
        assert!(out.is_none());
    }
}
