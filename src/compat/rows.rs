//! Row cursors returned by `DB::rows` and `DB::row`
//!
//! Results are fetched in full before the cursor is handed out, so a
//! cursor never holds a pool connection.

use crate::database::{Row, SqlValue};
use crate::error::{Error, Result};
use crate::models::Model;
use serde::de::DeserializeOwned;

/// Buffered cursor over a result set
#[derive(Debug, Clone, Default)]
pub struct Rows {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
    current: Option<Row>,
    error: Option<Error>,
    closed: bool,
}

impl Rows {
    pub fn new(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.columns().to_vec())
            .unwrap_or_default();
        Self::with_columns(columns, rows)
    }

    /// Cursor with known column names, which may have no rows at all
    pub fn with_columns(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
            ..Self::default()
        }
    }

    /// A closed cursor carrying the error that prevented the query
    pub fn failed(error: Error) -> Self {
        Self {
            error: Some(error),
            closed: true,
            ..Self::default()
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Advance to the next row; false once exhausted or closed
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.rows.next();
        if self.current.is_none() {
            self.close();
            return false;
        }
        true
    }

    /// Values of the current row
    pub fn values(&self) -> Option<&[SqlValue]> {
        self.current.as_ref().map(Row::values)
    }

    pub fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    /// Decode the current row by column name
    pub fn scan<T: DeserializeOwned>(&self) -> Result<T> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| Error::invalid_input("sql: Scan called without calling Next"))?;
        Ok(serde_json::from_value(row.to_json())?)
    }

    pub fn err(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Release the buffered rows; further `next` calls return false
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.rows = Vec::new().into_iter();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write the current row into the column fields of `dest`, in
    /// declaration order
    pub(crate) fn scan_positional<T: Model>(&self, dest: &mut T) -> Result<()> {
        let values = self
            .values()
            .ok_or_else(|| Error::invalid_input("sql: Scan called without calling Next"))?;
        let schema = T::schema();
        let fields: Vec<_> = schema.column_fields().collect();
        if fields.len() != values.len() {
            return Err(Error::invalid_input(format!(
                "sql: expected {} destination arguments in Scan, not {}",
                values.len(),
                fields.len()
            )));
        }

        let mut record = serde_json::to_value(&*dest)?;
        let object = record.as_object_mut().ok_or(Error::Unaddressable)?;
        for (field, value) in fields.iter().zip(values) {
            object.insert(field.db_name.clone(), field.to_json(value));
        }
        *dest = serde_json::from_value(record)?;
        Ok(())
    }
}

/// Single-row result, as returned by `DB::row`
#[derive(Debug, Clone)]
pub struct RowResult {
    row: Option<Row>,
    error: Option<Error>,
}

impl RowResult {
    pub fn new(result: Result<Option<Row>>) -> Self {
        match result {
            Ok(row) => Self { row, error: None },
            Err(err) => Self {
                row: None,
                error: Some(err),
            },
        }
    }

    /// Decode the row; `RecordNotFound` when the query matched nothing
    pub fn scan<T: DeserializeOwned>(&self) -> Result<T> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let row = self.row.as_ref().ok_or(Error::RecordNotFound)?;
        Ok(serde_json::from_value(row.to_json())?)
    }

    pub fn values(&self) -> Option<&[SqlValue]> {
        self.row.as_ref().map(Row::values)
    }

    pub fn err(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        id: i64,
        name: String,
    }

    fn sample() -> Vec<Row> {
        let columns = vec!["id".to_string(), "name".to_string()];
        vec![
            Row::new(columns.clone(), vec![SqlValue::BigInt(1), SqlValue::String("a".into())]),
            Row::new(columns, vec![SqlValue::BigInt(2), SqlValue::String("b".into())]),
        ]
    }

    #[test]
    fn test_cursor_walks_and_closes() {
        let mut rows = Rows::new(sample());
        assert_eq!(rows.columns(), ["id", "name"]);
        assert!(rows.values().is_none());
        assert!(rows.scan::<Pair>().is_err());

        assert!(rows.next());
        assert_eq!(rows.scan::<Pair>().unwrap(), Pair { id: 1, name: "a".into() });
        assert!(rows.next());
        assert_eq!(rows.values().map(<[SqlValue]>::len), Some(2));
        assert!(!rows.next());
        assert!(rows.is_closed());
        assert!(!rows.next());
        assert!(rows.err().is_none());
    }

    #[test]
    fn test_empty_cursor_keeps_columns() {
        let mut rows = Rows::with_columns(vec!["id".into(), "name".into()], Vec::new());
        assert_eq!(rows.columns(), ["id", "name"]);
        assert!(!rows.next());
        assert!(rows.is_closed());
        assert!(Rows::new(Vec::new()).columns().is_empty());
    }

    #[test]
    fn test_failed_cursor() {
        let mut rows = Rows::failed(Error::InvalidSql);
        assert!(!rows.next());
        assert_eq!(rows.err(), Some(&Error::InvalidSql));
    }

    #[test]
    fn test_row_result() {
        let found = RowResult::new(Ok(sample().into_iter().next()));
        assert_eq!(found.scan::<Pair>().unwrap().name, "a");

        let missing = RowResult::new(Ok(None));
        assert_eq!(missing.scan::<Pair>(), Err(Error::RecordNotFound));

        let failed = RowResult::new(Err(Error::InvalidTransaction));
        assert_eq!(failed.scan::<Pair>(), Err(Error::InvalidTransaction));
    }
}
