//! Legacy result wrapper
//!
//! Every method of `DB` forwards to the engine session and returns a new
//! `DB`. Builder methods carry the caller's `error`, `rows_affected` and
//! `committed`; finishers replace `error` and `rows_affected` with the
//! engine outcome and keep the caller's session, so conditions added
//! before the finisher stay on the chain they were added to.

use super::association::Association;
use super::convert::{convert_to_int, NumericArg};
use super::dialect::{build_key_name, CommonDialect};
use super::rows::{RowResult, Rows};
use super::statement::Statement;
use crate::database::{DatabaseAdapter, SqlValue, TxOptions};
use crate::error::{Error, ErrorChain, Result};
use crate::models::query_builder::{Arg, SqlExpr};
use crate::models::{Model, ModelDest, ModelSchema, ScanDest};
use crate::session::{Session, TxContext, Values};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Result of a facade call
#[derive(Clone)]
pub struct DB {
    pub engine: Session,
    pub error: Option<Error>,
    pub rows_affected: i64,
    pub committed: bool,
}

/// Scope function applied by `DB::scopes`
pub type ScopeFn<'a> = &'a dyn Fn(DB) -> DB;

/// A table named directly or through its model
#[derive(Debug, Clone, Copy)]
pub enum TableRef<'a> {
    Name(&'a str),
    Schema(&'static ModelSchema),
}

impl TableRef<'_> {
    pub fn model<T: Model>() -> Self {
        TableRef::Schema(T::schema())
    }

    fn table_name(&self, engine: &Session) -> String {
        match self {
            TableRef::Name(name) => name.to_string(),
            TableRef::Schema(schema) => schema.table_name(engine.naming()),
        }
    }
}

impl<'a> From<&'a str> for TableRef<'a> {
    fn from(name: &'a str) -> Self {
        TableRef::Name(name)
    }
}

impl From<&'static ModelSchema> for TableRef<'_> {
    fn from(schema: &'static ModelSchema) -> Self {
        TableRef::Schema(schema)
    }
}

fn count_to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl DB {
    pub fn from_engine(engine: Session) -> Self {
        Self {
            engine,
            error: None,
            rows_affected: 0,
            committed: false,
        }
    }

    /// Builder result: new session, caller's state
    fn chain(&self, engine: Session) -> Self {
        Self {
            engine,
            error: self.error.clone(),
            rows_affected: self.rows_affected,
            committed: self.committed,
        }
    }

    /// Finisher result: caller's session, engine outcome
    fn outcome(&self, result: Result<u64>) -> Self {
        let (rows_affected, error) = match result {
            Ok(n) => (count_to_i64(n), None),
            Err(err) => (0, Some(err)),
        };
        Self {
            engine: self.engine.clone(),
            error,
            rows_affected,
            committed: false,
        }
    }

    /// Caller's session with inline conditions: the first entry is the
    /// query, the rest are its arguments
    fn conditions(&self, engine: Session, conds: Vec<Arg>) -> Session {
        let mut conds = conds.into_iter();
        match conds.next() {
            Some(query) => engine.where_(query, conds.collect()),
            None => engine,
        }
    }

    /// Table of the current chain: explicit table, else the model's
    fn current_table(&self) -> Result<String> {
        if let Some(table) = self.engine.statement().table() {
            return Ok(table.to_string());
        }
        self.engine
            .model_schema()
            .map(|schema| schema.table_name(self.engine.naming()))
            .ok_or_else(|| Error::invalid_input("no table selected; call table() or model() first"))
    }

    // ---- builder methods ----

    pub fn model<T: ModelDest>(&self, value: &T) -> DB {
        self.chain(self.engine.clone().model(value))
    }

    pub fn table(&self, name: &str) -> DB {
        self.chain(self.engine.clone().table(name))
    }

    pub fn select(&self, query: &str, args: Vec<Arg>) -> DB {
        self.chain(self.engine.clone().select(query, args))
    }

    pub fn select_columns(&self, columns: &[&str]) -> DB {
        self.chain(self.engine.clone().select_columns(columns))
    }

    pub fn omit(&self, columns: &[&str]) -> DB {
        self.chain(self.engine.clone().omit(columns))
    }

    /// SELECT DISTINCT, optionally over the given columns
    pub fn distinct(&self, columns: &[&str]) -> DB {
        let mut engine = self.engine.clone().distinct();
        if !columns.is_empty() {
            engine = engine.select_columns(columns);
        }
        self.chain(engine)
    }

    /// Add a condition
    ///
    /// # Arguments
    /// * `query` - SQL fragment, column name, column map, expression or
    ///   primary key value(s)
    /// * `args` - values for the fragment's `?` placeholders
    ///
    /// # Examples
    /// ```ignore
    /// db.where_("name = ? AND age > ?", args!["jinzhu", 20]);
    /// db.where_("name", args![vec!["a", "b"]]);
    /// db.where_(columns([("name", "jinzhu"), ("age", 20)]), args![]);
    /// db.where_(10, args![]);
    /// ```
    pub fn where_(&self, query: impl Into<Arg>, args: Vec<Arg>) -> DB {
        self.chain(self.engine.clone().where_(query, args))
    }

    pub fn or(&self, query: impl Into<Arg>, args: Vec<Arg>) -> DB {
        self.chain(self.engine.clone().or(query, args))
    }

    pub fn not(&self, query: impl Into<Arg>, args: Vec<Arg>) -> DB {
        self.chain(self.engine.clone().not(query, args))
    }

    pub fn joins(&self, query: &str, args: Vec<Arg>) -> DB {
        self.chain(self.engine.clone().joins(query, args))
    }

    pub fn group(&self, name: &str) -> DB {
        self.chain(self.engine.clone().group(name))
    }

    pub fn having(&self, query: &str, args: Vec<Arg>) -> DB {
        self.chain(self.engine.clone().having(query, args))
    }

    pub fn order(&self, value: &str) -> DB {
        self.chain(self.engine.clone().order(value))
    }

    /// Limit the number of rows
    ///
    /// A value that does not convert to an integer limits to 0 and leaves
    /// its error both on the returned `DB` and on the session, so the next
    /// finisher reports it instead of running.
    pub fn limit(&self, limit: impl Into<NumericArg>) -> DB {
        match convert_to_int(limit) {
            Ok(n) => self.chain(self.engine.clone().limit(n as i64)),
            Err(err) => self.numeric_failure(self.engine.clone().limit(0), err),
        }
    }

    pub fn offset(&self, offset: impl Into<NumericArg>) -> DB {
        match convert_to_int(offset) {
            Ok(n) => self.chain(self.engine.clone().offset(n as i64)),
            Err(err) => self.numeric_failure(self.engine.clone().offset(0), err),
        }
    }

    fn numeric_failure(&self, engine: Session, err: Error) -> DB {
        DB {
            engine: engine.add_error(err.clone()),
            error: Some(err),
            rows_affected: self.rows_affected,
            committed: self.committed,
        }
    }

    /// Apply scope functions in order
    ///
    /// Each scope sees a fresh wrapper around the session built so far;
    /// only the session it returns is kept.
    pub fn scopes(&self, funcs: &[ScopeFn<'_>]) -> DB {
        let engine = funcs
            .iter()
            .fold(self.engine.clone(), |engine, scope| {
                scope(DB::from_engine(engine)).engine
            });
        self.chain(engine)
    }

    pub fn preload(&self, column: &str) -> DB {
        self.chain(self.engine.clone().preload(column))
    }

    pub fn raw(&self, sql: &str, args: Vec<Arg>) -> DB {
        self.chain(self.engine.clone().raw(sql, args))
    }

    pub fn unscoped(&self) -> DB {
        self.chain(self.engine.clone().unscoped())
    }

    pub fn debug(&self) -> DB {
        self.chain(self.engine.clone().debug())
    }

    /// Statement logging on or off for the returned chain
    pub fn log_mode(&self, enable: bool) -> DB {
        self.chain(self.engine.clone().log_mode(enable))
    }

    pub fn set<V: Any + Send + Sync>(&self, key: &str, value: V) -> DB {
        self.chain(self.engine.clone().set(key, value))
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.engine.get(key)
    }

    pub fn assign<K, V, I>(&self, attrs: I) -> DB
    where
        K: AsRef<str>,
        V: Into<SqlValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.chain(self.engine.clone().assign(attrs))
    }

    /// Fresh chain on the same connection
    pub fn new(&self) -> DB {
        DB::from_engine(self.engine.new_session())
    }

    /// Same as [`DB::new`]: a fresh chain on the same connection, with
    /// conditions and scopes dropped but logger and dry-run settings kept.
    pub fn clone_db(&self) -> DB {
        self.new()
    }

    /// Kept for source compatibility; table naming is fixed by
    /// `NamingStrategy` when the database is opened
    pub fn singular_table(&self, enable: bool) {
        log::debug!(
            "singular_table({}) ignored; configure naming.singular_table instead",
            enable
        );
    }

    // ---- transactions ----

    pub async fn begin(&self) -> DB {
        match self.engine.begin().await {
            Ok(tx) => self.chain(tx),
            Err(err) => DB {
                engine: self.engine.clone(),
                error: Some(err),
                rows_affected: self.rows_affected,
                committed: false,
            },
        }
    }

    /// Start a transaction bounded by `context`
    pub async fn begin_tx(&self, context: TxContext, options: Option<TxOptions>) -> DB {
        match self.engine.begin_tx(context, options).await {
            Ok(tx) => DB::from_engine(tx),
            Err(err) => DB {
                error: Some(err),
                ..DB::from_engine(self.engine.clone())
            },
        }
    }

    /// Commit; `committed` is true when nothing failed
    pub async fn commit(&self) -> DB {
        let error = self.engine.commit().await.err();
        DB {
            engine: self.engine.clone(),
            committed: error.is_none(),
            error,
            rows_affected: 0,
        }
    }

    pub async fn rollback(&self) -> DB {
        let result = self.engine.rollback().await;
        DB {
            engine: self.engine.clone(),
            error: self.error.clone().or(result.err()),
            rows_affected: self.rows_affected,
            committed: false,
        }
    }

    /// Roll back unless the transaction was committed
    ///
    /// Outside a transaction a new one is started and rolled back, which
    /// leaves nothing changed.
    pub async fn rollback_unless_committed(&self) -> DB {
        let engine = if self.engine.is_transaction() {
            if self.committed || self.engine.is_finished().await {
                return self.clone();
            }
            self.engine.clone()
        } else {
            match self.engine.begin().await {
                Ok(tx) => tx,
                Err(err) => return self.outcome(Err(err)),
            }
        };

        let error = engine.rollback().await.err();
        DB {
            engine,
            error,
            rows_affected: 0,
            committed: false,
        }
    }

    /// Run `f` in a transaction: commit on `Ok`, roll back on `Err`
    pub async fn transaction<F, Fut, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(DB) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.engine
            .transaction(|tx| f(DB::from_engine(tx)))
            .await
    }

    // ---- finishers ----

    pub async fn create<T: ModelDest>(&self, value: &mut T) -> DB {
        self.outcome(self.engine.create(value).await)
    }

    pub async fn save<T: ModelDest>(&self, value: &mut T) -> DB {
        self.outcome(self.engine.save(value).await)
    }

    pub async fn delete<T: ModelDest>(&self, value: &T, conds: Vec<Arg>) -> DB {
        let engine = self.conditions(self.engine.clone().model(value), conds);
        self.outcome(engine.delete(value).await)
    }

    pub async fn updates(&self, values: impl Into<Values>) -> DB {
        self.outcome(self.engine.updates(values).await)
    }

    /// Update the non-zero fields of `value`
    pub async fn updates_from<T: Model>(&self, value: &T) -> DB {
        match Values::from_model(value) {
            Ok(values) => self.updates(values).await,
            Err(err) => self.outcome(Err(err)),
        }
    }

    pub async fn update(&self, column: &str, value: impl Into<Arg>) -> DB {
        self.outcome(self.engine.update(column, value).await)
    }

    pub async fn update_columns(&self, values: impl Into<Values>) -> DB {
        self.outcome(self.engine.update_columns(values).await)
    }

    pub async fn update_column(&self, column: &str, value: impl Into<Arg>) -> DB {
        self.outcome(self.engine.update_column(column, value).await)
    }

    pub async fn first<T: ModelDest>(&self, out: &mut T, conds: Vec<Arg>) -> DB {
        let engine = self.conditions(self.engine.clone().model(&*out), conds);
        self.outcome(engine.first(out).await.map(|_| 1))
    }

    pub async fn take<T: ModelDest>(&self, out: &mut T, conds: Vec<Arg>) -> DB {
        let engine = self.conditions(self.engine.clone().model(&*out), conds);
        self.outcome(engine.take(out).await.map(|_| 1))
    }

    pub async fn last<T: ModelDest>(&self, out: &mut T, conds: Vec<Arg>) -> DB {
        let engine = self.conditions(self.engine.clone().model(&*out), conds);
        self.outcome(engine.last(out).await.map(|_| 1))
    }

    pub async fn find<T: ModelDest>(&self, out: &mut T, conds: Vec<Arg>) -> DB {
        let engine = self.conditions(self.engine.clone().model(&*out), conds);
        self.outcome(engine.find(out).await)
    }

    /// Count matching rows into an `i32`, `i64` or `isize`
    ///
    /// Any other target is left untouched and the result carries a type
    /// mismatch error; the count query runs regardless.
    ///
    /// # Examples
    /// ```ignore
    /// let mut total = 0i64;
    /// let result = db.model(&TestModel::default()).count(&mut total).await;
    /// ```
    pub async fn count(&self, value: &mut (dyn Any + Send)) -> DB {
        let (count, mut error) = match self.engine.count().await {
            Ok(n) => (n, None),
            Err(err) => (0, Some(err)),
        };
        // The count query yields one row whether or not the target accepts it.
        let rows_affected = if error.is_none() { 1 } else { 0 };

        if let Some(target) = value.downcast_mut::<i64>() {
            *target = count;
        } else if let Some(target) = value.downcast_mut::<isize>() {
            match isize::try_from(count) {
                Ok(n) => *target = n,
                Err(_) => error = Some(Error::conversion("int64 value out of range for int")),
            }
        } else if let Some(target) = value.downcast_mut::<i32>() {
            match i32::try_from(count) {
                Ok(n) => *target = n,
                Err(_) => error = Some(Error::conversion("int64 value out of range for int")),
            }
        } else {
            error = Some(Error::type_mismatch(
                "value must be a pointer to int or int64",
            ));
        }

        DB {
            engine: self.engine.clone(),
            rows_affected,
            error,
            committed: self.committed,
        }
    }

    pub async fn pluck<T: DeserializeOwned + Send>(&self, column: &str, dest: &mut Vec<T>) -> DB {
        let result = self.engine.pluck(column).await.map(|values| {
            *dest = values;
            dest.len() as u64
        });
        self.outcome(result)
    }

    pub async fn scan<D: ScanDest>(&self, dest: &mut D) -> DB {
        self.outcome(self.engine.scan(dest).await.map(|n| n as u64))
    }

    pub async fn exec(&self, sql: &str, args: Vec<Arg>) -> DB {
        self.outcome(self.engine.exec(sql, args).await)
    }

    /// Execute a raw statement
    pub async fn raw_sql(&self, sql: &str, args: Vec<Arg>) -> DB {
        self.exec(sql, args).await
    }

    /// Find the first match for the conditions or create it
    pub async fn first_or_create<T: Model>(&self, dest: &mut T, conds: Vec<Arg>) -> DB {
        let engine = self.conditions(self.engine.clone().model(&*dest), conds);
        self.outcome(engine.first_or_create(dest).await.map(|_| 1))
    }

    /// Load the association named by `foreign_keys[0]` into `value`
    ///
    /// The owner is the value given to `model` earlier in the chain. With
    /// no model on the chain `value` is both owner and destination.
    pub async fn related<T: ModelDest>(&self, value: &mut T, foreign_keys: &[&str]) -> DB {
        let Some(name) = foreign_keys.first() else {
            return self.outcome(Err(Error::invalid_input(
                "related requires an association name",
            )));
        };
        let owner = match self.engine.model_schema() {
            Some(_) => self.engine.clone(),
            None => self.engine.clone().model(&*value),
        };
        let association = owner.association(name);
        self.outcome(association.find(value).await.map(|_| 0))
    }

    pub fn association(&self, column: &str) -> Association {
        Association::new(self.engine.association(column))
    }

    /// Whether the stored error means nothing was found
    pub fn record_not_found(&self) -> bool {
        self.error.as_ref().is_some_and(Error::is_record_not_found)
    }

    // ---- rows ----

    /// First row of the current query
    pub async fn row(&self) -> RowResult {
        RowResult::new(self.engine.clone().limit(1).row().await)
    }

    pub async fn rows(&self) -> Result<Rows> {
        let rows = self.engine.rows().await?;
        if !rows.is_empty() {
            return Ok(Rows::new(rows));
        }
        let columns = self.engine.columns().await?;
        Ok(Rows::with_columns(columns, rows))
    }

    /// Copy the cursor's current row into `dest` by position
    ///
    /// Values go into the model's column fields in declaration order, so
    /// the query must select exactly those columns in that order.
    pub fn scan_rows<T: Model>(&self, rows: &mut Rows, dest: &mut T) -> Result<()> {
        rows.scan_positional(dest)?;
        match rows.err() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Walk and discard every remaining row, then close the cursor
    pub fn drain_rows(&self, mut rows: Rows) -> Result<()> {
        let mut drained = 0usize;
        while rows.next() {
            drained += 1;
        }
        rows.close();
        log::trace!("Drained {} rows", drained);
        match rows.err() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// The current SELECT without running it; empty when it cannot be built
    pub fn query_expr(&self) -> SqlExpr {
        self.engine.query_expr().unwrap_or_else(|err| {
            log::debug!("query_expr: {}", err);
            SqlExpr::default()
        })
    }

    // ---- schema ----

    pub fn new_scope<T: ModelDest>(&self, value: &T) -> Statement {
        Statement::new(self.engine.clone().model(value), Some(value.schema()))
    }

    pub fn dialect(&self) -> CommonDialect {
        CommonDialect::new(self.engine.dialect())
    }

    /// Whether `value` has not been saved yet (its `ID` is zero)
    ///
    /// # Panics
    /// When the model has no `ID` field.
    #[allow(clippy::panic)]
    pub fn new_record<T: Model>(&self, value: &T) -> bool {
        let Some(field) = T::schema().fields.iter().find(|f| f.name == "ID") else {
            panic!("No 'ID' field found in the model");
        };
        let id = serde_json::to_value(value)
            .ok()
            .and_then(|record| record.get(&field.db_name).map(SqlValue::from_json))
            .unwrap_or(SqlValue::Null);
        id.is_zero()
    }

    pub async fn auto_migrate(&self, schemas: &[&'static ModelSchema]) -> DB {
        let result = self.engine.migrator().auto_migrate(schemas).await;
        self.schema_outcome(result)
    }

    /// Schema operations keep the caller's `rows_affected`
    fn schema_outcome(&self, result: Result<()>) -> DB {
        if let Err(err) = &result {
            log::error!("migration failed: {}", ErrorChain::new(err));
        }
        DB {
            engine: self.engine.clone(),
            error: result.err(),
            rows_affected: self.rows_affected,
            committed: false,
        }
    }

    pub async fn has_table<'a>(&self, table: impl Into<TableRef<'a>>) -> bool {
        let name = table.into().table_name(&self.engine);
        match self.engine.migrator().has_table(&name).await {
            Ok(exists) => exists,
            Err(err) => {
                log::warn!("has_table({}) failed: {}", name, err);
                false
            }
        }
    }

    pub async fn create_table(&self, tables: &[TableRef<'_>]) -> DB {
        let migrator = self.engine.migrator();
        for table in tables {
            let result = match table {
                TableRef::Schema(schema) => migrator.create_table(schema).await,
                TableRef::Name(name) => Err(Error::invalid_input(format!(
                    "create_table({}) requires a model schema",
                    name
                ))),
            };
            if result.is_err() {
                return self.schema_outcome(result);
            }
        }
        self.schema_outcome(Ok(()))
    }

    pub async fn create_table_if_not_exists(&self, tables: &[TableRef<'_>]) -> DB {
        let migrator = self.engine.migrator();
        for table in tables {
            let result = match table {
                TableRef::Schema(schema) => migrator.create_table_if_not_exists(schema).await,
                TableRef::Name(name) => Err(Error::invalid_input(format!(
                    "create_table_if_not_exists({}) requires a model schema",
                    name
                ))),
            };
            if result.is_err() {
                return self.schema_outcome(result);
            }
        }
        self.schema_outcome(Ok(()))
    }

    pub async fn drop_table(&self, tables: &[TableRef<'_>]) -> DB {
        let migrator = self.engine.migrator();
        for table in tables {
            let result = migrator.drop_table(&table.table_name(&self.engine)).await;
            if result.is_err() {
                return self.schema_outcome(result);
            }
        }
        self.schema_outcome(Ok(()))
    }

    pub async fn drop_table_if_exists(&self, tables: &[TableRef<'_>]) -> DB {
        let migrator = self.engine.migrator();
        for table in tables {
            let result = migrator
                .drop_table_if_exists(&table.table_name(&self.engine))
                .await;
            if result.is_err() {
                return self.schema_outcome(result);
            }
        }
        self.schema_outcome(Ok(()))
    }

    /// Change `column` of the model's table to the type its schema declares
    pub async fn modify_column(&self, model: &'static ModelSchema, column: &str) -> DB {
        let table = model.table_name(self.engine.naming());
        let result = match model.field(column) {
            Some(field) => self.engine.migrator().alter_column(&table, field).await,
            None => Err(Error::invalid_input(format!(
                "{} has no field {}",
                model.name, column
            ))),
        };
        self.schema_outcome(result)
    }

    pub async fn drop_column(&self, column: &str) -> DB {
        let result = match self.current_table() {
            Ok(table) => self.engine.migrator().drop_column(&table, column).await,
            Err(err) => Err(err),
        };
        self.schema_outcome(result)
    }

    pub async fn rename_column(&self, old_name: &str, new_name: &str) -> DB {
        let result = match self.current_table() {
            Ok(table) => {
                self.engine
                    .migrator()
                    .rename_column(&table, old_name, new_name)
                    .await
            }
            Err(err) => Err(err),
        };
        self.schema_outcome(result)
    }

    /// Add a foreign key constraint on the current table
    ///
    /// `dest` is the referenced `table(column)`. SQLite cannot add
    /// constraints to existing tables, so there this only logs.
    pub async fn add_foreign_key(
        &self,
        field: &str,
        dest: &str,
        on_delete: &str,
        on_update: &str,
    ) -> DB {
        let result = match self.current_table() {
            Ok(table) => {
                let name = build_key_name("fk", &table, &[field, dest]);
                self.engine
                    .migrator()
                    .create_foreign_key(&name, &table, field, dest, on_delete, on_update)
                    .await
            }
            Err(err) => Err(err),
        };
        self.schema_outcome(result)
    }

    pub async fn add_index(&self, name: &str, columns: &[&str]) -> DB {
        self.create_index(name, columns, false).await
    }

    pub async fn add_unique_index(&self, name: &str, columns: &[&str]) -> DB {
        self.create_index(name, columns, true).await
    }

    async fn create_index(&self, name: &str, columns: &[&str], unique: bool) -> DB {
        let result = match self.current_table() {
            Ok(table) => {
                self.engine
                    .migrator()
                    .create_index(name, &table, columns, unique)
                    .await
            }
            Err(err) => Err(err),
        };
        self.schema_outcome(result)
    }

    pub async fn remove_index(&self, name: &str) -> DB {
        let result = match self.current_table() {
            Ok(table) => self.engine.migrator().drop_index(&table, name).await,
            Err(err) => Err(err),
        };
        self.schema_outcome(result)
    }

    // ---- connection ----

    /// The connection adapter behind this chain
    pub fn db(&self) -> Arc<dyn DatabaseAdapter> {
        self.engine.adapter().clone()
    }

    pub fn common_db(&self) -> Arc<dyn DatabaseAdapter> {
        self.db()
    }

    pub fn get_sql_db(&self) -> Result<Arc<dyn DatabaseAdapter>> {
        Ok(self.db())
    }

    /// Idle connections the pool should keep; negative values mean none
    pub fn set_max_idle_conns(&self, n: i32) {
        self.engine.set_max_idle_conns(u32::try_from(n).unwrap_or(0));
    }

    pub async fn close(&self) -> Result<()> {
        self.engine.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::compat::open;
    use crate::models::{DataType, FieldSchema};
    use once_cell::sync::Lazy;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
    struct Product {
        id: i64,
        code: String,
        price: i64,
    }

    static PRODUCT: Lazy<ModelSchema> = Lazy::new(|| {
        ModelSchema::builder("Product")
            .id()
            .field(FieldSchema::new("Code", DataType::String))
            .field(FieldSchema::new("Price", DataType::BigInt))
            .build()
    });

    impl Model for Product {
        fn schema() -> &'static ModelSchema {
            &PRODUCT
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Label {
        text: String,
    }

    static LABEL: Lazy<ModelSchema> = Lazy::new(|| {
        ModelSchema::builder("Label")
            .field(FieldSchema::new("Text", DataType::String))
            .build()
    });

    impl Model for Label {
        fn schema() -> &'static ModelSchema {
            &LABEL
        }
    }

    async fn db() -> DB {
        let db = open("sqlite3", &[":memory:"]).await.unwrap();
        let migrated = db.auto_migrate(&[&PRODUCT]).await;
        assert!(migrated.error.is_none(), "{:?}", migrated.error);
        db
    }

    #[tokio::test]
    async fn test_builder_keeps_state() {
        let mut db = db().await;
        db.rows_affected = 7;
        let chained = db.table("products").where_("price > ?", args![10]);
        assert_eq!(chained.rows_affected, 7);
        assert!(chained.error.is_none());
        // The receiver is not mutated
        assert!(db.engine.statement().table().is_none());
    }

    #[tokio::test]
    async fn test_limit_conversion_error() {
        let db = db().await;
        let limited = db.model(&Product::default()).limit(2.5f64);
        assert_eq!(
            limited.error,
            Some(Error::conversion("float64 value cannot be converted to int"))
        );

        let mut products: Vec<Product> = Vec::new();
        let found = limited.find(&mut products, args![]).await;
        assert!(found.error.is_some());
        assert!(products.is_empty());

        let ok = db.model(&Product::default()).limit(3).offset(1u64);
        assert!(ok.error.is_none());
    }

    #[tokio::test]
    async fn test_count_targets() {
        let db = db().await;
        let mut product = Product {
            code: "A1".into(),
            price: 100,
            ..Default::default()
        };
        assert!(db.create(&mut product).await.error.is_none());

        let scoped = db.model(&Product::default());
        let mut wide = 0i64;
        let result = scoped.count(&mut wide).await;
        assert!(result.error.is_none());
        assert_eq!(result.rows_affected, 1);
        assert_eq!(wide, 1);

        let mut narrow = 0i32;
        assert!(scoped.count(&mut narrow).await.error.is_none());
        assert_eq!(narrow, 1);

        let mut text = String::new();
        let result = scoped.count(&mut text).await;
        assert_eq!(
            result.error,
            Some(Error::type_mismatch("value must be a pointer to int or int64"))
        );
        assert_eq!(result.rows_affected, 1);
        assert!(text.is_empty());

        let missing = db.table("no_such_table").count(&mut wide).await;
        assert!(missing.error.is_some());
        assert_eq!(missing.rows_affected, 0);
    }

    #[tokio::test]
    async fn test_first_missing_sets_record_not_found() {
        let db = db().await;
        let mut product = Product::default();
        let result = db.first(&mut product, args!["code = ?", "missing"]).await;
        assert!(result.record_not_found());
        assert_eq!(result.rows_affected, 0);
        assert!(!db.record_not_found());
    }

    #[tokio::test]
    async fn test_new_record() {
        let db = db().await;
        let mut product = Product::default();
        assert!(db.new_record(&product));
        product.code = "B2".into();
        assert!(db.create(&mut product).await.error.is_none());
        assert!(!db.new_record(&product));
    }

    #[tokio::test]
    #[should_panic(expected = "No 'ID' field found in the model")]
    async fn test_new_record_without_id() {
        let db = db().await;
        db.new_record(&Label::default());
    }

    #[tokio::test]
    async fn test_rollback_unless_committed_after_commit() {
        let db = db().await;
        let tx = db.begin().await;
        assert!(tx.error.is_none());
        let mut product = Product {
            code: "C3".into(),
            ..Default::default()
        };
        assert!(tx.create(&mut product).await.error.is_none());
        let committed = tx.commit().await;
        assert!(committed.committed);

        let after = committed.rollback_unless_committed().await;
        assert!(after.error.is_none());

        let mut count = 0i64;
        db.model(&Product::default()).count(&mut count).await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_scope_functions() {
        let db = db().await;
        let cheap = |db: DB| db.where_("price < ?", args![50]);
        let coded = |db: DB| db.where_("code <> ?", args![""]);
        let scoped = db.table("products").scopes(&[&cheap, &coded]);
        let expr = scoped.query_expr();
        assert!(expr.sql.contains("price < ?"), "{}", expr.sql);
        assert!(expr.sql.contains("code <> ?"), "{}", expr.sql);
        assert_eq!(expr.args.len(), 2);
    }
}
