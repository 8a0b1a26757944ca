//! Query engine
//!
//! `Session` is the modern chainable API: every builder call returns a new
//! session carrying the statement under construction, and the async
//! finishers execute it against the pool or the open transaction. The
//! legacy facade in `crate::compat` wraps a session and reshapes its
//! results.

pub mod association;
pub mod crud;
pub mod migrator;
pub mod preload;
pub mod transaction;

pub use association::Association;
pub use crud::Values;
pub use migrator::Migrator;
pub use transaction::TxContext;

use crate::config::OrmConfig;
use crate::database::{DatabaseAdapter, PoolStatus, QueryResult, Row, SqlValue, TransactionAdapter};
use crate::error::{Error, Result};
use crate::models::query_builder::{
    explain, Arg, Condition, OrderByClause, OrderDirection, QueryBuilder, SqlDialect, SqlExpr,
    WhereCondition,
};
use crate::models::{ModelDest, ModelSchema, NamingStrategy};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Scope function applied by `Session::scopes`
pub type Scope<'a> = &'a dyn Fn(Session) -> Session;

type SharedTransaction = Arc<Mutex<Option<Box<dyn TransactionAdapter>>>>;

/// Where statements run
#[derive(Clone)]
enum Connection {
    Pool(Arc<dyn DatabaseAdapter>),
    /// Emptied on commit or rollback
    Transaction {
        adapter: Arc<dyn DatabaseAdapter>,
        tx: SharedTransaction,
    },
}

impl Connection {
    fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        match self {
            Connection::Pool(adapter) => adapter,
            Connection::Transaction { adapter, .. } => adapter,
        }
    }
}

#[derive(Clone)]
pub struct Session {
    conn: Connection,
    statement: QueryBuilder,
    config: Arc<OrmConfig>,
    schema: Option<&'static ModelSchema>,
    /// First record passed to `model`, used for primary key conditions
    model_record: Option<JsonValue>,
    settings: HashMap<String, Arc<dyn Any + Send + Sync>>,
    preloads: Vec<String>,
    assigns: IndexMap<String, SqlValue>,
    error: Option<Error>,
    log_sql: bool,
    context: Option<TxContext>,
}

impl Session {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>, config: OrmConfig) -> Self {
        let statement =
            QueryBuilder::new(adapter.dialect()).allow_global_update(config.allow_global_update);
        let log_sql = config.logger.log_sql;

        Self {
            conn: Connection::Pool(adapter),
            statement,
            config: Arc::new(config),
            schema: None,
            model_record: None,
            settings: HashMap::new(),
            preloads: Vec::new(),
            assigns: IndexMap::new(),
            error: None,
            log_sql,
            context: None,
        }
    }

    /// Connect using `config.database`
    pub async fn connect(config: OrmConfig) -> Result<Self> {
        config.validate()?;
        let adapter = crate::database::connect(&config.database.url, &config.database).await?;
        Ok(Self::new(adapter, config))
    }

    /// Same connection and settings with an empty statement
    pub fn new_session(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            statement: QueryBuilder::new(self.dialect())
                .allow_global_update(self.config.allow_global_update),
            config: self.config.clone(),
            schema: None,
            model_record: None,
            settings: self.settings.clone(),
            preloads: Vec::new(),
            assigns: IndexMap::new(),
            error: None,
            log_sql: self.log_sql,
            context: self.context.clone(),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        self.conn.adapter()
    }

    pub fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.statement.dialect().clone()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn naming(&self) -> &NamingStrategy {
        &self.config.naming
    }

    pub fn statement(&self) -> &QueryBuilder {
        &self.statement
    }

    pub fn model_schema(&self) -> Option<&'static ModelSchema> {
        self.schema
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn is_logging(&self) -> bool {
        self.log_sql
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.adapter().pool_status()
    }

    pub fn set_max_idle_conns(&self, n: u32) {
        self.adapter().set_max_idle_conns(n);
    }

    pub async fn ping(&self) -> Result<bool> {
        self.adapter().ping().await
    }

    pub async fn close(&self) {
        self.adapter().close().await;
    }

    /// Record an error; the first one wins and later ones are logged
    pub fn add_error(mut self, error: Error) -> Self {
        match &self.error {
            None => self.error = Some(error),
            Some(existing) => log::debug!("Discarding error {} after {}", error, existing),
        }
        self
    }

    /// Fail fast when an earlier chained call recorded an error
    fn check(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn push_condition(
        mut self,
        condition: Result<Condition>,
        connect: fn(Condition) -> WhereCondition,
    ) -> Self {
        match condition {
            Ok(condition) => {
                self.statement = self.statement.where_condition(connect(condition));
                self
            }
            Err(err) => self.add_error(err),
        }
    }

    // ---- chainable calls ----

    /// Target a model's table, remembering the value for key conditions
    pub fn model<T: ModelDest>(mut self, value: &T) -> Self {
        let record = match value.records() {
            Ok(records) => records.into_iter().next(),
            Err(err) => return self.add_error(err),
        };
        let schema = value.schema();
        self = self.apply_schema(schema);
        self.schema = Some(schema);
        self.model_record = if value.is_slice() { None } else { record };
        self
    }

    /// Table and model columns for `schema`, unless a table was chosen already
    fn apply_schema(mut self, schema: &'static ModelSchema) -> Self {
        if self.statement.table().is_none() {
            let table = schema.table_name(self.naming());
            self.statement = self.statement.from(table);
        }
        self.statement = self.statement.for_model(
            schema.column_names(),
            schema.soft_delete_column().map(str::to_string),
        );
        self
    }

    pub fn table(mut self, name: &str) -> Self {
        self.statement = self.statement.from(name);
        self
    }

    pub fn select(mut self, query: &str, args: Vec<Arg>) -> Self {
        self.statement = self.statement.select(SqlExpr::new(query, args));
        self
    }

    pub fn select_columns(mut self, columns: &[&str]) -> Self {
        self.statement = self.statement.select_columns(columns.iter().copied());
        self
    }

    pub fn omit(mut self, columns: &[&str]) -> Self {
        self.statement = self.statement.omit(columns.iter().copied());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.statement = self.statement.distinct(true);
        self
    }

    /// Add an AND condition
    ///
    /// `query` may be a fragment with `?` placeholders, a bare column
    /// name with one argument, a column map, a nested expression, or a
    /// primary key value (or list of them).
    pub fn where_(self, query: impl Into<Arg>, args: Vec<Arg>) -> Self {
        let condition = self.build_condition(query.into(), args);
        self.push_condition(condition, WhereCondition::and)
    }

    pub fn or(self, query: impl Into<Arg>, args: Vec<Arg>) -> Self {
        let condition = self.build_condition(query.into(), args);
        self.push_condition(condition, WhereCondition::or)
    }

    pub fn not(self, query: impl Into<Arg>, args: Vec<Arg>) -> Self {
        let condition = self.build_condition(query.into(), args);
        self.push_condition(condition, WhereCondition::not)
    }

    fn build_condition(&self, query: Arg, args: Vec<Arg>) -> Result<Condition> {
        match query {
            Arg::Scalar(SqlValue::String(sql)) | Arg::Scalar(SqlValue::Text(sql)) => {
                self.string_condition(sql, args)
            }
            Arg::Scalar(value) => Ok(Condition::Eq {
                column: self.primary_key_column(),
                value,
            }),
            Arg::Slice(values) => Ok(Condition::In {
                column: self.primary_key_column(),
                values,
            }),
            Arg::Columns(map) => Ok(self.columns_condition(map)),
            Arg::Expr(expr) => Ok(Condition::Expr(expr)),
        }
    }

    fn string_condition(&self, sql: String, mut args: Vec<Arg>) -> Result<Condition> {
        let trimmed = sql.trim();

        if args.is_empty() {
            // A numeric string is a primary key lookup
            if let Ok(id) = trimmed.parse::<i64>() {
                return Ok(Condition::Eq {
                    column: self.primary_key_column(),
                    value: SqlValue::BigInt(id),
                });
            }
            return Ok(Condition::Expr(SqlExpr::raw(sql)));
        }

        if trimmed.contains('?') || trimmed.contains(char::is_whitespace) || args.len() != 1 {
            return Ok(Condition::Expr(SqlExpr::new(sql, args)));
        }

        let column = self.column_name(trimmed);
        match args.remove(0) {
            Arg::Scalar(value) => Ok(Condition::Eq { column, value }),
            Arg::Slice(values) => Ok(Condition::In { column, values }),
            Arg::Expr(expr) => Ok(Condition::Expr(SqlExpr::new(
                format!("{} = ?", column),
                vec![Arg::Expr(expr)],
            ))),
            Arg::Columns(_) => Err(Error::invalid_input(format!(
                "cannot compare column {} with a column map",
                column
            ))),
        }
    }

    fn columns_condition(&self, map: IndexMap<String, SqlValue>) -> Condition {
        let mut conditions: Vec<WhereCondition> = map
            .into_iter()
            .map(|(column, value)| {
                WhereCondition::and(Condition::Eq {
                    column: self.column_name(&column),
                    value,
                })
            })
            .collect();
        match conditions.len() {
            1 => conditions.remove(0).condition,
            _ => Condition::Group(conditions),
        }
    }

    /// Column for a field name of the current model, or the name as given
    pub(crate) fn column_name(&self, name: &str) -> String {
        self.schema
            .and_then(|s| s.field(name))
            .filter(|f| f.is_column())
            .map(|f| f.db_name.clone())
            .unwrap_or_else(|| name.to_string())
    }

    fn primary_key_column(&self) -> String {
        self.schema
            .and_then(ModelSchema::primary_key)
            .map(|f| f.db_name.clone())
            .unwrap_or_else(|| "id".to_string())
    }

    pub fn joins(mut self, query: &str, args: Vec<Arg>) -> Self {
        self.statement = self.statement.join(SqlExpr::new(query, args));
        self
    }

    pub fn group(mut self, name: &str) -> Self {
        self.statement = self.statement.group_by(name);
        self
    }

    pub fn having(mut self, query: &str, args: Vec<Arg>) -> Self {
        self.statement = self.statement.having(SqlExpr::new(query, args));
        self
    }

    /// Append an ORDER BY term (`"name"`, `"age desc"`, or raw SQL)
    pub fn order(mut self, value: &str) -> Self {
        self.statement = self.statement.order(OrderByClause::parse(value));
        self
    }

    /// Drop every ORDER BY term collected so far
    pub fn reorder(mut self) -> Self {
        self.statement = self.statement.clear_order();
        self
    }

    /// Negative values remove the limit
    pub fn limit(mut self, limit: i64) -> Self {
        self.statement = self.statement.limit(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.statement = self.statement.offset(offset);
        self
    }

    pub fn scopes(self, funcs: &[Scope<'_>]) -> Self {
        funcs.iter().fold(self, |session, scope| scope(session))
    }

    /// Load an association after the main query
    pub fn preload(mut self, association: &str) -> Self {
        self.preloads.push(association.to_string());
        self
    }

    pub fn raw(mut self, sql: &str, args: Vec<Arg>) -> Self {
        self.statement = self.statement.raw(SqlExpr::new(sql, args));
        self
    }

    /// Include soft-deleted rows
    pub fn unscoped(mut self) -> Self {
        self.statement = self.statement.unscoped(true);
        self
    }

    /// Log every statement of this chain
    pub fn debug(mut self) -> Self {
        self.log_sql = true;
        self
    }

    pub fn log_mode(mut self, enable: bool) -> Self {
        self.log_sql = enable;
        self
    }

    /// Attributes applied by `first_or_create`, whether found or created
    pub fn assign<K, V, I>(mut self, attrs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<SqlValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in attrs {
            let column = self.column_name(key.as_ref());
            self.assigns.insert(column, value.into());
        }
        self
    }

    pub fn set<V: Any + Send + Sync>(mut self, key: &str, value: V) -> Self {
        self.settings.insert(key.to_string(), Arc::new(value));
        self
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.settings.get(key).cloned()
    }

    /// Typed lookup of a setting
    pub fn get_as<V: Any + Clone>(&self, key: &str) -> Option<V> {
        self.settings.get(key)?.downcast_ref::<V>().cloned()
    }

    /// Cancellation and deadline used by `begin`
    pub fn with_context(mut self, context: TxContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Render the current SELECT with parameters substituted
    pub fn to_sql(&self) -> Result<String> {
        self.check()?;
        let (sql, params) = self.statement.build()?;
        Ok(explain(&sql, &params))
    }

    /// The current SELECT as an embeddable expression
    pub fn query_expr(&self) -> Result<SqlExpr> {
        self.check()?;
        Ok(self.statement.build_expr()?)
    }

    // ---- execution ----

    pub(crate) async fn execute_sql(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult> {
        if self.config.dry_run {
            self.trace(sql, &params, Duration::ZERO, None);
            return Ok(QueryResult::default());
        }

        let started = Instant::now();
        let result = match &self.conn {
            Connection::Pool(adapter) => adapter.execute(sql, params.clone()).await,
            Connection::Transaction { tx, .. } => {
                let mut guard = tx.lock().await;
                match guard.as_mut() {
                    Some(tx) => tx.execute(sql, params.clone()).await,
                    None => Err(Error::InvalidTransaction),
                }
            }
        };
        self.trace(sql, &params, started.elapsed(), result.as_ref().err());
        result
    }

    pub(crate) async fn fetch_sql(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        if self.config.dry_run {
            self.trace(sql, &params, Duration::ZERO, None);
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let result = match &self.conn {
            Connection::Pool(adapter) => adapter.fetch_all(sql, params.clone()).await,
            Connection::Transaction { tx, .. } => {
                let mut guard = tx.lock().await;
                match guard.as_mut() {
                    Some(tx) => tx.fetch_all(sql, params.clone()).await,
                    None => Err(Error::InvalidTransaction),
                }
            }
        };
        self.trace(sql, &params, started.elapsed(), result.as_ref().err());
        result
    }

    /// Column names `sql` would return; empty in dry-run mode
    pub(crate) async fn describe_sql(&self, sql: &str) -> Result<Vec<String>> {
        if self.config.dry_run {
            return Ok(Vec::new());
        }

        match &self.conn {
            Connection::Pool(adapter) => adapter.columns(sql).await,
            Connection::Transaction { tx, .. } => {
                let mut guard = tx.lock().await;
                match guard.as_mut() {
                    Some(tx) => tx.columns(sql).await,
                    None => Err(Error::InvalidTransaction),
                }
            }
        }
    }

    fn trace(&self, sql: &str, params: &[SqlValue], elapsed: Duration, error: Option<&Error>) {
        let millis = elapsed.as_secs_f64() * 1000.0;

        if let Some(err) = error {
            log::error!("{} [{:.3}ms] {}", err, millis, explain(sql, params));
            return;
        }

        let threshold = self.config.logger.slow_threshold_ms;
        if threshold > 0 && elapsed >= Duration::from_millis(threshold) {
            log::warn!(
                "SLOW SQL >= {}ms [{:.3}ms] {}",
                threshold,
                millis,
                explain(sql, params)
            );
        } else if self.log_sql {
            log::info!("[{:.3}ms] {}", millis, explain(sql, params));
        } else {
            log::trace!("[{:.3}ms] {}", millis, sql);
        }
    }

    /// Qualified primary key column of `schema` for ORDER BY
    fn order_key(&self, schema: &ModelSchema) -> Option<String> {
        let pk = schema.primary_key()?;
        match self.statement.table().and_then(|t| t.split_whitespace().next()) {
            Some(table) if !table.starts_with('(') => Some(format!("{}.{}", table, pk.db_name)),
            _ => Some(pk.db_name.clone()),
        }
    }

    fn order_by_key(mut self, schema: &ModelSchema, direction: OrderDirection) -> Self {
        if let Some(column) = self.order_key(schema) {
            self.statement = self.statement.order_by(column, direction);
        }
        self
    }
}
