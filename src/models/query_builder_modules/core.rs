//! Core query building logic
//!
//! This module contains the database-agnostic statement structures and the
//! rendering of SELECT/COUNT/INSERT/UPDATE/DELETE, working with the dialect
//! system for quoting, placeholders and pagination.

use super::args::{Arg, SqlExpr};
use super::dialects::{create_dialect, DatabaseBackend, QueryError, SqlDialect};
use crate::database::types::SqlValue;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

#[allow(clippy::expect_used)]
static PLAIN_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.([A-Za-z_][A-Za-z0-9_]*|\*))?$")
        .expect("column pattern is valid")
});

#[allow(clippy::expect_used)]
static NUMBERED_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+)|@p(\d+)").expect("placeholder pattern is valid"));

/// Statement under construction
///
/// Cloned on every chained call of the engine, so all parts are owned.
#[derive(Clone)]
pub struct QueryBuilder {
    pub(crate) dialect: Arc<dyn SqlDialect>,
    pub(crate) backend: DatabaseBackend,
    pub(crate) table: Option<String>,
    pub(crate) model_columns: Vec<String>,
    pub(crate) soft_delete_column: Option<String>,
    pub(crate) select_columns: Vec<SqlExpr>,
    pub(crate) omit_columns: Vec<String>,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<SqlExpr>,
    pub(crate) where_conditions: Vec<WhereCondition>,
    pub(crate) group_by: Vec<String>,
    pub(crate) having_conditions: Vec<WhereCondition>,
    pub(crate) order_by: Vec<OrderByClause>,
    pub(crate) limit: Option<i64>,
    pub(crate) offset: Option<i64>,
    pub(crate) unscoped: bool,
    pub(crate) allow_global: bool,
    pub(crate) raw: Option<SqlExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Raw fragment with `?` placeholders
    Expr(SqlExpr),
    /// `column = value`, or `IS NULL` for a null value
    Eq { column: String, value: SqlValue },
    In { column: String, values: Vec<SqlValue> },
    /// Parenthesized sub-conditions
    Group(Vec<WhereCondition>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhereCondition {
    pub condition: Condition,
    pub connector: WhereConnector,
    pub negate: bool,
}

impl WhereCondition {
    pub fn and(condition: Condition) -> Self {
        Self {
            condition,
            connector: WhereConnector::And,
            negate: false,
        }
    }

    pub fn or(condition: Condition) -> Self {
        Self {
            condition,
            connector: WhereConnector::Or,
            negate: false,
        }
    }

    pub fn not(condition: Condition) -> Self {
        Self {
            condition,
            connector: WhereConnector::And,
            negate: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WhereConnector {
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderByClause {
    Column {
        column: String,
        direction: OrderDirection,
    },
    Raw(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderByClause {
    /// Parse a legacy order string (`"name"`, `"age desc"`, `"a, b"`)
    ///
    /// Simple `column [asc|desc]` strings become quoted columns; anything
    /// else is kept verbatim.
    pub fn parse(order: &str) -> Self {
        let tokens: Vec<&str> = order.split_whitespace().collect();
        let direction = match tokens.as_slice() {
            [_] => Some(OrderDirection::Asc),
            [_, dir] if dir.eq_ignore_ascii_case("asc") => Some(OrderDirection::Asc),
            [_, dir] if dir.eq_ignore_ascii_case("desc") => Some(OrderDirection::Desc),
            _ => None,
        };
        match direction {
            Some(direction) if PLAIN_COLUMN.is_match(tokens[0]) => OrderByClause::Column {
                column: tokens[0].to_string(),
                direction,
            },
            _ => OrderByClause::Raw(order.trim().to_string()),
        }
    }
}

impl QueryBuilder {
    /// Create a new query builder for the given dialect
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        let backend = dialect.backend();
        QueryBuilder {
            dialect,
            backend,
            table: None,
            model_columns: Vec::new(),
            soft_delete_column: None,
            select_columns: Vec::new(),
            omit_columns: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            where_conditions: Vec::new(),
            group_by: Vec::new(),
            having_conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            unscoped: false,
            allow_global: false,
            raw: None,
        }
    }

    pub fn for_backend(backend: DatabaseBackend) -> Self {
        Self::new(create_dialect(backend))
    }

    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Set the table to query from; `"users u"` and `"users AS u"` keep the alias
    pub fn from<S: Into<String>>(mut self, table: S) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Columns of the model behind the table, used by `omit` and soft delete
    pub fn for_model(mut self, columns: Vec<String>, soft_delete_column: Option<String>) -> Self {
        self.model_columns = columns;
        self.soft_delete_column = soft_delete_column;
        self
    }

    /// Replace the select list with one expression
    pub fn select(mut self, expr: SqlExpr) -> Self {
        self.select_columns = vec![expr];
        self
    }

    pub fn select_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_columns = columns.into_iter().map(|c| SqlExpr::raw(c)).collect();
        self
    }

    pub fn omit<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.omit_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn clear_select(mut self) -> Self {
        self.select_columns.clear();
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Add a raw join clause (`LEFT JOIN x ON ...`)
    pub fn join(mut self, expr: SqlExpr) -> Self {
        self.joins.push(expr);
        self
    }

    pub fn where_condition(mut self, condition: WhereCondition) -> Self {
        self.where_conditions.push(condition);
        self
    }

    pub fn where_expr(self, expr: SqlExpr) -> Self {
        self.where_condition(WhereCondition::and(Condition::Expr(expr)))
    }

    /// Add WHERE column = value condition
    pub fn where_eq<S: Into<String>, V: Into<SqlValue>>(self, column: S, value: V) -> Self {
        self.where_condition(WhereCondition::and(Condition::Eq {
            column: column.into(),
            value: value.into(),
        }))
    }

    /// OR WHERE column = value condition
    pub fn or_where_eq<S: Into<String>, V: Into<SqlValue>>(self, column: S, value: V) -> Self {
        self.where_condition(WhereCondition::or(Condition::Eq {
            column: column.into(),
            value: value.into(),
        }))
    }

    /// WHERE column IN (values)
    pub fn where_in<S: Into<String>>(self, column: S, values: Vec<SqlValue>) -> Self {
        self.where_condition(WhereCondition::and(Condition::In {
            column: column.into(),
            values,
        }))
    }

    /// Add WHERE column IS NULL condition
    pub fn where_null<S: Into<String>>(self, column: S) -> Self {
        self.where_eq(column, SqlValue::Null)
    }

    pub fn has_conditions(&self) -> bool {
        !self.where_conditions.is_empty()
    }

    /// Add GROUP BY clause
    pub fn group_by<S: Into<String>>(mut self, column: S) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn having(mut self, expr: SqlExpr) -> Self {
        self.having_conditions
            .push(WhereCondition::and(Condition::Expr(expr)));
        self
    }

    /// Add ORDER BY clause
    pub fn order_by<S: Into<String>>(mut self, column: S, direction: OrderDirection) -> Self {
        self.order_by.push(OrderByClause::Column {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn order(mut self, clause: OrderByClause) -> Self {
        self.order_by.push(clause);
        self
    }

    pub fn clear_order(mut self) -> Self {
        self.order_by.clear();
        self
    }

    /// Add LIMIT clause; a negative limit removes it
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = (limit >= 0).then_some(limit);
        self
    }

    /// Add OFFSET clause; a negative offset removes it
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = (offset >= 0).then_some(offset);
        self
    }

    /// Skip the soft delete filter
    pub fn unscoped(mut self, unscoped: bool) -> Self {
        self.unscoped = unscoped;
        self
    }

    /// Allow UPDATE and DELETE without conditions
    pub fn allow_global_update(mut self, allow: bool) -> Self {
        self.allow_global = allow;
        self
    }

    /// Use a raw statement instead of the built SELECT
    pub fn raw(mut self, expr: SqlExpr) -> Self {
        self.raw = Some(expr);
        self
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    fn table_or_err(&self) -> Result<&str, QueryError> {
        self.table.as_deref().ok_or_else(|| QueryError::MissingClause {
            clause: "from".to_string(),
        })
    }

    /// User conditions plus the soft delete filter
    fn effective_conditions(&self) -> Vec<WhereCondition> {
        let mut conditions = self.where_conditions.clone();

        if let (Some(column), false) = (&self.soft_delete_column, self.unscoped) {
            let has_or = conditions
                .iter()
                .skip(1)
                .any(|c| c.connector == WhereConnector::Or);
            if has_or {
                conditions = vec![WhereCondition::and(Condition::Group(conditions))];
            }
            let column = match self.table.as_deref().and_then(|t| t.split_whitespace().next()) {
                Some(table) => format!("{}.{}", table, column),
                None => column.clone(),
            };
            conditions.push(WhereCondition::and(Condition::Eq {
                column,
                value: SqlValue::Null,
            }));
        }

        conditions
    }

    /// Build the SELECT statement with dialect-specific syntax
    pub fn build(&self) -> Result<(String, Vec<SqlValue>), QueryError> {
        let mut w = SqlWriter::new(self.dialect.as_ref());
        self.write_select(&mut w)?;
        let (sql, params) = w.finish();

        #[cfg(debug_assertions)]
        {
            log::debug!("QueryBuilder SELECT SQL: {}", sql);
            log::debug!("  Parameters to bind: {:?}", params);
        }

        Ok((sql, params))
    }

    fn write_select(&self, w: &mut SqlWriter<'_>) -> Result<(), QueryError> {
        if let Some(raw) = &self.raw {
            return w.write_expr(raw);
        }

        let table = self.table_or_err()?;

        w.push("SELECT ");
        if self.distinct {
            w.push("DISTINCT ");
        }
        self.write_select_list(w)?;
        w.push(" FROM ");
        w.table(table);
        self.write_body(w)?;

        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            for (i, clause) in self.order_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                match clause {
                    OrderByClause::Column { column, direction } => {
                        w.quote(column);
                        w.push(match direction {
                            OrderDirection::Asc => " ASC",
                            OrderDirection::Desc => " DESC",
                        });
                    }
                    OrderByClause::Raw(sql) => w.push(sql),
                }
            }
        } else if self.backend == DatabaseBackend::SqlServer
            && (self.limit.is_some() || self.offset.is_some())
        {
            // OFFSET/FETCH is only valid after ORDER BY
            w.push(" ORDER BY (SELECT NULL)");
        }

        w.push(&self.dialect.limit_syntax(self.limit, self.offset));
        Ok(())
    }

    /// The SELECT as a fragment with `?` placeholders
    ///
    /// Used to embed one statement inside another as a subquery argument.
    pub fn build_expr(&self) -> Result<SqlExpr, QueryError> {
        let mut w = SqlWriter::new(self.dialect.as_ref());
        w.positional = true;
        self.write_select(&mut w)?;
        let (sql, params) = w.finish();
        Ok(SqlExpr::new(
            sql,
            params.into_iter().map(Arg::Scalar).collect(),
        ))
    }

    /// Joins, WHERE, GROUP BY and HAVING
    fn write_body(&self, w: &mut SqlWriter<'_>) -> Result<(), QueryError> {
        for join in &self.joins {
            w.push(" ");
            w.write_expr(join)?;
        }

        let conditions = self.effective_conditions();
        if !conditions.is_empty() {
            w.push(" WHERE ");
            w.write_conditions(&conditions)?;
        }

        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            for (i, column) in self.group_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.column_or_raw(column);
            }
        }

        if !self.having_conditions.is_empty() {
            w.push(" HAVING ");
            w.write_conditions(&self.having_conditions)?;
        }

        Ok(())
    }

    fn write_select_list(&self, w: &mut SqlWriter<'_>) -> Result<(), QueryError> {
        if !self.select_columns.is_empty() {
            for (i, expr) in self.select_columns.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                if expr.args.is_empty() && is_column_list(&expr.sql) {
                    for (j, column) in expr.sql.split(',').enumerate() {
                        if j > 0 {
                            w.push(", ");
                        }
                        w.quote(column.trim());
                    }
                } else {
                    w.write_expr(expr)?;
                }
            }
            return Ok(());
        }

        if !self.omit_columns.is_empty() && !self.model_columns.is_empty() {
            let kept: Vec<&String> = self
                .model_columns
                .iter()
                .filter(|c| !self.omit_columns.contains(c))
                .collect();
            for (i, column) in kept.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.quote(column);
            }
            return Ok(());
        }

        w.push("*");
        Ok(())
    }

    /// Build a COUNT over the current conditions
    ///
    /// Grouped or distinct selects are counted through a subquery. ORDER BY,
    /// LIMIT and OFFSET are ignored.
    pub fn build_count(&self) -> Result<(String, Vec<SqlValue>), QueryError> {
        if self.raw.is_some() || self.distinct || !self.group_by.is_empty() {
            let mut inner = self.clone().clear_order();
            inner.limit = None;
            inner.offset = None;
            let (sql, params) = inner.build()?;
            return Ok((
                format!("SELECT COUNT(*) FROM ({}) AS count_source", sql),
                params,
            ));
        }

        let table = self.table_or_err()?;
        let mut w = SqlWriter::new(self.dialect.as_ref());
        w.push("SELECT ");
        match self.select_columns.as_slice() {
            [expr] if expr.sql.to_ascii_lowercase().contains("count(") => w.write_expr(expr)?,
            _ => w.push("COUNT(*)"),
        }
        w.push(" FROM ");
        w.table(table);
        self.write_body(&mut w)?;
        Ok(w.finish())
    }

    /// Build an INSERT for one row
    ///
    /// An empty row inserts defaults only. `returning` columns are appended
    /// where the dialect supports RETURNING.
    pub fn build_insert(
        &self,
        data: &IndexMap<String, SqlValue>,
        returning: &[String],
    ) -> Result<(String, Vec<SqlValue>), QueryError> {
        let table = self.table_or_err()?;
        let mut w = SqlWriter::new(self.dialect.as_ref());

        // SQLite has no DEFAULT keyword in VALUES; leaving the column out is equivalent
        let data: Vec<(&String, &SqlValue)> = data
            .iter()
            .filter(|(_, v)| !(self.backend == DatabaseBackend::SQLite && v.is_default()))
            .collect();

        w.push("INSERT INTO ");
        w.table(table);

        if data.is_empty() {
            match self.backend {
                DatabaseBackend::MySQL | DatabaseBackend::MariaDB => w.push(" () VALUES ()"),
                _ => w.push(" DEFAULT VALUES"),
            }
        } else {
            w.push(" (");
            for (i, (column, _)) in data.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.quote(column);
            }
            w.push(") VALUES (");
            for (i, (_, value)) in data.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.bind((*value).clone());
            }
            w.push(")");
        }

        if !returning.is_empty() {
            let quoted: Vec<String> = returning
                .iter()
                .map(|c| self.dialect.quote_identifier(c))
                .collect();
            if let Some(clause) = self.dialect.returning_syntax(&quoted) {
                w.push(&clause);
            }
        }

        let (sql, params) = w.finish();

        // Log generated SQL in development mode
        #[cfg(debug_assertions)]
        {
            log::debug!("QueryBuilder INSERT SQL: {}", sql);
            log::debug!("  Parameters to bind: {:?}", params);
        }

        Ok((sql, params))
    }

    /// Build an UPDATE query
    ///
    /// Values are scalars or expressions (`price * ?`).
    pub fn build_update(
        &self,
        data: &IndexMap<String, Arg>,
    ) -> Result<(String, Vec<SqlValue>), QueryError> {
        let table = self.table_or_err()?;

        if data.is_empty() {
            return Err(QueryError::InvalidSyntax {
                backend: self.backend,
                message: "No data provided for UPDATE".to_string(),
            });
        }
        if !self.has_conditions() && !self.allow_global {
            return Err(QueryError::MissingWhere);
        }

        let mut w = SqlWriter::new(self.dialect.as_ref());
        w.push("UPDATE ");
        w.table(table);
        w.push(" SET ");

        for (i, (column, value)) in data.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.quote(column);
            w.push(" = ");
            match value {
                Arg::Scalar(v) => w.bind(v.clone()),
                Arg::Expr(expr) => w.write_expr(expr)?,
                Arg::Slice(_) | Arg::Columns(_) => {
                    return Err(QueryError::InvalidSyntax {
                        backend: self.backend,
                        message: format!("cannot assign a list to column {}", column),
                    })
                }
            }
        }

        let conditions = self.effective_conditions();
        if !conditions.is_empty() {
            w.push(" WHERE ");
            w.write_conditions(&conditions)?;
        }

        Ok(w.finish())
    }

    /// Build a DELETE query
    pub fn build_delete(&self) -> Result<(String, Vec<SqlValue>), QueryError> {
        let table = self.table_or_err()?;

        if !self.has_conditions() && !self.allow_global {
            return Err(QueryError::MissingWhere);
        }

        let mut w = SqlWriter::new(self.dialect.as_ref());
        w.push("DELETE FROM ");
        w.table(table);

        // Hard deletes remove soft-deleted rows too
        let conditions = self.where_conditions.clone();
        if !conditions.is_empty() {
            w.push(" WHERE ");
            w.write_conditions(&conditions)?;
        }

        Ok(w.finish())
    }
}

/// Substitute parameters into a statement for display
///
/// Only for logs and dry runs; the result is never executed.
pub fn explain(sql: &str, params: &[SqlValue]) -> String {
    if NUMBERED_PLACEHOLDER.is_match(sql) {
        return NUMBERED_PLACEHOLDER
            .replace_all(sql, |caps: &regex::Captures<'_>| {
                let index = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .and_then(|m| m.as_str().parse::<usize>().ok())
                    .unwrap_or(0);
                match index.checked_sub(1).and_then(|i| params.get(i)) {
                    Some(value) => value.to_sql_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();
    }

    let mut out = String::with_capacity(sql.len());
    let mut params = params.iter();
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => match params.next() {
                    Some(value) => out.push_str(&value.to_sql_string()),
                    None => out.push(c),
                },
                _ => out.push(c),
            },
        }
    }
    out
}

fn is_column_list(sql: &str) -> bool {
    sql.split(',').all(|part| PLAIN_COLUMN.is_match(part.trim()))
}

/// Accumulates SQL text and bind parameters
struct SqlWriter<'a> {
    dialect: &'a dyn SqlDialect,
    sql: String,
    params: Vec<SqlValue>,
    /// Emit `?` regardless of dialect
    positional: bool,
}

impl<'a> SqlWriter<'a> {
    fn new(dialect: &'a dyn SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
            positional: false,
        }
    }

    fn finish(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn quote(&mut self, identifier: &str) {
        let quoted = self.dialect.quote_identifier(identifier);
        self.sql.push_str(&quoted);
    }

    fn column_or_raw(&mut self, column: &str) {
        if PLAIN_COLUMN.is_match(column) {
            self.quote(column);
        } else {
            self.push(column);
        }
    }

    /// Table name quoted, alias and subqueries kept as written
    fn table(&mut self, table: &str) {
        if table.trim_start().starts_with('(') {
            self.push(table);
            return;
        }
        let mut parts = table.split_whitespace();
        if let Some(name) = parts.next() {
            self.quote(name);
        }
        for part in parts {
            self.push(" ");
            self.push(part);
        }
    }

    /// Bind a value; DEFAULT stays a keyword
    fn bind(&mut self, value: SqlValue) {
        if value.is_default() {
            self.push("DEFAULT");
            return;
        }
        self.params.push(value);
        if self.positional {
            self.sql.push('?');
            return;
        }
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    /// Comma-separated placeholders; `NULL` for an empty list
    fn bind_list(&mut self, values: &[SqlValue]) {
        if values.is_empty() {
            self.push("NULL");
            return;
        }
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.push(",");
            }
            self.bind(value.clone());
        }
    }

    fn write_arg(&mut self, arg: &Arg, after_paren: bool) -> Result<(), QueryError> {
        match arg {
            Arg::Scalar(value) => self.bind(value.clone()),
            Arg::Slice(values) if after_paren => self.bind_list(values),
            Arg::Slice(values) => {
                self.push("(");
                self.bind_list(values);
                self.push(")");
            }
            Arg::Expr(expr) => self.write_expr(expr)?,
            Arg::Columns(map) => {
                let conditions: Vec<WhereCondition> = map
                    .iter()
                    .map(|(column, value)| {
                        WhereCondition::and(Condition::Eq {
                            column: column.clone(),
                            value: value.clone(),
                        })
                    })
                    .collect();
                self.write_conditions(&conditions)?;
            }
        }
        Ok(())
    }

    /// Copy a fragment, replacing `?` outside quotes with its argument
    ///
    /// A list directly after `(` expands without extra parentheses, so
    /// `id IN (?)` and `id IN ?` render the same.
    fn write_expr(&mut self, expr: &SqlExpr) -> Result<(), QueryError> {
        let mut args = expr.args.iter();
        let mut quote: Option<char> = None;
        let mut prev: Option<char> = None;

        for c in expr.sql.chars() {
            match quote {
                Some(q) => {
                    self.sql.push(c);
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '\'' | '"' | '`' => {
                        quote = Some(c);
                        self.sql.push(c);
                    }
                    '?' => {
                        let arg = args
                            .next()
                            .ok_or_else(|| self.arity_error(expr))?;
                        self.write_arg(arg, prev == Some('('))?;
                    }
                    _ => self.sql.push(c),
                },
            }
            prev = Some(c);
        }

        if args.next().is_some() {
            return Err(self.arity_error(expr));
        }
        Ok(())
    }

    fn arity_error(&self, expr: &SqlExpr) -> QueryError {
        QueryError::InvalidSyntax {
            backend: self.dialect.backend(),
            message: format!(
                "{} argument(s) given for placeholders in \"{}\"",
                expr.args.len(),
                expr.sql
            ),
        }
    }

    fn write_conditions(&mut self, conditions: &[WhereCondition]) -> Result<(), QueryError> {
        let wrap = conditions.len() > 1;
        for (i, condition) in conditions.iter().enumerate() {
            if i > 0 {
                self.push(match condition.connector {
                    WhereConnector::And => " AND ",
                    WhereConnector::Or => " OR ",
                });
            }
            self.write_condition(condition, wrap)?;
        }
        Ok(())
    }

    fn write_condition(&mut self, condition: &WhereCondition, wrap: bool) -> Result<(), QueryError> {
        let negate = condition.negate;
        match &condition.condition {
            Condition::Expr(expr) => {
                if negate {
                    self.push("NOT (");
                    self.write_expr(expr)?;
                    self.push(")");
                } else if wrap {
                    self.push("(");
                    self.write_expr(expr)?;
                    self.push(")");
                } else {
                    self.write_expr(expr)?;
                }
            }
            Condition::Eq { column, value } => {
                self.quote(column);
                match (value.is_null(), negate) {
                    (true, false) => self.push(" IS NULL"),
                    (true, true) => self.push(" IS NOT NULL"),
                    (false, negate) => {
                        self.push(if negate { " <> " } else { " = " });
                        self.bind(value.clone());
                    }
                }
            }
            Condition::In { column, values } => {
                self.quote(column);
                self.push(if negate { " NOT IN (" } else { " IN (" });
                self.bind_list(values);
                self.push(")");
            }
            Condition::Group(inner) => {
                if negate {
                    self.push("NOT ");
                }
                self.push("(");
                self.write_conditions(inner)?;
                self.push(")");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    fn pg() -> QueryBuilder {
        QueryBuilder::for_backend(DatabaseBackend::Postgres)
    }

    fn sqlite() -> QueryBuilder {
        QueryBuilder::for_backend(DatabaseBackend::SQLite)
    }

    #[test]
    fn test_select_with_numbered_placeholders() {
        let (sql, params) = pg()
            .from("users")
            .where_expr(SqlExpr::new("age > ?", args![18]))
            .where_eq("name", "ann")
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE (age > $1) AND \"name\" = $2");
        assert_eq!(params, vec![SqlValue::Int(18), SqlValue::from("ann")]);
    }

    #[test]
    fn test_slice_expansion() {
        let (sql, params) = sqlite()
            .from("users")
            .where_expr(SqlExpr::new("id IN (?)", args![vec![1, 2, 3]]))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE id IN (?,?,?)");
        assert_eq!(params.len(), 3);

        let (sql, _) = sqlite()
            .from("users")
            .where_in("id", Vec::new())
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE \"id\" IN (NULL)");
    }

    #[test]
    fn test_placeholder_inside_literal_is_kept() {
        let (sql, params) = sqlite()
            .from("t")
            .where_expr(SqlExpr::new("a = '?' AND b = ?", args![1]))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"t\" WHERE a = '?' AND b = ?");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_argument_count_mismatch() {
        let result = sqlite()
            .from("t")
            .where_expr(SqlExpr::new("a = ? AND b = ?", args![1]))
            .build();
        assert!(matches!(result, Err(QueryError::InvalidSyntax { .. })));
    }

    #[test]
    fn test_negated_conditions() {
        let (sql, _) = sqlite()
            .from("t")
            .where_condition(WhereCondition::not(Condition::Eq {
                column: "name".into(),
                value: SqlValue::from("x"),
            }))
            .where_condition(WhereCondition::not(Condition::In {
                column: "id".into(),
                values: vec![SqlValue::Int(1)],
            }))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"t\" WHERE \"name\" <> ? AND \"id\" NOT IN (?)");
    }

    #[test]
    fn test_soft_delete_wraps_or_conditions() {
        let (sql, _) = sqlite()
            .from("users")
            .for_model(vec!["id".into(), "deleted_at".into()], Some("deleted_at".into()))
            .where_eq("a", 1)
            .or_where_eq("b", 2)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE (\"a\" = ? OR \"b\" = ?) AND \"users\".\"deleted_at\" IS NULL"
        );

        let (sql, _) = sqlite()
            .from("users")
            .for_model(vec!["id".into()], Some("deleted_at".into()))
            .unscoped(true)
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\"");
    }

    #[test]
    fn test_select_group_having_order() {
        let (sql, params) = sqlite()
            .from("test_models")
            .select(SqlExpr::raw("category, count(*) as count"))
            .group_by("category")
            .having(SqlExpr::new("count(*) > ?", args![1]))
            .order(OrderByClause::parse("category desc"))
            .limit(10)
            .offset(5)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT category, count(*) as count FROM \"test_models\" GROUP BY \"category\" \
             HAVING count(*) > ? ORDER BY \"category\" DESC LIMIT 10 OFFSET 5"
        );
        assert_eq!(params, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn test_plain_select_columns_are_quoted() {
        let (sql, _) = pg()
            .from("users u")
            .select_columns(["u.name", "u.id"])
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT \"u\".\"name\", \"u\".\"id\" FROM \"users\" u");
    }

    #[test]
    fn test_sql_server_needs_order_for_offset() {
        let (sql, _) = QueryBuilder::for_backend(DatabaseBackend::SqlServer)
            .from("users")
            .limit(5)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM [users] ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn test_negative_limit_is_ignored() {
        let builder = sqlite().from("t").limit(-1).offset(-1);
        assert_eq!(builder.build().unwrap().0, "SELECT * FROM \"t\"");
    }

    #[test]
    fn test_count_queries() {
        let (sql, _) = sqlite()
            .from("t")
            .where_eq("a", 1)
            .order_by("a", OrderDirection::Asc)
            .limit(3)
            .build_count()
            .unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM \"t\" WHERE \"a\" = ?");

        let (sql, _) = sqlite().from("t").group_by("a").build_count().unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM (SELECT * FROM \"t\" GROUP BY \"a\") AS count_source"
        );
    }

    #[test]
    fn test_insert_with_returning() {
        let mut data = IndexMap::new();
        data.insert("name".to_string(), SqlValue::from("a"));
        data.insert("id".to_string(), SqlValue::Default);

        let (sql, params) = pg().from("users").build_insert(&data, &["id".into()]).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"name\", \"id\") VALUES ($1, DEFAULT) RETURNING \"id\""
        );
        assert_eq!(params.len(), 1);

        let (sql, _) = sqlite().from("users").build_insert(&data, &[]).unwrap();
        assert_eq!(sql, "INSERT INTO \"users\" (\"name\") VALUES (?)");

        let (sql, _) = QueryBuilder::for_backend(DatabaseBackend::MySQL)
            .from("users")
            .build_insert(&IndexMap::new(), &["id".into()])
            .unwrap();
        assert_eq!(sql, "INSERT INTO `users` () VALUES ()");
    }

    #[test]
    fn test_update_and_delete_require_conditions() {
        let mut data = IndexMap::new();
        data.insert("name".to_string(), Arg::from("b"));

        assert_eq!(
            sqlite().from("t").build_update(&data),
            Err(QueryError::MissingWhere)
        );
        assert_eq!(sqlite().from("t").build_delete(), Err(QueryError::MissingWhere));

        let (sql, _) = sqlite()
            .from("t")
            .allow_global_update(true)
            .build_delete()
            .unwrap();
        assert_eq!(sql, "DELETE FROM \"t\"");
    }

    #[test]
    fn test_update_with_expression() {
        let mut data = IndexMap::new();
        data.insert("price".to_string(), Arg::from(SqlExpr::new("price * ?", args![2])));
        data.insert("name".to_string(), Arg::from("x"));

        let (sql, params) = pg()
            .from("products")
            .where_eq("id", 7)
            .build_update(&data)
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE \"products\" SET \"price\" = price * $1, \"name\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_explain_substitutes_literals() {
        assert_eq!(
            explain("SELECT * FROM t WHERE a = $1 AND b = $2", &[SqlValue::Int(1), SqlValue::from("o'k")]),
            "SELECT * FROM t WHERE a = 1 AND b = 'o''k'"
        );
        assert_eq!(
            explain("SELECT * FROM t WHERE a = ? AND b = '?'", &[SqlValue::Null]),
            "SELECT * FROM t WHERE a = NULL AND b = '?'"
        );
    }

    #[test]
    fn test_build_expr_uses_question_marks() {
        let expr = QueryBuilder::for_backend(DatabaseBackend::Postgres)
            .from("users")
            .select_columns(["id"])
            .where_eq("name", "a")
            .build_expr()
            .unwrap();
        assert_eq!(expr.sql, "SELECT \"id\" FROM \"users\" WHERE \"name\" = ?");
        assert_eq!(expr.args, vec![Arg::Scalar(SqlValue::from("a"))]);
    }

    #[test]
    fn test_order_parsing() {
        assert_eq!(
            OrderByClause::parse("name"),
            OrderByClause::Column {
                column: "name".into(),
                direction: OrderDirection::Asc
            }
        );
        assert_eq!(
            OrderByClause::parse("name desc, id"),
            OrderByClause::Raw("name desc, id".into())
        );
    }
}
