/// Query Building and Execution Module
///
/// This module provides the statement builders the predicate layer mutates,
/// their SQL rendering, and their execution against a [`Handle`].
///
/// Conditions are stored as templates and rendered late, so the table alias
/// and the parameter order are only fixed when a statement is built.
use super::connection::Handle;
use super::param::{Arg, Param};
use super::render::{finish_placeholders, inline_params, quote_ident, render_template, Dialect};
use super::schema::get_table_columns;
use crate::core::{Result, SqlweaveError};
use crate::selectors::Predicate;
use rusqlite::{params_from_iter, types::ValueRef, Connection, Row};
use tracing::debug;

/// Column added by the SQLite `DISTINCT ON` emulation.
pub const DISTINCT_RANK_COLUMN: &str = "_distinct_rank";

/// Represents the result of a SQL query execution
#[derive(Debug)]
pub struct QueryResult {
    /// Column names from the query result
    pub columns: Vec<String>,
    /// Rows of data as string values
    pub rows: Vec<Vec<String>>,
    /// Number of rows returned
    pub row_count: usize,
}

impl QueryResult {
    /// Creates a new QueryResult from column names and row data
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let row_count = rows.len();
        QueryResult {
            columns,
            rows,
            row_count,
        }
    }
}

/// Boolean operator joining the members of a condition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joiner {
    And,
    Or,
}

impl Joiner {
    fn as_sql(&self) -> &'static str {
        match self {
            Joiner::And => " AND ",
            Joiner::Or => " OR ",
        }
    }
}

/// Which rows of a soft-deleting table a select sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftDeleteMode {
    /// Only rows whose soft-delete column is NULL
    #[default]
    Live,
    /// Only rows whose soft-delete column is set
    OnlyDeleted,
    /// Every row
    IncludeDeleted,
}

#[derive(Debug, Clone)]
enum Condition {
    Expr {
        template: String,
        args: Vec<Arg>,
    },
    Group {
        /// Joins the group to the conditions before it
        prefix: Joiner,
        /// Joins the plain conditions inside the group
        joiner: Joiner,
        members: Vec<Condition>,
    },
}

/// The WHERE conditions of a statement. Top-level conditions are joined by
/// AND, groups by their own prefix.
#[derive(Debug, Clone, Default)]
struct WhereClause {
    conditions: Vec<Condition>,
}

impl WhereClause {
    fn push(&mut self, template: &str, args: Vec<Arg>) {
        self.conditions.push(Condition::Expr {
            template: template.to_string(),
            args,
        });
    }

    fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Renders the conditions as one WHERE part; empty groups yield nothing.
    ///
    /// With `more` set, a clause holding a top-level OR is parenthesised so
    /// the parts AND-ed after it apply to all of it.
    fn render(
        &self,
        alias: Option<&str>,
        params: &mut Vec<Param>,
        more: bool,
    ) -> Result<Vec<String>> {
        let joined = join_conditions(&self.conditions, Joiner::And, alias, params)?;
        Ok(match joined {
            Joined { count: 0, .. } => Vec::new(),
            Joined { sql, has_or: true, count } if more && count > 1 => vec![format!("({})", sql)],
            Joined { sql, .. } => vec![sql],
        })
    }
}

struct Joined {
    sql: String,
    count: usize,
    has_or: bool,
}

// The first rendered member takes no separator; later plain conditions join
// with `joiner` and later groups with their own prefix.
fn join_conditions(
    members: &[Condition],
    joiner: Joiner,
    alias: Option<&str>,
    params: &mut Vec<Param>,
) -> Result<Joined> {
    let mut joined = Joined {
        sql: String::new(),
        count: 0,
        has_or: false,
    };
    for member in members {
        let (rendered, separator) = match member {
            Condition::Expr { template, args } => {
                let sql = render_template(template, args, alias, params)?;
                (Some(format!("({})", sql)), joiner)
            }
            Condition::Group {
                prefix,
                joiner: inner,
                members,
            } => {
                let group = join_conditions(members, *inner, alias, params)?;
                let rendered = match group.count {
                    0 => None,
                    1 => Some(group.sql),
                    _ => Some(format!("({})", group.sql)),
                };
                (rendered, *prefix)
            }
        };
        if let Some(rendered) = rendered {
            if joined.count > 0 {
                joined.sql.push_str(separator.as_sql());
                joined.has_or |= separator == Joiner::Or;
            }
            joined.sql.push_str(&rendered);
            joined.count += 1;
        }
    }
    Ok(joined)
}

fn where_sql(parts: &[String]) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// Static description of a mapped table.
#[derive(Debug, Clone, Default)]
pub struct TableModel {
    pub name: String,
    pub alias: Option<String>,
    pub columns: Vec<String>,
    pub soft_delete_column: Option<String>,
}

impl TableModel {
    pub fn new(name: impl Into<String>) -> Self {
        TableModel {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete_column = Some(column.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SelectMode {
    Rows,
    Count,
}

/// A SELECT statement under construction.
///
/// Builder methods take `&mut self` so the same value can be threaded through
/// [`Predicate`]s and chained at the call site.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    handle: Option<Handle>,
    dialect: Dialect,
    table: Option<String>,
    alias: Option<String>,
    model_columns: Vec<String>,
    soft_delete_column: Option<String>,
    soft_delete: SoftDeleteMode,
    where_clause: WhereClause,
    columns: Vec<String>,
    excluded: Vec<String>,
    distinct_on: Vec<String>,
    orders: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl SelectQuery {
    /// Creates a detached SQLite select; it can be built but not executed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached select rendered for the given dialect.
    pub fn with_dialect(dialect: Dialect) -> Self {
        SelectQuery {
            dialect,
            ..Default::default()
        }
    }

    /// Creates a select bound to a database or transaction handle.
    pub fn from_handle(handle: Handle) -> Self {
        SelectQuery {
            handle: Some(handle),
            ..Default::default()
        }
    }

    /// Reports whether the statement will run inside a transaction.
    pub fn in_transaction(&self) -> bool {
        self.handle.as_ref().is_some_and(Handle::is_transaction)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = Some(table.into());
        self
    }

    pub fn alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.alias = Some(alias.into());
        self
    }

    /// Points the select at a table model: name, alias, columns, soft-delete column.
    pub fn model(&mut self, model: &TableModel) -> &mut Self {
        self.table = Some(model.name.clone());
        self.alias = model.alias.clone();
        self.model_columns = model.columns.clone();
        self.soft_delete_column = model.soft_delete_column.clone();
        self
    }

    pub fn soft_delete_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.soft_delete_column = Some(column.into());
        self
    }

    /// Appends a condition template, AND-ed with its siblings.
    ///
    /// `?TableAlias` expands to the quoted alias, every other `?` consumes the
    /// next argument.
    pub fn where_(&mut self, template: &str, args: Vec<Arg>) -> &mut Self {
        self.where_clause.push(template, args);
        self
    }

    /// Opens a nested group.
    ///
    /// Conditions added by `f` land inside the group and are joined by
    /// `joiner`. The group is joined to the conditions before it by `prefix`;
    /// as the first condition it takes no prefix.
    pub fn where_group<F>(&mut self, prefix: Joiner, joiner: Joiner, f: F) -> &mut Self
    where
        F: FnOnce(&mut SelectQuery),
    {
        let outer = std::mem::take(&mut self.where_clause.conditions);
        f(self);
        let members = std::mem::replace(&mut self.where_clause.conditions, outer);
        self.where_clause.conditions.push(Condition::Group {
            prefix,
            joiner,
            members,
        });
        self
    }

    pub fn column<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn exclude_column<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Appends a raw ORDER BY expression such as `"name desc"`.
    pub fn order_expr(&mut self, expr: impl Into<String>) -> &mut Self {
        self.orders.push(expr.into());
        self
    }

    /// Keeps one row per distinct value of the raw expression.
    ///
    /// SQLite ranks rows in a subquery and the outer select lists the table's
    /// columns so the rank stays hidden. Without a model or a handle to read
    /// the schema from, `build` falls back to `*`.
    pub fn distinct_on(&mut self, expr: impl Into<String>) -> &mut Self {
        self.distinct_on.push(expr.into());
        self
    }

    /// Selects only soft-deleted rows.
    pub fn where_deleted(&mut self) -> &mut Self {
        self.soft_delete = SoftDeleteMode::OnlyDeleted;
        self
    }

    /// Selects live and soft-deleted rows alike.
    pub fn where_all_with_deleted(&mut self) -> &mut Self {
        self.soft_delete = SoftDeleteMode::IncludeDeleted;
        self
    }

    pub fn soft_delete_mode(&self) -> SoftDeleteMode {
        self.soft_delete
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset
    }

    pub fn order_exprs(&self) -> &[String] {
        &self.orders
    }

    pub fn has_conditions(&self) -> bool {
        !self.where_clause.is_empty()
    }

    /// Applies a predicate; `None` is a no-op.
    pub fn apply(&mut self, predicate: impl Into<Option<Predicate>>) -> &mut Self {
        if let Some(predicate) = predicate.into() {
            predicate.apply(self);
        }
        self
    }

    /// Renders the statement into SQL and its bound parameters.
    ///
    /// # Errors
    ///
    /// Returns `SqlweaveError::Query` when no table is set, a condition
    /// template does not match its arguments, or columns are excluded without
    /// a known column list. Executing through a handle resolves the column
    /// list from the schema instead.
    pub fn build(&self) -> Result<(String, Vec<Param>)> {
        self.render(None, SelectMode::Rows)
    }

    /// Renders the statement with parameters inlined, for logs and tests.
    pub fn to_debug_sql(&self) -> Result<String> {
        let (sql, params) = self.render_raw(None, SelectMode::Rows)?;
        Ok(inline_params(&sql, &params))
    }

    fn render(
        &self,
        table_columns: Option<&[String]>,
        mode: SelectMode,
    ) -> Result<(String, Vec<Param>)> {
        let (sql, params) = self.render_raw(table_columns, mode)?;
        Ok((finish_placeholders(sql, self.dialect), params))
    }

    fn render_raw(
        &self,
        table_columns: Option<&[String]>,
        mode: SelectMode,
    ) -> Result<(String, Vec<Param>)> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| SqlweaveError::Query("select query has no table".to_string()))?;
        let alias = self.alias.as_deref().unwrap_or(table);
        let qalias = quote_ident(alias);

        let projection = match mode {
            SelectMode::Rows => self.projection(table, &qalias, table_columns)?,
            SelectMode::Count => "*".to_string(),
        };

        let mut params = Vec::new();
        let visibility = self.soft_delete_column.as_ref().and_then(|column| {
            let column = format!("{}.{}", qalias, quote_ident(column));
            match self.soft_delete {
                SoftDeleteMode::Live => Some(format!("({} IS NULL)", column)),
                SoftDeleteMode::OnlyDeleted => Some(format!("({} IS NOT NULL)", column)),
                SoftDeleteMode::IncludeDeleted => None,
            }
        });
        let mut parts = self
            .where_clause
            .render(Some(alias), &mut params, visibility.is_some())?;
        parts.extend(visibility);
        let from = format!("{} AS {}", quote_ident(table), qalias);

        let mut sql = if self.distinct_on.is_empty() {
            format!("SELECT {} FROM {}{}", projection, from, where_sql(&parts))
        } else {
            match self.dialect {
                Dialect::Postgres => format!(
                    "SELECT DISTINCT ON ({}) {} FROM {}{}",
                    self.distinct_on.join(", "),
                    projection,
                    from,
                    where_sql(&parts)
                ),
                Dialect::Sqlite => {
                    let window_order = if self.orders.is_empty() {
                        self.distinct_on.join(", ")
                    } else {
                        self.orders.join(", ")
                    };
                    format!(
                        "SELECT {projection} FROM (SELECT {qalias}.*, ROW_NUMBER() OVER \
                         (PARTITION BY {partition} ORDER BY {window_order}) AS {rank} \
                         FROM {from}{filter}) AS {qalias} WHERE {qalias}.{rank} = 1",
                        partition = self.distinct_on.join(", "),
                        rank = quote_ident(DISTINCT_RANK_COLUMN),
                        filter = where_sql(&parts),
                    )
                }
            }
        };

        if mode == SelectMode::Count {
            return Ok((format!("SELECT count(*) FROM ({})", sql), params));
        }

        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        match (self.limit, self.offset, self.dialect) {
            (Some(limit), _, _) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(_), Dialect::Sqlite) => sql.push_str(" LIMIT -1"),
            _ => {}
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok((sql, params))
    }

    fn projection(
        &self,
        table: &str,
        qalias: &str,
        table_columns: Option<&[String]>,
    ) -> Result<String> {
        let known = if self.model_columns.is_empty() {
            table_columns
        } else {
            Some(&self.model_columns[..])
        };
        let mut columns: Vec<&String> = if self.excluded.is_empty() {
            if self.columns.is_empty() && self.emulates_distinct_on() {
                // `*` would also return the rank column.
                known.unwrap_or_default().iter().collect()
            } else {
                self.columns.iter().collect()
            }
        } else if !self.columns.is_empty() {
            self.columns.iter().collect()
        } else if let Some(known) = known {
            known.iter().collect()
        } else {
            return Err(SqlweaveError::Query(format!(
                "cannot exclude columns of {} without a column list",
                table
            )));
        };

        if !self.excluded.is_empty() {
            columns.retain(|c| !self.excluded.contains(c));
            if columns.is_empty() {
                return Err(SqlweaveError::Query(format!(
                    "every column of {} is excluded",
                    table
                )));
            }
        }

        if columns.is_empty() {
            return Ok("*".to_string());
        }
        Ok(columns
            .iter()
            .map(|c| format!("{}.{}", qalias, quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", "))
    }

    fn emulates_distinct_on(&self) -> bool {
        self.dialect == Dialect::Sqlite && !self.distinct_on.is_empty()
    }

    fn needs_schema_columns(&self) -> bool {
        self.columns.is_empty()
            && self.model_columns.is_empty()
            && (!self.excluded.is_empty() || self.emulates_distinct_on())
    }

    fn with_connection<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        if self.dialect != Dialect::Sqlite {
            return Err(SqlweaveError::Query(
                "only SQLite statements can be executed".to_string(),
            ));
        }
        let handle = self.handle.as_ref().ok_or_else(|| {
            SqlweaveError::Query("select query is not bound to a database handle".to_string())
        })?;
        handle.with_connection(f)
    }

    fn build_on(&self, conn: &Connection, mode: SelectMode) -> Result<(String, Vec<Param>)> {
        if mode == SelectMode::Rows && self.needs_schema_columns() {
            let table = self.table.as_deref().unwrap_or_default();
            let names: Vec<String> = get_table_columns(conn, table)?
                .into_iter()
                .map(|c| c.name)
                .collect();
            return self.render(Some(&names), mode);
        }
        self.render(None, mode)
    }

    /// Executes the select and returns every row formatted for display.
    pub fn fetch(&self) -> Result<QueryResult> {
        self.with_connection(|conn| {
            let (sql, params) = self.build_on(conn, SelectMode::Rows)?;
            debug!(sql = %sql, "executing select");
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| SqlweaveError::Query(format!("Failed to prepare statement: {}", e)))?;

            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let column_count = stmt.column_count();

            let rows = stmt
                .query_map(params_from_iter(params.iter()), |row| {
                    let mut values = Vec::with_capacity(column_count);
                    for i in 0..column_count {
                        values.push(format_value(row.get_ref(i)?));
                    }
                    Ok(values)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(QueryResult::new(columns, rows))
        })
    }

    /// Executes the select and maps every row with `f`.
    pub fn query_map<T, F>(&self, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.with_connection(|conn| {
            let (sql, params) = self.build_on(conn, SelectMode::Rows)?;
            debug!(sql = %sql, "executing select");
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| SqlweaveError::Query(format!("Failed to prepare statement: {}", e)))?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), |row| f(row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Counts matching rows, ignoring projection, order, limit and offset.
    pub fn count(&self) -> Result<i64> {
        self.with_connection(|conn| {
            let (sql, params) = self.build_on(conn, SelectMode::Count)?;
            debug!(sql = %sql, "executing count");
            let count = conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
            Ok(count)
        })
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.count()? > 0)
    }
}

/// An INSERT statement under construction.
#[derive(Debug, Clone, Default)]
pub struct InsertQuery {
    handle: Option<Handle>,
    dialect: Dialect,
    table: Option<String>,
    values: Vec<(String, Param)>,
}

impl InsertQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        InsertQuery {
            dialect,
            ..Default::default()
        }
    }

    pub fn from_handle(handle: Handle) -> Self {
        InsertQuery {
            handle: Some(handle),
            ..Default::default()
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.handle.as_ref().is_some_and(Handle::is_transaction)
    }

    pub fn table(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = Some(table.into());
        self
    }

    pub fn value(&mut self, column: impl Into<String>, value: impl Into<Param>) -> &mut Self {
        self.values.push((column.into(), value.into()));
        self
    }

    pub fn build(&self) -> Result<(String, Vec<Param>)> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| SqlweaveError::Query("insert query has no table".to_string()))?;
        if self.values.is_empty() {
            return Err(SqlweaveError::Query(format!(
                "insert into {} has no values",
                table
            )));
        }
        let columns: Vec<String> = self.values.iter().map(|(c, _)| quote_ident(c)).collect();
        let placeholders = vec!["?"; self.values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders
        );
        let params = self.values.iter().map(|(_, v)| v.clone()).collect();
        Ok((finish_placeholders(sql, self.dialect), params))
    }

    /// Executes the insert and returns the number of affected rows.
    pub fn exec(&self) -> Result<usize> {
        Ok(self.exec_inner()?.0)
    }

    /// Executes the insert and returns the new row's rowid.
    pub fn exec_returning_id(&self) -> Result<i64> {
        Ok(self.exec_inner()?.1)
    }

    fn exec_inner(&self) -> Result<(usize, i64)> {
        let (sql, params) = self.build()?;
        execute_on(self.handle.as_ref(), self.dialect, "insert", |conn| {
            debug!(sql = %sql, "executing insert");
            let affected = conn.execute(&sql, params_from_iter(params.iter()))?;
            Ok((affected, conn.last_insert_rowid()))
        })
    }
}

/// An UPDATE statement under construction.
#[derive(Debug, Clone, Default)]
pub struct UpdateQuery {
    handle: Option<Handle>,
    dialect: Dialect,
    table: Option<String>,
    alias: Option<String>,
    sets: Vec<(String, Param)>,
    where_clause: WhereClause,
}

impl UpdateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        UpdateQuery {
            dialect,
            ..Default::default()
        }
    }

    pub fn from_handle(handle: Handle) -> Self {
        UpdateQuery {
            handle: Some(handle),
            ..Default::default()
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.handle.as_ref().is_some_and(Handle::is_transaction)
    }

    pub fn table(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = Some(table.into());
        self
    }

    pub fn alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Param>) -> &mut Self {
        self.sets.push((column.into(), value.into()));
        self
    }

    pub fn where_(&mut self, template: &str, args: Vec<Arg>) -> &mut Self {
        self.where_clause.push(template, args);
        self
    }

    /// Renders the statement.
    ///
    /// Updates without a condition are refused; use `where_("1 = 1", vec![])`
    /// to touch every row on purpose.
    pub fn build(&self) -> Result<(String, Vec<Param>)> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| SqlweaveError::Query("update query has no table".to_string()))?;
        if self.sets.is_empty() {
            return Err(SqlweaveError::Query(format!(
                "update of {} has no columns to set",
                table
            )));
        }
        if self.where_clause.is_empty() {
            return Err(SqlweaveError::Query(format!(
                "update of {} requires at least one condition",
                table
            )));
        }
        let alias = self.alias.as_deref().unwrap_or(table);

        let mut params: Vec<Param> = Vec::with_capacity(self.sets.len());
        let assignments: Vec<String> = self
            .sets
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!("{} = ?", quote_ident(column))
            })
            .collect();
        let parts = self.where_clause.render(Some(alias), &mut params, false)?;
        let sql = format!(
            "UPDATE {} AS {} SET {}{}",
            quote_ident(table),
            quote_ident(alias),
            assignments.join(", "),
            where_sql(&parts)
        );
        Ok((finish_placeholders(sql, self.dialect), params))
    }

    /// Executes the update and returns the number of affected rows.
    pub fn exec(&self) -> Result<usize> {
        let (sql, params) = self.build()?;
        execute_on(self.handle.as_ref(), self.dialect, "update", |conn| {
            debug!(sql = %sql, "executing update");
            Ok(conn.execute(&sql, params_from_iter(params.iter()))?)
        })
    }
}

/// A DELETE statement under construction.
#[derive(Debug, Clone, Default)]
pub struct DeleteQuery {
    handle: Option<Handle>,
    dialect: Dialect,
    table: Option<String>,
    alias: Option<String>,
    where_clause: WhereClause,
}

impl DeleteQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        DeleteQuery {
            dialect,
            ..Default::default()
        }
    }

    pub fn from_handle(handle: Handle) -> Self {
        DeleteQuery {
            handle: Some(handle),
            ..Default::default()
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.handle.as_ref().is_some_and(Handle::is_transaction)
    }

    pub fn table(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = Some(table.into());
        self
    }

    pub fn alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn where_(&mut self, template: &str, args: Vec<Arg>) -> &mut Self {
        self.where_clause.push(template, args);
        self
    }

    /// Renders the statement. Deletes without a condition are refused.
    pub fn build(&self) -> Result<(String, Vec<Param>)> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| SqlweaveError::Query("delete query has no table".to_string()))?;
        if self.where_clause.is_empty() {
            return Err(SqlweaveError::Query(format!(
                "delete from {} requires at least one condition",
                table
            )));
        }
        let alias = self.alias.as_deref().unwrap_or(table);
        let mut params = Vec::new();
        let parts = self.where_clause.render(Some(alias), &mut params, false)?;
        let sql = format!(
            "DELETE FROM {} AS {}{}",
            quote_ident(table),
            quote_ident(alias),
            where_sql(&parts)
        );
        Ok((finish_placeholders(sql, self.dialect), params))
    }

    /// Executes the delete and returns the number of affected rows.
    pub fn exec(&self) -> Result<usize> {
        let (sql, params) = self.build()?;
        execute_on(self.handle.as_ref(), self.dialect, "delete", |conn| {
            debug!(sql = %sql, "executing delete");
            Ok(conn.execute(&sql, params_from_iter(params.iter()))?)
        })
    }
}

fn execute_on<R, F>(handle: Option<&Handle>, dialect: Dialect, kind: &str, f: F) -> Result<R>
where
    F: FnOnce(&Connection) -> Result<R>,
{
    if dialect != Dialect::Sqlite {
        return Err(SqlweaveError::Query(
            "only SQLite statements can be executed".to_string(),
        ));
    }
    let handle = handle.ok_or_else(|| {
        SqlweaveError::Query(format!("{} query is not bound to a database handle", kind))
    })?;
    handle.with_connection(f)
}

/// Formats a SQLite value for display
fn format_value(value: ValueRef) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(b) => format!("<BLOB: {} bytes>", b.len()),
    }
}
