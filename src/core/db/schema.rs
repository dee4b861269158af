/// Schema Introspection Module
///
/// Column metadata for tables whose statements exclude columns without a
/// table model describing them.
use crate::core::{Result, SqlweaveError};
use rusqlite::{Connection, Row};

/// Represents a database column with its metadata
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared type name (e.g., "INTEGER", "TEXT", "REAL", "BLOB")
    pub type_name: String,
    /// Whether the column allows NULL values
    pub notnull: bool,
    /// Whether this column is part of the primary key
    pub pk: bool,
    /// Default value expression (if any)
    pub dflt_value: Option<String>,
}

impl Column {
    /// Creates a Column from a `pragma_table_info` row
    fn from_pragma_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Column {
            name: row.get(0)?,
            type_name: row.get(1)?,
            notnull: row.get(2)?,
            dflt_value: row.get(3)?,
            pk: row.get::<_, i64>(4)? > 0,
        })
    }
}

/// Lists the columns of a table in declaration order.
///
/// # Errors
///
/// Returns `SqlweaveError::Query` when the table does not exist.
pub fn get_table_columns(conn: &Connection, table_name: &str) -> Result<Vec<Column>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map([table_name], |row| Column::from_pragma_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if columns.is_empty() {
        return Err(SqlweaveError::Query(format!("no such table: {}", table_name)));
    }
    Ok(columns)
}
