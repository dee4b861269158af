/// Bound Parameter Module
///
/// Owned values bound to statement placeholders, and the template arguments
/// used by condition strings.
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Value};

/// Timestamp layout stored in SQLite text columns; sorts lexically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// An owned value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Param {
    /// Renders the value as an inline SQL literal.
    ///
    /// Used for debug output only; statements always bind parameters.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Param::Null => "NULL".to_string(),
            Param::Integer(i) => i.to_string(),
            Param::Real(f) => f.to_string(),
            Param::Text(s) => quote_literal(s),
            Param::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02X}", byte)).collect();
                format!("X'{}'", hex)
            }
            Param::Timestamp(t) => quote_literal(&t.format(TIMESTAMP_FORMAT).to_string()),
            Param::Json(v) => quote_literal(&v.to_string()),
        }
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Param::Null => Value::Null,
            Param::Integer(i) => Value::Integer(*i),
            Param::Real(f) => Value::Real(*f),
            Param::Text(s) => Value::Text(s.clone()),
            Param::Blob(b) => Value::Blob(b.clone()),
            Param::Timestamp(t) => Value::Text(t.format(TIMESTAMP_FORMAT).to_string()),
            Param::Json(v) => Value::Text(v.to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Text(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Text(s)
    }
}

impl From<&String> for Param {
    fn from(s: &String) -> Self {
        Param::Text(s.clone())
    }
}

impl From<i64> for Param {
    fn from(i: i64) -> Self {
        Param::Integer(i)
    }
}

impl From<i32> for Param {
    fn from(i: i32) -> Self {
        Param::Integer(i64::from(i))
    }
}

impl From<u32> for Param {
    fn from(i: u32) -> Self {
        Param::Integer(i64::from(i))
    }
}

impl From<f64> for Param {
    fn from(f: f64) -> Self {
        Param::Real(f)
    }
}

impl From<bool> for Param {
    fn from(b: bool) -> Self {
        Param::Integer(i64::from(b))
    }
}

impl From<Vec<u8>> for Param {
    fn from(b: Vec<u8>) -> Self {
        Param::Blob(b)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(t: DateTime<Utc>) -> Self {
        Param::Timestamp(t)
    }
}

impl From<serde_json::Value> for Param {
    fn from(v: serde_json::Value) -> Self {
        Param::Json(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Param::Null, Into::into)
    }
}

/// One argument of a condition template.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Quoted as an identifier: `"name"`
    Ident(String),
    /// Bound as a single placeholder
    Value(Param),
    /// Bound as a comma-separated placeholder list, for `IN (?)`
    List(Vec<Param>),
}

impl Arg {
    pub fn ident(name: impl Into<String>) -> Self {
        Arg::Ident(name.into())
    }

    pub fn value(value: impl Into<Param>) -> Self {
        Arg::Value(value.into())
    }

    pub fn list<I, P>(values: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
    {
        Arg::List(values.into_iter().map(Into::into).collect())
    }
}
