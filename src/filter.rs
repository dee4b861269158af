/// Declarative filter, projection and paging descriptor.
///
/// A [`Where`] is usually deserialized from a request and applied to a select
/// in two steps: [`Where::apply_filters`] adds the row conditions and
/// [`Where::apply_select`] the projection, paging and ordering.

use crate::core::db::{Arg, SelectQuery};
use crate::selectors::Predicate;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

pub const DEFAULT_ID_COL: &str = "id";
pub const DEFAULT_FLAGS_COL: &str = "flags";
pub const DEFAULT_CREATED_AT_COL: &str = "created_at";
pub const DEFAULT_UPDATED_AT_COL: &str = "updated_at";

/// Maps a caller-facing sort key to the column it orders by.
pub type OrderMap = HashMap<i32, String>;

pub fn order_asc(col: &str) -> String {
    format!("{} asc", col)
}

pub fn order_desc(col: &str) -> String {
    format!("{} desc", col)
}

/// Column names a [`Where`] filters on when it does not name its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnDefaults {
    pub id: String,
    pub flags: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Default for ColumnDefaults {
    fn default() -> Self {
        ColumnDefaults {
            id: DEFAULT_ID_COL.to_string(),
            flags: DEFAULT_FLAGS_COL.to_string(),
            created_at: DEFAULT_CREATED_AT_COL.to_string(),
            updated_at: DEFAULT_UPDATED_AT_COL.to_string(),
        }
    }
}

/// Filter, projection and paging options for a select.
///
/// Blank `*_col` fields fall back to [`ColumnDefaults`]. Time bounds are
/// milliseconds since the Unix epoch and inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Where {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_in_ids: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub has_flags: Vec<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub has_not_flags: Vec<i64>,

    #[serde(skip_serializing_if = "is_false")]
    pub only_deleted: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub with_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub id_col: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub flags_col: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_at_col: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub updated_at_col: String,

    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
    pub updated_after: Option<i64>,
    pub updated_before: Option<i64>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub select_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_columns: Vec<String>,

    #[serde(skip_serializing_if = "is_zero")]
    pub sort_by: i32,
    #[serde(skip_serializing_if = "is_false")]
    pub sort_desc: bool,

    #[serde(skip)]
    pub order: OrderMap,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

fn pick(column: &str, default: &str) -> String {
    if column.is_empty() {
        default.to_string()
    } else {
        column.to_string()
    }
}

fn millis(field: &str, ms: i64) -> Option<DateTime<Utc>> {
    let t = Utc.timestamp_millis_opt(ms).single();
    if t.is_none() {
        warn!(field, ms, "timestamp out of range; bound skipped");
    }
    t
}

impl Where {
    /// Attaches the sort-key map used by [`Where::apply_select`].
    pub fn with_order(mut self, order: OrderMap) -> Self {
        self.order = order;
        self
    }

    /// The column names this descriptor filters on, overrides first.
    pub fn columns(&self, defaults: &ColumnDefaults) -> ColumnDefaults {
        ColumnDefaults {
            id: pick(&self.id_col, &defaults.id),
            flags: pick(&self.flags_col, &defaults.flags),
            created_at: pick(&self.created_at_col, &defaults.created_at),
            updated_at: pick(&self.updated_at_col, &defaults.updated_at),
        }
    }

    /// Adds the row conditions, using the built-in column defaults.
    pub fn apply_filters(&self, q: &mut SelectQuery) {
        self.apply_filters_with(q, &ColumnDefaults::default())
    }

    /// Adds the row conditions in a fixed order: id, id set, excluded ids,
    /// required flags, forbidden flags, soft-delete visibility, then the
    /// created and updated bounds.
    pub fn apply_filters_with(&self, q: &mut SelectQuery, defaults: &ColumnDefaults) {
        let cols = self.columns(defaults);

        if !self.id.is_empty() {
            q.where_(
                "?TableAlias.? = ?",
                vec![Arg::ident(&cols.id), Arg::value(&self.id)],
            );
        }
        if !self.ids.is_empty() {
            q.where_(
                "?TableAlias.? IN (?)",
                vec![Arg::ident(&cols.id), Arg::list(&self.ids)],
            );
        }
        if !self.not_in_ids.is_empty() {
            q.where_(
                "?TableAlias.? NOT IN (?)",
                vec![Arg::ident(&cols.id), Arg::list(&self.not_in_ids)],
            );
        }

        for &flag in &self.has_flags {
            q.where_(
                "?TableAlias.? & ? = ?",
                vec![Arg::ident(&cols.flags), Arg::value(flag), Arg::value(flag)],
            );
        }
        for &flag in &self.has_not_flags {
            q.where_(
                "?TableAlias.? & ? = 0",
                vec![Arg::ident(&cols.flags), Arg::value(flag)],
            );
        }

        if self.only_deleted {
            q.where_deleted();
        } else if self.with_deleted {
            q.where_all_with_deleted();
        }

        let bounds = [
            ("created_after", self.created_after, &cols.created_at, ">="),
            ("created_before", self.created_before, &cols.created_at, "<="),
            ("updated_after", self.updated_after, &cols.updated_at, ">="),
            ("updated_before", self.updated_before, &cols.updated_at, "<="),
        ];
        for (field, ms, column, op) in bounds {
            let Some(t) = ms.and_then(|ms| millis(field, ms)) else {
                continue;
            };
            q.where_(
                &format!("?TableAlias.? {} ?", op),
                vec![Arg::ident(column), Arg::value(t)],
            );
        }
    }

    /// Sets projection, exclusion, limit and offset, then orders by the
    /// column `sort_by` maps to. An unknown sort key adds no ordering.
    pub fn apply_select(&self, q: &mut SelectQuery) {
        if !self.select_columns.is_empty() {
            q.column(self.select_columns.iter().cloned());
        }
        if !self.exclude_columns.is_empty() {
            q.exclude_column(self.exclude_columns.iter().cloned());
        }
        if let Some(limit) = self.limit {
            q.limit(limit);
        }
        if let Some(offset) = self.offset {
            q.offset(offset);
        }
        if let Some(col) = self.order.get(&self.sort_by) {
            if self.sort_desc {
                q.order_expr(order_desc(col));
            } else {
                q.order_expr(order_asc(col));
            }
        }
    }

    /// [`Where::apply_filters`] as a predicate.
    pub fn filters(&self) -> Predicate {
        let filter = self.clone();
        Predicate::new(move |q| filter.apply_filters(q))
    }

    /// [`Where::apply_filters_with`] as a predicate.
    pub fn filters_with(&self, defaults: &ColumnDefaults) -> Predicate {
        let filter = self.clone();
        let defaults = defaults.clone();
        Predicate::new(move |q| filter.apply_filters_with(q, &defaults))
    }

    /// [`Where::apply_select`] as a predicate.
    pub fn select(&self) -> Predicate {
        let filter = self.clone();
        Predicate::new(move |q| filter.apply_select(q))
    }
}
