/// Composable query predicates.
///
/// A [`Predicate`] is a reusable closure that adds conditions (or ordering,
/// or distinct-on) to a [`SelectQuery`]. Factories here never touch a query
/// until the predicate is applied; combinators build bigger predicates out of
/// smaller ones. Wherever a combinator accepts predicates it also accepts
/// `Option<Predicate>`, and `None` members are skipped, so [`apply_if`] can be
/// dropped straight into a list.
///
/// Column names are always quoted as identifiers and values always bound as
/// parameters.

use crate::core::db::{Arg, Joiner, Param, SelectQuery};
use crate::filter::Where;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// A reusable transformation of a [`SelectQuery`].
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&mut SelectQuery) + Send + Sync>);

impl Predicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut SelectQuery) + Send + Sync + 'static,
    {
        Predicate(Arc::new(f))
    }

    pub fn apply(&self, query: &mut SelectQuery) {
        (self.0)(query)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

fn collect<I, P>(predicates: I) -> Vec<Predicate>
where
    I: IntoIterator<Item = P>,
    P: Into<Option<Predicate>>,
{
    predicates.into_iter().filter_map(|p| p.into()).collect()
}

/// Combines predicates into one that applies each, in order.
pub fn apply<I, P>(predicates: I) -> Predicate
where
    I: IntoIterator<Item = P>,
    P: Into<Option<Predicate>>,
{
    let predicates = collect(predicates);
    Predicate::new(move |q| {
        for predicate in &predicates {
            predicate.apply(q);
        }
    })
}

/// Returns `apply(predicates)` when `cond` holds, `None` otherwise.
pub fn apply_if<I, P>(cond: bool, predicates: I) -> Option<Predicate>
where
    I: IntoIterator<Item = P>,
    P: Into<Option<Predicate>>,
{
    if !cond {
        return None;
    }
    Some(apply(predicates))
}

fn group<I, P>(joiner: Joiner, predicates: I) -> Predicate
where
    I: IntoIterator<Item = P>,
    P: Into<Option<Predicate>>,
{
    let inner = apply(predicates);
    Predicate::new(move |q| {
        q.where_group(joiner, joiner, |g| inner.apply(g));
    })
}

/// Adds a parenthesised group whose members are joined by OR, prefixed by
/// OR when conditions precede it.
pub fn or_group<I, P>(predicates: I) -> Predicate
where
    I: IntoIterator<Item = P>,
    P: Into<Option<Predicate>>,
{
    group(Joiner::Or, predicates)
}

/// Adds a parenthesised group whose members are joined by AND, prefixed by
/// AND when conditions precede it.
pub fn and_group<I, P>(predicates: I) -> Predicate
where
    I: IntoIterator<Item = P>,
    P: Into<Option<Predicate>>,
{
    group(Joiner::And, predicates)
}

/// Wraps every predicate in its own OR group inside one AND group.
///
/// The predicates are OR-ed with each other and the whole is AND-ed to the
/// conditions before it: `x` then `or([a, b])` yields `x AND (a OR b)`.
pub fn or<I, P>(predicates: I) -> Predicate
where
    I: IntoIterator<Item = P>,
    P: Into<Option<Predicate>>,
{
    and_group(collect(predicates).into_iter().map(|p| or_group([p])))
}

/// Applies a filter descriptor's conditions; `None` is the identity.
pub fn use_where(filter: Option<Where>) -> Predicate {
    Predicate::new(move |q| {
        if let Some(filter) = &filter {
            filter.apply_filters(q);
        }
    })
}

/// Applies a filter descriptor's projection, paging and order; `None` is
/// the identity.
pub fn use_select(filter: Option<Where>) -> Predicate {
    Predicate::new(move |q| {
        if let Some(filter) = &filter {
            filter.apply_select(q);
        }
    })
}

/// Predicate adding one condition template with fixed arguments.
pub(crate) fn condition(template: impl Into<String>, args: Vec<Arg>) -> Predicate {
    let template = template.into();
    Predicate::new(move |q| {
        q.where_(&template, args.clone());
    })
}

pub fn where_equal(col: impl Into<String>, value: impl Into<Param>) -> Predicate {
    condition(
        "?TableAlias.? = ?",
        vec![Arg::ident(col), Arg::value(value)],
    )
}

pub fn where_not_equal(col: impl Into<String>, value: impl Into<Param>) -> Predicate {
    condition(
        "?TableAlias.? != ?",
        vec![Arg::ident(col), Arg::value(value)],
    )
}

pub fn where_null(col: impl Into<String>) -> Predicate {
    condition("?TableAlias.? is null", vec![Arg::ident(col)])
}

pub fn where_not_null(col: impl Into<String>) -> Predicate {
    condition("?TableAlias.? is not null", vec![Arg::ident(col)])
}

/// Keeps the first row per value of `col`, ordered by `col` then `id`.
pub fn where_distinct_on(col: impl Into<String>) -> Predicate {
    let col = col.into();
    Predicate::new(move |q| {
        q.distinct_on(col.clone())
            .order_expr(format!("{}, id", col));
    })
}

pub fn where_in<I, V>(col: impl Into<String>, values: I) -> Predicate
where
    I: IntoIterator<Item = V>,
    V: Into<Param>,
{
    condition(
        "?TableAlias.? IN (?)",
        vec![Arg::ident(col), Arg::list(values)],
    )
}

pub fn where_not_in<I, V>(col: impl Into<String>, values: I) -> Predicate
where
    I: IntoIterator<Item = V>,
    V: Into<Param>,
{
    condition(
        "?TableAlias.? NOT IN (?)",
        vec![Arg::ident(col), Arg::list(values)],
    )
}

fn where_like(col: String, pattern: String) -> Predicate {
    Predicate::new(move |q| {
        let template = format!("?TableAlias.? {} ?", q.dialect().ilike());
        q.where_(
            &template,
            vec![Arg::Ident(col.clone()), Arg::value(pattern.clone())],
        );
    })
}

/// Case-insensitive substring match.
pub fn where_contains(col: impl Into<String>, substr: &str) -> Predicate {
    where_like(col.into(), format!("%{}%", substr))
}

/// Case-insensitive prefix match.
pub fn where_begins(col: impl Into<String>, substr: &str) -> Predicate {
    where_like(col.into(), format!("{}%", substr))
}

/// Case-insensitive suffix match.
pub fn where_ends(col: impl Into<String>, substr: &str) -> Predicate {
    where_like(col.into(), format!("%{}", substr))
}

/// `col <= t`
pub fn where_before(col: impl Into<String>, t: DateTime<Utc>) -> Predicate {
    condition("?TableAlias.? <= ?", vec![Arg::ident(col), Arg::value(t)])
}

/// `col >= t`
pub fn where_after(col: impl Into<String>, t: DateTime<Utc>) -> Predicate {
    condition("?TableAlias.? >= ?", vec![Arg::ident(col), Arg::value(t)])
}
