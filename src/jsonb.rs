/// JSON column predicates.
///
/// Path expressions are written with the `->`/`->>` operators, which both
/// PostgreSQL (jsonb) and SQLite (3.38+) understand. Array containment has no
/// portable spelling, so those predicates pick their SQL from the query's
/// [`Dialect`] when applied.

use crate::core::db::{Arg, Dialect, Param};
use crate::selectors::{condition, Predicate};

/// Doubles single quotes so the segment can sit inside a SQL literal.
///
/// Single-pass: escaping an escaped segment doubles the quotes again.
pub fn escape_json_path_segment(segment: &str) -> String {
    segment.replace('\'', "''")
}

/// Builds a path expression rooted at `?TableAlias.?`.
///
/// Empty segments are skipped. Every kept segment is accessed with `->`,
/// except the last non-empty one, which uses `->>` when `want_text` is set.
pub fn jsonb_path_expression<S: AsRef<str>>(path: &[S], want_text: bool) -> String {
    let last = path.iter().rposition(|s| !s.as_ref().is_empty());
    let mut expr = String::from("?TableAlias.?");
    for (idx, segment) in path.iter().enumerate() {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        let op = if want_text && Some(idx) == last {
            "->>"
        } else {
            "->"
        };
        expr.push_str(&format!(" {} '{}'", op, escape_json_path_segment(segment)));
    }
    expr
}

/// `col ->> field = value`
pub fn where_jsonb_equal(
    col: impl Into<String>,
    field: impl Into<String>,
    value: impl Into<Param>,
) -> Predicate {
    condition(
        "?TableAlias.? ->> ? = ?",
        vec![Arg::ident(col), Arg::value(field.into()), Arg::value(value)],
    )
}

/// Compares the text value at `path` inside `col`.
pub fn where_jsonb_path_equal<S: AsRef<str>>(
    col: impl Into<String>,
    path: &[S],
    value: impl Into<Param>,
) -> Predicate {
    let template = format!("{} = ?", jsonb_path_expression(path, true));
    condition(template, vec![Arg::ident(col), Arg::value(value)])
}

fn contains_object(target: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Postgres => format!(
            "{} @> jsonb_build_array(jsonb_build_object(?::text, ?::text))",
            target
        ),
        Dialect::Sqlite => format!(
            "EXISTS (SELECT 1 FROM json_each({}) AS \"elem\" \
             WHERE CAST(\"elem\".\"value\" ->> ? AS TEXT) = CAST(? AS TEXT))",
            target
        ),
    }
}

/// Matches rows where the array under `key` holds an object whose `field`
/// equals `value` as text.
pub fn where_jsonb_objects_array_key_value_equal(
    col: impl Into<String>,
    key: impl Into<String>,
    field: impl Into<String>,
    value: impl Into<String>,
) -> Predicate {
    let args = vec![
        Arg::ident(col),
        Arg::value(key.into()),
        Arg::value(field.into()),
        Arg::value(value.into()),
    ];
    Predicate::new(move |q| {
        let template = contains_object("?TableAlias.? -> ?", q.dialect());
        q.where_(&template, args.clone());
    })
}

/// Like [`where_jsonb_objects_array_key_value_equal`], with the array found
/// at a nested `path`.
pub fn where_jsonb_path_objects_array_key_value_equal<S: AsRef<str>>(
    col: impl Into<String>,
    path: &[S],
    field: impl Into<String>,
    value: impl Into<String>,
) -> Predicate {
    let target = jsonb_path_expression(path, false);
    let args = vec![
        Arg::ident(col),
        Arg::value(field.into()),
        Arg::value(value.into()),
    ];
    Predicate::new(move |q| {
        let template = contains_object(&target, q.dialect());
        q.where_(&template, args.clone());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::SelectQuery;

    #[test]
    fn test_escape_json_path_segment() {
        assert_eq!(escape_json_path_segment("plain"), "plain");
        assert_eq!(escape_json_path_segment("it's"), "it''s");
        assert_eq!(escape_json_path_segment("''"), "''''");
        assert_eq!(escape_json_path_segment(r"a\b"), r"a\b");
    }

    #[test]
    fn test_path_expression() {
        assert_eq!(
            jsonb_path_expression(&["a", "b", "c"], true),
            "?TableAlias.? -> 'a' -> 'b' ->> 'c'"
        );
        assert_eq!(
            jsonb_path_expression(&["a", "b"], false),
            "?TableAlias.? -> 'a' -> 'b'"
        );
        assert_eq!(jsonb_path_expression::<&str>(&[], true), "?TableAlias.?");
    }

    #[test]
    fn test_path_expression_skips_empty_segments() {
        assert_eq!(
            jsonb_path_expression(&["a", "", "b", ""], true),
            "?TableAlias.? -> 'a' ->> 'b'"
        );
        assert_eq!(jsonb_path_expression(&["", ""], true), "?TableAlias.?");
    }

    #[test]
    fn test_path_expression_escapes_segments() {
        assert_eq!(
            jsonb_path_expression(&["o'brien"], true),
            "?TableAlias.? ->> 'o''brien'"
        );
    }

    fn postgres() -> SelectQuery {
        let mut q = SelectQuery::with_dialect(Dialect::Postgres);
        q.table("docs").alias("d");
        q
    }

    #[test]
    fn test_jsonb_equal() {
        let mut q = postgres();
        q.apply(where_jsonb_equal("data", "kind", "note"));
        let (sql, params) = q.build().unwrap();
        assert!(sql.ends_with("WHERE (\"d\".\"data\" ->> $1 = $2)"));
        assert_eq!(params, vec![Param::from("kind"), Param::from("note")]);
    }

    #[test]
    fn test_jsonb_path_equal() {
        let mut q = postgres();
        q.apply(where_jsonb_path_equal("data", &["author", "name"], "ann"));
        let (sql, params) = q.build().unwrap();
        assert!(sql.ends_with("WHERE (\"d\".\"data\" -> 'author' ->> 'name' = $1)"));
        assert_eq!(params, vec![Param::from("ann")]);
    }

    #[test]
    fn test_objects_array_containment_on_postgres() {
        let mut q = postgres();
        q.apply(where_jsonb_objects_array_key_value_equal("data", "tags", "name", "rust"));
        let (sql, params) = q.build().unwrap();
        assert!(sql.ends_with(
            "WHERE (\"d\".\"data\" -> $1 @> jsonb_build_array(jsonb_build_object($2::text, $3::text)))"
        ));
        assert_eq!(
            params,
            vec![Param::from("tags"), Param::from("name"), Param::from("rust")]
        );
    }

    #[test]
    fn test_path_objects_array_containment_on_postgres() {
        let mut q = postgres();
        q.apply(where_jsonb_path_objects_array_key_value_equal(
            "data",
            &["meta", "tags"],
            "name",
            "rust",
        ));
        let (sql, params) = q.build().unwrap();
        assert!(sql.ends_with(
            "WHERE (\"d\".\"data\" -> 'meta' -> 'tags' @> jsonb_build_array(jsonb_build_object($1::text, $2::text)))"
        ));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_objects_array_containment_on_sqlite() {
        let mut q = SelectQuery::new();
        q.table("docs")
            .apply(where_jsonb_objects_array_key_value_equal("data", "tags", "name", "rust"));
        let (sql, params) = q.build().unwrap();
        assert!(sql.contains("EXISTS (SELECT 1 FROM json_each(\"docs\".\"data\" -> ?) AS \"elem\""));
        assert_eq!(params.len(), 3);
    }
}
