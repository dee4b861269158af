/// SQL Rendering Module
///
/// Turns condition templates into SQL text plus an ordered parameter list.
/// Identifiers are quoted, values are always bound, never inlined.
use super::param::{Arg, Param};
use crate::core::{Result, SqlweaveError};
use serde::Deserialize;

/// Placeholder expanded to the statement's quoted table alias.
pub const TABLE_ALIAS: &str = "?TableAlias";

/// SQL flavour a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Executed through rusqlite; `?` placeholders
    #[default]
    Sqlite,
    /// Render-only; `$n` placeholders, `ILIKE`, `DISTINCT ON`, `@>`
    Postgres,
}

impl Dialect {
    /// Case-insensitive pattern match operator.
    pub fn ilike(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "LIKE",
            Dialect::Postgres => "ILIKE",
        }
    }
}

/// Quotes an identifier, doubling embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Expands a condition template.
///
/// `?TableAlias` becomes the quoted alias; with no alias it is dropped along
/// with a directly following `.`. Every other `?` consumes the next argument.
/// Question marks inside string literals and quoted identifiers are left
/// alone.
pub fn render_template(
    template: &str,
    args: &[Arg],
    alias: Option<&str>,
    params: &mut Vec<Param>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut args_iter = args.iter();
    let mut quote: Option<char> = None;
    let mut rest = template;

    while let Some(ch) = rest.chars().next() {
        if ch == '\'' || ch == '"' {
            quote = match quote {
                None => Some(ch),
                Some(q) if q == ch => None,
                open => open,
            };
            out.push(ch);
            rest = &rest[1..];
            continue;
        }
        if quote.is_some() || ch != '?' {
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
            continue;
        }

        if rest.starts_with(TABLE_ALIAS) {
            rest = &rest[TABLE_ALIAS.len()..];
            match alias {
                Some(alias) => out.push_str(&quote_ident(alias)),
                None => {
                    if rest.starts_with('.') {
                        rest = &rest[1..];
                    }
                }
            }
            continue;
        }

        rest = &rest[1..];
        match args_iter.next() {
            Some(Arg::Ident(name)) => out.push_str(&quote_ident(name)),
            Some(Arg::Value(value)) => {
                out.push('?');
                params.push(value.clone());
            }
            Some(Arg::List(values)) => {
                if values.is_empty() {
                    // Empty row set: IN is false and NOT IN is true.
                    out.push_str("SELECT NULL WHERE 1 = 0");
                } else {
                    out.push_str(&vec!["?"; values.len()].join(", "));
                    params.extend(values.iter().cloned());
                }
            }
            None => {
                return Err(SqlweaveError::Query(format!(
                    "not enough arguments for condition template: {}",
                    template
                )))
            }
        }
    }

    if args_iter.next().is_some() {
        return Err(SqlweaveError::Query(format!(
            "too many arguments for condition template: {}",
            template
        )));
    }

    Ok(out)
}

// Copies `sql`, handing every `?` outside string literals and quoted
// identifiers to `placeholder`. Doubled quotes close and reopen.
fn rewrite_placeholders(sql: &str, mut placeholder: impl FnMut(&mut String)) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    for ch in sql.chars() {
        match (ch, quote) {
            ('\'' | '"', None) => quote = Some(ch),
            (c, Some(q)) if c == q => quote = None,
            ('?', None) => {
                placeholder(&mut out);
                continue;
            }
            _ => {}
        }
        out.push(ch);
    }
    out
}

/// Rewrites `?` placeholders outside literals and quoted identifiers into
/// the dialect's form.
pub fn finish_placeholders(sql: String, dialect: Dialect) -> String {
    if dialect == Dialect::Sqlite {
        return sql;
    }

    let mut n = 0;
    rewrite_placeholders(&sql, |out| {
        n += 1;
        out.push('$');
        out.push_str(&n.to_string());
    })
}

/// Inlines bound parameters into SQL rendered with `?` placeholders.
pub fn inline_params(sql: &str, params: &[Param]) -> String {
    let mut params = params.iter();
    rewrite_placeholders(sql, |out| match params.next() {
        Some(param) => out.push_str(&param.to_sql_literal()),
        None => out.push('?'),
    })
}
