use std::sync::LazyLock;

use regex::Regex;

use crate::db::ConnectionKind;
use crate::utils::sql_string_list;

static SELECT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*select\s+(?:distinct\s+)?(?:top\s+\(?\d+\)?\s+)?").expect("valid select regex")
});

static ALIAS_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\s+as\s+(\S+)\s*$").expect("valid alias regex"));

fn unquote(name: &str) -> String {
    name.trim()
        .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
        .to_string()
}

/// Byte offset of the first top-level `FROM` keyword in `body`.
fn top_level_from(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0i32;
    let mut in_quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match in_quote {
            Some(q) if b == q => in_quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' | b'`' => in_quote = Some(b),
                b'[' => in_quote = Some(b']'),
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ if depth == 0 => {
                    let boundary_before = i == 0 || bytes[i - 1].is_ascii_whitespace();
                    let word = body.get(i..i + 4);
                    let boundary_after = bytes.get(i + 4).is_none_or(|c| c.is_ascii_whitespace());
                    if boundary_before && boundary_after && word.is_some_and(|w| w.eq_ignore_ascii_case("from")) {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Split the select list on commas outside parentheses.
fn split_select_list(list: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                items.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&list[start..]);
    items
}

/// Column names of a `SELECT` statement, in select-list order.
///
/// An `AS` alias wins; otherwise a trailing bare alias; otherwise the last
/// dotted part of the expression. Quoting characters are stripped. Returns
/// an empty list for anything that is not a plain select.
pub fn parse_column_names(sql: &str) -> Vec<String> {
    let Some(prefix) = SELECT_PREFIX.find(sql) else {
        return Vec::new();
    };
    let body = &sql[prefix.end()..];
    let list = match top_level_from(body) {
        Some(end) => &body[..end],
        None => body,
    };
    split_select_list(list)
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            if let Some(caps) = ALIAS_SUFFIX.captures(item) {
                return unquote(&caps[1]);
            }
            if !item.ends_with(')') {
                if let Some((_, last)) = item.rsplit_once(char::is_whitespace) {
                    return unquote(last);
                }
            }
            match item.rsplit_once('.') {
                Some((_, last)) if !item.ends_with(')') => unquote(last),
                _ => unquote(item),
            }
        })
        .collect()
}

pub fn select_columns_sql(kind: ConnectionKind, table: &str, columns: &[String]) -> String {
    let list = columns.iter().map(|c| kind.quote(c)).collect::<Vec<_>>().join(", ");
    format!("SELECT {list} FROM {}", kind.quote(table))
}

/// SQLite has no `TRUNCATE`.
pub fn truncate_sql(kind: ConnectionKind, table: &str) -> String {
    match kind {
        ConnectionKind::Sqlite => format!("DELETE FROM {}", kind.quote(table)),
        _ => format!("TRUNCATE TABLE {}", kind.quote(table)),
    }
}

/// Expression producing the unique id of a row from its id columns.
pub fn concat_columns(kind: ConnectionKind, columns: &[String]) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| kind.quote(c)).collect();
    match (quoted.len(), kind) {
        (1, _) => quoted.concat(),
        (_, ConnectionKind::Sqlite) => quoted.join(" || "),
        _ => format!("CONCAT({})", quoted.join(", ")),
    }
}

/// `DELETE FROM t WHERE <id expr> IN ('..', ..)`.
pub fn delete_ids_sql<'a, I>(kind: ConnectionKind, table: &str, id_columns: &[String], ids: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    format!(
        "DELETE FROM {} WHERE {} IN ({})",
        kind.quote(table),
        concat_columns(kind, id_columns),
        sql_string_list(ids)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_list_names() {
        let sql = "SELECT o.id, COUNT(x) AS total, [name] label, t.\"price\" FROM orders o";
        assert_eq!(parse_column_names(sql), vec!["id", "total", "label", "price"]);
    }

    #[test]
    fn nested_from_is_ignored() {
        let sql = "select id, (select max(v) from other) as top from t";
        assert_eq!(parse_column_names(sql), vec!["id", "top"]);
    }

    #[test]
    fn composite_ids() {
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(concat_columns(ConnectionKind::Sqlite, &cols), "\"a\" || \"b\"");
        assert_eq!(
            delete_ids_sql(ConnectionKind::SqlServer, "t", &cols, ["1x", "o'k"]),
            "DELETE FROM [t] WHERE CONCAT([a], [b]) IN ('1x','o''k')"
        );
    }
}
