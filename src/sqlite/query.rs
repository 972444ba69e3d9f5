use crate::driver::MaterializedRows;
use crate::error::SqlError;
use crate::types::SqlValue;

/// Extract one cell of a row into the unified value type.
fn extract_value(row: &rusqlite::Row<'_>, index: usize) -> Result<SqlValue, SqlError> {
    use rusqlite::types::ValueRef;
    let value = row
        .get_ref(index)
        .map_err(|e| SqlError::sql("SqliteConnection::execute_query", e.to_string()))?;
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::LLong(i),
        ValueRef::Real(f) => SqlValue::Double(f),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    })
}

/// Run a statement with its current bindings and collect every row.
///
/// SQLite steps rows out of the statement directly; there is no wire
/// protocol to prefetch over, so the rows are simply materialized.
pub(crate) fn materialize(
    stmt: &mut rusqlite::Statement<'_>,
) -> Result<MaterializedRows, SqlError> {
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(ToString::to_string)
        .collect();
    let mut rows = stmt.raw_query();
    let mut collected = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| SqlError::sql("SqliteConnection::execute_query", e.to_string()))?
    {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(extract_value(row, i)?);
        }
        collected.push(values);
    }
    Ok(MaterializedRows::new(columns, collected))
}

/// The first `;`-terminated statement of `sql`, quote- and comment-aware.
///
/// Queries may only run one statement at a time; anything after the first
/// semicolon is dropped by the caller's contract.
pub(crate) fn first_statement(sql: &str) -> &str {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b';' => return &sql[..=i],
            b'\'' | b'"' | b'`' => i = skip_quoted(bytes, i),
            b'[' => {
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    sql
}

// Advance past a quoted region, honoring the doubled-quote escape.
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i;
        }
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_semicolon() {
        assert_eq!(
            first_statement("SELECT 1; SELECT 2;"),
            "SELECT 1;"
        );
        assert_eq!(first_statement("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn semicolons_in_strings_do_not_split() {
        assert_eq!(
            first_statement("SELECT 'a;b'; SELECT 2;"),
            "SELECT 'a;b';"
        );
        assert_eq!(
            first_statement("SELECT 'it''s; fine'; SELECT 2;"),
            "SELECT 'it''s; fine';"
        );
        assert_eq!(
            first_statement("SELECT \"col;name\" FROM t; DROP TABLE t;"),
            "SELECT \"col;name\" FROM t;"
        );
    }

    #[test]
    fn semicolons_in_comments_do_not_split() {
        assert_eq!(
            first_statement("SELECT 1 -- nope; not here\n; SELECT 2;"),
            "SELECT 1 -- nope; not here\n;"
        );
        assert_eq!(
            first_statement("SELECT /* a;b */ 1; SELECT 2;"),
            "SELECT /* a;b */ 1;"
        );
    }
}
