use crate::driver::BindParam;
use crate::error::SqlError;

/// Bind one parameter into a statement at a 1-based index.
///
/// String and blob views are copied into the statement by SQLite during
/// the bind call, so the borrowed data does not need to outlive it.
/// Timestamps are stored as plain integers; SQLite has no temporal SQL
/// type and a numeric Unix time is compact and unambiguous.
pub(crate) fn bind_param(
    stmt: &mut rusqlite::Statement<'_>,
    index: usize,
    value: BindParam<'_>,
) -> Result<(), SqlError> {
    let result = match value {
        BindParam::Null => stmt.raw_bind_parameter(index, rusqlite::types::Null),
        BindParam::Int(v) => stmt.raw_bind_parameter(index, v),
        BindParam::LLong(v) | BindParam::Timestamp(v) => stmt.raw_bind_parameter(index, v),
        BindParam::Double(v) => stmt.raw_bind_parameter(index, v),
        BindParam::Text(v) => stmt.raw_bind_parameter(index, v),
        BindParam::Blob(v) => stmt.raw_bind_parameter(index, v),
    };
    result.map_err(|e| {
        SqlError::sql(
            "SqliteStatement::bind",
            format!("cannot bind parameter {index} -- {e}"),
        )
    })
}
