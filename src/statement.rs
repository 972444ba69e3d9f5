use std::cell::Cell;

use crate::driver::{BindParam, DriverStatement};
use crate::error::SqlError;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// A pre-compiled SQL statement with positional `?` parameters.
///
/// Created by [`Connection::prepare`](crate::Connection::prepare); borrows
/// its connection, so it cannot outlive the checkout. Parameters are
/// numbered from 1. String and blob setters take borrowed views which the
/// backend consumes before the call returns, so the referenced data only
/// needs to live for the duration of the `set_*` call.
///
/// ```rust,no_run
/// use sql_pool::prelude::*;
///
/// # fn demo(conn: &mut Connection) -> Result<(), SqlError> {
/// let mut stmt = conn.prepare("INSERT INTO logs (message, created) VALUES (?, ?)")?;
/// stmt.set_string(1, "user logged in")?;
/// stmt.set_timestamp(2, 1_700_000_000)?;
/// stmt.execute()?;
/// # Ok(())
/// # }
/// ```
pub struct PreparedStatement<'conn> {
    stmt: Box<dyn DriverStatement + 'conn>,
    // The owning connection's rows-changed counter.
    conn_rows_changed: &'conn Cell<u64>,
    max_rows: usize,
    fetch_size: usize,
}

impl<'conn> PreparedStatement<'conn> {
    pub(crate) fn new(
        stmt: Box<dyn DriverStatement + 'conn>,
        conn_rows_changed: &'conn Cell<u64>,
        max_rows: usize,
        fetch_size: usize,
    ) -> Self {
        Self {
            stmt,
            conn_rows_changed,
            max_rows,
            fetch_size,
        }
    }

    fn check_index(&self, index: usize) -> Result<(), SqlError> {
        let count = self.stmt.parameter_count();
        if index < 1 || index > count {
            return Err(SqlError::sql(
                "PreparedStatement::bind",
                format!("parameter index {index} is out of range [1..{count}]"),
            ));
        }
        Ok(())
    }

    fn bind(&mut self, index: usize, value: BindParam<'_>) -> Result<(), SqlError> {
        self.check_index(index)?;
        self.stmt.bind(index, value)
    }

    /// Bind SQL NULL at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if `index` is out of range or the backend
    /// rejects the binding. The same applies to every `set_*` method.
    pub fn set_null(&mut self, index: usize) -> Result<(), SqlError> {
        self.bind(index, BindParam::Null)
    }

    /// Bind a string value at `index`.
    pub fn set_string(&mut self, index: usize, value: &str) -> Result<(), SqlError> {
        self.bind(index, BindParam::Text(value))
    }

    /// Bind a 32-bit integer at `index`.
    pub fn set_int(&mut self, index: usize, value: i32) -> Result<(), SqlError> {
        self.bind(index, BindParam::Int(value))
    }

    /// Bind a 64-bit integer at `index`.
    pub fn set_llong(&mut self, index: usize, value: i64) -> Result<(), SqlError> {
        self.bind(index, BindParam::LLong(value))
    }

    /// Bind a double at `index`.
    pub fn set_double(&mut self, index: usize, value: f64) -> Result<(), SqlError> {
        self.bind(index, BindParam::Double(value))
    }

    /// Bind a binary value at `index`. An empty byte sequence binds SQL
    /// NULL.
    pub fn set_blob(&mut self, index: usize, value: &[u8]) -> Result<(), SqlError> {
        if value.is_empty() {
            self.bind(index, BindParam::Null)
        } else {
            self.bind(index, BindParam::Blob(value))
        }
    }

    /// Bind a Unix timestamp (UTC seconds) at `index`.
    ///
    /// SQLite has no temporal SQL types; the value is stored as a numeric
    /// type, as-is.
    pub fn set_timestamp(&mut self, index: usize, value: i64) -> Result<(), SqlError> {
        self.bind(index, BindParam::Timestamp(value))
    }

    /// Bind a whole parameter list at once, values to indices 1..=N.
    ///
    /// The call is atomic with respect to the parameter count: when
    /// `values.len()` differs from [`parameter_count`](Self::parameter_count),
    /// nothing is bound and an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] on a count mismatch or any rejected binding.
    pub fn bind_values(&mut self, values: &[SqlValue]) -> Result<(), SqlError> {
        bind_values_into(&mut *self.stmt, values)
    }

    /// Number of `?` placeholders in the statement.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.stmt.parameter_count()
    }

    /// Run the statement. Bound string/blob references were already
    /// consumed at bind time, so nothing needs to stay alive across this
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the backend reports an error.
    pub fn execute(&mut self) -> Result<(), SqlError> {
        let changed = self.stmt.execute()?;
        self.conn_rows_changed.set(changed);
        Ok(())
    }

    /// Run the statement as a query. The returned [`ResultSet`] borrows
    /// this statement and is consumed by the next statement call.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the backend reports an error.
    pub fn execute_query(&mut self) -> Result<ResultSet<'_>, SqlError> {
        let (max_rows, fetch_size) = (self.max_rows, self.fetch_size);
        self.conn_rows_changed.set(0);
        let rows = self.stmt.execute_query()?;
        Ok(ResultSet::new(rows, max_rows, fetch_size))
    }

    /// Number of rows changed by the most recent
    /// [`execute`](Self::execute).
    ///
    /// Inside a transaction, read this *before* commit; the connection's
    /// count is reset to zero when the transaction ends.
    #[must_use]
    pub fn rows_changed(&self) -> u64 {
        self.stmt.rows_changed()
    }
}

/// Bind a full value list into a driver statement, checking the count
/// first so a mismatch binds nothing.
pub(crate) fn bind_values_into(
    stmt: &mut dyn DriverStatement,
    values: &[SqlValue],
) -> Result<(), SqlError> {
    let count = stmt.parameter_count();
    if values.len() != count {
        return Err(SqlError::sql(
            "PreparedStatement::bind_values",
            format!(
                "parameter count mismatch -- statement has {count} parameters, {} values given",
                values.len()
            ),
        ));
    }
    for (i, value) in values.iter().enumerate() {
        let param = match value {
            SqlValue::Null => BindParam::Null,
            SqlValue::Int(v) => BindParam::Int(*v),
            SqlValue::LLong(v) => BindParam::LLong(*v),
            SqlValue::Double(v) => BindParam::Double(*v),
            SqlValue::Text(v) => BindParam::Text(v),
            SqlValue::Blob(v) if v.is_empty() => BindParam::Null,
            SqlValue::Blob(v) => BindParam::Blob(v),
            SqlValue::Timestamp(v) => BindParam::Timestamp(*v),
        };
        stmt.bind(i + 1, param)?;
    }
    Ok(())
}
