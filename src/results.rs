use crate::driver::DriverRows;
use crate::error::SqlError;
use crate::types::{SqlDateTime, SqlValue};

/// A forward-only cursor over the rows of a query.
///
/// The cursor starts *before* the first row; the first call to
/// [`next`](Self::next) makes the first row current. Rows can only be
/// visited once, front to back.
///
/// Column values are fetched by 1-based index or by name (case-sensitive,
/// first match wins). Values are coerced on demand: a numeric getter
/// parses text base-10 and fails with [`SqlError`] when the text is not a
/// number, while [`get_string`](Self::get_string) succeeds for any
/// non-null value. For SQL NULL, reference-shaped getters return `None`
/// and numeric getters return 0; use [`is_null`](Self::is_null) to tell
/// the two apart.
///
/// ```rust,no_run
/// use sql_pool::prelude::*;
///
/// # fn demo(conn: &mut Connection) -> Result<(), SqlError> {
/// let mut rows = conn.execute_query("SELECT name, age FROM users")?;
/// while rows.next()? {
///     let name = rows.get_string(1)?;
///     let age = rows.get_int(2)?;
///     println!("{}: {age}", name.as_deref().unwrap_or("n/a"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct ResultSet<'stmt> {
    rows: Box<dyn DriverRows + 'stmt>,
    on_row: bool,
    row_count: usize,
    max_rows: usize,
}

impl<'stmt> ResultSet<'stmt> {
    pub(crate) fn new(
        mut rows: Box<dyn DriverRows + 'stmt>,
        max_rows: usize,
        fetch_size: usize,
    ) -> Self {
        if fetch_size >= 1 {
            rows.set_fetch_size(fetch_size);
        }
        Self {
            rows,
            on_row: false,
            row_count: 0,
            max_rows,
        }
    }

    /// Number of columns in this result set.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.rows.column_count()
    }

    /// Name of the column at a 1-based index, or `None` when the index is
    /// out of range.
    #[must_use]
    pub fn column_name(&self, column_index: usize) -> Option<&str> {
        if column_index < 1 {
            return None;
        }
        self.rows.column_name(column_index - 1)
    }

    /// Byte size of the value at `column_index` in the current row. Blobs
    /// and strings report their stored length; numbers report the length
    /// of their string rendering. SQL NULL reports 0.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row or the index is out
    /// of range.
    pub fn column_size(&self, column_index: usize) -> Result<usize, SqlError> {
        let value = self.cell(column_index, "ResultSet::column_size")?;
        Ok(match value {
            SqlValue::Null => 0,
            other => other
                .as_bytes()
                .map_or_else(|| other.to_text().map_or(0, |s| s.len()), <[u8]>::len),
        })
    }

    /// Advance the cursor one row. Returns `false` when no rows remain; an
    /// empty result set returns `false` on the first call.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the backend fails while fetching.
    pub fn next(&mut self) -> Result<bool, SqlError> {
        if self.max_rows > 0 && self.row_count >= self.max_rows {
            self.on_row = false;
            return Ok(false);
        }
        self.on_row = self.rows.next()?;
        if self.on_row {
            self.row_count += 1;
        }
        Ok(self.on_row)
    }

    fn cell(&self, column_index: usize, function: &'static str) -> Result<&SqlValue, SqlError> {
        if !self.on_row {
            return Err(SqlError::sql(
                function,
                "no current row -- call next() before reading column values",
            ));
        }
        if column_index < 1 || column_index > self.rows.column_count() {
            return Err(SqlError::sql(
                function,
                format!(
                    "column index {column_index} is out of range [1..{}]",
                    self.rows.column_count()
                ),
            ));
        }
        self.rows
            .value(column_index - 1)
            .ok_or_else(|| SqlError::sql(function, "no current row"))
    }

    fn index_of(&self, column_name: &str, function: &'static str) -> Result<usize, SqlError> {
        (0..self.rows.column_count())
            .find(|&i| self.rows.column_name(i) == Some(column_name))
            .map(|i| i + 1)
            .ok_or_else(|| {
                SqlError::sql(function, format!("column '{column_name}' does not exist"))
            })
    }

    /// Whether the value at `column_index` in the current row is SQL NULL.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row or the index is out
    /// of range.
    pub fn is_null(&self, column_index: usize) -> Result<bool, SqlError> {
        Ok(self.cell(column_index, "ResultSet::is_null")?.is_null())
    }

    /// The value at `column_index` as a string, `None` for SQL NULL.
    ///
    /// Unlike the borrowed blob view, the string is freshly allocated per
    /// call, so it may be kept past the next [`next`](Self::next).
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row or the index is out
    /// of range.
    pub fn get_string(&self, column_index: usize) -> Result<Option<String>, SqlError> {
        Ok(self.cell(column_index, "ResultSet::get_string")?.to_text())
    }

    /// [`get_string`](Self::get_string) by column name.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row or the column does
    /// not exist.
    pub fn get_string_by_name(&self, column_name: &str) -> Result<Option<String>, SqlError> {
        let i = self.index_of(column_name, "ResultSet::get_string_by_name")?;
        self.get_string(i)
    }

    /// The value at `column_index` as an `i32`; SQL NULL yields 0.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row, the index is out
    /// of range, or the value cannot be read as a number.
    pub fn get_int(&self, column_index: usize) -> Result<i32, SqlError> {
        self.cell(column_index, "ResultSet::get_int")?
            .to_int()
            .map_err(|m| SqlError::sql("ResultSet::get_int", m))
    }

    /// [`get_int`](Self::get_int) by column name.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get_int`](Self::get_int), plus an unknown
    /// column name.
    pub fn get_int_by_name(&self, column_name: &str) -> Result<i32, SqlError> {
        let i = self.index_of(column_name, "ResultSet::get_int_by_name")?;
        self.get_int(i)
    }

    /// The value at `column_index` as an `i64`; SQL NULL yields 0.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row, the index is out
    /// of range, or the value cannot be read as a number.
    pub fn get_llong(&self, column_index: usize) -> Result<i64, SqlError> {
        self.cell(column_index, "ResultSet::get_llong")?
            .to_llong()
            .map_err(|m| SqlError::sql("ResultSet::get_llong", m))
    }

    /// [`get_llong`](Self::get_llong) by column name.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get_llong`](Self::get_llong), plus an unknown
    /// column name.
    pub fn get_llong_by_name(&self, column_name: &str) -> Result<i64, SqlError> {
        let i = self.index_of(column_name, "ResultSet::get_llong_by_name")?;
        self.get_llong(i)
    }

    /// The value at `column_index` as an `f64`; SQL NULL yields 0.0.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row, the index is out
    /// of range, or the value cannot be read as a number.
    pub fn get_double(&self, column_index: usize) -> Result<f64, SqlError> {
        self.cell(column_index, "ResultSet::get_double")?
            .to_double()
            .map_err(|m| SqlError::sql("ResultSet::get_double", m))
    }

    /// [`get_double`](Self::get_double) by column name.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get_double`](Self::get_double), plus an
    /// unknown column name.
    pub fn get_double_by_name(&self, column_name: &str) -> Result<f64, SqlError> {
        let i = self.index_of(column_name, "ResultSet::get_double_by_name")?;
        self.get_double(i)
    }

    /// The value at `column_index` as raw bytes, `None` for SQL NULL.
    ///
    /// The view borrows the current row and is only valid until the next
    /// call to [`next`](Self::next); copy it to keep it longer.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row, the index is out
    /// of range, or the value has no byte representation.
    pub fn get_blob(&self, column_index: usize) -> Result<Option<&[u8]>, SqlError> {
        let value = self.cell(column_index, "ResultSet::get_blob")?;
        if value.is_null() {
            return Ok(None);
        }
        value.as_bytes().map(Some).ok_or_else(|| {
            SqlError::sql(
                "ResultSet::get_blob",
                "column value cannot be read as binary data",
            )
        })
    }

    /// [`get_blob`](Self::get_blob) by column name.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get_blob`](Self::get_blob), plus an unknown
    /// column name.
    pub fn get_blob_by_name(&self, column_name: &str) -> Result<Option<&[u8]>, SqlError> {
        let i = self.index_of(column_name, "ResultSet::get_blob_by_name")?;
        self.get_blob(i)
    }

    /// The value at `column_index` as a Unix timestamp in UTC seconds; SQL
    /// NULL yields 0.
    ///
    /// For backends without temporal SQL types (SQLite), the stored value
    /// is taken to be either a numeric Unix time, returned as-is, or an
    /// ISO 8601 string, which is parsed.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row, the index is out
    /// of range, or the value cannot be converted to a timestamp.
    pub fn get_timestamp(&self, column_index: usize) -> Result<i64, SqlError> {
        self.cell(column_index, "ResultSet::get_timestamp")?
            .to_timestamp()
            .map_err(|m| SqlError::sql("ResultSet::get_timestamp", m))
    }

    /// [`get_timestamp`](Self::get_timestamp) by column name.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get_timestamp`](Self::get_timestamp), plus an
    /// unknown column name.
    pub fn get_timestamp_by_name(&self, column_name: &str) -> Result<i64, SqlError> {
        let i = self.index_of(column_name, "ResultSet::get_timestamp_by_name")?;
        self.get_timestamp(i)
    }

    /// The value at `column_index` as a broken-down [`SqlDateTime`]. SQL
    /// NULL yields a zeroed value; use [`is_null`](Self::is_null) if in
    /// doubt.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if there is no current row, the index is out
    /// of range, or the value cannot be converted to a date or time.
    pub fn get_datetime(&self, column_index: usize) -> Result<SqlDateTime, SqlError> {
        self.cell(column_index, "ResultSet::get_datetime")?
            .to_datetime()
            .map_err(|m| SqlError::sql("ResultSet::get_datetime", m))
    }

    /// [`get_datetime`](Self::get_datetime) by column name.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get_datetime`](Self::get_datetime), plus an
    /// unknown column name.
    pub fn get_datetime_by_name(&self, column_name: &str) -> Result<SqlDateTime, SqlError> {
        let i = self.index_of(column_name, "ResultSet::get_datetime_by_name")?;
        self.get_datetime(i)
    }

    /// Hint how many rows to prefetch per database round-trip for the
    /// remaining [`next`](Self::next) calls. Only meaningful for backends
    /// that prefetch (MySQL, Oracle).
    ///
    /// # Panics
    ///
    /// Fatal if `rows` is less than 1: a panic, or the abort handler when
    /// one is installed.
    pub fn set_fetch_size(&mut self, rows: usize) {
        if rows < 1 {
            SqlError::assert_failure("ResultSet::set_fetch_size", "fetch size must be >= 1");
        }
        self.rows.set_fetch_size(rows);
    }

    /// The current prefetch batch size hint.
    #[must_use]
    pub fn fetch_size(&self) -> usize {
        self.rows.fetch_size()
    }
}
