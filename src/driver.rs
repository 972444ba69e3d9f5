//! The contract a database backend implements to plug into the pool.
//!
//! A backend provides a [`Driver`] that opens connections from a [`DbUrl`],
//! plus the three object kinds the core drives: connections, prepared
//! statements, and row cursors. Drivers are registered process-wide by
//! protocol name and resolved once, when a pool is created.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::connection::TransactionType;
use crate::error::SqlError;
use crate::types::SqlValue;
use crate::url::DbUrl;

/// A borrowed statement parameter.
///
/// String and blob variants are views into caller memory; a driver must
/// consume them (copy into the statement) before `bind` returns.
#[derive(Debug, Clone, Copy)]
pub enum BindParam<'a> {
    /// SQL NULL
    Null,
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    LLong(i64),
    /// 64-bit float
    Double(f64),
    /// Text view
    Text(&'a str),
    /// Binary view
    Blob(&'a [u8]),
    /// Unix timestamp, UTC seconds
    Timestamp(i64),
}

/// Factory for backend connections, keyed by URL protocol.
pub trait Driver: Send + Sync {
    /// Open a new session against the database the URL describes.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] with the backend's connect error message.
    fn open(&self, url: &DbUrl) -> Result<Box<dyn DriverConnection>, SqlError>;
}

/// One live backend session. Closing is dropping.
pub trait DriverConnection: Send {
    /// Round-trip to the server to check the session is alive.
    fn ping(&mut self) -> bool;

    /// Start a transaction of the given type.
    fn begin(&mut self, transaction_type: TransactionType) -> Result<(), SqlError>;

    fn commit(&mut self) -> Result<(), SqlError>;

    fn rollback(&mut self) -> Result<(), SqlError>;

    /// Execute one or more `;`-separated statements, returning the number
    /// of rows changed by the last one.
    fn execute(&mut self, sql: &str) -> Result<u64, SqlError>;

    /// Execute the first statement of `sql` and return its rows. Any
    /// additional statements are silently dropped.
    fn execute_query<'c>(&'c mut self, sql: &str) -> Result<Box<dyn DriverRows + 'c>, SqlError>;

    /// Compile a single statement with `?` placeholders.
    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn DriverStatement + 'c>, SqlError>;

    /// Session-level statement timeout in milliseconds; 0 disables it.
    ///
    /// # Errors
    ///
    /// Backends without a timeout mechanism fail with a "not supported"
    /// [`SqlError`].
    fn set_query_timeout(&mut self, ms: i32) -> Result<(), SqlError> {
        let _ = ms;
        Err(SqlError::sql(
            "DriverConnection::set_query_timeout",
            "query timeout is not supported by this database backend",
        ))
    }

    /// Row id generated by the most recent insert.
    ///
    /// # Errors
    ///
    /// Backends without generated row ids fail with a "not supported"
    /// [`SqlError`].
    fn last_row_id(&mut self) -> Result<i64, SqlError> {
        Err(SqlError::sql(
            "DriverConnection::last_row_id",
            "row ids are not supported by this database backend",
        ))
    }
}

/// A compiled statement with positional parameters.
///
/// Statements borrow their connection and stay on the thread using it, so
/// implementations need not be `Send`.
pub trait DriverStatement {
    /// Bind a parameter at a 1-based index. The view in `value` is consumed
    /// before the call returns.
    fn bind(&mut self, index: usize, value: BindParam<'_>) -> Result<(), SqlError>;

    /// Number of `?` placeholders in the statement.
    fn parameter_count(&self) -> usize;

    /// Run the statement, returning the number of rows changed.
    fn execute(&mut self) -> Result<u64, SqlError>;

    /// Run the statement as a query.
    fn execute_query<'s>(&'s mut self) -> Result<Box<dyn DriverRows + 's>, SqlError>;

    /// Rows changed by the most recent [`execute`](Self::execute).
    fn rows_changed(&self) -> u64;
}

/// A forward-only cursor over query results.
///
/// The cursor starts before the first row; `next` advances it. Cell values
/// for the current row are exposed through [`value`](Self::value). Like
/// statements, cursors stay on the thread holding the connection.
pub trait DriverRows {
    /// Advance to the next row. Returns false when the rows are exhausted.
    fn next(&mut self) -> Result<bool, SqlError>;

    fn column_count(&self) -> usize;

    /// Name of a column by 0-based index.
    fn column_name(&self, index: usize) -> Option<&str>;

    /// Cell of the current row by 0-based index; `None` when out of range.
    fn value(&self, index: usize) -> Option<&SqlValue>;

    /// Hint how many rows to prefetch per round-trip. Backends that do not
    /// prefetch ignore it.
    fn set_fetch_size(&mut self, rows: usize);

    fn fetch_size(&self) -> usize;
}

/// Fully materialized query results, the in-memory [`DriverRows`]
/// implementation.
///
/// Backends that have no streaming protocol (SQLite) produce these
/// directly; the core also uses them to detach a row set from the
/// statement that produced it.
pub struct MaterializedRows {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    current: Option<usize>,
    fetch_size: usize,
}

impl MaterializedRows {
    /// Wrap pre-collected rows. The cursor starts before the first row.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            current: None,
            fetch_size: 0,
        }
    }

    /// Drain a cursor into owned rows, releasing whatever it borrowed.
    ///
    /// # Errors
    ///
    /// Propagates any [`SqlError`] raised while fetching.
    pub fn collect(mut rows: Box<dyn DriverRows + '_>) -> Result<Self, SqlError> {
        let columns: Vec<String> = (0..rows.column_count())
            .map(|i| rows.column_name(i).unwrap_or_default().to_string())
            .collect();
        let mut collected = Vec::new();
        while rows.next()? {
            let row: Vec<SqlValue> = (0..columns.len())
                .map(|i| rows.value(i).cloned().unwrap_or(SqlValue::Null))
                .collect();
            collected.push(row);
        }
        Ok(Self::new(columns, collected))
    }
}

impl DriverRows for MaterializedRows {
    fn next(&mut self) -> Result<bool, SqlError> {
        let next = self.current.map_or(0, |i| i + 1);
        if next < self.rows.len() {
            self.current = Some(next);
            Ok(true)
        } else {
            self.current = Some(self.rows.len());
            Ok(false)
        }
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(String::as_str)
    }

    fn value(&self, index: usize) -> Option<&SqlValue> {
        let row = self.rows.get(self.current?)?;
        row.get(index)
    }

    fn set_fetch_size(&mut self, rows: usize) {
        self.fetch_size = rows;
    }

    fn fetch_size(&self) -> usize {
        self.fetch_size
    }
}

type Registry = RwLock<HashMap<String, Arc<dyn Driver>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, Arc<dyn Driver>> = HashMap::new();
        #[cfg(feature = "sqlite")]
        map.insert("sqlite".to_string(), Arc::new(crate::sqlite::SqliteDriver));
        RwLock::new(map)
    })
}

/// Register a driver for a protocol, replacing any previous registration.
pub fn register_driver(protocol: &str, driver: Arc<dyn Driver>) {
    registry().write().insert(protocol.to_string(), driver);
}

/// Resolve the driver for a protocol.
pub(crate) fn driver_for(protocol: &str) -> Result<Arc<dyn Driver>, SqlError> {
    registry().read().get(protocol).cloned().ok_or_else(|| {
        SqlError::sql(
            "driver::driver_for",
            format!("database protocol '{protocol}' is not supported"),
        )
    })
}

/// Check whether a database protocol is supported. Accepts either a full
/// connection URL or just the protocol name, e.g. `"sqlite"`.
#[must_use]
pub fn is_supported(url_or_protocol: &str) -> bool {
    let protocol = url_or_protocol
        .split_once("://")
        .map_or(url_or_protocol, |(p, _)| p);
    registry().read().contains_key(protocol)
}
