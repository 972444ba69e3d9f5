use std::cell::Cell;
use std::sync::Arc;

use tracing::warn;

use crate::driver::{Driver, DriverConnection, MaterializedRows};
use crate::error::SqlError;
use crate::pool::{DEFAULT_FETCH_SIZE, PoolInner};
use crate::results::ResultSet;
use crate::statement::{PreparedStatement, bind_values_into};
use crate::types::SqlValue;
use crate::url::DbUrl;

/// Transaction isolation levels and behaviors.
///
/// Support varies by database system: SQLite runs every isolation level as
/// SERIALIZABLE and adds its own `Immediate`/`Exclusive` locking variants;
/// `ReadUncommitted` is a MySQL-only level. The core forwards the type to
/// the backend unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionType {
    /// The backend's default isolation level.
    #[default]
    Default,
    /// Transactions can read uncommitted data (MySQL).
    ReadUncommitted,
    /// A transaction only sees data committed before it began.
    ReadCommitted,
    /// Prevents non-repeatable reads.
    RepeatableRead,
    /// Full serializable isolation.
    Serializable,
    /// SQLite: start immediately, acquiring a RESERVED lock.
    Immediate,
    /// SQLite: start immediately, acquiring an EXCLUSIVE lock.
    Exclusive,
}

/// Per-session state that travels with a connection between the pool and
/// its current holder.
pub(crate) struct ConnCore {
    pub(crate) driver: Box<dyn DriverConnection>,
    pub(crate) in_transaction: bool,
    // Rows changed by the most recent execute; zeroed by commit and
    // rollback. A Cell so prepared statements, which hold the driver
    // borrow, can still record their counts.
    last_rows_changed: Cell<u64>,
    query_timeout_ms: i32,
    max_rows: usize,
    fetch_size: usize,
}

impl ConnCore {
    /// Open a fresh backend session configured from the URL.
    pub(crate) fn open(driver: &dyn Driver, url: &DbUrl) -> Result<Self, SqlError> {
        let conn = driver.open(url)?;
        let fetch_size = match url.parameter("fetch-size") {
            Some(v) => v.parse::<usize>().ok().filter(|n| *n >= 1).ok_or_else(|| {
                SqlError::sql(
                    "Connection::open",
                    format!("invalid fetch-size parameter '{v}'"),
                )
            })?,
            None => DEFAULT_FETCH_SIZE,
        };
        Ok(Self {
            driver: conn,
            in_transaction: false,
            last_rows_changed: Cell::new(0),
            query_timeout_ms: 0,
            max_rows: 0,
            fetch_size,
        })
    }

    pub(crate) fn ping(&mut self) -> bool {
        self.driver.ping()
    }
}

/// A connection checked out of a [`ConnectionPool`](crate::ConnectionPool).
///
/// Execute SQL directly with [`execute`](Self::execute) /
/// [`execute_query`](Self::execute_query), or compile a reusable statement
/// with [`prepare`](Self::prepare). Dropping the handle (or calling
/// [`close`](Self::close)) returns the connection to its pool; an open
/// transaction is rolled back on the way back.
///
/// A connection is not thread-safe and belongs to one thread at a time;
/// the handle is `Send` so it can move between threads, but statements and
/// result sets borrow it and pin it in place while they live.
pub struct Connection {
    pool: Arc<PoolInner>,
    id: u64,
    core: Option<ConnCore>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

impl Connection {
    pub(crate) fn new(pool: Arc<PoolInner>, id: u64, core: ConnCore) -> Self {
        Self {
            pool,
            id,
            core: Some(core),
        }
    }

    fn core_mut(&mut self) -> &mut ConnCore {
        self.core.as_mut().expect("connection already returned")
    }

    fn core(&self) -> &ConnCore {
        self.core.as_ref().expect("connection already returned")
    }

    /// Execute one or more `;`-separated SQL statements that return no
    /// result, such as INSERT, UPDATE, DELETE or DDL.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the backend reports an error; the connection
    /// stays usable.
    pub fn execute(&mut self, sql: &str) -> Result<(), SqlError> {
        let core = self.core_mut();
        let changed = core.driver.execute(sql)?;
        core.last_rows_changed.set(changed);
        Ok(())
    }

    /// Execute a single SQL statement with positional `?` parameters.
    ///
    /// The statement is prepared internally, the parameters bound 1..N, and
    /// the statement run once. With an empty parameter slice this behaves
    /// exactly like [`execute`](Self::execute).
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] on a parameter-count mismatch (nothing is
    /// bound) or any backend error.
    pub fn execute_params(&mut self, sql: &str, params: &[SqlValue]) -> Result<(), SqlError> {
        if params.is_empty() {
            return self.execute(sql);
        }
        let core = self.core_mut();
        let mut stmt = core.driver.prepare(sql)?;
        bind_values_into(&mut *stmt, params)?;
        let changed = stmt.execute()?;
        drop(stmt);
        core.last_rows_changed.set(changed);
        Ok(())
    }

    /// Execute a SQL SELECT statement and return its rows.
    ///
    /// Only **one** statement may run per query: if `sql` contains several
    /// `;`-separated statements, the first is executed and the rest are
    /// silently dropped. The returned [`ResultSet`] borrows this connection
    /// and is consumed by the next call on it.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the backend reports an error.
    pub fn execute_query(&mut self, sql: &str) -> Result<ResultSet<'_>, SqlError> {
        let (max_rows, fetch_size) = (self.core().max_rows, self.core().fetch_size);
        let core = self.core_mut();
        core.last_rows_changed.set(0);
        let rows = core.driver.execute_query(sql)?;
        Ok(ResultSet::new(rows, max_rows, fetch_size))
    }

    /// Execute a SQL SELECT statement with positional `?` parameters.
    ///
    /// Same dispatch as [`execute_params`](Self::execute_params): the
    /// statement is prepared and bound internally. The row set is detached
    /// from the internal statement, so it stays valid until the next call
    /// on this connection.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] on a parameter-count mismatch or backend error.
    pub fn execute_query_params(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet<'_>, SqlError> {
        if params.is_empty() {
            return self.execute_query(sql);
        }
        let (max_rows, fetch_size) = (self.core().max_rows, self.core().fetch_size);
        let core = self.core_mut();
        core.last_rows_changed.set(0);
        let mut stmt = core.driver.prepare(sql)?;
        bind_values_into(&mut *stmt, params)?;
        let rows = MaterializedRows::collect(stmt.execute_query()?)?;
        drop(stmt);
        Ok(ResultSet::new(Box::new(rows), max_rows, fetch_size))
    }

    /// Compile a SQL statement with `?` placeholders for repeated
    /// execution. The statement borrows this connection; it cannot outlive
    /// the checkout.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the backend cannot compile the statement.
    pub fn prepare(&mut self, sql: &str) -> Result<PreparedStatement<'_>, SqlError> {
        let (max_rows, fetch_size) = (self.core().max_rows, self.core().fetch_size);
        let core = self.core_mut();
        let rows_changed = &core.last_rows_changed;
        let stmt = core.driver.prepare(sql)?;
        Ok(PreparedStatement::new(stmt, rows_changed, max_rows, fetch_size))
    }

    /// Begin a transaction with the backend's default isolation level.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if a transaction is already open (nested
    /// transactions are not supported) or the backend fails.
    pub fn begin_transaction(&mut self) -> Result<(), SqlError> {
        self.begin_transaction_type(TransactionType::Default)
    }

    /// Begin a transaction of a specific [`TransactionType`].
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if a transaction is already open or the backend
    /// fails.
    pub fn begin_transaction_type(
        &mut self,
        transaction_type: TransactionType,
    ) -> Result<(), SqlError> {
        let core = self.core_mut();
        if core.in_transaction {
            return Err(SqlError::sql(
                "Connection::begin_transaction",
                "transaction already in progress -- nested transactions are not supported",
            ));
        }
        core.driver.begin(transaction_type)?;
        core.in_transaction = true;
        Ok(())
    }

    /// Whether an uncommitted transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.core().in_transaction
    }

    /// Commit the current transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if no transaction is open or the backend fails.
    pub fn commit(&mut self) -> Result<(), SqlError> {
        let core = self.core_mut();
        if !core.in_transaction {
            return Err(SqlError::sql(
                "Connection::commit",
                "no transaction in progress",
            ));
        }
        core.driver.commit()?;
        core.in_transaction = false;
        core.last_rows_changed.set(0);
        Ok(())
    }

    /// Roll back the current transaction, discarding its changes.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if no transaction is open or the backend fails.
    pub fn rollback(&mut self) -> Result<(), SqlError> {
        let core = self.core_mut();
        if !core.in_transaction {
            return Err(SqlError::sql(
                "Connection::rollback",
                "no transaction in progress",
            ));
        }
        core.driver.rollback()?;
        core.in_transaction = false;
        core.last_rows_changed.set(0);
        Ok(())
    }

    /// Round-trip to the database to check the connection is alive.
    pub fn ping(&mut self) -> bool {
        self.core_mut().ping()
    }

    /// Reset any statement or result state on the connection.
    ///
    /// Statements and result sets borrow the connection, so stale handles
    /// cannot exist by the time this can be called; the method is an
    /// explicit reset point and is safe to call repeatedly.
    pub fn clear(&mut self) {
        let _ = self.core_mut();
    }

    /// Row id generated by the most recent insert on this connection.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the backend does not track row ids.
    pub fn last_row_id(&mut self) -> Result<i64, SqlError> {
        self.core_mut().driver.last_row_id()
    }

    /// Number of rows changed by the most recent execute.
    ///
    /// Inside a transaction, read this *before* ending it: `commit` and
    /// `rollback` reset the count to zero.
    #[must_use]
    pub fn rows_changed(&self) -> u64 {
        self.core().last_rows_changed.get()
    }

    /// The statement timeout in milliseconds; 0 means no limit.
    #[must_use]
    pub fn query_timeout(&self) -> i32 {
        self.core().query_timeout_ms
    }

    /// Set the statement timeout for this session. Not every backend
    /// supports one.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if the backend rejects the timeout.
    pub fn set_query_timeout(&mut self, ms: i32) -> Result<(), SqlError> {
        if ms < 0 {
            SqlError::assert_failure(
                "Connection::set_query_timeout",
                "query timeout must not be negative",
            );
        }
        let core = self.core_mut();
        core.driver.set_query_timeout(ms)?;
        core.query_timeout_ms = ms;
        Ok(())
    }

    /// Maximum number of rows a result set will yield; 0 means no limit.
    #[must_use]
    pub fn max_rows(&self) -> usize {
        self.core().max_rows
    }

    /// Cap the number of rows result sets yield. Excess rows are silently
    /// dropped.
    pub fn set_max_rows(&mut self, max: usize) {
        self.core_mut().max_rows = max;
    }

    /// The prefetch batch size hint for result sets.
    #[must_use]
    pub fn fetch_size(&self) -> usize {
        self.core().fetch_size
    }

    /// Set the prefetch batch size hint. Only meaningful for backends that
    /// prefetch rows; also settable for all connections through the
    /// `fetch-size` URL parameter.
    ///
    /// # Panics
    ///
    /// Fatal if `rows` is less than 1: a panic, or the abort handler when
    /// one is installed.
    pub fn set_fetch_size(&mut self, rows: usize) {
        if rows < 1 {
            SqlError::assert_failure("Connection::set_fetch_size", "fetch size must be >= 1");
        }
        self.core_mut().fetch_size = rows;
    }

    /// The URL of the pool this connection belongs to.
    #[must_use]
    pub fn url(&self) -> &DbUrl {
        self.pool.url()
    }

    /// Return the connection to its pool.
    ///
    /// Equivalent to dropping the handle: an open transaction is rolled
    /// back (failures are logged, not propagated) and the connection is
    /// marked available again.
    pub fn close(self) {
        // Drop does the work.
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(mut core) = self.core.take() {
            if core.in_transaction {
                if let Err(e) = core.driver.rollback() {
                    warn!(error = %e, "failed to rollback transaction on connection return");
                }
                core.in_transaction = false;
                core.last_rows_changed.set(0);
            }
            self.pool.checkin(self.id, core);
        }
    }
}
