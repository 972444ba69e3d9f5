/*!
 * SQL Pool - a thread-safe database connection pool
 *
 * This crate multiplexes a bounded set of long-lived SQL connections
 * across many concurrent threads. Callers check a connection out of the
 * pool, use it briefly for queries, prepared statements or transactions,
 * and return it by dropping the handle. The pool reuses idle connections,
 * opens new ones on demand up to a maximum, and a background reaper
 * thread closes stale or broken connections, trimming the pool back
 * toward its initial size.
 *
 * # Features
 *
 * - Bounded pooling with fail-fast acquisition (a full pool errors
 *   instead of blocking)
 * - Every handed-out connection passed a liveness ping during checkout
 * - Uniform parameter binding and result-set access across backends
 * - Automatic rollback of open transactions when a connection returns
 * - Pluggable backends through a driver registry keyed by URL protocol;
 *   SQLite ships in the box
 *
 * # Example
 *
 * ```rust,no_run
 * use sql_pool::prelude::*;
 *
 * fn example() -> Result<(), SqlError> {
 *     let url = "sqlite:///var/db/app.db?synchronous=normal".parse()?;
 *     let pool = ConnectionPool::new(url)?;
 *     pool.start()?;
 *
 *     let mut conn = pool.get_connection()?;
 *     conn.execute("CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)")?;
 *
 *     let mut stmt = conn.prepare("INSERT INTO users (name) VALUES (?)")?;
 *     stmt.set_string(1, "alice")?;
 *     stmt.execute()?;
 *     drop(stmt);
 *
 *     let mut rows = conn.execute_query("SELECT id, name FROM users")?;
 *     while rows.next()? {
 *         println!("{} {}", rows.get_llong(1)?, rows.get_string(2)?.unwrap_or_default());
 *     }
 *     drop(rows);
 *     drop(conn);
 *
 *     pool.stop()?;
 *     Ok(())
 * }
 * ```
 */

#![forbid(unsafe_code)]

pub mod connection;
pub mod driver;
pub mod error;
pub mod pool;
pub mod results;
pub mod statement;
pub mod types;
pub mod url;

// Backend implementations (conditionally compiled)
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the core surface at the crate root
pub use connection::{Connection, TransactionType};
pub use error::{ErrorKind, OrAbort, SqlError, set_abort_handler};
pub use pool::ConnectionPool;
pub use results::ResultSet;
pub use statement::PreparedStatement;
pub use types::{SqlDateTime, SqlValue};
pub use url::DbUrl;

pub mod prelude {
    //! Convenient imports for common functionality.

    pub use crate::connection::{Connection, TransactionType};
    pub use crate::driver::{
        BindParam, Driver, DriverConnection, DriverRows, DriverStatement, MaterializedRows,
        is_supported, register_driver,
    };
    pub use crate::error::{ErrorKind, OrAbort, SqlError, set_abort_handler};
    pub use crate::pool::{
        ConnectionPool, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_FETCH_SIZE,
        DEFAULT_INITIAL_CONNECTIONS, DEFAULT_MAX_CONNECTIONS, DEFAULT_SWEEP_INTERVAL,
    };
    pub use crate::results::ResultSet;
    pub use crate::statement::PreparedStatement;
    pub use crate::types::{SqlDateTime, SqlValue};
    pub use crate::url::{DbUrl, percent_decode, percent_encode};

    #[cfg(feature = "sqlite")]
    pub use crate::sqlite::SqliteDriver;
}
