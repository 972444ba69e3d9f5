//! SQLite backend, implemented on `rusqlite`.
//!
//! Registered under the `sqlite` protocol. The URL path names the database
//! file (`sqlite:///var/db/app.db`); a path of `:memory:` opens an
//! in-memory database. Query parameters other than the reserved
//! `user`/`password`/`use-ssl`/`fetch-size` are applied as PRAGMAs at open,
//! so `sqlite:///db?synchronous=normal&journal_mode=wal` configures the
//! session the way the names suggest.

mod connection;
mod params;
mod query;
mod statement;

pub(crate) use connection::SqliteConnection;

use crate::driver::{Driver, DriverConnection};
use crate::error::SqlError;
use crate::url::DbUrl;

/// Driver factory for `sqlite://` URLs.
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn open(&self, url: &DbUrl) -> Result<Box<dyn DriverConnection>, SqlError> {
        Ok(Box::new(SqliteConnection::open(url)?))
    }
}
