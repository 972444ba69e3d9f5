use std::time::Duration;

use crate::connection::TransactionType;
use crate::driver::{DriverConnection, DriverRows, DriverStatement};
use crate::error::SqlError;
use crate::url::DbUrl;

use super::query::{first_statement, materialize};
use super::statement::SqliteStatement;

// URL parameters with a meaning of their own; everything else becomes a
// PRAGMA.
const RESERVED_PARAMETERS: [&str; 4] = ["user", "password", "use-ssl", "fetch-size"];

pub(crate) struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub(crate) fn open(url: &DbUrl) -> Result<Self, SqlError> {
        let path = url.path().ok_or_else(|| {
            SqlError::sql(
                "SqliteConnection::open",
                format!("no database path in URL '{url}'"),
            )
        })?;
        let path = if path.trim_start_matches('/') == ":memory:" {
            ":memory:"
        } else {
            path
        };
        let conn = rusqlite::Connection::open(path).map_err(|e| {
            SqlError::sql(
                "SqliteConnection::open",
                format!("unable to open database '{path}' -- {e}"),
            )
        })?;
        let this = Self { conn };
        for (name, value) in url.parameters() {
            if !RESERVED_PARAMETERS.contains(&name) {
                this.apply_pragma(name, value)?;
            }
        }
        Ok(this)
    }

    fn apply_pragma(&self, name: &str, value: &str) -> Result<(), SqlError> {
        let well_formed = |s: &str, extra: fn(char) -> bool| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || extra(c))
        };
        if !well_formed(name, |c| c == '_') || !well_formed(value, |c| matches!(c, '_' | '-' | '.'))
        {
            return Err(SqlError::sql(
                "SqliteConnection::open",
                format!("invalid pragma parameter '{name}={value}'"),
            ));
        }
        // execute_batch tolerates pragmas that echo a result row, such as
        // journal_mode.
        self.conn
            .execute_batch(&format!("PRAGMA {name} = {value};"))
            .map_err(|e| {
                SqlError::sql(
                    "SqliteConnection::open",
                    format!("cannot apply pragma '{name}={value}' -- {e}"),
                )
            })
    }
}

impl DriverConnection for SqliteConnection {
    fn ping(&mut self) -> bool {
        self.conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
    }

    fn begin(&mut self, transaction_type: TransactionType) -> Result<(), SqlError> {
        // SQLite runs every isolation level as SERIALIZABLE; only its own
        // locking variants change the statement.
        let sql = match transaction_type {
            TransactionType::Immediate => "BEGIN IMMEDIATE TRANSACTION;",
            TransactionType::Exclusive => "BEGIN EXCLUSIVE TRANSACTION;",
            _ => "BEGIN TRANSACTION;",
        };
        self.conn
            .execute_batch(sql)
            .map_err(|e| SqlError::sql("SqliteConnection::begin", e.to_string()))
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        self.conn
            .execute_batch("COMMIT TRANSACTION;")
            .map_err(|e| SqlError::sql("SqliteConnection::commit", e.to_string()))
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        self.conn
            .execute_batch("ROLLBACK TRANSACTION;")
            .map_err(|e| SqlError::sql("SqliteConnection::rollback", e.to_string()))
    }

    fn execute(&mut self, sql: &str) -> Result<u64, SqlError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| SqlError::sql("SqliteConnection::execute", e.to_string()))?;
        Ok(self.conn.changes())
    }

    fn execute_query<'c>(&'c mut self, sql: &str) -> Result<Box<dyn DriverRows + 'c>, SqlError> {
        let mut stmt = self
            .conn
            .prepare(first_statement(sql))
            .map_err(|e| SqlError::sql("SqliteConnection::execute_query", e.to_string()))?;
        let rows = materialize(&mut stmt)?;
        Ok(Box::new(rows))
    }

    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn DriverStatement + 'c>, SqlError> {
        let stmt = self
            .conn
            .prepare(first_statement(sql))
            .map_err(|e| SqlError::sql("SqliteConnection::prepare", e.to_string()))?;
        Ok(Box::new(SqliteStatement::new(stmt)))
    }

    fn set_query_timeout(&mut self, ms: i32) -> Result<(), SqlError> {
        // SQLite has no statement timeout; the busy timeout is the closest
        // session-level knob and is what this maps to.
        self.conn
            .busy_timeout(Duration::from_millis(u64::try_from(ms).unwrap_or(0)))
            .map_err(|e| SqlError::sql("SqliteConnection::set_query_timeout", e.to_string()))
    }

    fn last_row_id(&mut self) -> Result<i64, SqlError> {
        Ok(self.conn.last_insert_rowid())
    }
}
