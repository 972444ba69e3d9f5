use crate::driver::{BindParam, DriverRows, DriverStatement};
use crate::error::SqlError;

use super::params::bind_param;
use super::query::materialize;

/// A compiled SQLite statement. Bindings persist across executions until
/// rebound, which lets a statement be re-run cheaply.
pub(crate) struct SqliteStatement<'conn> {
    stmt: rusqlite::Statement<'conn>,
    changes: u64,
}

impl<'conn> SqliteStatement<'conn> {
    pub(crate) fn new(stmt: rusqlite::Statement<'conn>) -> Self {
        Self { stmt, changes: 0 }
    }
}

impl DriverStatement for SqliteStatement<'_> {
    fn bind(&mut self, index: usize, value: BindParam<'_>) -> Result<(), SqlError> {
        bind_param(&mut self.stmt, index, value)
    }

    fn parameter_count(&self) -> usize {
        self.stmt.parameter_count()
    }

    fn execute(&mut self) -> Result<u64, SqlError> {
        let changed = self
            .stmt
            .raw_execute()
            .map_err(|e| SqlError::sql("SqliteStatement::execute", e.to_string()))?;
        self.changes = changed as u64;
        Ok(self.changes)
    }

    fn execute_query<'s>(&'s mut self) -> Result<Box<dyn DriverRows + 's>, SqlError> {
        let rows = materialize(&mut self.stmt)?;
        Ok(Box::new(rows))
    }

    fn rows_changed(&self) -> u64 {
        self.changes
    }
}
