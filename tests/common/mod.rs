#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sql_pool::prelude::*;

/// Unique database file path so parallel tests never collide.
pub fn unique_path(prefix: &str) -> String {
    let pid = std::process::id();
    let ns = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("/tmp/{prefix}_{pid}_{ns}.db")
}

/// Removes database files (and SQLite sidecars) when the test ends.
pub struct FileCleanup(pub Vec<String>);

impl Drop for FileCleanup {
    fn drop(&mut self) {
        for p in &self.0 {
            let _ = std::fs::remove_file(p);
            let _ = std::fs::remove_file(format!("{p}-wal"));
            let _ = std::fs::remove_file(format!("{p}-shm"));
        }
    }
}

/// Shared, scriptable state behind a [`MockDriver`].
pub struct MockState {
    /// When set, `open` fails with this message.
    pub open_error: Mutex<Option<String>>,
    /// Answer every ping with this.
    pub ping_ok: AtomicBool,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub pings: AtomicUsize,
    /// When set, opens fail once this many connections were opened.
    pub open_limit: Mutex<Option<usize>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            open_error: Mutex::new(None),
            ping_ok: AtomicBool::new(true),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            open_limit: Mutex::new(None),
        }
    }

    /// Simulate the database going away: live sessions stop answering
    /// pings and new connects are refused.
    pub fn kill(&self) {
        self.ping_ok.store(false, Ordering::SeqCst);
        *self.open_error.lock() = Some("connect to database failed -- connection refused".into());
    }

    /// Bring the database back.
    pub fn revive(&self) {
        self.ping_ok.store(true, Ordering::SeqCst);
        *self.open_error.lock() = None;
    }

    pub fn live(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

/// An in-memory backend whose failure behavior tests can script.
pub struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    /// Register a fresh mock under `protocol` and hand back its state.
    pub fn install(protocol: &str) -> Arc<MockState> {
        let state = Arc::new(MockState::new());
        register_driver(
            protocol,
            Arc::new(MockDriver {
                state: Arc::clone(&state),
            }),
        );
        state
    }
}

impl Driver for MockDriver {
    fn open(&self, _url: &DbUrl) -> Result<Box<dyn DriverConnection>, SqlError> {
        if let Some(msg) = self.state.open_error.lock().clone() {
            return Err(SqlError::sql("MockDriver::open", msg));
        }
        if let Some(limit) = *self.state.open_limit.lock()
            && self.state.opened.load(Ordering::SeqCst) >= limit
        {
            return Err(SqlError::sql("MockDriver::open", "too many connections"));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl DriverConnection for MockConnection {
    fn ping(&mut self) -> bool {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        self.state.ping_ok.load(Ordering::SeqCst)
    }

    fn begin(&mut self, _transaction_type: TransactionType) -> Result<(), SqlError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        Ok(())
    }

    fn execute(&mut self, _sql: &str) -> Result<u64, SqlError> {
        Ok(0)
    }

    fn execute_query<'c>(&'c mut self, _sql: &str) -> Result<Box<dyn DriverRows + 'c>, SqlError> {
        Ok(Box::new(MaterializedRows::new(Vec::new(), Vec::new())))
    }

    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn DriverStatement + 'c>, SqlError> {
        Ok(Box::new(MockStatement {
            parameters: sql.matches('?').count(),
        }))
    }

    fn last_row_id(&mut self) -> Result<i64, SqlError> {
        Ok(0)
    }
}

struct MockStatement {
    parameters: usize,
}

impl DriverStatement for MockStatement {
    fn bind(&mut self, _index: usize, _value: BindParam<'_>) -> Result<(), SqlError> {
        Ok(())
    }

    fn parameter_count(&self) -> usize {
        self.parameters
    }

    fn execute(&mut self) -> Result<u64, SqlError> {
        Ok(0)
    }

    fn execute_query<'s>(&'s mut self) -> Result<Box<dyn DriverRows + 's>, SqlError> {
        Ok(Box::new(MaterializedRows::new(Vec::new(), Vec::new())))
    }

    fn rows_changed(&self) -> u64 {
        0
    }
}
