use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::connection::{ConnCore, Connection};
use crate::driver::{self, Driver};
use crate::error::SqlError;
use crate::url::DbUrl;

/// Connections opened by [`ConnectionPool::start`].
pub const DEFAULT_INITIAL_CONNECTIONS: usize = 5;
/// Upper bound on live connections per pool.
pub const DEFAULT_MAX_CONNECTIONS: usize = 20;
/// Idle time after which the reaper may close a connection.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(90);
/// Interval between reaper sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Row prefetch batch size, overridable per URL with `fetch-size`.
pub const DEFAULT_FETCH_SIZE: usize = 100;

// Defensive cap on the find-ping-evict loop. Each failed ping shrinks the
// pool, so the loop terminates well before this in practice.
const MAX_ACQUIRE_ATTEMPTS: usize = 10;

struct PoolEntry {
    id: u64,
    available: bool,
    last_accessed: Instant,
    // Present while the connection sits idle in the pool; taken by the
    // holder during checkout.
    core: Option<ConnCore>,
}

struct PoolState {
    entries: Vec<PoolEntry>,
    initial: usize,
    max: usize,
    connection_timeout: Duration,
    sweep_interval: Duration,
    reaper_enabled: bool,
    filled: bool,
    started: bool,
    stopped: bool,
    next_id: u64,
    reaper: Option<JoinHandle<()>>,
}

impl PoolState {
    fn active(&self) -> usize {
        self.entries.iter().filter(|e| !e.available).count()
    }
}

pub(crate) struct PoolInner {
    url: DbUrl,
    driver: Arc<dyn Driver>,
    state: Mutex<PoolState>,
    alarm: Condvar,
}

impl PoolInner {
    pub(crate) fn url(&self) -> &DbUrl {
        &self.url
    }

    /// Hand a connection back after checkout. Called from the
    /// [`Connection`] drop path.
    pub(crate) fn checkin(&self, id: u64, core: ConnCore) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) {
            entry.core = Some(core);
            entry.last_accessed = Instant::now();
            entry.available = true;
        }
        // No matching entry means the connection was evicted or the pool
        // was drained while it was out; dropping the core closes the
        // session.
    }
}

/// A thread-safe pool of database connections.
///
/// The pool multiplexes a bounded set of long-lived connections across
/// many threads. [`start`](Self::start) pre-opens
/// [`initial_connections`](Self::initial_connections) sessions;
/// [`get_connection`](Self::get_connection) hands out an idle one, opening
/// new sessions on demand up to [`max_connections`](Self::max_connections).
/// A full pool fails fast rather than blocking. A background reaper thread
/// (enabled by default) periodically closes idle connections that have
/// outlived [`connection_timeout`](Self::connection_timeout) or stopped
/// answering pings, trimming the pool back toward its initial size.
///
/// ```rust,no_run
/// use sql_pool::prelude::*;
///
/// # fn demo() -> Result<(), SqlError> {
/// let pool = ConnectionPool::new("sqlite:///var/db/app.db?synchronous=normal".parse()?)?;
/// pool.start()?;
///
/// let mut conn = pool.get_connection()?;
/// let mut rows = conn.execute_query("SELECT name FROM users")?;
/// while rows.next()? {
///     println!("{:?}", rows.get_string(1)?);
/// }
/// drop(rows);
/// drop(conn); // returns the connection to the pool
///
/// pool.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool").finish()
    }
}

impl ConnectionPool {
    /// Create a pool for the database the URL describes. The backend
    /// driver is resolved from the URL protocol once, here.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if no driver is registered for the protocol.
    pub fn new(url: DbUrl) -> Result<Self, SqlError> {
        let driver = driver::driver_for(url.protocol())?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                url,
                driver,
                state: Mutex::new(PoolState {
                    entries: Vec::new(),
                    initial: DEFAULT_INITIAL_CONNECTIONS,
                    max: DEFAULT_MAX_CONNECTIONS,
                    connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
                    sweep_interval: DEFAULT_SWEEP_INTERVAL,
                    reaper_enabled: true,
                    filled: false,
                    started: false,
                    stopped: false,
                    next_id: 0,
                    reaper: None,
                }),
                alarm: Condvar::new(),
            }),
        })
    }

    /// Prepare the pool for use: open the initial connections and spawn
    /// the reaper thread if it is enabled.
    ///
    /// If the *first* open fails the pool is left unfilled and the error
    /// propagates; `start` can be retried. A failure on a *later* open
    /// keeps the connections opened so far and is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the first connection cannot be opened.
    pub fn start(&self) -> Result<(), SqlError> {
        let mut state = self.inner.state.lock();
        state.stopped = false;
        state.started = true;
        if !state.filled {
            if let Err(e) = self.fill(&mut state) {
                state.started = false;
                return Err(e);
            }
            state.filled = true;
            if state.reaper_enabled && state.reaper.is_none() {
                debug!("starting database reaper thread");
                state.reaper = Some(self.spawn_reaper());
            }
        }
        Ok(())
    }

    fn fill(&self, state: &mut PoolState) -> Result<(), SqlError> {
        for i in 0..state.initial {
            match ConnCore::open(&*self.inner.driver, &self.inner.url) {
                Ok(core) => {
                    let id = state.next_id;
                    state.next_id += 1;
                    state.entries.push(PoolEntry {
                        id,
                        available: true,
                        last_accessed: Instant::now(),
                        core: Some(core),
                    });
                }
                Err(e) => {
                    if i > 0 {
                        warn!(error = %e, opened = i, "failed to fill the pool with initial connections");
                        return Ok(());
                    }
                    return Err(SqlError::sql(
                        "ConnectionPool::start",
                        format!("failed to start connection pool -- {e}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Check a connection out of the pool.
    ///
    /// The first available connection in insertion order is pinged; one
    /// that fails its ping is closed and evicted, and the scan restarts.
    /// When nothing idle remains and the pool is below
    /// [`max_connections`](Self::max_connections), a new connection is
    /// opened. Every connection this method returns passed a ping during
    /// the call.
    ///
    /// The method never waits for a connection to be returned: a full pool
    /// is an immediate error.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the pool is full, a new connection cannot
    /// be opened, or the pool is not started.
    pub fn get_connection(&self) -> Result<Connection, SqlError> {
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let candidate = {
                let mut state = self.inner.state.lock();
                if !state.started || state.stopped {
                    return Err(SqlError::sql(
                        "ConnectionPool::get_connection",
                        "connection pool is not started",
                    ));
                }
                match state.entries.iter_mut().find(|e| e.available) {
                    Some(entry) => {
                        entry.available = false;
                        let core = entry.core.take();
                        Some((entry.id, core))
                    }
                    None => None,
                }
            };

            match candidate {
                Some((id, Some(mut core))) => {
                    // Pool connections must pass the ping test before they
                    // are handed out.
                    if core.ping() {
                        return Ok(Connection::new(Arc::clone(&self.inner), id, core));
                    }
                    debug!(id, "evicting connection that failed its ping");
                    let mut state = self.inner.state.lock();
                    state.entries.retain(|e| e.id != id);
                    drop(state);
                    drop(core);
                }
                Some((id, None)) => {
                    // An available entry without a session is corrupt
                    // bookkeeping; drop the entry and keep going.
                    let mut state = self.inner.state.lock();
                    state.entries.retain(|e| e.id != id);
                }
                None => {
                    let mut state = self.inner.state.lock();
                    if state.entries.len() >= state.max {
                        return Err(SqlError::sql(
                            "ConnectionPool::get_connection",
                            format!(
                                "connection pool is full -- all {} connections are in use",
                                state.max
                            ),
                        ));
                    }
                    let core =
                        ConnCore::open(&*self.inner.driver, &self.inner.url).map_err(|e| {
                            SqlError::sql(
                                "ConnectionPool::get_connection",
                                format!("failed to create a connection -- {e}"),
                            )
                        })?;
                    let id = state.next_id;
                    state.next_id += 1;
                    state.entries.push(PoolEntry {
                        id,
                        available: false,
                        last_accessed: Instant::now(),
                        core: None,
                    });
                    drop(state);
                    return Ok(Connection::new(Arc::clone(&self.inner), id, core));
                }
            }
        }
        Err(SqlError::sql(
            "ConnectionPool::get_connection",
            format!(
                "failed to get a connection that passed the ping test after {MAX_ACQUIRE_ATTEMPTS} attempts"
            ),
        ))
    }

    /// Like [`get_connection`](Self::get_connection), but returns `None`
    /// instead of an error.
    #[must_use]
    pub fn try_get_connection(&self) -> Option<Connection> {
        self.get_connection().ok()
    }

    /// Close stale idle connections now, without waiting for the reaper.
    /// Returns the number of connections closed.
    pub fn reap_connections(&self) -> usize {
        let mut state = self.inner.state.lock();
        reap(&mut state)
    }

    /// Shut the pool down: close every pooled connection and stop the
    /// reaper thread.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if connections are still checked out; the pool
    /// is left running in that case.
    pub fn stop(&self) -> Result<(), SqlError> {
        let reaper = {
            let mut state = self.inner.state.lock();
            let active = state.active();
            if active > 0 {
                return Err(SqlError::sql(
                    "ConnectionPool::stop",
                    format!("cannot stop connection pool -- {active} connections are still in use"),
                ));
            }
            state.stopped = true;
            state.started = false;
            state.entries.clear();
            state.filled = false;
            state.reaper.take()
        };
        if let Some(handle) = reaper {
            debug!("stopping database reaper thread");
            self.inner.alarm.notify_all();
            let _ = handle.join();
        }
        Ok(())
    }

    /// Number of connections in the pool, idle and checked out.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Number of connections currently checked out.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.state.lock().active()
    }

    /// Whether the pool cannot hand out another connection, i.e. every
    /// possible connection is checked out.
    #[must_use]
    pub fn is_full(&self) -> bool {
        let state = self.inner.state.lock();
        state.active() == state.max
    }

    #[must_use]
    pub fn initial_connections(&self) -> usize {
        self.inner.state.lock().initial
    }

    /// Set the number of connections `start` opens and the reaper trims
    /// down to.
    ///
    /// # Panics
    ///
    /// Fatal if `connections` exceeds the maximum: a panic, or the abort
    /// handler when one is installed.
    pub fn set_initial_connections(&self, connections: usize) {
        let mut state = self.inner.state.lock();
        if connections > state.max {
            SqlError::assert_failure(
                "ConnectionPool::set_initial_connections",
                "initial connections must not exceed max connections",
            );
        }
        state.initial = connections;
    }

    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.inner.state.lock().max
    }

    /// Set the upper bound on live connections.
    ///
    /// # Panics
    ///
    /// Fatal if `connections` is below the initial connection count: a
    /// panic, or the abort handler when one is installed.
    pub fn set_max_connections(&self, connections: usize) {
        let mut state = self.inner.state.lock();
        if connections < state.initial {
            SqlError::assert_failure(
                "ConnectionPool::set_max_connections",
                "max connections must not be below initial connections",
            );
        }
        state.max = connections;
    }

    /// Idle time after which the reaper may close a connection.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.inner.state.lock().connection_timeout
    }

    /// # Panics
    ///
    /// Fatal if `timeout` is zero: a panic, or the abort handler when one
    /// is installed.
    pub fn set_connection_timeout(&self, timeout: Duration) {
        if timeout.is_zero() {
            SqlError::assert_failure(
                "ConnectionPool::set_connection_timeout",
                "connection timeout must be positive",
            );
        }
        self.inner.state.lock().connection_timeout = timeout;
    }

    /// Interval between reaper sweeps.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.inner.state.lock().sweep_interval
    }

    /// # Panics
    ///
    /// Fatal if `interval` is zero: a panic, or the abort handler when one
    /// is installed.
    pub fn set_sweep_interval(&self, interval: Duration) {
        if interval.is_zero() {
            SqlError::assert_failure(
                "ConnectionPool::set_sweep_interval",
                "sweep interval must be positive",
            );
        }
        self.inner.state.lock().sweep_interval = interval;
    }

    /// Whether the reaper thread runs. On by default; changes take effect
    /// the next time the pool is started from a stopped state.
    #[must_use]
    pub fn reaper_enabled(&self) -> bool {
        self.inner.state.lock().reaper_enabled
    }

    pub fn set_reaper_enabled(&self, enabled: bool) {
        self.inner.state.lock().reaper_enabled = enabled;
    }

    /// The URL this pool connects to.
    #[must_use]
    pub fn url(&self) -> &DbUrl {
        &self.inner.url
    }

    /// Install or clear the process-wide abort handler consulted when an
    /// error is treated as unhandled (see [`OrAbort`](crate::OrAbort)).
    /// The handler is global, shared by every pool.
    pub fn set_abort_handler(handler: Option<Box<dyn Fn(&str) + Send + Sync>>) {
        crate::error::set_abort_handler(handler);
    }

    /// Library version string.
    #[must_use]
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn spawn_reaper(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        std::thread::Builder::new()
            .name("sql-pool-reaper".into())
            .spawn(move || reaper_loop(&inner))
            .expect("failed to spawn reaper thread")
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "connection pool dropped while connections are checked out");
        }
    }
}

fn reaper_loop(inner: &PoolInner) {
    let mut state = inner.state.lock();
    while !state.stopped {
        let interval = state.sweep_interval;
        let _ = inner.alarm.wait_for(&mut state, interval);
        if state.stopped {
            break;
        }
        let reaped = reap(&mut state);
        if reaped > 0 {
            debug!(reaped, "reaper closed stale connections");
        }
    }
    drop(state);
    debug!("reaper thread stopped");
}

/// Close idle connections that timed out or no longer answer pings,
/// trimming at most `size - active - initial` of them so the pool settles
/// back toward its initial size. In-use connections are never touched.
fn reap(state: &mut PoolState) -> usize {
    let mut excess = state
        .entries
        .len()
        .saturating_sub(state.active())
        .saturating_sub(state.initial);
    let timeout = state.connection_timeout;
    let mut reaped = 0;
    let mut i = 0;
    while excess > 0 && i < state.entries.len() {
        let entry = &mut state.entries[i];
        if entry.available {
            let stale = entry.last_accessed.elapsed() > timeout;
            let dead = !stale && !entry.core.as_mut().is_some_and(ConnCore::ping);
            if stale || dead {
                state.entries.remove(i);
                excess -= 1;
                reaped += 1;
                continue;
            }
        }
        i += 1;
    }
    reaped
}
