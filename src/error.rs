use std::fmt;
use std::panic::Location;
use std::sync::OnceLock;

use parking_lot::RwLock;
use thiserror::Error;

/// The two failure classes the library distinguishes.
///
/// `Sql` covers everything recoverable: driver I/O, constraint violations,
/// parse failures, pool exhaustion, out-of-range indices. `Assert` marks a
/// precondition violation by the caller; it is fatal, reported through the
/// abort handler when one is installed and as a panic otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A database or API error. Checked, recoverable.
    Sql,
    /// A programmer error. Not expected to be caught.
    Assert,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Sql => write!(f, "SQLException"),
            ErrorKind::Assert => write!(f, "AssertException"),
        }
    }
}

/// The single error type used across the library.
///
/// Every failure carries a structured frame: the kind, a message, the
/// function that raised it, and the source location. The location is
/// captured automatically through `#[track_caller]`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SqlError {
    kind: ErrorKind,
    message: String,
    function: &'static str,
    file: &'static str,
    line: u32,
}

impl SqlError {
    /// Build a checked SQL error raised by `function`.
    #[track_caller]
    pub fn sql(function: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Sql, function, message)
    }

    /// Build an assertion-kind error raised by `function`.
    #[track_caller]
    pub fn assert(function: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assert, function, message)
    }

    #[track_caller]
    fn new(kind: ErrorKind, function: &'static str, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            kind,
            message: message.into(),
            function,
            file: location.file(),
            line: location.line(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The function that raised the error, e.g. `"Connection::execute"`.
    #[must_use]
    pub fn function(&self) -> &'static str {
        self.function
    }

    #[must_use]
    pub fn file(&self) -> &'static str {
        self.file
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Render the full frame, the way an uncaught error is reported.
    #[must_use]
    pub fn frame(&self) -> String {
        format!(
            "{} -- {} raised in {} at {}:{}",
            self.kind, self.message, self.function, self.file, self.line
        )
    }

    /// Treat this error as unhandled: invoke the process-wide abort handler
    /// if one is installed, then terminate the process.
    pub fn abort(&self) -> ! {
        if let Some(handler) = abort_handler().read().as_ref() {
            handler(&self.frame());
            std::process::exit(1);
        }
        eprintln!("{}", self.frame());
        std::process::abort();
    }

    /// Fail a violated precondition. Routes through the abort handler when
    /// one is installed; otherwise panics with the rendered frame. Fatal in
    /// release builds as well as debug.
    #[track_caller]
    pub(crate) fn assert_failure(function: &'static str, message: &str) -> ! {
        let err = SqlError::assert(function, message);
        if abort_handler_installed() {
            err.abort();
        }
        panic!("{}", err.frame());
    }
}

type AbortHandler = Box<dyn Fn(&str) + Send + Sync>;

fn abort_handler() -> &'static RwLock<Option<AbortHandler>> {
    static HANDLER: OnceLock<RwLock<Option<AbortHandler>>> = OnceLock::new();
    HANDLER.get_or_init(|| RwLock::new(None))
}

/// Install or clear the process-wide abort handler.
///
/// The handler receives the rendered error frame when an error is treated
/// as unhandled (see [`OrAbort`]). After the handler returns, the process
/// exits. When no handler is installed, the frame is printed to stderr and
/// the process aborts.
pub fn set_abort_handler(handler: Option<Box<dyn Fn(&str) + Send + Sync>>) {
    *abort_handler().write() = handler;
}

/// Whether an abort handler is currently installed.
#[must_use]
pub fn abort_handler_installed() -> bool {
    abort_handler().read().is_some()
}

/// Escape hatch for callers that want the unhandled-error behavior of the
/// abort handler instead of propagating a `Result`.
pub trait OrAbort<T> {
    /// Unwrap the value, or route the error through the abort handler and
    /// terminate the process.
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T, SqlError> {
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(e) => e.abort(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_carries_location() {
        let err = SqlError::sql("tests::frame_carries_location", "boom");
        assert_eq!(err.kind(), ErrorKind::Sql);
        assert_eq!(err.message(), "boom");
        assert_eq!(err.function(), "tests::frame_carries_location");
        assert!(err.file().ends_with("error.rs"));
        assert!(err.line() > 0);
        assert!(err.frame().contains("SQLException"));
        assert!(err.frame().contains("error.rs"));
    }

    #[test]
    fn display_is_the_message() {
        let err = SqlError::sql("t", "pool is full");
        assert_eq!(err.to_string(), "pool is full");
    }

    #[test]
    fn assert_kind_renders_as_assert_exception() {
        let err = SqlError::assert("t", "fetch size must be >= 1");
        assert_eq!(err.kind(), ErrorKind::Assert);
        assert!(err.frame().starts_with("AssertException"));
    }

    // Install/clear and the assert-failure panic share one test so no
    // handler is ever installed while another thread trips a precondition.
    #[test]
    fn abort_handler_and_assert_failure() {
        assert!(!abort_handler_installed());
        set_abort_handler(Some(Box::new(|_| {})));
        assert!(abort_handler_installed());
        set_abort_handler(None);
        assert!(!abort_handler_installed());

        let panic = std::panic::catch_unwind(|| SqlError::assert_failure("t", "nope"));
        let msg = *panic.unwrap_err().downcast::<String>().unwrap();
        assert!(msg.contains("AssertException"));
        assert!(msg.contains("nope"));
    }
}
