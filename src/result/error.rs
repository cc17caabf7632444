//! Error types for expectkit

use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving a session.
///
/// Every engine operation returns this error to its immediate caller. The
/// type is `Clone` so that a terminal failure of the background reader can be
/// reported both by [`Session::wait`](crate::Session::wait) and by every
/// matcher that was blocked when it happened.
///
/// # Examples
///
/// ```no_run
/// use expectkit::{ExpectError, Pattern, Session};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder()
///     .timeout(Duration::from_secs(5))
///     .spawn_command("some-command")
///     .await?;
///
/// match session.expect(&Pattern::exact("done")).await {
///     Ok(result) => println!("Matched: {}", result.matched),
///     Err(ExpectError::Timeout { duration }) => {
///         eprintln!("Timed out after {:?}", duration);
///     }
///     Err(ExpectError::SessionClosed) => {
///         eprintln!("Process went away");
///     }
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug, Clone)]
pub enum ExpectError {
    /// The transport could not be established.
    #[error("Failed to spawn: {0}")]
    SpawnFailed(String),

    /// A pattern failed to compile. Checked before any blocking.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    /// No match before the deadline.
    #[error("Timeout waiting for pattern (after {duration:?})")]
    Timeout {
        /// Duration that was waited before timing out
        duration: Duration,
    },

    /// The session was closed, or its entity terminated, before or during
    /// the operation.
    #[error("Session is closed")]
    SessionClosed,

    /// The arguments of an operation were unusable (e.g. an empty case set).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not available on this transport.
    #[error("Unsupported by this transport: {0}")]
    Unsupported(String),

    /// Writing to the transport failed.
    #[error("Write failed: {0}")]
    WriteFailed(#[source] Arc<io::Error>),

    /// Reading from the transport failed. Terminal for the session.
    #[error("Read failed: {0}")]
    ReadFailed(#[source] Arc<io::Error>),

    /// The spawned entity exited with a non-zero status.
    #[error("Process exited with status {code}")]
    ExitStatus {
        /// Exit code reported by the entity
        code: u32,
    },

    /// A case declared as a failure case matched.
    #[error("Case {index} failed: {message}")]
    CaseFailed {
        /// Index of the case that matched
        index: usize,
        /// Message attached to the case
        message: String,
    },
}

impl ExpectError {
    pub(crate) fn write_failed(e: io::Error) -> Self {
        ExpectError::WriteFailed(Arc::new(e))
    }

    pub(crate) fn read_failed(e: io::Error) -> Self {
        ExpectError::ReadFailed(Arc::new(e))
    }

    /// Returns `true` for a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExpectError::Timeout { .. })
    }
}

/// Errors related to pattern creation.
#[derive(Error, Debug, Clone)]
pub enum PatternError {
    /// Invalid regex pattern.
    #[error("Invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// Empty pattern.
    ///
    /// Returned when attempting to create an exact pattern from an empty string.
    #[error("Pattern cannot be empty")]
    EmptyPattern,
}
