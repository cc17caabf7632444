//! Result types for expect operations

mod error;

pub use error::{ExpectError, PatternError};

use std::fmt;

/// Result of a pattern match.
///
/// `output` is the snapshot of the searched buffer at the moment of the
/// match. With the default [`RetentionPolicy::RetainAll`](crate::RetentionPolicy)
/// this is the whole session output so far.
///
/// # Examples
///
/// ```no_run
/// use expectkit::{Pattern, Session};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let session = Session::builder().spawn_command("echo user@example.com").await?;
/// let pattern = Pattern::regex(r"(\w+)@(\w+)\.(\w+)")?;
/// let result = session.expect(&pattern).await?;
///
/// println!("Email: {}", result.matched);
/// println!("User: {}", result.groups[0]);
/// println!("Domain: {}", result.groups[1]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// Index of the pattern or case that matched.
    ///
    /// Always 0 for a single-pattern `expect`.
    pub pattern_index: usize,

    /// Snapshot of the searched buffer.
    pub output: String,

    /// The matched text. Empty for a zero-wait call that found nothing.
    pub matched: String,

    /// Explicit capture groups, starting with group 1.
    ///
    /// A group that did not take part in the match is an empty string.
    /// Patterns without parenthesized groups yield an empty vector.
    pub groups: Vec<String>,

    /// Start of the match in the session buffer (byte offset).
    pub start: usize,

    /// End of the match in the session buffer (byte offset).
    pub end: usize,

    /// Text of the searched buffer that precedes the match.
    pub before: String,
}

/// Outcome of a single batch entry.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Position of the entry in the batch.
    pub index: usize,

    /// Buffer snapshot for expect/switch entries, empty for sends.
    pub output: String,

    /// Matched text for expect/switch entries, empty for sends.
    pub matched: String,

    /// Capture groups of the match, starting with group 1.
    pub groups: Vec<String>,

    /// For switch entries, the index of the winning case.
    pub case_index: Option<usize>,

    /// The error this entry failed with, if any.
    pub error: Option<ExpectError>,
}

impl BatchResult {
    pub(crate) fn sent(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub(crate) fn matched(index: usize, result: MatchResult, case_index: Option<usize>) -> Self {
        Self {
            index,
            output: result.output,
            matched: result.matched,
            groups: result.groups,
            case_index,
            error: None,
        }
    }

    pub(crate) fn failed(index: usize, error: ExpectError) -> Self {
        Self {
            index,
            error: Some(error),
            ..Default::default()
        }
    }

    /// Returns `true` if the entry completed without error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A batch that stopped at a failing entry.
///
/// `results` holds every entry that ran, the failing one last.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Results up to and including the failing entry.
    pub results: Vec<BatchResult>,
    /// The error that stopped the batch.
    pub error: ExpectError,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch stopped at entry {}: {}",
            self.results.len().saturating_sub(1),
            self.error
        )
    }
}

impl std::error::Error for BatchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
