//! Pattern matching for expect operations

mod matcher;
mod template;

pub use matcher::{ExactMatcher, Match, Matcher, RegexMatcher};
pub use template::expand_template;

use crate::result::PatternError;
use regex::bytes::Regex;
use std::fmt;
use std::str::FromStr;

/// Pattern types for matching session output.
///
/// A pattern is immutable and can be reused across calls and sessions.
/// Matching always reports the first match found scanning from the start of
/// the searched region, with standard leftmost-first regex semantics.
///
/// # Examples
///
/// ```
/// use expectkit::Pattern;
///
/// // Exact string
/// let p1 = Pattern::exact("password: ");
///
/// // Regular expression
/// let p2 = Pattern::regex(r"\d+").unwrap();
///
/// // Regular expression with a capture group
/// let p3: Pattern = r"user (\w+)".parse().unwrap();
/// ```
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact byte-string match.
    ///
    /// Uses Boyer-Moore-Horspool and never yields capture groups.
    Exact(String),

    /// Regular expression match over raw output bytes.
    ///
    /// Parenthesized groups are reported as capture groups.
    Regex(Regex),
}

impl Pattern {
    /// Create an exact string pattern.
    ///
    /// ```
    /// use expectkit::Pattern;
    ///
    /// let pattern = Pattern::exact("$ ");
    /// ```
    pub fn exact(s: impl Into<String>) -> Self {
        Pattern::Exact(s.into())
    }

    /// Compile a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidRegex`] if the expression does not compile.
    ///
    /// ```
    /// use expectkit::Pattern;
    ///
    /// let pattern = Pattern::regex(r"(?i)hello").unwrap();
    /// assert!(Pattern::regex("(unclosed").is_err());
    /// ```
    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        Ok(Pattern::Regex(Regex::new(pattern)?))
    }

    /// Convert pattern to a matcher implementation
    pub fn to_matcher(&self) -> Result<Box<dyn Matcher>, PatternError> {
        match self {
            Pattern::Exact(s) => Ok(Box::new(ExactMatcher::new(s.as_bytes())?)),
            Pattern::Regex(r) => Ok(Box::new(RegexMatcher::from(r.clone()))),
        }
    }

    /// Source text of the pattern, for diagnostics
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Exact(s) => s,
            Pattern::Regex(r) => r.as_str(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Exact(s) => write!(f, "{:?}", s),
            Pattern::Regex(r) => write!(f, "/{}/", r.as_str()),
        }
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    /// Parses the string as a regular expression.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::regex(s)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::Regex(regex)
    }
}
