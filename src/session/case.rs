//! Multi-way matching with optional responses

use crate::pattern::Pattern;
use std::fmt;

/// One rule of an [`expect_switch`](crate::Session::expect_switch).
///
/// Cases are tried in declaration order against the same buffer contents;
/// the first one whose pattern matches wins.
///
/// # Examples
///
/// ```
/// use expectkit::{Case, Pattern};
///
/// let cases = vec![
///     Case::new(Pattern::exact("Password: ")).respond("secret\n"),
///     Case::new(Pattern::regex(r"\[y/n\]").unwrap()).respond("y\n").continue_after_match(3),
///     Case::new(Pattern::exact("denied")).fail("access denied"),
///     Case::new(Pattern::regex(r"\$ $").unwrap()),
/// ];
/// assert_eq!(cases.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct Case {
    pattern: Pattern,
    response: Option<String>,
    continues: usize,
    failure: Option<String>,
}

impl Case {
    /// A case that only matches.
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            response: None,
            continues: 0,
            failure: None,
        }
    }

    /// Send `template` when this case wins.
    ///
    /// `\1`, `\2`, ... expand to the capture groups of the match; see
    /// [`expand_template`](crate::expand_template).
    pub fn respond(mut self, template: impl Into<String>) -> Self {
        self.response = Some(template.into());
        self
    }

    /// Keep the switch running after this case matches, up to `max` times.
    ///
    /// Each continuation scans only output that follows the previous match.
    /// Once the continuations are used up the case ends the switch normally.
    pub fn continue_after_match(mut self, max: usize) -> Self {
        self.continues = max;
        self
    }

    /// End the switch with [`ExpectError::CaseFailed`](crate::ExpectError::CaseFailed)
    /// when this case matches.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Pattern of the case
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Response template, if any
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// How many times the switch continues after this case matches
    pub fn continues(&self) -> usize {
        self.continues
    }

    /// Failure message, if this is a failure case
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

impl From<Pattern> for Case {
    fn from(pattern: Pattern) -> Self {
        Case::new(pattern)
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "case {}", self.pattern)?;
        if let Some(response) = &self.response {
            write!(f, " => {:?}", response)?;
        }
        if self.continues > 0 {
            write!(f, " continue {}", self.continues)?;
        }
        if let Some(message) = &self.failure {
            write!(f, " fail {:?}", message)?;
        }
        Ok(())
    }
}
