//! Ordered expect/send transcripts

use crate::pattern::Pattern;
use crate::session::Case;
use crate::transport::Signal;
use std::time::Duration;

/// One entry of a batch run by [`Session::expect_batch`](crate::Session::expect_batch).
///
/// Entries run strictly in order and the batch stops at the first failure.
///
/// # Examples
///
/// ```
/// use expectkit::{Batcher, Pattern};
/// use std::time::Duration;
///
/// let batch = vec![
///     Batcher::send("ping\n"),
///     Batcher::expect(Pattern::exact("pong")),
///     Batcher::expect_timeout(Pattern::exact("$ "), Duration::from_secs(1)),
///     Batcher::send("bye\n"),
/// ];
/// assert_eq!(batch.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub enum Batcher {
    /// Write literal bytes
    Send(Vec<u8>),
    /// Wait for a pattern, with an optional per-entry timeout
    Expect {
        /// Pattern to wait for
        pattern: Pattern,
        /// Overrides the batch timeout
        timeout: Option<Duration>,
    },
    /// Run a case switch, with an optional per-entry timeout
    Switch {
        /// Cases in priority order
        cases: Vec<Case>,
        /// Overrides the batch timeout
        timeout: Option<Duration>,
    },
    /// Deliver a control signal
    Signal(Signal),
}

impl Batcher {
    /// A send entry
    pub fn send(data: impl AsRef<[u8]>) -> Self {
        Batcher::Send(data.as_ref().to_vec())
    }

    /// An expect entry using the batch timeout
    pub fn expect(pattern: Pattern) -> Self {
        Batcher::Expect {
            pattern,
            timeout: None,
        }
    }

    /// An expect entry with its own timeout
    pub fn expect_timeout(pattern: Pattern, timeout: Duration) -> Self {
        Batcher::Expect {
            pattern,
            timeout: Some(timeout),
        }
    }

    /// A switch entry using the batch timeout
    pub fn switch(cases: Vec<Case>) -> Self {
        Batcher::Switch {
            cases,
            timeout: None,
        }
    }

    /// A switch entry with its own timeout
    pub fn switch_timeout(cases: Vec<Case>, timeout: Duration) -> Self {
        Batcher::Switch {
            cases,
            timeout: Some(timeout),
        }
    }

    /// A signal entry
    pub fn signal(signal: Signal) -> Self {
        Batcher::Signal(signal)
    }

    /// Short name of the entry kind, for logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Batcher::Send(_) => "send",
            Batcher::Expect { .. } => "expect",
            Batcher::Switch { .. } => "switch",
            Batcher::Signal(_) => "signal",
        }
    }
}
