//! A holder that owns at most one session and can be re-attached

use crate::pattern::Pattern;
use crate::result::{BatchFailure, BatchResult, ExpectError, MatchResult};
use crate::session::{Batcher, Case, Session, SessionBuilder, SpawnSource};
use crate::transport::Signal;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Owns at most one [`Session`] at a time.
///
/// Attaching closes the session currently held before opening the new
/// one, so a background reader is never leaked. While detached, every
/// engine operation fails with [`ExpectError::SessionClosed`].
///
/// # Examples
///
/// ```no_run
/// use expectkit::{Expecter, Pattern, SpawnSource};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut expecter = Expecter::default();
/// expecter.attach(SpawnSource::command_line("bash")).await?;
/// expecter.send(b"echo hi\n").await?;
/// expecter.expect(&Pattern::exact("hi")).await?;
///
/// // Replaces the bash session
/// expecter.attach(SpawnSource::command_line("python3 -i")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Expecter {
    builder: SessionBuilder,
    session: Option<Session>,
}

impl Expecter {
    /// A detached holder that attaches with `builder`'s settings.
    pub fn new(builder: SessionBuilder) -> Self {
        Self {
            builder,
            session: None,
        }
    }

    /// Close the held session, if any, then attach to `source`.
    ///
    /// If the new attach fails the holder stays detached and the error is
    /// returned.
    pub async fn attach(&mut self, source: SpawnSource) -> Result<(), ExpectError> {
        if let Err(e) = self.close().await {
            debug!(error = %e, "closing previous session failed");
        }
        self.session = Some(self.builder.clone().attach(source).await?);
        Ok(())
    }

    /// Close and drop the held session. Succeeds when detached.
    pub async fn close(&mut self) -> Result<(), ExpectError> {
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }

    /// Whether a session is held
    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// The held session.
    pub fn session(&self) -> Result<&Session, ExpectError> {
        self.session.as_ref().ok_or(ExpectError::SessionClosed)
    }

    /// See [`Session::expect`]
    pub async fn expect(&self, pattern: &Pattern) -> Result<MatchResult, ExpectError> {
        self.session()?.expect(pattern).await
    }

    /// See [`Session::expect_timeout`]
    pub async fn expect_timeout(
        &self,
        pattern: &Pattern,
        timeout: Duration,
    ) -> Result<MatchResult, ExpectError> {
        self.session()?.expect_timeout(pattern, timeout).await
    }

    /// See [`Session::expect_switch`]
    pub async fn expect_switch(&self, cases: &[Case]) -> Result<MatchResult, ExpectError> {
        self.session()?.expect_switch(cases).await
    }

    /// See [`Session::expect_switch_timeout`]
    pub async fn expect_switch_timeout(
        &self,
        cases: &[Case],
        timeout: Duration,
    ) -> Result<MatchResult, ExpectError> {
        self.session()?.expect_switch_timeout(cases, timeout).await
    }

    /// See [`Session::expect_batch`]
    pub async fn expect_batch(&self, batch: &[Batcher]) -> Result<Vec<BatchResult>, BatchFailure> {
        self.batch_session()?.expect_batch(batch).await
    }

    /// See [`Session::expect_batch_timeout`]
    pub async fn expect_batch_timeout(
        &self,
        batch: &[Batcher],
        timeout: Duration,
    ) -> Result<Vec<BatchResult>, BatchFailure> {
        self.batch_session()?
            .expect_batch_timeout(batch, timeout)
            .await
    }

    fn batch_session(&self) -> Result<&Session, BatchFailure> {
        self.session().map_err(|error| BatchFailure {
            results: Vec::new(),
            error,
        })
    }

    /// See [`Session::send`]
    pub async fn send(&self, data: &[u8]) -> Result<(), ExpectError> {
        self.session()?.send(data).await
    }

    /// See [`Session::send_line`]
    pub async fn send_line(&self, line: &str) -> Result<(), ExpectError> {
        self.session()?.send_line(line).await
    }

    /// See [`Session::send_signal`]
    pub async fn send_signal(&self, signal: Signal) -> Result<(), ExpectError> {
        self.session()?.send_signal(signal).await
    }

    /// See [`Session::wait`]
    pub async fn wait(&self) -> Result<(), ExpectError> {
        self.session()?.wait().await
    }

    /// Unwrap `result`, handing an error to `handler`.
    ///
    /// This is the panic-unless-handled convenience for scripts: without a
    /// handler an error panics.
    ///
    /// # Panics
    ///
    /// Panics with the error's message if `result` is an error and no
    /// handler was supplied.
    ///
    /// ```
    /// use expectkit::{ExpectError, Expecter};
    ///
    /// let mut seen = Vec::new();
    /// let mut log = |e: ExpectError| seen.push(e.to_string());
    /// let value: Option<u8> = Expecter::check(Err(ExpectError::SessionClosed), Some(&mut log));
    /// assert!(value.is_none());
    /// assert_eq!(seen, ["Session is closed"]);
    /// ```
    pub fn check<T, E: fmt::Display>(
        result: Result<T, E>,
        handler: Option<&mut dyn FnMut(E)>,
    ) -> Option<T> {
        match (result, handler) {
            (Ok(value), _) => Some(value),
            (Err(e), Some(handler)) => {
                handler(e);
                None
            }
            (Err(e), None) => panic!("unhandled expect error: {}", e),
        }
    }
}

impl fmt::Debug for Expecter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expecter")
            .field("session", &self.session)
            .finish()
    }
}
