//! Sessions: the caller's binding to a spawned entity
//!
//! A [`Session`] owns a [`Transport`], a background task that accumulates
//! its output, and the send path back to it. Every operation takes `&self`,
//! so a session can be shared between tasks; matches block only the calling
//! task, never the reader.

mod batch;
mod builder;
mod case;
mod expecter;
mod reader;
mod spawn;

pub use batch::Batcher;
pub use builder::SessionBuilder;
pub use case::Case;
pub use expecter::Expecter;
pub use spawn::SpawnSource;

use crate::buffer::{OutputBuffer, RetentionPolicy};
use crate::pattern::{expand_template, Match, Pattern};
use crate::result::{BatchFailure, BatchResult, ExpectError, MatchResult};
use crate::transport::{Control, Input, Signal, Transport};
use reader::{OutputState, SharedState};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Timeout that probes the current buffer and returns without waiting.
pub const ZERO_WAIT: Duration = Duration::ZERO;

/// Main session for interacting with a spawned entity.
///
/// # Examples
///
/// ```no_run
/// use expectkit::{Pattern, Session};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder()
///     .timeout(Duration::from_secs(30))
///     .spawn_command("python3 -i")
///     .await?;
///
/// session.expect(&Pattern::exact(">>> ")).await?;
/// session.send_line("print('Hello')").await?;
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    state: SharedState,
    input: Mutex<Input>,
    control: Arc<dyn Control>,
    reader: StdMutex<Option<JoinHandle<()>>>,
    closing: AtomicBool,
    timeout: Option<Duration>,
    retention: RetentionPolicy,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Spawn a command line with default settings.
    ///
    /// Shorthand for `Session::builder().spawn_command(command)`.
    pub async fn spawn(command: &str) -> Result<Self, ExpectError> {
        SessionBuilder::new().spawn_command(command).await
    }

    pub(crate) fn start(transport: Transport, config: &SessionBuilder) -> Self {
        let (tx, _rx) = watch::channel(OutputState::new(config.strip_ansi_enabled()));
        let state = Arc::new(tx);
        let Transport {
            output,
            input,
            control,
        } = transport;
        let reader = reader::spawn(output, control.clone(), state.clone(), config.read_chunk());

        Self {
            state,
            input: Mutex::new(input),
            control,
            reader: StdMutex::new(Some(reader)),
            closing: AtomicBool::new(false),
            timeout: config.default_timeout(),
            retention: config.retention_policy(),
        }
    }

    /// Wait for a pattern using the session's default timeout.
    ///
    /// Scans start at the buffer start (or after the previous match under
    /// [`RetentionPolicy::ConsumeMatched`]); the first match wins.
    ///
    /// # Errors
    ///
    /// - [`ExpectError::InvalidPattern`] before any waiting
    /// - [`ExpectError::Timeout`] if nothing matches in time
    /// - [`ExpectError::SessionClosed`] if the session is closed, or the
    ///   entity ends without producing a match
    /// - [`ExpectError::ReadFailed`] if reading the output failed
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use expectkit::{Pattern, Session};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let session = Session::spawn("echo test").await?;
    /// let result = session.expect(&Pattern::exact("test")).await?;
    /// println!("Matched: {}", result.matched);
    /// println!("Before: {}", result.before);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn expect(&self, pattern: &Pattern) -> Result<MatchResult, ExpectError> {
        self.expect_within(pattern, self.timeout).await
    }

    /// Wait for a pattern with an explicit timeout.
    ///
    /// With [`ZERO_WAIT`] this never blocks: it returns the match found in
    /// the current buffer, or an empty match carrying the buffer snapshot.
    pub async fn expect_timeout(
        &self,
        pattern: &Pattern,
        timeout: Duration,
    ) -> Result<MatchResult, ExpectError> {
        self.expect_within(pattern, Some(timeout)).await
    }

    async fn expect_within(
        &self,
        pattern: &Pattern,
        timeout: Option<Duration>,
    ) -> Result<MatchResult, ExpectError> {
        let matcher = pattern.to_matcher()?;
        let policy = self.retention;
        debug!(pattern = %pattern, ?timeout, "expect");

        let found = self
            .wait_for(timeout, |buffer| {
                let start = buffer.scan_start(policy);
                let m = matcher.find(buffer.since(start))?;
                Some(settle(buffer, policy, start, &m, 0))
            })
            .await;

        match found {
            Err(ExpectError::Timeout { duration }) if duration.is_zero() => {
                Ok(self.snapshot(policy))
            }
            other => other,
        }
    }

    /// Run a case switch using the session's default timeout.
    ///
    /// The returned [`MatchResult::pattern_index`] is the index of the
    /// winning case. A winning case's response is sent before returning.
    ///
    /// # Errors
    ///
    /// As [`Session::expect`], plus [`ExpectError::InvalidArgument`] for an
    /// empty case list and [`ExpectError::CaseFailed`] when a failure case
    /// wins. A zero-wait switch with no matching case fails with a
    /// zero-duration [`ExpectError::Timeout`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use expectkit::{Case, Pattern, Session};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let session = Session::spawn("ssh host").await?;
    /// let cases = [
    ///     Case::new(Pattern::exact("Password: ")).respond("secret\n"),
    ///     Case::new(Pattern::regex(r"\$ $")?),
    /// ];
    /// let result = session.expect_switch(&cases).await?;
    /// println!("case {} won", result.pattern_index);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn expect_switch(&self, cases: &[Case]) -> Result<MatchResult, ExpectError> {
        self.switch_within(cases, self.timeout).await
    }

    /// Run a case switch with an explicit timeout shared by all cases and
    /// continuations.
    pub async fn expect_switch_timeout(
        &self,
        cases: &[Case],
        timeout: Duration,
    ) -> Result<MatchResult, ExpectError> {
        self.switch_within(cases, Some(timeout)).await
    }

    async fn switch_within(
        &self,
        cases: &[Case],
        timeout: Option<Duration>,
    ) -> Result<MatchResult, ExpectError> {
        if cases.is_empty() {
            return Err(ExpectError::InvalidArgument(
                "switch needs at least one case".to_string(),
            ));
        }
        let matchers = cases
            .iter()
            .map(|case| case.pattern().to_matcher())
            .collect::<Result<Vec<_>, _>>()?;
        let mut remaining: Vec<usize> = cases.iter().map(Case::continues).collect();
        let policy = self.retention;
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut floor = 0;

        loop {
            let result = self
                .wait_until(timeout, deadline, |buffer| {
                    let start = buffer.scan_start(policy).max(floor);
                    let (index, m) = matchers.iter().enumerate().find_map(|(index, matcher)| {
                        matcher.find(buffer.since(start)).map(|m| (index, m))
                    })?;
                    Some(settle(buffer, policy, start, &m, index))
                })
                .await?;

            let index = result.pattern_index;
            let case = &cases[index];
            debug!(case = index, matched = %result.matched, "switch case matched");

            if let Some(message) = case.failure() {
                return Err(ExpectError::CaseFailed {
                    index,
                    message: message.to_string(),
                });
            }
            if let Some(template) = case.response() {
                let response = expand_template(template, &result.groups);
                self.send(response.as_bytes()).await?;
            }
            if remaining[index] == 0 {
                return Ok(result);
            }
            remaining[index] -= 1;
            floor = result.end;
        }
    }

    /// Run a batch using the session's default timeout.
    ///
    /// Entries run strictly in order. The first failing entry stops the
    /// batch; its result is the last one in the returned
    /// [`BatchFailure::results`], and later entries are never attempted.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use expectkit::{Batcher, Pattern, Session};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let session = Session::spawn("cat").await?;
    /// let results = session
    ///     .expect_batch(&[
    ///         Batcher::send("ping\n"),
    ///         Batcher::expect(Pattern::exact("ping")),
    ///     ])
    ///     .await?;
    /// assert_eq!(results.len(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn expect_batch(&self, batch: &[Batcher]) -> Result<Vec<BatchResult>, BatchFailure> {
        self.batch_within(batch, self.timeout).await
    }

    /// Run a batch with an explicit shared timeout. Entries that carry their
    /// own timeout use it instead.
    pub async fn expect_batch_timeout(
        &self,
        batch: &[Batcher],
        timeout: Duration,
    ) -> Result<Vec<BatchResult>, BatchFailure> {
        self.batch_within(batch, Some(timeout)).await
    }

    async fn batch_within(
        &self,
        batch: &[Batcher],
        timeout: Option<Duration>,
    ) -> Result<Vec<BatchResult>, BatchFailure> {
        let mut results = Vec::with_capacity(batch.len());

        for (index, entry) in batch.iter().enumerate() {
            trace!(step = index, kind = entry.kind(), "batch entry");
            let outcome = match entry {
                Batcher::Send(data) => self.send(data).await.map(|()| BatchResult::sent(index)),
                Batcher::Expect {
                    pattern,
                    timeout: own,
                } => self
                    .expect_within(pattern, own.or(timeout))
                    .await
                    .map(|m| BatchResult::matched(index, m, None)),
                Batcher::Switch { cases, timeout: own } => self
                    .switch_within(cases, own.or(timeout))
                    .await
                    .map(|m| {
                        let case = m.pattern_index;
                        BatchResult::matched(index, m, Some(case))
                    }),
                Batcher::Signal(signal) => self
                    .send_signal(*signal)
                    .await
                    .map(|()| BatchResult::sent(index)),
            };

            match outcome {
                Ok(result) => results.push(result),
                Err(error) => {
                    debug!(step = index, error = %error, "batch stopped");
                    let mut failed = BatchResult::failed(index, error.clone());
                    if matches!(entry, Batcher::Expect { .. } | Batcher::Switch { .. }) {
                        failed.output = self.output();
                    }
                    results.push(failed);
                    return Err(BatchFailure { results, error });
                }
            }
        }

        Ok(results)
    }

    /// Send data to the entity.
    ///
    /// Bytes are written as given: no newline is added and nothing is
    /// encoded. Concurrent sends are serialized, never interleaved.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use expectkit::Session;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let session = Session::spawn("bash").await?;
    /// // Ctrl-C
    /// session.send(&[0x03]).await?;
    ///
    /// // Text with carriage return
    /// session.send(b"password\r").await?;
    ///
    /// // Up arrow
    /// session.send(b"\x1b[A").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send(&self, data: &[u8]) -> Result<(), ExpectError> {
        if self.is_closed() {
            return Err(ExpectError::SessionClosed);
        }
        trace!(bytes = data.len(), "send");

        let mut input = self.input.lock().await;
        match &mut *input {
            Input::Blocking(writer) => {
                let writer = writer.clone();
                let data = data.to_vec();
                tokio::task::spawn_blocking(move || {
                    let mut writer = writer
                        .lock()
                        .map_err(|_| std::io::Error::other("writer poisoned"))?;
                    writer.write_all(&data)?;
                    writer.flush()
                })
                .await
                .map_err(|e| ExpectError::write_failed(std::io::Error::other(e)))?
                .map_err(ExpectError::write_failed)
            }
            Input::Async(writer) => {
                writer.write_all(data).await.map_err(ExpectError::write_failed)?;
                writer.flush().await.map_err(ExpectError::write_failed)
            }
        }
    }

    /// Send a line (appends `\n`) in a single write.
    pub async fn send_line(&self, line: &str) -> Result<(), ExpectError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.send(&data).await
    }

    /// Deliver a control signal to the entity.
    ///
    /// # Errors
    ///
    /// [`ExpectError::Unsupported`] on transports without signal delivery.
    /// The buffer is left untouched either way.
    pub async fn send_signal(&self, signal: Signal) -> Result<(), ExpectError> {
        if self.is_closed() {
            return Err(ExpectError::SessionClosed);
        }
        debug!(%signal, "send signal");
        self.control.signal(signal).await
    }

    /// Close the session.
    ///
    /// Stops the reader, tears the entity down and fails every in-flight
    /// match with [`ExpectError::SessionClosed`]. Closing again is a no-op
    /// that also succeeds.
    pub async fn close(&self) -> Result<(), ExpectError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("closing session");
        self.state.send_modify(|s| s.closed = true);
        let result = self.control.close().await;
        self.abort_reader();
        result
    }

    /// Wait until the entity's output ends.
    ///
    /// Returns the terminal error, if any: [`ExpectError::ReadFailed`] for a
    /// broken stream, [`ExpectError::ExitStatus`] for a process that exited
    /// unsuccessfully. Returns `Ok` once the session is closed.
    pub async fn wait(&self) -> Result<(), ExpectError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| s.closed || s.finished.is_some())
            .await
            .map_err(|_| ExpectError::SessionClosed)?;
        match &state.finished {
            Some(Some(err)) if !state.closed => Err(err.clone()),
            _ => Ok(()),
        }
    }

    /// Whether [`Session::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Whether the entity's output has ended
    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished.is_some()
    }

    /// Snapshot of everything accumulated so far (lossy UTF-8).
    pub fn output(&self) -> String {
        let state = self.state.borrow();
        state.buffer.text(0, state.buffer.len())
    }

    /// Raw bytes accumulated so far.
    pub fn output_bytes(&self) -> Vec<u8> {
        self.state.borrow().buffer.as_bytes().to_vec()
    }

    /// Discard the accumulated output. Later offsets restart at zero.
    pub fn clear_buffer(&self) {
        self.state.send_modify(|s| s.buffer.clear());
    }

    /// Empty result for a zero-wait probe that found nothing.
    fn snapshot(&self, policy: RetentionPolicy) -> MatchResult {
        let state = self.state.borrow();
        let buffer = &state.buffer;
        let output = buffer.text(buffer.scan_start(policy), buffer.len());
        MatchResult {
            pattern_index: 0,
            before: output.clone(),
            output,
            matched: String::new(),
            groups: Vec::new(),
            start: buffer.len(),
            end: buffer.len(),
        }
    }

    async fn wait_for<T>(
        &self,
        timeout: Option<Duration>,
        probe: impl FnMut(&mut OutputBuffer) -> Option<T>,
    ) -> Result<T, ExpectError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        self.wait_until(timeout, deadline, probe).await
    }

    /// Probe the buffer every time it changes until `probe` yields a value.
    ///
    /// Output that arrived before the stream ended is still probed. A zero
    /// timeout probes once and reports a zero-duration timeout, even after
    /// the stream ended; only `close` makes it fail.
    async fn wait_until<T>(
        &self,
        timeout: Option<Duration>,
        deadline: Option<Instant>,
        mut probe: impl FnMut(&mut OutputBuffer) -> Option<T>,
    ) -> Result<T, ExpectError> {
        let mut rx = self.state.subscribe();
        let zero_wait = timeout.is_some_and(|t| t.is_zero());

        loop {
            let mut closed = false;
            let mut found = None;
            let mut terminal = None;
            self.state.send_if_modified(|state| {
                closed = state.closed;
                if !closed {
                    found = probe(&mut state.buffer);
                    terminal = state.terminal_error();
                }
                false
            });

            if closed {
                return Err(ExpectError::SessionClosed);
            }
            if let Some(value) = found {
                return Ok(value);
            }
            if zero_wait {
                return Err(ExpectError::Timeout {
                    duration: ZERO_WAIT,
                });
            }
            if let Some(err) = terminal {
                return Err(err);
            }

            let changed = match (deadline, timeout) {
                (Some(deadline), Some(duration)) => {
                    match tokio::time::timeout_at(deadline, rx.changed()).await {
                        Ok(changed) => changed,
                        Err(_) => return Err(ExpectError::Timeout { duration }),
                    }
                }
                _ => rx.changed().await,
            };
            if changed.is_err() {
                return Err(ExpectError::SessionClosed);
            }
        }
    }

    fn abort_reader(&self) {
        if let Some(reader) = self.reader.lock().ok().and_then(|mut r| r.take()) {
            reader.abort();
        }
    }
}

/// Turn a match relative to `start` into a result, consuming it under
/// [`RetentionPolicy::ConsumeMatched`].
fn settle(
    buffer: &mut OutputBuffer,
    policy: RetentionPolicy,
    start: usize,
    m: &Match,
    index: usize,
) -> MatchResult {
    let (abs_start, abs_end) = (start + m.start, start + m.end);
    let groups = m
        .groups
        .iter()
        .map(|group| {
            group
                .as_ref()
                .map(|range| buffer.text(start + range.start, start + range.end))
                .unwrap_or_default()
        })
        .collect();

    let result = MatchResult {
        pattern_index: index,
        output: buffer.text(start, buffer.len()),
        matched: buffer.text(abs_start, abs_end),
        groups,
        start: abs_start,
        end: abs_end,
        before: buffer.text(start, abs_start),
    };
    if policy == RetentionPolicy::ConsumeMatched {
        buffer.mark_matched(abs_end);
    }
    result
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.send_modify(|s| s.closed = true);
        self.abort_reader();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let control = self.control.clone();
                handle.spawn(async move {
                    let _ = control.close().await;
                });
            }
            Err(_) => self.control.close_blocking(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Session")
            .field("buffered", &state.buffer.len())
            .field("closed", &state.closed)
            .field("finished", &state.finished.is_some())
            .field("timeout", &self.timeout)
            .field("retention", &self.retention)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(data: &[u8]) -> OutputBuffer {
        let mut buffer = OutputBuffer::new(false);
        buffer.append(data);
        buffer
    }

    #[test]
    fn test_settle_extracts_groups() {
        let mut buffer = buffer_with(b"xx abc123 yy");
        let matcher = Pattern::regex(r"([a-z]+)(\d+)(z)?").unwrap().to_matcher().unwrap();
        let m = matcher.find(buffer.since(3)).unwrap();

        let result = settle(&mut buffer, RetentionPolicy::RetainAll, 3, &m, 2);
        assert_eq!(result.pattern_index, 2);
        assert_eq!(result.matched, "abc123");
        assert_eq!(result.groups, vec!["abc", "123", ""]);
        assert_eq!((result.start, result.end), (3, 9));
        assert_eq!(result.before, "");
        assert_eq!(result.output, "abc123 yy");
        assert_eq!(buffer.matched_position(), 0);
    }

    #[test]
    fn test_settle_consumes_under_consume_policy() {
        let mut buffer = buffer_with(b"one two");
        let matcher = Pattern::exact("one").to_matcher().unwrap();
        let m = matcher.find(buffer.as_bytes()).unwrap();

        settle(&mut buffer, RetentionPolicy::ConsumeMatched, 0, &m, 0);
        assert_eq!(buffer.matched_position(), 3);
    }
}
