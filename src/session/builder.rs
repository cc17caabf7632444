//! Session builder for configuration

use crate::buffer::RetentionPolicy;
use crate::config::{vars, EnvConfig};
use crate::result::ExpectError;
use crate::session::{Session, SpawnSource};
use crate::transport::scripted::Script;
use crate::transport::Transport;
use portable_pty::PtySize;
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "ssh")]
use crate::transport::ssh::TerminalSpec;

/// Default timeout for expect operations (in seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default PTY rows
const DEFAULT_PTY_ROWS: u16 = 24;

/// Default PTY columns
const DEFAULT_PTY_COLS: u16 = 80;

/// Default size of a single transport read (in bytes)
const DEFAULT_READ_CHUNK: usize = 4096;

/// Builder for configuring and attaching sessions.
///
/// # Defaults
///
/// - Timeout: 30 seconds
/// - ANSI stripping: disabled
/// - Retention: [`RetentionPolicy::RetainAll`]
/// - PTY size: 24 rows × 80 columns
/// - Read chunk: 4096 bytes
///
/// # Examples
///
/// ```no_run
/// use expectkit::{RetentionPolicy, Session};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder()
///     .timeout(Duration::from_secs(60))
///     .strip_ansi(true)
///     .retention(RetentionPolicy::ConsumeMatched)
///     .pty_size(40, 120)
///     .spawn_command("python3 -i")
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    timeout: Option<Duration>,
    strip_ansi: bool,
    retention: RetentionPolicy,
    pty_size: PtySize,
    read_chunk: usize,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Create a new session builder with default configuration.
    ///
    /// See the [`SessionBuilder`] documentation for default values.
    pub fn new() -> Self {
        Self {
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            strip_ansi: false,
            retention: RetentionPolicy::default(),
            pty_size: PtySize {
                rows: DEFAULT_PTY_ROWS,
                cols: DEFAULT_PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            },
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }

    /// Defaults overlaid with `EXPECTKIT_*` environment variables.
    ///
    /// | variable | meaning |
    /// |---|---|
    /// | `EXPECTKIT_TIMEOUT_MS` | default timeout in milliseconds |
    /// | `EXPECTKIT_STRIP_ANSI` | `1`/`true`/`yes`/`on` to strip ANSI sequences |
    /// | `EXPECTKIT_RETENTION` | `retain` or `consume` |
    /// | `EXPECTKIT_PTY_ROWS`, `EXPECTKIT_PTY_COLS` | PTY size |
    ///
    /// Unset or unparseable variables leave the default in place.
    pub fn from_env() -> Self {
        Self::new().with_env(&EnvConfig::default())
    }

    /// Overlay the values present in `env`.
    pub fn with_env(mut self, env: &EnvConfig) -> Self {
        if let Some(timeout) = env.duration_millis(vars::TIMEOUT_MS) {
            self.timeout = Some(timeout);
        }
        if let Some(strip) = env.bool(vars::STRIP_ANSI) {
            self.strip_ansi = strip;
        }
        match env.get(vars::RETENTION).as_deref().map(str::trim) {
            Some("retain") => self.retention = RetentionPolicy::RetainAll,
            Some("consume") => self.retention = RetentionPolicy::ConsumeMatched,
            Some(other) => debug!(value = other, "ignoring unknown retention policy"),
            None => {}
        }
        if let Some(rows) = env.parse(vars::PTY_ROWS) {
            self.pty_size.rows = rows;
        }
        if let Some(cols) = env.parse(vars::PTY_COLS) {
            self.pty_size.cols = cols;
        }
        self
    }

    /// Set the default timeout for expect, switch and batch operations.
    ///
    /// [`Duration::ZERO`] makes every default-timeout operation a zero-wait
    /// probe of the current buffer.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the default timeout (wait indefinitely).
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Enable or disable ANSI escape sequence stripping.
    ///
    /// When enabled, escape sequences are removed as output arrives, before
    /// anything is matched against it.
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    /// Choose which part of the buffer each match scans.
    pub fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.retention = policy;
        self
    }

    /// Set PTY (terminal) size for local commands.
    pub fn pty_size(mut self, rows: u16, cols: u16) -> Self {
        self.pty_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self
    }

    /// Set the size of a single transport read. Zero is treated as one.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk = size.max(1);
        self
    }

    /// Configured default timeout
    pub fn default_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Configured retention policy
    pub fn retention_policy(&self) -> RetentionPolicy {
        self.retention
    }

    /// Open `source` and attach a session to it.
    ///
    /// The background reader starts immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::SpawnFailed`] if the entity cannot be started,
    /// or [`ExpectError::InvalidPattern`] for a script with a bad input
    /// pattern.
    pub async fn attach(self, source: SpawnSource) -> Result<Session, ExpectError> {
        debug!(source = ?source, "attaching session");
        let transport = source.open(self.pty_size).await?;
        Ok(Session::start(transport, &self))
    }

    /// Spawn a whitespace-split command line in a PTY.
    ///
    /// ```no_run
    /// use expectkit::{Pattern, Session};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let session = Session::builder().spawn_command("python3 -i").await?;
    /// session.expect(&Pattern::exact(">>> ")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn spawn_command(self, command: &str) -> Result<Session, ExpectError> {
        self.attach(SpawnSource::command_line(command)).await
    }

    /// Spawn a program with an exact argument vector in a PTY.
    pub async fn spawn_args<I, S>(self, args: I) -> Result<Session, ExpectError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attach(SpawnSource::args(args)).await
    }

    /// Attach to a scripted fake entity.
    pub async fn spawn_scripted(self, script: Script) -> Result<Session, ExpectError> {
        self.attach(SpawnSource::scripted(script)).await
    }

    /// Attach to a caller-built transport.
    pub async fn spawn_generic(self, transport: Transport) -> Result<Session, ExpectError> {
        self.attach(SpawnSource::generic(transport)).await
    }

    /// Start a shell on an authenticated SSH session channel.
    #[cfg(feature = "ssh")]
    pub async fn spawn_ssh(
        self,
        channel: russh::Channel<russh::client::Msg>,
    ) -> Result<Session, ExpectError> {
        self.attach(SpawnSource::ssh(channel)).await
    }

    /// Start a shell inside a remote PTY on an authenticated SSH channel.
    #[cfg(feature = "ssh")]
    pub async fn spawn_ssh_pty(
        self,
        channel: russh::Channel<russh::client::Msg>,
        terminal: TerminalSpec,
    ) -> Result<Session, ExpectError> {
        self.attach(SpawnSource::ssh_pty(channel, terminal)).await
    }

    pub(crate) fn strip_ansi_enabled(&self) -> bool {
        self.strip_ansi
    }

    pub(crate) fn read_chunk(&self) -> usize {
        self.read_chunk
    }
}
