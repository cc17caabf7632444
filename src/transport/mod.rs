//! The byte-stream and control channel to a spawned entity.
//!
//! A [`Transport`] is what a session attaches to: an output stream the
//! background reader drains, an input sink for sends, and a [`Control`]
//! handle for signals, termination and close. Concrete transports build
//! one of these:
//!
//! - [`process`]: a local command inside a PTY
//! - [`scripted`]: a deterministic fake entity for tests
//! - [`Transport::stream`]: any async reader/writer pair
//! - `ssh` (feature `ssh`): an interactive shell on a russh channel

pub mod process;
pub mod scripted;
#[cfg(feature = "ssh")]
pub mod ssh;

use crate::result::ExpectError;
use async_trait::async_trait;
use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};

/// Output side of a transport.
pub enum Output {
    /// A blocking reader, drained on a blocking thread (PTY masters).
    Blocking(Box<dyn Read + Send>),
    /// An async reader, drained on a task.
    Async(Box<dyn AsyncRead + Send + Unpin>),
}

/// Input side of a transport.
pub enum Input {
    /// A blocking writer; writes run on a blocking thread.
    Blocking(Arc<Mutex<Box<dyn Write + Send>>>),
    /// An async writer.
    Async(Box<dyn AsyncWrite + Send + Unpin>),
}

impl Input {
    /// Wrap a blocking writer
    pub fn blocking(writer: Box<dyn Write + Send>) -> Self {
        Input::Blocking(Arc::new(Mutex::new(writer)))
    }
}

/// Control signals deliverable to a spawned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGINT
    Interrupt,
    /// SIGQUIT
    Quit,
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
    /// SIGHUP
    Hangup,
    /// SIGUSR1
    User1,
    /// SIGUSR2
    User2,
}

impl Signal {
    /// Parse a signal name such as `INT`, `SIGTERM` or `hup`
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        let short = upper.strip_prefix("SIG").unwrap_or(&upper);
        match short {
            "INT" => Some(Signal::Interrupt),
            "QUIT" => Some(Signal::Quit),
            "TERM" => Some(Signal::Terminate),
            "KILL" => Some(Signal::Kill),
            "HUP" => Some(Signal::Hangup),
            "USR1" => Some(Signal::User1),
            "USR2" => Some(Signal::User2),
            _ => None,
        }
    }

    /// Conventional short name (`INT`, `TERM`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Interrupt => "INT",
            Signal::Quit => "QUIT",
            Signal::Terminate => "TERM",
            Signal::Kill => "KILL",
            Signal::Hangup => "HUP",
            Signal::User1 => "USR1",
            Signal::User2 => "USR2",
        }
    }

    #[cfg(unix)]
    pub(crate) fn as_raw(&self) -> libc::c_int {
        match self {
            Signal::Interrupt => libc::SIGINT,
            Signal::Quit => libc::SIGQUIT,
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
            Signal::Hangup => libc::SIGHUP,
            Signal::User1 => libc::SIGUSR1,
            Signal::User2 => libc::SIGUSR2,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.name())
    }
}

/// Lifecycle control of a spawned entity.
///
/// `close` must be safe to call more than once.
#[async_trait]
pub trait Control: Send + Sync {
    /// Deliver a signal to the entity.
    async fn signal(&self, signal: Signal) -> Result<(), ExpectError> {
        Err(ExpectError::Unsupported(format!(
            "cannot deliver {} over a plain stream",
            signal
        )))
    }

    /// Wait for the entity to finish once its output has ended, reporting
    /// how it finished.
    async fn wait(&self) -> Result<(), ExpectError> {
        Ok(())
    }

    /// Tear the entity down.
    async fn close(&self) -> Result<(), ExpectError>;

    /// Blocking teardown for when no async runtime is available, such as a
    /// session dropped outside one. Does nothing unless the entity holds
    /// resources beyond its streams.
    fn close_blocking(&self) {}
}

/// Control for entities that are nothing more than a byte stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamControl;

#[async_trait]
impl Control for StreamControl {
    async fn close(&self) -> Result<(), ExpectError> {
        Ok(())
    }
}

/// A bidirectional channel to an already-spawned entity.
pub struct Transport {
    /// Where the entity's output is read from
    pub output: Output,
    /// Where input for the entity is written
    pub input: Input,
    /// Signals, termination and close
    pub control: Arc<dyn Control>,
}

impl Transport {
    /// Assemble a transport from its parts
    pub fn new(output: Output, input: Input, control: Arc<dyn Control>) -> Self {
        Self {
            output,
            input,
            control,
        }
    }

    /// A stream-only transport over an async reader/writer pair.
    ///
    /// Signals are unsupported and close only stops the session's reader.
    pub fn stream<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::new(
            Output::Async(Box::new(reader)),
            Input::Async(Box::new(writer)),
            Arc::new(StreamControl),
        )
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = match self.output {
            Output::Blocking(_) => "blocking",
            Output::Async(_) => "async",
        };
        f.debug_struct("Transport").field("output", &output).finish()
    }
}
