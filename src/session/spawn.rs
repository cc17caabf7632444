//! Where a session's entity comes from

use crate::result::ExpectError;
use crate::transport::scripted::{self, Script};
use crate::transport::{process, Transport};
use portable_pty::PtySize;
use std::fmt;

#[cfg(feature = "ssh")]
use crate::transport::ssh::{self, TerminalSpec};

/// The entity a session attaches to.
///
/// Every variant is opened by [`SessionBuilder::attach`](crate::SessionBuilder::attach).
pub enum SpawnSource {
    /// A command line split on whitespace; arguments cannot contain spaces
    CommandLine(String),
    /// A program and its exact argument vector
    Args(Vec<String>),
    /// A shell on an authenticated SSH session channel
    #[cfg(feature = "ssh")]
    Ssh {
        /// Channel from `channel_open_session`
        channel: russh::Channel<russh::client::Msg>,
        /// Remote PTY to request before the shell, if any
        terminal: Option<TerminalSpec>,
    },
    /// A transport built by the caller
    Generic(Transport),
    /// A deterministic fake entity
    Scripted(Script),
}

impl SpawnSource {
    /// A whitespace-split command line
    pub fn command_line(command: impl Into<String>) -> Self {
        SpawnSource::CommandLine(command.into())
    }

    /// A fixed argument vector; the first element is the program
    pub fn args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SpawnSource::Args(args.into_iter().map(Into::into).collect())
    }

    /// A shell on `channel` without a PTY
    #[cfg(feature = "ssh")]
    pub fn ssh(channel: russh::Channel<russh::client::Msg>) -> Self {
        SpawnSource::Ssh {
            channel,
            terminal: None,
        }
    }

    /// A shell on `channel` inside a remote PTY
    #[cfg(feature = "ssh")]
    pub fn ssh_pty(channel: russh::Channel<russh::client::Msg>, terminal: TerminalSpec) -> Self {
        SpawnSource::Ssh {
            channel,
            terminal: Some(terminal),
        }
    }

    /// Any caller-built transport
    pub fn generic(transport: Transport) -> Self {
        SpawnSource::Generic(transport)
    }

    /// A scripted fake entity
    pub fn scripted(script: Script) -> Self {
        SpawnSource::Scripted(script)
    }

    pub(crate) async fn open(self, pty_size: PtySize) -> Result<Transport, ExpectError> {
        match self {
            SpawnSource::CommandLine(command) => {
                let argv = process::split_command_line(&command);
                process::spawn(&argv, pty_size)
            }
            SpawnSource::Args(argv) => process::spawn(&argv, pty_size),
            #[cfg(feature = "ssh")]
            SpawnSource::Ssh { channel, terminal } => ssh::open(channel, terminal).await,
            SpawnSource::Generic(transport) => Ok(transport),
            SpawnSource::Scripted(script) => scripted::spawn(script),
        }
    }
}

impl fmt::Debug for SpawnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnSource::CommandLine(command) => f.debug_tuple("CommandLine").field(command).finish(),
            SpawnSource::Args(args) => f.debug_tuple("Args").field(args).finish(),
            #[cfg(feature = "ssh")]
            SpawnSource::Ssh { terminal, .. } => {
                f.debug_struct("Ssh").field("terminal", terminal).finish()
            }
            SpawnSource::Generic(transport) => f.debug_tuple("Generic").field(transport).finish(),
            SpawnSource::Scripted(script) => f.debug_tuple("Scripted").field(script).finish(),
        }
    }
}
