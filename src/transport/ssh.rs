//! Interactive shells on an SSH session channel
//!
//! Connecting and authenticating stay with the caller: hand over a channel
//! obtained from `russh::client::Handle::channel_open_session` and this
//! module requests a shell on it (and, optionally, a remote PTY first).
//!
//! A driver task owns the channel. It forwards channel data to the
//! session's output stream, forwards session writes as channel data, and
//! services signal and close requests.

use super::{Control, Input, Output, Signal, Transport};
use crate::result::ExpectError;
use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Sig};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const PIPE_CAPACITY: usize = 64 * 1024;
const READ_CHUNK: usize = 4096;

/// Remote terminal requested for a PTY-backed shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSpec {
    /// Terminal type sent as `TERM`
    pub term: String,
    /// Width in columns
    pub cols: u32,
    /// Height in rows
    pub rows: u32,
}

impl Default for TerminalSpec {
    fn default() -> Self {
        Self {
            term: "xterm".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}

enum Command {
    Signal(Sig, oneshot::Sender<Result<(), ExpectError>>),
    Close,
}

/// Start a shell on `channel`, requesting a remote PTY first when
/// `terminal` is given.
pub async fn open(
    channel: Channel<Msg>,
    terminal: Option<TerminalSpec>,
) -> Result<Transport, ExpectError> {
    if let Some(terminal) = &terminal {
        channel
            .request_pty(
                true,
                &terminal.term,
                terminal.cols,
                terminal.rows,
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| ExpectError::SpawnFailed(format!("PTY request: {}", e)))?;
    }
    channel
        .request_shell(true)
        .await
        .map_err(|e| ExpectError::SpawnFailed(format!("shell request: {}", e)))?;
    debug!(pty = terminal.is_some(), "ssh shell started");

    let (engine, driver_end) = tokio::io::duplex(PIPE_CAPACITY);
    let (reader, writer) = tokio::io::split(engine);
    let (commands, command_rx) = mpsc::channel(8);
    let driver = tokio::spawn(drive(channel, driver_end, command_rx));

    Ok(Transport::new(
        Output::Async(Box::new(reader)),
        Input::Async(Box::new(writer)),
        std::sync::Arc::new(SshControl {
            commands,
            driver: Mutex::new(Some(driver)),
        }),
    ))
}

/// What the driver does with one channel message.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    /// Remote output for the session.
    Output(Vec<u8>),
    /// The remote side sent EOF. The channel may still carry an exit status.
    EndOfOutput,
    /// The channel is gone.
    Finished,
    Continue,
}

fn classify(msg: Option<ChannelMsg>, exit_status: &mut Option<u32>) -> Flow {
    match msg {
        Some(ChannelMsg::Data { data }) => Flow::Output(data.to_vec()),
        Some(ChannelMsg::ExtendedData { data, ext: 1 }) => Flow::Output(data.to_vec()),
        Some(ChannelMsg::ExitStatus { exit_status: code }) => {
            debug!(code, "remote exit status");
            *exit_status = Some(code);
            Flow::Continue
        }
        Some(ChannelMsg::Eof) => Flow::EndOfOutput,
        Some(ChannelMsg::Close) | None => Flow::Finished,
        Some(other) => {
            trace!(?other, "ignored channel message");
            Flow::Continue
        }
    }
}

/// Pump the channel until it closes. Returns the remote exit status, if one
/// was reported.
async fn drive(
    mut channel: Channel<Msg>,
    pipe: DuplexStream,
    mut commands: mpsc::Receiver<Command>,
) -> Option<u32> {
    let (mut from_session, mut to_session) = tokio::io::split(pipe);
    let mut buf = vec![0u8; READ_CHUNK];
    let mut input_open = true;
    let mut output_open = true;
    let mut exit_status = None;

    loop {
        tokio::select! {
            msg = channel.wait() => match classify(msg, &mut exit_status) {
                Flow::Output(data) if output_open => {
                    if to_session.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Flow::Output(_) | Flow::Continue => {}
                Flow::EndOfOutput => {
                    // Exit status usually follows EOF, so keep pumping.
                    output_open = false;
                    let _ = to_session.shutdown().await;
                }
                Flow::Finished => break,
            },
            read = from_session.read(&mut buf), if input_open => match read {
                Ok(0) | Err(_) => {
                    input_open = false;
                    let _ = channel.eof().await;
                }
                Ok(n) => {
                    if let Err(e) = channel.data(&buf[..n]).await {
                        warn!(error = %e, "ssh channel write failed");
                        break;
                    }
                }
            },
            command = commands.recv() => match command {
                Some(Command::Signal(sig, reply)) => {
                    let result = channel
                        .signal(sig)
                        .await
                        .map_err(|e| ExpectError::write_failed(std::io::Error::other(e.to_string())));
                    let _ = reply.send(result);
                }
                Some(Command::Close) | None => {
                    let _ = channel.close().await;
                    break;
                }
            },
        }
    }

    exit_status
}

fn exit_result(exit_status: Option<u32>) -> Result<(), ExpectError> {
    match exit_status {
        Some(code) if code != 0 => Err(ExpectError::ExitStatus { code }),
        _ => Ok(()),
    }
}

fn to_sig(signal: Signal) -> Sig {
    match signal {
        Signal::Interrupt => Sig::INT,
        Signal::Quit => Sig::QUIT,
        Signal::Terminate => Sig::TERM,
        Signal::Kill => Sig::KILL,
        Signal::Hangup => Sig::HUP,
        Signal::User1 => Sig::USR1,
        Signal::User2 => Sig::Custom("USR2".to_string()),
    }
}

struct SshControl {
    commands: mpsc::Sender<Command>,
    driver: Mutex<Option<JoinHandle<Option<u32>>>>,
}

#[async_trait]
impl Control for SshControl {
    async fn signal(&self, signal: Signal) -> Result<(), ExpectError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Signal(to_sig(signal), reply))
            .await
            .map_err(|_| ExpectError::SessionClosed)?;
        response.await.map_err(|_| ExpectError::SessionClosed)?
    }

    async fn wait(&self) -> Result<(), ExpectError> {
        let driver = self.driver.lock().ok().and_then(|mut d| d.take());
        let Some(driver) = driver else {
            return Ok(());
        };
        exit_result(driver.await.ok().flatten())
    }

    async fn close(&self) -> Result<(), ExpectError> {
        // The driver may already be gone.
        let _ = self.commands.try_send(Command::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_terminal() {
        let spec = TerminalSpec::default();
        assert_eq!((spec.term.as_str(), spec.cols, spec.rows), ("xterm", 80, 24));
    }

    #[test]
    fn test_exit_status_after_eof_is_kept() {
        let mut status = None;
        assert_eq!(classify(Some(ChannelMsg::Eof), &mut status), Flow::EndOfOutput);
        assert_eq!(
            classify(Some(ChannelMsg::ExitStatus { exit_status: 1 }), &mut status),
            Flow::Continue
        );
        assert_eq!(classify(Some(ChannelMsg::Close), &mut status), Flow::Finished);
        assert_eq!(status, Some(1));
        assert!(matches!(
            exit_result(status),
            Err(ExpectError::ExitStatus { code: 1 })
        ));
    }

    #[test]
    fn test_clean_exit_and_lost_channel() {
        let mut status = None;
        assert_eq!(classify(None, &mut status), Flow::Finished);
        assert!(exit_result(status).is_ok());
        assert!(exit_result(Some(0)).is_ok());
    }

    #[test]
    fn test_signal_mapping() {
        assert!(matches!(to_sig(Signal::Interrupt), Sig::INT));
        assert!(matches!(to_sig(Signal::User2), Sig::Custom(ref name) if name == "USR2"));
    }
}
