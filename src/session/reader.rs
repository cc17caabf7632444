//! Background accumulation of transport output

use crate::buffer::OutputBuffer;
use crate::result::ExpectError;
use crate::transport::{Control, Output};
use std::io::{self, Read};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// State shared between the reader and every caller-side operation.
#[derive(Debug)]
pub(crate) struct OutputState {
    pub(crate) buffer: OutputBuffer,
    /// Set once by `close`; no further appends or matches.
    pub(crate) closed: bool,
    /// Set once when the output stream ended, with the terminal error if any.
    pub(crate) finished: Option<Option<ExpectError>>,
}

impl OutputState {
    pub(crate) fn new(strip_ansi: bool) -> Self {
        Self {
            buffer: OutputBuffer::new(strip_ansi),
            closed: false,
            finished: None,
        }
    }

    /// Why no further output can arrive, if that is the case.
    pub(crate) fn terminal_error(&self) -> Option<ExpectError> {
        if self.closed {
            return Some(ExpectError::SessionClosed);
        }
        match &self.finished {
            Some(Some(err @ ExpectError::ReadFailed(_))) => Some(err.clone()),
            Some(_) => Some(ExpectError::SessionClosed),
            None => None,
        }
    }
}

pub(crate) type SharedState = Arc<watch::Sender<OutputState>>;

/// Start draining `output` into `state`.
pub(crate) fn spawn(
    output: Output,
    control: Arc<dyn Control>,
    state: SharedState,
    chunk_size: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = match output {
            Output::Blocking(reader) => drain_blocking(reader, &state, chunk_size).await,
            Output::Async(reader) => drain_async(reader, &state, chunk_size).await,
        };

        let closed = state.borrow().closed;
        let finished = match outcome {
            _ if closed => None,
            Ok(()) => control.wait().await.err(),
            Err(e) => Some(e),
        };
        debug!(error = ?finished, "output stream ended");
        state.send_modify(|s| s.finished = Some(finished));
    })
}

fn append(state: &SharedState, data: &[u8]) {
    trace!(bytes = data.len(), "output received");
    state.send_modify(|s| {
        if !s.closed {
            s.buffer.append(data);
        }
    });
}

async fn drain_async(
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    state: &SharedState,
    chunk_size: usize,
) -> Result<(), ExpectError> {
    let mut buf = vec![0u8; chunk_size];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => append(state, &buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(ExpectError::read_failed(e)),
        }
    }
}

/// Each read runs on the blocking pool, so aborting the task stops the
/// loop between reads.
async fn drain_blocking(
    mut reader: Box<dyn Read + Send>,
    state: &SharedState,
    chunk_size: usize,
) -> Result<(), ExpectError> {
    let mut buf = vec![0u8; chunk_size];
    loop {
        let (returned_reader, returned_buf, result) = tokio::task::spawn_blocking(move || {
            let result = reader.read(&mut buf);
            (reader, buf, result)
        })
        .await
        .map_err(|e| ExpectError::read_failed(io::Error::other(e)))?;
        reader = returned_reader;
        buf = returned_buf;

        match result {
            Ok(0) => return Ok(()),
            Ok(n) => append(state, &buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_hangup(&e) => return Ok(()),
            Err(e) => return Err(ExpectError::read_failed(e)),
        }
    }
}

/// A PTY master reports EIO once every slave descriptor is closed.
#[cfg(unix)]
fn is_hangup(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EIO)
}

#[cfg(not(unix))]
fn is_hangup(_e: &io::Error) -> bool {
    false
}
