//! Deterministic fake entities for tests
//!
//! A [`Script`] plays the part of the far end of a session: it emits output,
//! waits for the caller to write specific input, and pauses, strictly in
//! order. The engine side sees an ordinary byte stream.
//!
//! ```
//! use expectkit::transport::scripted::Script;
//! use expectkit::Pattern;
//!
//! let script = Script::new()
//!     .emit("login: ")
//!     .expect_input(Pattern::exact("admin\n"))
//!     .emit("welcome\n$ ")
//!     .exit();
//! assert_eq!(script.len(), 4);
//! ```

use super::{Control, Input, Output, Transport};
use crate::pattern::{Matcher, Pattern};
use crate::result::ExpectError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf};
use tokio::task::JoinHandle;
use tracing::trace;

/// Capacity of the in-memory pipe between engine and fake.
const PIPE_CAPACITY: usize = 64 * 1024;

/// One step of a scripted entity.
#[derive(Debug, Clone)]
pub enum Step {
    /// Write bytes to the session output
    Emit(Vec<u8>),
    /// Block until the caller's input matches, consuming through the match
    ExpectInput(Pattern),
    /// Pause
    Delay(Duration),
    /// End the output stream
    Exit,
}

/// An ordered list of [`Step`]s.
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    /// An empty script. The fake stays open until the session is closed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an output step
    pub fn emit(mut self, data: impl AsRef<[u8]>) -> Self {
        self.steps.push(Step::Emit(data.as_ref().to_vec()));
        self
    }

    /// Append a step that waits for matching input
    pub fn expect_input(mut self, pattern: Pattern) -> Self {
        self.steps.push(Step::ExpectInput(pattern));
        self
    }

    /// Append a pause
    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Delay(duration));
        self
    }

    /// Append end-of-output
    pub fn exit(mut self) -> Self {
        self.steps.push(Step::Exit);
        self
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the script has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The steps in order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

enum Compiled {
    Emit(Vec<u8>),
    ExpectInput(Box<dyn Matcher>),
    Delay(Duration),
    Exit,
}

/// Start the fake entity and return the engine's side of it.
///
/// Must be called from within a tokio runtime.
pub fn spawn(script: Script) -> Result<Transport, ExpectError> {
    let steps = script
        .steps
        .into_iter()
        .map(|step| {
            Ok(match step {
                Step::Emit(data) => Compiled::Emit(data),
                Step::ExpectInput(pattern) => Compiled::ExpectInput(pattern.to_matcher()?),
                Step::Delay(duration) => Compiled::Delay(duration),
                Step::Exit => Compiled::Exit,
            })
        })
        .collect::<Result<Vec<_>, ExpectError>>()?;

    let (engine, fake) = tokio::io::duplex(PIPE_CAPACITY);
    let (reader, writer) = tokio::io::split(engine);
    let task = tokio::spawn(run(steps, fake));

    Ok(Transport::new(
        Output::Async(Box::new(reader)),
        Input::Async(Box::new(writer)),
        std::sync::Arc::new(ScriptedControl {
            task: Mutex::new(Some(task)),
        }),
    ))
}

async fn run(steps: Vec<Compiled>, fake: DuplexStream) {
    let (mut input, mut output) = tokio::io::split(fake);
    let mut pending = Vec::new();

    for (index, step) in steps.into_iter().enumerate() {
        trace!(step = index, "scripted step");
        match step {
            Compiled::Emit(data) => {
                if output.write_all(&data).await.is_err() {
                    return;
                }
            }
            Compiled::ExpectInput(matcher) => {
                if !consume_until(&mut input, &mut pending, matcher.as_ref()).await {
                    return;
                }
            }
            Compiled::Delay(duration) => tokio::time::sleep(duration).await,
            Compiled::Exit => return,
        }
    }

    // Output stays open while idling.
    idle(&mut input).await;
    drop(output);
}

/// Read input until `matcher` matches, dropping everything through the match.
/// Returns `false` if the caller side went away first.
async fn consume_until(
    input: &mut ReadHalf<DuplexStream>,
    pending: &mut Vec<u8>,
    matcher: &dyn Matcher,
) -> bool {
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(m) = matcher.find(pending) {
            pending.drain(..m.end);
            return true;
        }
        match input.read(&mut chunk).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => pending.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Swallow input until the caller side goes away.
async fn idle(input: &mut ReadHalf<DuplexStream>) {
    let mut chunk = [0u8; 1024];
    while let Ok(n) = input.read(&mut chunk).await {
        if n == 0 {
            break;
        }
    }
}

struct ScriptedControl {
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Control for ScriptedControl {
    async fn close(&self) -> Result<(), ExpectError> {
        if let Some(task) = self.task.lock().ok().and_then(|mut t| t.take()) {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_builder_keeps_order() {
        let script = Script::new()
            .emit("a")
            .delay(Duration::from_millis(5))
            .expect_input(Pattern::exact("b"))
            .exit();
        assert!(matches!(script.steps()[0], Step::Emit(ref d) if d == b"a"));
        assert!(matches!(script.steps()[1], Step::Delay(_)));
        assert!(matches!(script.steps()[2], Step::ExpectInput(_)));
        assert!(matches!(script.steps()[3], Step::Exit));
    }

    #[tokio::test]
    async fn test_invalid_input_pattern_rejected() {
        let err = spawn(Script::new().expect_input(Pattern::exact(""))).unwrap_err();
        assert!(matches!(err, ExpectError::InvalidPattern(_)));
    }

    #[tokio::test]
    async fn test_emit_then_exit_reaches_eof() {
        let transport = spawn(Script::new().emit("hello").exit()).unwrap();
        let Output::Async(mut reader) = transport.output else {
            panic!("scripted output is async");
        };
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_expect_input_gates_output() {
        let transport = spawn(
            Script::new()
                .expect_input(Pattern::exact("ping"))
                .emit("pong")
                .exit(),
        )
        .unwrap();
        let (Output::Async(mut reader), Input::Async(mut writer)) =
            (transport.output, transport.input)
        else {
            panic!("scripted transport is async");
        };

        writer.write_all(b"pi").await.unwrap();
        writer.write_all(b"ng\n").await.unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"pong");
    }
}
