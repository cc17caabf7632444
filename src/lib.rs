//! expectkit: expect-style session automation for Rust
//!
//! expectkit spawns a controllable entity (a local command in a PTY, a
//! shell on an SSH channel, any async byte stream, or a scripted fake),
//! accumulates its output in the background, and lets you drive it by
//! waiting for patterns and writing input back.
//!
//! # Features
//!
//! - **Background accumulation**: output is read continuously; matches never
//!   block the reader
//! - **Pattern matching**: exact strings (Boyer-Moore-Horspool) and regular
//!   expressions over raw bytes, with capture groups
//! - **Zero-wait probes**: [`ZERO_WAIT`] reports the current buffer without
//!   blocking
//! - **Case switches**: first matching case wins, with templated responses
//! - **Batches**: ordered expect/send transcripts that stop at the first
//!   failure and return partial results
//! - **Scripted transport**: deterministic fake entities for tests
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use expectkit::{Pattern, Session};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::builder()
//!         .timeout(Duration::from_secs(30))
//!         .spawn_command("python3 -i")
//!         .await?;
//!
//!     session.expect(&Pattern::exact(">>> ")).await?;
//!     session.send_line("print('Hello, World!')").await?;
//!
//!     let result = session.expect(&Pattern::regex(r"Hello, (\w+)!")?).await?;
//!     println!("Greeted: {}", result.groups[0]);
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Switches and batches
//!
//! ```rust,no_run
//! use expectkit::{Batcher, Case, Pattern, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let session = Session::spawn("ssh router").await?;
//! let login = vec![
//!     Case::new(Pattern::exact("Password: ")).respond("secret\n"),
//!     Case::new(Pattern::regex(r"Host (\S+) unreachable")?).fail("unreachable"),
//!     Case::new(Pattern::regex(r"[#>] $")?),
//! ];
//!
//! let results = session
//!     .expect_batch(&[
//!         Batcher::switch(login),
//!         Batcher::send("show version\n"),
//!         Batcher::expect(Pattern::regex(r"Version (\S+)")?),
//!     ])
//!     .await?;
//! println!("version {}", results[2].groups[0]);
//! # Ok(())
//! # }
//! ```
//!
//! # Testing against a scripted entity
//!
//! ```rust
//! use expectkit::transport::scripted::Script;
//! use expectkit::{Pattern, Session};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let script = Script::new()
//!     .expect_input(Pattern::exact("ping"))
//!     .emit("pong\n");
//! let session = Session::builder().spawn_scripted(script).await?;
//!
//! session.send(b"ping").await?;
//! let result = session.expect(&Pattern::exact("pong")).await?;
//! assert_eq!(result.matched, "pong");
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! [`SessionBuilder`] carries the defaults; [`SessionBuilder::from_env`]
//! overlays `EXPECTKIT_*` environment variables.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events and never installs a subscriber.

#![warn(missing_docs)]

mod buffer;
pub mod config;
mod pattern;
mod result;
mod session;
pub mod transport;

#[cfg(feature = "script")]
pub mod script;

// Public API exports
pub use buffer::{strip_ansi, AnsiFilter, RetentionPolicy};
pub use pattern::{expand_template, ExactMatcher, Match, Matcher, Pattern, RegexMatcher};
pub use result::{BatchFailure, BatchResult, ExpectError, MatchResult, PatternError};
pub use session::{
    Batcher, Case, Expecter, Session, SessionBuilder, SpawnSource, ZERO_WAIT,
};
pub use transport::{Signal, Transport};

#[cfg(feature = "ssh")]
pub use transport::ssh::TerminalSpec;
