//! Batch scripts: expect/send transcripts kept in text files.
//!
//! A script is parsed into [`Batcher`] entries and run as one batch, so it
//! stops at the first failing step.
//!
//! # Syntax
//!
//! ```text
//! # comment
//! timeout 5s                      # default for later expect/switch
//! expect "login: " 10s            # regex, optional own timeout
//! expect exact "$ "               # exact text
//! sendline "admin"                # appends \n
//! send "secret\r"
//! signal INT
//! switch 3s {
//!   case "\$ $" => "exit\n"
//!   case "retry (\d+)" => "again \1\n" continue 3
//!   case "denied" fail "access denied"
//! }
//! ```
//!
//! Durations take `ms`, `s` or `m`; a bare number is seconds. Strings
//! understand `\n \r \t \e \" \\ \xNN`; any other backslash pair is kept
//! as written, so regex escapes and `\1` response references survive.
//!
//! # Example
//!
//! ```rust,no_run
//! use expectkit::script::BatchScript;
//! use expectkit::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let script = BatchScript::from_str(r#"
//!         expect ">>> "
//!         sendline "print('Hello')"
//!         expect "Hello"
//!     "#)?;
//!
//!     let session = Session::spawn("python3 -i").await?;
//!     script.run(&session).await?;
//!     Ok(())
//! }
//! ```

mod error;
pub(crate) mod parser;

pub use error::ScriptError;

use crate::{BatchFailure, BatchResult, Batcher, Session};
use std::path::Path;

/// A parsed batch script.
#[derive(Debug, Clone)]
pub struct BatchScript {
    entries: Vec<Batcher>,
}

impl BatchScript {
    /// Parse a script from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(input: &str) -> Result<Self, ScriptError> {
        Ok(Self {
            entries: parser::parse_script(input)?,
        })
    }

    /// Parse a script from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// The batch entries in order
    pub fn entries(&self) -> &[Batcher] {
        &self.entries
    }

    /// Consume the script, yielding its entries
    pub fn into_entries(self) -> Vec<Batcher> {
        self.entries
    }

    /// Run the script against `session` as a single batch.
    pub async fn run(&self, session: &Session) -> Result<Vec<BatchResult>, BatchFailure> {
        session.expect_batch(&self.entries).await
    }
}

/// Resolve backslash escapes in a script string.
pub(crate) fn unescape(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let escaped = match bytes[i + 1] {
            b'n' => Some(b'\n'),
            b'r' => Some(b'\r'),
            b't' => Some(b'\t'),
            b'e' => Some(0x1b),
            b'"' => Some(b'"'),
            b'\\' => Some(b'\\'),
            b'x' => bytes
                .get(i + 2..i + 4)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .map(|byte| {
                    i += 2;
                    byte
                }),
            _ => None,
        };
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 2;
            }
            None => {
                out.extend_from_slice(&bytes[i..i + 2]);
                i += 2;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_known_escapes() {
        assert_eq!(unescape(r#"a\nb\r\t\e\"\\"#), b"a\nb\r\t\x1b\"\\");
        assert_eq!(unescape(r"\x41\x1b"), b"A\x1b");
    }

    #[test]
    fn test_unescape_keeps_unknown_pairs() {
        assert_eq!(unescape(r"\d+ \$ \1"), br"\d+ \$ \1");
        assert_eq!(unescape(r"\xZZ"), br"\xZZ");
        assert_eq!(unescape("trailing\\"), b"trailing\\");
    }

    #[test]
    fn test_from_str() {
        let script = BatchScript::from_str("sendline \"hi\"\nexpect \"hi\"").unwrap();
        assert_eq!(script.entries().len(), 2);
        assert_eq!(script.into_entries()[0].kind(), "send");
    }
}
