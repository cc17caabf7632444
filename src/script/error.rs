//! Error types for batch script parsing.

use std::fmt;

/// Errors that can occur while loading a batch script.
#[derive(Debug)]
pub enum ScriptError {
    /// The script does not follow the grammar.
    ParseError {
        /// Line number where the error occurred.
        line: usize,
        /// Column number where the error occurred.
        col: usize,
        /// Error message.
        message: String,
    },
    /// A pattern failed to compile.
    PatternError {
        /// Line of the offending pattern.
        line: usize,
        /// Compilation error.
        source: crate::PatternError,
    },
    /// A well-formed value that cannot be used (unknown signal, bad UTF-8, ...).
    InvalidValue {
        /// Line of the offending value.
        line: usize,
        /// What is wrong with it.
        message: String,
    },
    /// I/O error while reading the script.
    IoError(std::io::Error),
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::ParseError { line, col, message } => {
                write!(
                    f,
                    "Parse error at line {}, column {}: {}",
                    line, col, message
                )
            }
            ScriptError::PatternError { line, source } => {
                write!(f, "Pattern error at line {}: {}", line, source)
            }
            ScriptError::InvalidValue { line, message } => {
                write!(f, "Invalid value at line {}: {}", line, message)
            }
            ScriptError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::PatternError { source, .. } => Some(source),
            ScriptError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ScriptError {
    fn from(e: std::io::Error) -> Self {
        ScriptError::IoError(e)
    }
}

impl From<pest::error::Error<crate::script::parser::Rule>> for ScriptError {
    fn from(e: pest::error::Error<crate::script::parser::Rule>) -> Self {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((line, col)) => (line, col),
            pest::error::LineColLocation::Span((line, col), _) => (line, col),
        };
        ScriptError::ParseError {
            line,
            col,
            message: e.variant.to_string(),
        }
    }
}
