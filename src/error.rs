//! Error types for the jsonpl toolchain.
//!
//! Three layers that must not be conflated:
//! - [`Error::Parse`]: malformed source (document, tokens, statements).
//! - [`Error::Type`]: the checker rejected the program.
//! - [`Error::Runtime`]: execution failed and no error-handling region caught
//!   it; carries a script-level trace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A line/column pair, 1-based. `(0, 0)` means "no position".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineCol {
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number, starting at 1.
    pub col: u32,
}

impl LineCol {
    /// A position carrying no information.
    pub const EMPTY: LineCol = LineCol { line: 0, col: 0 };

    /// Creates a position.
    pub fn new(line: u32, col: u32) -> Self {
        LineCol { line, col }
    }

    /// Position one column to the right, e.g. the first character inside a
    /// quoted string when `self` points at the opening quote.
    pub fn inner(&self) -> Self {
        LineCol {
            line: self.line,
            col: self.col + 1,
        }
    }

    /// Position shifted `n` columns to the right.
    pub fn add_col(&self, n: u32) -> Self {
        LineCol {
            line: self.line,
            col: self.col + n,
        }
    }

    /// Whether this is the empty position.
    pub fn is_empty(&self) -> bool {
        self.line == 0 && self.col == 0
    }
}

impl std::fmt::Display for LineCol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "?:?")
        } else {
            write!(f, "{}:{}", self.line, self.col)
        }
    }
}

/// One entry of a script-level call trace: which type/member was executing
/// and where it was defined or invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInfo {
    /// Enclosing type name, or `""` at the top level.
    pub type_name: String,
    /// Function or member name.
    pub member: String,
    /// Source position.
    pub line_col: LineCol,
}

impl StackInfo {
    /// Creates a trace entry.
    pub fn new(type_name: impl Into<String>, member: impl Into<String>, line_col: LineCol) -> Self {
        StackInfo {
            type_name: type_name.into(),
            member: member.into(),
            line_col,
        }
    }

    /// The same entry positioned at a call site.
    pub fn at(mut self, line_col: LineCol) -> Self {
        if !line_col.is_empty() {
            self.line_col = line_col;
        }
        self
    }
}

impl std::fmt::Display for StackInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.type_name.is_empty() {
            write!(f, "{} at {}", self.member, self.line_col)
        } else {
            write!(f, "{}#{} at {}", self.type_name, self.member, self.line_col)
        }
    }
}

/// jsonpl toolchain errors.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Malformed source text or document structure. Fatal to compilation.
    #[error("parse error at {line_col}: {message}")]
    Parse {
        /// Error description.
        message: String,
        /// Source position.
        line_col: LineCol,
    },

    /// The type checker rejected the program. Fatal to compilation.
    #[error("type error at {line_col}: {message}")]
    Type {
        /// Error description.
        message: String,
        /// Source position.
        line_col: LineCol,
    },

    /// Execution failed and nothing in the script caught it.
    #[error("runtime error: {message}{}", format_stack(.stack))]
    Runtime {
        /// Error description.
        message: String,
        /// Script-level trace, innermost call last.
        stack: Vec<StackInfo>,
    },
}

fn format_stack(stack: &[StackInfo]) -> String {
    let mut out = String::new();
    for info in stack.iter().rev() {
        out.push_str("\n    at ");
        out.push_str(&info.to_string());
    }
    out
}

impl Error {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>, line_col: LineCol) -> Self {
        Error::Parse {
            message: message.into(),
            line_col,
        }
    }

    /// Creates a type error.
    pub fn type_error(message: impl Into<String>, line_col: LineCol) -> Self {
        Error::Type {
            message: message.into(),
            line_col,
        }
    }

    /// Creates a runtime error without a trace.
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime {
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// The source position of the error, if it has one.
    pub fn line_col(&self) -> Option<LineCol> {
        match self {
            Error::Parse { line_col, .. } | Error::Type { line_col, .. } => Some(*line_col),
            Error::Runtime { .. } => None,
        }
    }
}

/// Result type for jsonpl operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_display() {
        assert_eq!(LineCol::new(3, 14).to_string(), "3:14");
        assert_eq!(LineCol::EMPTY.to_string(), "?:?");
    }

    #[test]
    fn runtime_error_formats_trace() {
        let err = Error::Runtime {
            message: "index out of bounds".to_string(),
            stack: vec![
                StackInfo::new("", "main", LineCol::new(1, 1)),
                StackInfo::new("Point", "norm", LineCol::new(4, 3)),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("index out of bounds"));
        assert!(text.contains("Point#norm at 4:3"));
    }
}
