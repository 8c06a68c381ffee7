//! Character-level source access: positioned cursors and multi-file
//! composition.
//!
//! The document parser and the tokenizer both consume characters through the
//! [`Chars`] trait. [`CharCursor`] reads a single string; [`IncludeCursor`]
//! stacks cursors to support `#include "name"` directives resolved against a
//! [`SourceSet`].

use std::collections::HashMap;

use crate::error::{Error, LineCol, Result};

/// A positioned character stream.
pub trait Chars {
    /// Peeks the `i`-th character ahead (1-based) without consuming.
    fn peek(&mut self, i: usize) -> Option<char>;

    /// Consumes and returns the next character.
    fn advance(&mut self) -> Option<char>;

    /// Position of the next character to be read.
    fn line_col(&self) -> LineCol;

    /// Skips whitespace. Fallible because include resolution happens at
    /// whitespace-skip points.
    fn skip_blank(&mut self) -> Result<()>;
}

/// Character cursor over one source string.
#[derive(Debug, Clone)]
pub struct CharCursor {
    /// Source characters.
    chars: Vec<char>,
    /// Index of the next character to read.
    current: usize,
    line: u32,
    col: u32,
}

impl CharCursor {
    /// Creates a cursor starting at line 1, column 1.
    pub fn new(source: &str) -> Self {
        Self::with_start(source, LineCol::new(1, 1))
    }

    /// Creates a cursor whose first character sits at `start`. Used when the
    /// source is a fragment of a larger document (entry values, interpolated
    /// substrings).
    pub fn with_start(source: &str, start: LineCol) -> Self {
        CharCursor {
            chars: source.chars().collect(),
            current: 0,
            line: start.line.max(1),
            col: start.col.max(1),
        }
    }

    /// Number of unread characters.
    pub fn remaining(&self) -> usize {
        self.chars.len() - self.current
    }

    /// Whether at least one character remains.
    pub fn has_next(&self) -> bool {
        self.current < self.chars.len()
    }
}

impl Chars for CharCursor {
    fn peek(&mut self, i: usize) -> Option<char> {
        self.chars.get(self.current + i - 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.current).copied()?;
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn line_col(&self) -> LineCol {
        LineCol::new(self.line, self.col)
    }

    fn skip_blank(&mut self) -> Result<()> {
        while let Some(c) = self.peek(1) {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
        Ok(())
    }
}

/// A named collection of source texts resolvable by `#include`.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    files: HashMap<String, String>,
}

impl SourceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        SourceSet::default()
    }

    /// Adds or replaces a named source.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.files.insert(name.into(), text.into());
        self
    }

    /// Looks up a named source.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(|s| s.as_str())
    }
}

const INCLUDE_KEYWORD: &str = "#include";

struct IncludeFrame {
    name: String,
    cursor: CharCursor,
}

/// A character stream composed from a main source plus `#include`d sources.
///
/// An include directive may appear wherever whitespace may: when skipping
/// blanks the cursor recognizes `#include "name"`, resolves `name` against
/// the [`SourceSet`], and continues reading from the included text before
/// returning to the including file. Including a file that is already on the
/// include stack is a parse error.
pub struct IncludeCursor<'a> {
    sources: &'a SourceSet,
    stack: Vec<IncludeFrame>,
}

impl<'a> IncludeCursor<'a> {
    /// Opens the stream at `main`, which must exist in `sources`.
    pub fn new(sources: &'a SourceSet, main: &str) -> Result<Self> {
        let text = sources
            .get(main)
            .ok_or_else(|| Error::parse(format!("source not found: {}", main), LineCol::EMPTY))?;
        Ok(IncludeCursor {
            sources,
            stack: vec![IncludeFrame {
                name: main.to_string(),
                cursor: CharCursor::new(text),
            }],
        })
    }

    fn pop_exhausted(&mut self) {
        while self.stack.len() > 1 {
            let top = &self.stack[self.stack.len() - 1];
            if top.cursor.has_next() {
                break;
            }
            self.stack.pop();
        }
    }

    fn top(&mut self) -> &mut IncludeFrame {
        let idx = self.stack.len() - 1;
        &mut self.stack[idx]
    }

    /// Recognizes and consumes one `#include "name"` directive if the top
    /// cursor is positioned at one. Returns whether a file was pushed.
    fn try_include(&mut self) -> Result<bool> {
        {
            let top = self.top();
            for (i, expected) in INCLUDE_KEYWORD.chars().enumerate() {
                if top.cursor.peek(i + 1) != Some(expected) {
                    return Ok(false);
                }
            }
        }
        let directive_pos = self.top().cursor.line_col();
        for _ in 0..INCLUDE_KEYWORD.len() {
            self.top().cursor.advance();
        }
        // whitespace between the keyword and the quoted name
        while let Some(c) = self.top().cursor.peek(1) {
            if c.is_whitespace() {
                self.top().cursor.advance();
            } else {
                break;
            }
        }
        let quote = match self.top().cursor.advance() {
            Some(c) if c == '"' || c == '\'' => c,
            _ => {
                return Err(Error::parse(
                    "invalid #include statement: expecting a quoted source name",
                    directive_pos,
                ))
            }
        };
        let mut name = String::new();
        loop {
            match self.top().cursor.advance() {
                Some(c) if c == quote => break,
                Some(c) => name.push(c),
                None => {
                    return Err(Error::parse(
                        "invalid #include statement: reaches eof",
                        directive_pos,
                    ))
                }
            }
        }
        if self.stack.iter().any(|f| f.name == name) {
            return Err(Error::parse(
                format!("recursive include: {}", name),
                directive_pos,
            ));
        }
        let text = self.sources.get(&name).ok_or_else(|| {
            Error::parse(
                format!("unable to #include \"{}\": source not found", name),
                directive_pos,
            )
        })?;
        self.stack.push(IncludeFrame {
            name,
            cursor: CharCursor::new(text),
        });
        Ok(true)
    }
}

impl Chars for IncludeCursor<'_> {
    fn peek(&mut self, i: usize) -> Option<char> {
        self.pop_exhausted();
        let mut n = i;
        for frame in self.stack.iter_mut().rev() {
            let avail = frame.cursor.remaining();
            if n <= avail {
                return frame.cursor.peek(n);
            }
            n -= avail;
        }
        None
    }

    fn advance(&mut self) -> Option<char> {
        self.pop_exhausted();
        loop {
            if let Some(c) = self.top().cursor.advance() {
                return Some(c);
            }
            if self.stack.len() == 1 {
                return None;
            }
            self.stack.pop();
        }
    }

    fn line_col(&self) -> LineCol {
        self.stack[self.stack.len() - 1].cursor.line_col()
    }

    fn skip_blank(&mut self) -> Result<()> {
        loop {
            self.pop_exhausted();
            self.top().cursor.skip_blank()?;
            if !self.top().cursor.has_next() {
                if self.stack.len() == 1 {
                    return Ok(());
                }
                self.stack.pop();
                continue;
            }
            if self.top().cursor.peek(1) == Some('#') {
                if self.try_include()? {
                    continue;
                }
                return Ok(());
            }
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<C: Chars>(cs: &mut C) -> String {
        let mut out = String::new();
        loop {
            if cs.skip_blank().is_err() {
                break;
            }
            match cs.advance() {
                Some(c) => out.push(c),
                None => break,
            }
        }
        out
    }

    #[test]
    fn cursor_tracks_position() {
        let mut cur = CharCursor::new("ab\ncd");
        assert_eq!(cur.line_col(), LineCol::new(1, 1));
        cur.advance();
        cur.advance();
        cur.advance(); // newline
        assert_eq!(cur.line_col(), LineCol::new(2, 1));
        assert_eq!(cur.advance(), Some('c'));
        assert_eq!(cur.line_col(), LineCol::new(2, 2));
    }

    #[test]
    fn include_composes_sources() {
        let mut set = SourceSet::new();
        set.insert("main", "a #include \"lib\" b");
        set.insert("lib", "x y");
        let mut cur = IncludeCursor::new(&set, "main").unwrap();
        assert_eq!(drain(&mut cur), "axyb");
    }

    #[test]
    fn recursive_include_is_rejected() {
        let mut set = SourceSet::new();
        set.insert("main", "#include \"main\"");
        let mut cur = IncludeCursor::new(&set, "main").unwrap();
        let err = cur.skip_blank().unwrap_err();
        assert!(err.to_string().contains("recursive include"));
    }
}
