//! Rule-race tokenizer.
//!
//! All candidate rules are fed the input character by character; rules that
//! can no longer extend drop out. When no rule survives the next character,
//! the traveled text is closed as a token: surviving rules whose
//! accumulation is complete are filtered, and the one with the highest
//! declared precedence wins. Keywords outrank the identifier rule that way.
//! An equal-precedence tie over the same text is a hard error, as is a split
//! point falling between two identifier-class characters.

use std::collections::VecDeque;

use crate::error::{Error, LineCol, Result};
use crate::json::{self, JsonObject, ParserOptions};
use crate::source::{CharCursor, Chars};

use super::token::{Token, TokenKind, TokenValue};

trait TokenRule {
    fn name(&self) -> &'static str;
    fn reset(&mut self);
    /// Tries to extend the accumulation with `c`. Returns false, leaving the
    /// rule's state untouched, when the character cannot extend it.
    fn feed(&mut self, c: char) -> bool;
    /// Whether the current accumulation is a complete token.
    fn check(&self) -> bool;
    fn precedence(&self) -> i32;
    fn build(&self, raw: &str, line_col: LineCol) -> Result<Token>;
}

struct VarNameRule {
    len: usize,
}

impl TokenRule for VarNameRule {
    fn name(&self) -> &'static str {
        "variable name"
    }

    fn reset(&mut self) {
        self.len = 0;
    }

    fn feed(&mut self, c: char) -> bool {
        let ok = if self.len == 0 {
            c.is_ascii_alphabetic() || c == '_' || c == '$'
        } else {
            c.is_ascii_alphanumeric() || c == '_' || c == '$'
        };
        if ok {
            self.len += 1;
        }
        ok
    }

    fn check(&self) -> bool {
        self.len > 0
    }

    fn precedence(&self) -> i32 {
        0
    }

    fn build(&self, raw: &str, line_col: LineCol) -> Result<Token> {
        Ok(Token::new(TokenKind::VarName, raw, line_col))
    }
}

struct IntRule {
    len: usize,
}

impl TokenRule for IntRule {
    fn name(&self) -> &'static str {
        "integer literal"
    }

    fn reset(&mut self) {
        self.len = 0;
    }

    fn feed(&mut self, c: char) -> bool {
        if c.is_ascii_digit() {
            self.len += 1;
            true
        } else {
            false
        }
    }

    fn check(&self) -> bool {
        self.len > 0
    }

    fn precedence(&self) -> i32 {
        0
    }

    fn build(&self, raw: &str, line_col: LineCol) -> Result<Token> {
        let n: i64 = raw
            .parse()
            .map_err(|_| Error::parse(format!("integer literal out of range: {}", raw), line_col))?;
        Ok(match i32::try_from(n) {
            Ok(i) => Token::with_value(TokenKind::Int, raw, line_col, TokenValue::Int(i)),
            Err(_) => Token::with_value(TokenKind::Long, raw, line_col, TokenValue::Long(n)),
        })
    }
}

struct FloatRule {
    int_digits: usize,
    seen_dot: bool,
    frac_digits: usize,
}

impl TokenRule for FloatRule {
    fn name(&self) -> &'static str {
        "floating literal"
    }

    fn reset(&mut self) {
        self.int_digits = 0;
        self.seen_dot = false;
        self.frac_digits = 0;
    }

    fn feed(&mut self, c: char) -> bool {
        if c.is_ascii_digit() {
            if self.seen_dot {
                self.frac_digits += 1;
            } else {
                self.int_digits += 1;
            }
            true
        } else if c == '.' && !self.seen_dot && self.int_digits > 0 {
            self.seen_dot = true;
            true
        } else {
            false
        }
    }

    fn check(&self) -> bool {
        self.seen_dot && self.frac_digits > 0
    }

    fn precedence(&self) -> i32 {
        0
    }

    fn build(&self, raw: &str, line_col: LineCol) -> Result<Token> {
        let d: f64 = raw
            .parse()
            .map_err(|_| Error::parse(format!("illegal floating literal: {}", raw), line_col))?;
        Ok(Token::with_value(
            TokenKind::Double,
            raw,
            line_col,
            TokenValue::Double(d),
        ))
    }
}

struct FullRule {
    text: &'static str,
    kind: TokenKind,
    prec: i32,
    matched: usize,
}

impl FullRule {
    fn new(text: &'static str, kind: TokenKind, prec: i32) -> Box<dyn TokenRule> {
        Box::new(FullRule {
            text,
            kind,
            prec,
            matched: 0,
        })
    }
}

impl TokenRule for FullRule {
    fn name(&self) -> &'static str {
        self.text
    }

    fn reset(&mut self) {
        self.matched = 0;
    }

    fn feed(&mut self, c: char) -> bool {
        if self.text.as_bytes().get(self.matched) == Some(&(c as u8)) && c.is_ascii() {
            self.matched += 1;
            true
        } else {
            false
        }
    }

    fn check(&self) -> bool {
        self.matched == self.text.len()
    }

    fn precedence(&self) -> i32 {
        self.prec
    }

    fn build(&self, raw: &str, line_col: LineCol) -> Result<Token> {
        let value = match self.kind {
            TokenKind::Bool => Some(TokenValue::Bool(self.text == "true")),
            _ => None,
        };
        Ok(Token {
            kind: self.kind,
            raw: raw.to_string(),
            line_col,
            value,
        })
    }
}

fn all_rules() -> Vec<Box<dyn TokenRule>> {
    use TokenKind::*;
    vec![
        Box::new(VarNameRule { len: 0 }),
        Box::new(IntRule { len: 0 }),
        Box::new(FloatRule {
            int_digits: 0,
            seen_dot: false,
            frac_digits: 0,
        }),
        FullRule::new("true", Bool, 1),
        FullRule::new("false", Bool, 1),
        FullRule::new("null", Null, 1),
        FullRule::new("new", New, 1),
        FullRule::new("(", LeftPar, 0),
        FullRule::new(")", RightPar, 0),
        FullRule::new("[", LeftBracket, 0),
        FullRule::new("]", RightBracket, 0),
        FullRule::new("{", LeftBrace, 0),
        FullRule::new("+", Plus, 0),
        FullRule::new("-", Minus, 0),
        FullRule::new("*", Multiply, 0),
        FullRule::new("/", Divide, 0),
        FullRule::new("%", Mod, 0),
        FullRule::new("+=", PlusAssign, 0),
        FullRule::new("-=", MinusAssign, 0),
        FullRule::new("*=", MultiplyAssign, 0),
        FullRule::new("/=", DivideAssign, 0),
        FullRule::new("%=", ModAssign, 0),
        FullRule::new(">", Gt, 0),
        FullRule::new(">=", Ge, 0),
        FullRule::new("<", Lt, 0),
        FullRule::new("<=", Le, 0),
        FullRule::new("==", CmpEq, 0),
        FullRule::new("!=", CmpNe, 0),
        FullRule::new("!", LogicNot, 0),
        FullRule::new("&&", LogicAnd, 0),
        FullRule::new("||", LogicOr, 0),
        FullRule::new(".", Dot, 0),
        FullRule::new(":", Colon, 0),
        FullRule::new(",", Comma, 0),
    ]
}

/// Whether a token boundary may sit next to `c`. Identifier-class characters
/// refuse to be split from their neighbors.
fn can_split(c: char) -> bool {
    c.is_ascii() && !(c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Tokenizer over one expression fragment.
pub struct Tokenizer {
    cursor: CharCursor,
    rules: Vec<Box<dyn TokenRule>>,
    buffer: VecDeque<Token>,
}

impl Tokenizer {
    /// Creates a tokenizer whose first character sits at `start` in the
    /// enclosing document.
    pub fn new(text: &str, start: LineCol) -> Self {
        Tokenizer {
            cursor: CharCursor::with_start(text, start),
            rules: all_rules(),
            buffer: VecDeque::new(),
        }
    }

    /// Peeks the `n`-th token ahead (1-based).
    pub fn peek(&mut self, n: usize) -> Result<Option<&Token>> {
        while self.buffer.len() < n {
            match self.read_token()? {
                Some(t) => self.buffer.push_back(t),
                None => return Ok(None),
            }
        }
        Ok(self.buffer.get(n - 1))
    }

    /// Consumes the next token.
    pub fn next(&mut self) -> Result<Option<Token>> {
        if let Some(t) = self.buffer.pop_front() {
            return Ok(Some(t));
        }
        self.read_token()
    }

    /// Position of the next token (or of the cursor at eof).
    pub fn current_line_col(&mut self) -> LineCol {
        match self.buffer.front() {
            Some(t) => t.line_col,
            None => {
                let _ = self.cursor.skip_blank();
                self.cursor.line_col()
            }
        }
    }

    /// Hands the underlying characters to the document parser for a
    /// `new T: { ... }` construction. The next token must be the opening
    /// brace and nothing may have been tokenized past it.
    pub fn take_json_object(&mut self) -> Result<JsonObject> {
        let brace = match self.next()? {
            Some(t) if t.kind == TokenKind::LeftBrace => t,
            Some(t) => {
                return Err(Error::parse(
                    format!("expecting '{{' but got {}", t.raw),
                    t.line_col,
                ))
            }
            None => {
                return Err(Error::parse(
                    "expecting '{' but got eof",
                    self.cursor.line_col(),
                ))
            }
        };
        if !self.buffer.is_empty() {
            return Err(Error::parse(
                "cannot parse json construction here",
                brace.line_col,
            ));
        }
        json::parse_object_body(&mut self.cursor, &ParserOptions::program(), brace.line_col)
    }

    fn read_token(&mut self) -> Result<Option<Token>> {
        self.cursor.skip_blank()?;
        let first = match self.cursor.peek(1) {
            Some(c) => c,
            None => return Ok(None),
        };
        let line_col = self.cursor.line_col();
        if first == '"' || first == '\'' {
            let (content, _) = json::parse_string_literal(&mut self.cursor)?;
            return Ok(Some(Token::with_value(
                TokenKind::Str,
                content.clone(),
                line_col,
                TokenValue::Str(content),
            )));
        }
        for rule in &mut self.rules {
            rule.reset();
        }
        let mut alive: Vec<usize> = (0..self.rules.len()).collect();
        let mut traveled = String::new();
        loop {
            let c = match self.cursor.peek(1) {
                Some(c) => c,
                None => return self.finish(&traveled, &alive, line_col).map(Some),
            };
            let survivors: Vec<usize> = alive
                .iter()
                .copied()
                .filter(|&i| self.rules[i].feed(c))
                .collect();
            if survivors.is_empty() {
                if traveled.is_empty() {
                    return Err(Error::parse(
                        format!("all rules failed when reading the first character: '{}'", c),
                        line_col,
                    ));
                }
                let prev = traveled.chars().last().unwrap_or(' ');
                if !can_split(c) && !can_split(prev) {
                    return Err(Error::parse(
                        format!("cannot split token between '{}' and '{}'", prev, c),
                        self.cursor.line_col(),
                    ));
                }
                return self.finish(&traveled, &alive, line_col).map(Some);
            }
            self.cursor.advance();
            traveled.push(c);
            alive = survivors;
        }
    }

    fn finish(&self, traveled: &str, alive: &[usize], line_col: LineCol) -> Result<Token> {
        let mut best: Option<usize> = None;
        let mut tie = false;
        for &i in alive {
            if !self.rules[i].check() {
                continue;
            }
            match best {
                None => best = Some(i),
                Some(b) => {
                    let bp = self.rules[b].precedence();
                    let ip = self.rules[i].precedence();
                    if ip > bp {
                        best = Some(i);
                        tie = false;
                    } else if ip == bp {
                        tie = true;
                    }
                }
            }
        }
        let best = best.ok_or_else(|| {
            Error::parse(format!("cannot parse the token: {}", traveled), line_col)
        })?;
        if tie {
            let winners: Vec<&str> = alive
                .iter()
                .copied()
                .filter(|&i| {
                    self.rules[i].check()
                        && self.rules[i].precedence() == self.rules[best].precedence()
                })
                .map(|i| self.rules[i].name())
                .collect();
            return Err(Error::parse(
                format!(
                    "rules conflict on token '{}': {}",
                    traveled,
                    winners.join(", ")
                ),
                line_col,
            ));
        }
        self.rules[best].build(traveled, line_col)
    }
}
