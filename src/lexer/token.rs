//! Token types.

use serde::{Deserialize, Serialize};

use crate::error::LineCol;

/// Lexical token kinds of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Identifier.
    VarName,
    /// Integer literal fitting in 32 bits.
    Int,
    /// Integer literal requiring 64 bits.
    Long,
    /// Floating literal.
    Double,
    /// `true` or `false`.
    Bool,
    /// Quoted string literal.
    Str,
    /// `null`.
    Null,
    /// `new`.
    New,
    LeftPar,
    RightPar,
    LeftBracket,
    RightBracket,
    LeftBrace,
    Plus,
    Minus,
    Multiply,
    Divide,
    Mod,
    PlusAssign,
    MinusAssign,
    MultiplyAssign,
    DivideAssign,
    ModAssign,
    Gt,
    Ge,
    Lt,
    Le,
    CmpEq,
    CmpNe,
    LogicNot,
    LogicAnd,
    LogicOr,
    Dot,
    Colon,
    Comma,
}

impl TokenKind {
    /// Whether the token may legally follow a complete expression as its
    /// terminator (argument separator or closing delimiter).
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            TokenKind::Comma | TokenKind::RightPar | TokenKind::RightBracket
        )
    }
}

/// The decoded payload of a literal token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenValue {
    Int(i32),
    Long(i64),
    Double(f64),
    Bool(bool),
    Str(String),
}

/// One token: kind, the raw text it was read from, its source position, and
/// the decoded literal payload when there is one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub raw: String,
    pub line_col: LineCol,
    pub value: Option<TokenValue>,
}

impl Token {
    pub fn new(kind: TokenKind, raw: impl Into<String>, line_col: LineCol) -> Self {
        Token {
            kind,
            raw: raw.into(),
            line_col,
            value: None,
        }
    }

    pub fn with_value(
        kind: TokenKind,
        raw: impl Into<String>,
        line_col: LineCol,
        value: TokenValue,
    ) -> Self {
        Token {
            kind,
            raw: raw.into(),
            line_col,
            value: Some(value),
        }
    }
}
