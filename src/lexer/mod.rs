//! Expression tokenizer.
//!
//! Expression text reaches the tokenizer as raw string values extracted from
//! the program document, each carrying the document position where the text
//! begins, so token positions line up with the original source.

pub mod token;
pub mod tokenizer;

pub use token::{Token, TokenKind, TokenValue};
pub use tokenizer::Tokenizer;
