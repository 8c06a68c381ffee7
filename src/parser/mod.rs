//! Statement and expression parsing.
//!
//! Statements are read from the entry list of the program document
//! ([`stmt::StatementParser`]); expression text inside entry keys and values
//! goes through the Pratt parser in [`expr`].

pub mod ast;
pub mod expr;
pub mod stmt;

pub use expr::ExprParser;
pub use stmt::StatementParser;
