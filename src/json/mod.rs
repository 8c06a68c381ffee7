//! Positioned, permissively parsed JSON documents.
//!
//! Program sources are JSON documents with relaxations enabled (see
//! [`ParserOptions::program`]); explorer snapshots use strict mode
//! ([`ParserOptions::data`]). Every node carries the [`crate::error::LineCol`]
//! where its content begins, which is what downstream expression parsing
//! needs as its offset.

pub mod parser;
pub mod value;

pub use parser::{parse, parse_object, parse_object_body, parse_string_literal, ParserOptions};
pub use value::{Entry, Json, JsonObject};
