//! # jsonpl - A Statically Typed Scripting Language with JSON Syntax
//!
//! [![Crates.io](https://img.shields.io/crates/v/jsonpl.svg)](https://crates.io/crates/jsonpl)
//! [![Documentation](https://docs.rs/jsonpl/badge.svg)](https://docs.rs/jsonpl)
//! [![License: MIT](https://img.shields.io/badge/License-MIT-yellow.svg)](https://opensource.org/licenses/MIT)
//!
//! Programs are JSON documents: every statement is an object entry, every
//! block is a nested object. A permissive reader accepts the bare-word
//! spelling below, a tokenizer and Pratt parser handle the expressions
//! inside entries, a type checker verifies the whole document and lowers it
//! to an instruction tree, and a tree-walking evaluator runs that tree over
//! typed frames.
//!
//! ## Quick Start
//!
//! Add jsonpl to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! jsonpl = "1.0.0"
//! ```
//!
//! ### Basic Usage
//!
//! ```rust
//! use jsonpl::InterpreterBuilder;
//!
//! # fn main() -> jsonpl::Result<()> {
//! let program = r#"{
//!     var
//!     total: 0
//!     for: [ { var
//!     i: 1 }, i <= 10, i += 1 ]
//!     do: { total += i }
//! }"#;
//!
//! let interp = InterpreterBuilder::new().compile(program)?;
//! let frame = interp.execute()?;
//! assert_eq!(interp.explorer().get("total", &frame)?.stringify(), "55");
//! # Ok(())
//! # }
//! ```
//!
//! ### Host Bindings and Console Output
//!
//! The host can bind constant globals before compilation and capture
//! everything the program prints:
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use jsonpl::{HostValue, InterpreterBuilder};
//!
//! # fn main() -> jsonpl::Result<()> {
//! let interp = InterpreterBuilder::new()
//!     .bind("name", HostValue::Str("world".to_string()))
//!     .compile(r#"{
//!         std.console.log: ["hello, " + name]
//!     }"#)?;
//!
//! let lines = Rc::new(RefCell::new(Vec::new()));
//! let sink = lines.clone();
//! interp.set_output(move |s| sink.borrow_mut().push(s.to_string()));
//! interp.execute()?;
//! assert_eq!(lines.borrow().join(""), "hello, world");
//! # Ok(())
//! # }
//! ```
//!
//! ## Language Overview
//!
//! ### Types
//!
//! - **Primitives**: `int`, `long`, `float`, `double`, `bool` live directly
//!   in frame slots; `string`, arrays, classes, functions and collections
//!   are references.
//! - **Classes**: `class` defines one, `new Point:[1, 2]` or
//!   `new Point { x: 1, y: 2 }` constructs an instance.
//! - **Generics**: `template: { T }` classes and the `std` collection
//!   templates are instantiated with `let IntList: { std.List: [int] }`;
//!   each `let` produces a distinct nominal type.
//!
//! ### Control Flow
//!
//! - `if: cond` / `then:` / `else:` blocks, `while:` / `do:` and
//!   `for: [init, cond, incr]` / `do:` loops with `break` and `continue`.
//! - `if: err != null` after some statements turns them into a guarded
//!   region; the `then:` branch sees the caught error as `err`.
//! - `throw: "message"` raises, bare `throw` rethrows inside an error
//!   branch.
//!
//! ### Errors
//!
//! Uncaught script errors surface as [`Error::Runtime`] with a script-level
//! trace:
//!
//! ```rust
//! use jsonpl::InterpreterBuilder;
//!
//! let interp = InterpreterBuilder::new()
//!     .compile("{\nvar\nx: 0\nvar\ny: 1 / x\n}")
//!     .unwrap();
//! let err = interp.execute().unwrap_err();
//! assert!(err.to_string().contains("divide by zero"));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Source → Document Reader → Statement Parser → Type Checker → Instructions → Evaluator
//! ```
//!
//! ### Main Components
//!
//! - [`json`] - Positioned, permissive JSON reader shared by data and
//!   program documents
//! - [`lexer`] - Expression tokenizer
//! - [`parser`] - Statement and expression parsers producing the AST
//! - [`types`] - The type checker; checking an expression also lowers it
//! - [`runtime`] - Typed frames, the instruction tree and the evaluator
//! - [`Interpreter`] - Compile once, execute per fresh root frame
//! - [`MemoryExplorer`] - Reflective access to the variables of a frame
//!
//! Multi-file programs compose through `#include "name"` directives resolved
//! against a [`SourceSet`].
//!
//! ## License
//!
//! Licensed under the [MIT License](https://opensource.org/licenses/MIT).

#![allow(clippy::large_enum_variant)] // Instruction variants are built once, boxed where hot
#![allow(clippy::result_large_err)] // compile errors carry positions by value

/// Version of the jsonpl toolchain.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod interpreter;
pub mod json;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod source;
pub mod types;

pub use error::{Error, LineCol, Result, StackInfo};
pub use interpreter::{HostValue, Interpreter, InterpreterBuilder};
pub use json::{Json, JsonObject, ParserOptions};
pub use runtime::{Ctx, MemoryExplorer, RefValue};
pub use source::{CharCursor, Chars, IncludeCursor, SourceSet};
pub use types::builtins::{StdTypes, TypeProvider};
pub use types::checker::{Checker, CompiledProgram};
