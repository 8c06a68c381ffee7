//! The public entry point: compile a document once, execute it as often as
//! needed.
//!
//! [`InterpreterBuilder`] collects type providers and host bindings, then
//! compiles a source text (or a pre-parsed document) into an
//! [`Interpreter`]. Each [`Interpreter::execute`] run gets a fresh root frame
//! seeded with the provider globals and host bindings, so runs do not
//! observe each other's state.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::{Error, LineCol, Result};
use crate::json::{parse_object, JsonObject, ParserOptions};
use crate::parser::ast::Modifiers;
use crate::parser::stmt::StatementParser;
use crate::runtime::explorer::MemoryExplorer;
use crate::runtime::instruction::run_seq;
use crate::runtime::memory::{ActionContext, Ctx, ErrorValue, Execution, RefValue};
use crate::source::{CharCursor, IncludeCursor, SourceSet};
use crate::types::builtins::{StdTypes, TypeProvider};
use crate::types::checker::{Checker, CompiledProgram};
use crate::types::context::Variable;
use crate::types::TypeInstance;

/// A host-supplied value bound to a global name before compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
}

impl HostValue {
    fn type_instance(&self) -> TypeInstance {
        match self {
            HostValue::Int(_) => TypeInstance::Int,
            HostValue::Long(_) => TypeInstance::Long,
            HostValue::Float(_) => TypeInstance::Float,
            HostValue::Double(_) => TypeInstance::Double,
            HostValue::Bool(_) => TypeInstance::Bool,
            HostValue::Str(_) => TypeInstance::Str,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            HostValue::Int(_) => "int",
            HostValue::Long(_) => "long",
            HostValue::Float(_) => "float",
            HostValue::Double(_) => "double",
            HostValue::Bool(_) => "bool",
            HostValue::Str(_) => "string",
        }
    }
}

type OutputSink = Rc<RefCell<Box<dyn FnMut(&str)>>>;

fn default_output() -> OutputSink {
    Rc::new(RefCell::new(Box::new(|line: &str| {
        tracing::info!(target: "console", "{}", line);
    }) as Box<dyn FnMut(&str)>))
}

/// Compilation front door. Providers add type namespaces, bindings add
/// constant globals; `compile*` runs the full pipeline.
#[derive(Default)]
pub struct InterpreterBuilder {
    providers: Vec<Box<dyn TypeProvider>>,
    bindings: Vec<(String, HostValue)>,
}

impl InterpreterBuilder {
    pub fn new() -> Self {
        InterpreterBuilder::default()
    }

    /// Registers an extra type provider; [`StdTypes`] is always installed.
    pub fn add_provider(mut self, provider: Box<dyn TypeProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Binds a constant global the program can read. The value can be
    /// replaced between runs with [`Interpreter::put`].
    pub fn bind(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.bindings.push((name.into(), value));
        self
    }

    /// Compiles a program from source text.
    pub fn compile(self, source: &str) -> Result<Interpreter> {
        let mut cs = CharCursor::new(source);
        let obj = parse_object(&mut cs, &ParserOptions::program())?;
        self.compile_document(&obj)
    }

    /// Compiles the source named `main`, resolving `#include` directives
    /// against `sources`.
    pub fn compile_sources(self, main: &str, sources: &SourceSet) -> Result<Interpreter> {
        let mut cs = IncludeCursor::new(sources, main)?;
        let obj = parse_object(&mut cs, &ParserOptions::program())?;
        self.compile_document(&obj)
    }

    /// Compiles an already-parsed document.
    pub fn compile_document(self, document: &JsonObject) -> Result<Interpreter> {
        debug!(entries = document.entries.len(), "parsing statements");
        let stmts = StatementParser::parse_document(document)?;
        let mut checker = Checker::new();
        let mut ref_seeds = StdTypes.install(checker.context_mut())?;
        for provider in &self.providers {
            ref_seeds.extend(provider.install(checker.context_mut())?);
        }
        let mut binding_seeds = Vec::new();
        for (name, value) in self.bindings {
            let var = checker.context_mut().declare_var(
                &name,
                value.type_instance(),
                Modifiers::empty().with(Modifiers::CONST),
                LineCol::EMPTY,
            )?;
            binding_seeds.push((var, value));
        }
        let program = checker.check_program(&stmts)?;
        Ok(Interpreter {
            program,
            ref_seeds,
            binding_seeds,
            output: default_output(),
        })
    }
}

/// A compiled program plus the seeds for its root frame.
pub struct Interpreter {
    program: CompiledProgram,
    ref_seeds: Vec<(Variable, RefValue)>,
    binding_seeds: Vec<(Variable, HostValue)>,
    output: OutputSink,
}

// the output sink is an opaque closure, so the derive is unavailable
impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("program", &self.program)
            .field("bindings", &self.binding_seeds)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Replaces the value of a host binding for subsequent runs. The new
    /// value must have the type the binding was compiled with.
    pub fn put(&mut self, name: &str, value: HostValue) -> Result<()> {
        let seed = self
            .binding_seeds
            .iter_mut()
            .find(|(var, _)| var.name == name)
            .ok_or_else(|| Error::runtime(format!("no binding named '{}'", name)))?;
        if std::mem::discriminant(&seed.1) != std::mem::discriminant(&value) {
            return Err(Error::runtime(format!(
                "binding '{}' holds {}, cannot put {}",
                name,
                seed.1.kind_name(),
                value.kind_name()
            )));
        }
        seed.1 = value;
        Ok(())
    }

    /// Redirects console output; the default sink logs each line.
    pub fn set_output(&self, output: impl FnMut(&str) + 'static) {
        *self.output.borrow_mut() = Box::new(output);
    }

    /// Layout of the global frame, for inspecting the result of a run.
    pub fn explorer(&self) -> &Rc<MemoryExplorer> {
        &self.program.explorer
    }

    /// Runs the program on a fresh root frame and returns that frame.
    pub fn execute(&self) -> Result<Ctx> {
        let root = ActionContext::new_ctx(self.program.total, None);
        {
            let mut frame = root.borrow_mut();
            for (var, value) in &self.ref_seeds {
                frame.refs[var.index] = value.clone();
            }
            for (var, value) in &self.binding_seeds {
                match value {
                    HostValue::Int(v) => frame.ints[var.index] = *v,
                    HostValue::Long(v) => frame.longs[var.index] = *v,
                    HostValue::Float(v) => frame.floats[var.index] = *v,
                    HostValue::Double(v) => frame.doubles[var.index] = *v,
                    HostValue::Bool(v) => frame.bools[var.index] = *v,
                    HostValue::Str(s) => {
                        frame.refs[var.index] = RefValue::Str(Rc::from(s.as_str()))
                    }
                }
            }
        }
        let sink = self.output.clone();
        let mut exec = Execution::new(Box::new(move |line| (*sink.borrow_mut())(line)));
        run_seq(&self.program.instructions, &root, &mut exec).map_err(uncaught)?;
        Ok(root)
    }
}

fn uncaught(err: Rc<ErrorValue>) -> Error {
    Error::Runtime {
        message: err.message.clone(),
        stack: err.stack.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::Json;

    fn captured() -> (Rc<RefCell<Vec<String>>>, impl FnMut(&str) + 'static) {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        (lines, move |line: &str| {
            sink.borrow_mut().push(line.to_string())
        })
    }

    #[test]
    fn compile_and_execute() {
        let interp = InterpreterBuilder::new()
            .compile("{\nvar\nx: 1 + 2\n}")
            .unwrap();
        let frame = interp.execute().unwrap();
        let got = interp.explorer().get("x", &frame).unwrap();
        assert!(got.data_eq(&Json::Int(3, LineCol::EMPTY)));
    }

    #[test]
    fn console_output_is_redirectable() {
        let interp = InterpreterBuilder::new()
            .compile("{\nstd.console.log: [\"hello\"]\n}")
            .unwrap();
        let (lines, sink) = captured();
        interp.set_output(sink);
        interp.execute().unwrap();
        assert_eq!(lines.borrow().as_slice(), ["hello"]);
    }

    #[test]
    fn host_bindings_are_readable_and_replaceable() {
        let mut interp = InterpreterBuilder::new()
            .bind("limit", HostValue::Int(5))
            .compile("{\nvar\nx: limit * 2\n}")
            .unwrap();
        let frame = interp.execute().unwrap();
        assert!(interp
            .explorer()
            .get("x", &frame)
            .unwrap()
            .data_eq(&Json::Int(10, LineCol::EMPTY)));
        interp.put("limit", HostValue::Int(7)).unwrap();
        let frame = interp.execute().unwrap();
        assert!(interp
            .explorer()
            .get("x", &frame)
            .unwrap()
            .data_eq(&Json::Int(14, LineCol::EMPTY)));
        assert!(interp.put("limit", HostValue::Str("no".into())).is_err());
        assert!(interp.put("missing", HostValue::Int(0)).is_err());
    }

    #[test]
    fn bindings_are_const_to_the_program() {
        let err = InterpreterBuilder::new()
            .bind("limit", HostValue::Int(5))
            .compile("{\nlimit: 6\n}")
            .unwrap_err();
        assert!(err.to_string().contains("const"));
    }

    #[test]
    fn uncaught_errors_carry_a_trace() {
        let interp = InterpreterBuilder::new()
            .compile(
                "{\nfunction\nboom: {}\nvoid: { throw: \"bad state\" }\nboom: []\n}",
            )
            .unwrap();
        let err = interp.execute().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("bad state"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn includes_compose_sources() {
        let mut sources = SourceSet::new();
        sources.insert("lib", "function\ndouble: { n: int }\nint: { return: n * 2 }");
        sources.insert("main", "{\n#include \"lib\"\nvar\nx: double:[21]\n}");
        let interp = InterpreterBuilder::new()
            .compile_sources("main", &sources)
            .unwrap();
        let frame = interp.execute().unwrap();
        assert!(interp
            .explorer()
            .get("x", &frame)
            .unwrap()
            .data_eq(&Json::Int(42, LineCol::EMPTY)));
    }
}
