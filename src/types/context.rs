//! Checking context: a scope arena with parent indices.
//!
//! Scopes form a tree held in one `Vec`; each scope points at its parent by
//! index. Global, function-body and class-body scopes own a frame (a fresh
//! allocator and a deeper frame depth); `if`/loop/error-region scopes share
//! the enclosing frame's allocator.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, LineCol, Result};
use crate::parser::ast::Modifiers;

use super::{ClassType, RuntimeMemoryTotal, StorageKind, TypeInstance};

/// A declared binding.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub typ: TypeInstance,
    pub kind: StorageKind,
    pub index: usize,
    /// Absolute frame depth of the declaring scope.
    pub mem_depth: usize,
    pub modifiers: Modifiers,
    /// Position in declaration order across the whole check; slot indices
    /// are per family and do not carry that order.
    pub seq: usize,
}

/// What a scope is for; drives `return`/`break` placement checks and
/// private-field access.
#[derive(Debug, Clone)]
pub enum ScopeKind {
    Global,
    Function { ret: TypeInstance },
    Class { class: Rc<ClassType> },
    Block,
    Loop,
}

#[derive(Debug)]
struct Scope {
    parent: Option<usize>,
    kind: ScopeKind,
    types: HashMap<String, TypeInstance>,
    vars: HashMap<String, Variable>,
    allocator: usize,
    mem_depth: usize,
}

/// The scope arena.
#[derive(Debug)]
pub struct TypeContext {
    scopes: Vec<Scope>,
    allocators: Vec<RuntimeMemoryTotal>,
    current: usize,
    tmp_counter: usize,
    var_counter: usize,
}

impl TypeContext {
    /// Creates the context with the global scope and primitive type names.
    pub fn new() -> Self {
        let mut ctx = TypeContext {
            scopes: vec![Scope {
                parent: None,
                kind: ScopeKind::Global,
                types: HashMap::new(),
                vars: HashMap::new(),
                allocator: 0,
                mem_depth: 0,
            }],
            allocators: vec![RuntimeMemoryTotal::default()],
            current: 0,
            tmp_counter: 0,
            var_counter: 0,
        };
        for (name, typ) in [
            ("int", TypeInstance::Int),
            ("long", TypeInstance::Long),
            ("float", TypeInstance::Float),
            ("double", TypeInstance::Double),
            ("bool", TypeInstance::Bool),
            ("string", TypeInstance::Str),
            ("void", TypeInstance::Void),
            ("error", TypeInstance::Error),
        ] {
            ctx.scopes[0].types.insert(name.to_string(), typ);
        }
        ctx
    }

    /// Index of the current scope.
    pub fn current_scope(&self) -> usize {
        self.current
    }

    /// Re-enters a previously created scope (template instantiation checks
    /// run in the template's defining scope).
    pub fn enter(&mut self, scope: usize) -> usize {
        let prev = self.current;
        self.current = scope;
        prev
    }

    /// Opens a frame-owning child scope.
    pub fn push_frame(&mut self, kind: ScopeKind) {
        let allocator = self.allocators.len();
        self.allocators.push(RuntimeMemoryTotal::default());
        let mem_depth = self.scopes[self.current].mem_depth + 1;
        self.scopes.push(Scope {
            parent: Some(self.current),
            kind,
            types: HashMap::new(),
            vars: HashMap::new(),
            allocator,
            mem_depth,
        });
        self.current = self.scopes.len() - 1;
    }

    /// Opens a child scope sharing the enclosing frame.
    pub fn push_block(&mut self, kind: ScopeKind) {
        let parent = &self.scopes[self.current];
        let (allocator, mem_depth) = (parent.allocator, parent.mem_depth);
        self.scopes.push(Scope {
            parent: Some(self.current),
            kind,
            types: HashMap::new(),
            vars: HashMap::new(),
            allocator,
            mem_depth,
        });
        self.current = self.scopes.len() - 1;
    }

    /// Leaves the current scope. The scope stays in the arena; variable
    /// slots of block scopes stay reserved in the shared frame.
    pub fn pop(&mut self) {
        if let Some(parent) = self.scopes[self.current].parent {
            self.current = parent;
        }
    }

    /// Frame depth of the current scope.
    pub fn mem_depth(&self) -> usize {
        self.scopes[self.current].mem_depth
    }

    /// Final slot totals of the allocator owned by `scope`.
    pub fn total_of(&self, scope: usize) -> RuntimeMemoryTotal {
        self.allocators[self.scopes[scope].allocator]
    }

    /// Declares a variable in the current scope, allocating a slot in the
    /// scope's frame.
    pub fn declare_var(
        &mut self,
        name: &str,
        typ: TypeInstance,
        modifiers: Modifiers,
        line_col: LineCol,
    ) -> Result<Variable> {
        if self.scopes[self.current].vars.contains_key(name) {
            return Err(Error::type_error(
                format!("variable '{}' is already defined", name),
                line_col,
            ));
        }
        let kind = typ.storage_kind();
        let allocator = self.scopes[self.current].allocator;
        let index = self.allocators[allocator].allocate(kind);
        let seq = self.var_counter;
        self.var_counter += 1;
        let var = Variable {
            name: name.to_string(),
            typ,
            kind,
            index,
            mem_depth: self.scopes[self.current].mem_depth,
            modifiers,
            seq,
        };
        self.scopes[self.current]
            .vars
            .insert(name.to_string(), var.clone());
        Ok(var)
    }

    /// Allocates a hidden slot in the current frame (json construction
    /// temporaries).
    pub fn declare_tmp(&mut self, typ: TypeInstance) -> Result<Variable> {
        self.tmp_counter += 1;
        let name = format!("$tmp${}", self.tmp_counter);
        self.declare_var(&name, typ, Modifiers::empty(), LineCol::EMPTY)
    }

    /// Resolves a variable, walking outward. Returns the variable and the
    /// frame distance from the current scope to its declaring frame.
    pub fn lookup_var(&self, name: &str) -> Option<(Variable, usize)> {
        let here = self.scopes[self.current].mem_depth;
        let mut scope = Some(self.current);
        while let Some(idx) = scope {
            if let Some(var) = self.scopes[idx].vars.get(name) {
                return Some((var.clone(), here - var.mem_depth));
            }
            scope = self.scopes[idx].parent;
        }
        None
    }

    /// Declares a type name in the current scope.
    pub fn declare_type(
        &mut self,
        name: &str,
        typ: TypeInstance,
        line_col: LineCol,
    ) -> Result<()> {
        if self.scopes[self.current].types.contains_key(name) {
            return Err(Error::type_error(
                format!("type '{}' is already defined", name),
                line_col,
            ));
        }
        self.scopes[self.current]
            .types
            .insert(name.to_string(), typ);
        Ok(())
    }

    /// Resolves a type name, walking outward.
    pub fn lookup_type(&self, name: &str) -> Option<TypeInstance> {
        let mut scope = Some(self.current);
        while let Some(idx) = scope {
            if let Some(typ) = self.scopes[idx].types.get(name) {
                return Some(typ.clone());
            }
            scope = self.scopes[idx].parent;
        }
        None
    }

    /// Whether the current scope sits inside a loop body, not crossing a
    /// function or class boundary.
    pub fn in_loop(&self) -> bool {
        let mut scope = Some(self.current);
        while let Some(idx) = scope {
            match self.scopes[idx].kind {
                ScopeKind::Loop => return true,
                ScopeKind::Function { .. } | ScopeKind::Class { .. } | ScopeKind::Global => {
                    return false
                }
                ScopeKind::Block => {}
            }
            scope = self.scopes[idx].parent;
        }
        false
    }

    /// Return type of the enclosing function, if any.
    pub fn function_ret(&self) -> Option<TypeInstance> {
        let mut scope = Some(self.current);
        while let Some(idx) = scope {
            match &self.scopes[idx].kind {
                ScopeKind::Function { ret } => return Some(ret.clone()),
                ScopeKind::Global => return None,
                _ => {}
            }
            scope = self.scopes[idx].parent;
        }
        None
    }

    /// The innermost enclosing class, if any; private fields are visible
    /// only inside it.
    pub fn enclosing_class(&self) -> Option<Rc<ClassType>> {
        let mut scope = Some(self.current);
        while let Some(idx) = scope {
            if let ScopeKind::Class { class } = &self.scopes[idx].kind {
                return Some(class.clone());
            }
            scope = self.scopes[idx].parent;
        }
        None
    }

    /// All variables declared directly in `scope`, in declaration order.
    pub fn vars_of(&self, scope: usize) -> Vec<Variable> {
        let mut vars: Vec<Variable> = self.scopes[scope].vars.values().cloned().collect();
        vars.sort_by_key(|v| v.seq);
        vars
    }
}

impl Default for TypeContext {
    fn default() -> Self {
        TypeContext::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_depth_and_lookup() {
        let mut ctx = TypeContext::new();
        let v0 = ctx
            .declare_var("a", TypeInstance::Int, Modifiers::empty(), LineCol::EMPTY)
            .unwrap();
        assert_eq!(v0.mem_depth, 0);
        ctx.push_frame(ScopeKind::Function {
            ret: TypeInstance::Void,
        });
        let (found, depth) = ctx.lookup_var("a").unwrap();
        assert_eq!(found.index, 0);
        assert_eq!(depth, 1);
        ctx.push_block(ScopeKind::Block);
        let v1 = ctx
            .declare_var("b", TypeInstance::Int, Modifiers::empty(), LineCol::EMPTY)
            .unwrap();
        // block shares the function frame
        assert_eq!(v1.mem_depth, 1);
        let (_, depth) = ctx.lookup_var("b").unwrap();
        assert_eq!(depth, 0);
    }

    #[test]
    fn shadowing_in_nested_scope() {
        let mut ctx = TypeContext::new();
        ctx.declare_var("x", TypeInstance::Int, Modifiers::empty(), LineCol::EMPTY)
            .unwrap();
        assert!(ctx
            .declare_var("x", TypeInstance::Int, Modifiers::empty(), LineCol::EMPTY)
            .is_err());
        ctx.push_block(ScopeKind::Block);
        assert!(ctx
            .declare_var("x", TypeInstance::Bool, Modifiers::empty(), LineCol::EMPTY)
            .is_ok());
    }

    #[test]
    fn vars_list_in_declaration_order() {
        // families interleave, so slot indices alone would reorder them
        let mut ctx = TypeContext::new();
        for (name, typ) in [
            ("a", TypeInstance::Int),
            ("s", TypeInstance::Str),
            ("flag", TypeInstance::Bool),
            ("b", TypeInstance::Int),
        ] {
            ctx.declare_var(name, typ, Modifiers::empty(), LineCol::EMPTY)
                .unwrap();
        }
        let names: Vec<String> = ctx.vars_of(0).into_iter().map(|v| v.name).collect();
        assert_eq!(names, ["a", "s", "flag", "b"]);
    }
}
