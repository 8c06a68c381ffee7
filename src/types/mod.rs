//! Type instances and slot bookkeeping.
//!
//! Primitive types are unit variants; composite types share their defining
//! allocation through `Rc`, and equality for class, template and collection
//! instantiations is `Rc` identity: every `let` instantiation is its own
//! nominal type.

pub mod builtins;
pub mod checker;
pub mod context;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::parser::ast::{Expr, Modifiers};
use crate::runtime::explorer::MemoryExplorer;
use crate::runtime::instruction::Instruction;

/// Which typed slot family a value of some type occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Int,
    Long,
    Float,
    Double,
    Bool,
    Ref,
}

/// Slot counts of one frame, per storage family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeMemoryTotal {
    pub ints: usize,
    pub longs: usize,
    pub floats: usize,
    pub doubles: usize,
    pub bools: usize,
    pub refs: usize,
}

impl RuntimeMemoryTotal {
    /// Reserves one slot of `kind`, returning its index.
    pub fn allocate(&mut self, kind: StorageKind) -> usize {
        let counter = match kind {
            StorageKind::Int => &mut self.ints,
            StorageKind::Long => &mut self.longs,
            StorageKind::Float => &mut self.floats,
            StorageKind::Double => &mut self.doubles,
            StorageKind::Bool => &mut self.bools,
            StorageKind::Ref => &mut self.refs,
        };
        let index = *counter;
        *counter += 1;
        index
    }
}

/// A resolved variable location: how many frames outward, and the slot index
/// within that frame (the storage family comes from the type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemPos {
    pub depth: usize,
    pub index: usize,
}

/// One checked parameter of a function or constructor.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub typ: TypeInstance,
    pub kind: StorageKind,
    pub index: usize,
    /// Default value, filling omitted trailing arguments and omitted json
    /// construction keys.
    pub default: Option<Expr>,
}

/// Signature of an invocable value.
///
/// `total` is a `Cell` because a function's name is declared before its body
/// is checked (recursion), and the frame size is only known after.
#[derive(Debug)]
pub struct FunctionDescriptor {
    pub params: Vec<ParamInfo>,
    pub ret: TypeInstance,
    /// Frame size of one invocation.
    pub total: std::cell::Cell<RuntimeMemoryTotal>,
}

/// A field of a class instance: a slot in the instance frame.
#[derive(Debug, Clone)]
pub struct ClassField {
    pub name: String,
    pub typ: TypeInstance,
    pub kind: StorageKind,
    pub index: usize,
    pub modifiers: Modifiers,
}

/// A checked class. Registered before its body is checked so fields and
/// methods may refer to the class recursively.
#[derive(Debug)]
pub struct ClassType {
    pub name: String,
    pub params: RefCell<Vec<ParamInfo>>,
    pub fields: RefCell<Vec<ClassField>>,
    pub total: RefCell<RuntimeMemoryTotal>,
    pub body: RefCell<Rc<Vec<Instruction>>>,
    /// Frame depth of the scope the class is defined in; construction walks
    /// `use_depth - def_depth` frames outward to find the parent frame.
    pub def_depth: usize,
    pub explorer: RefCell<Option<Rc<MemoryExplorer>>>,
}

impl ClassType {
    pub fn field(&self, name: &str) -> Option<ClassField> {
        self.fields.borrow().iter().find(|f| f.name == name).cloned()
    }
}

/// An unchecked template class: the AST is kept and re-checked per
/// instantiation with the type parameters bound.
#[derive(Debug)]
pub struct TemplateType {
    pub name: String,
    pub type_params: Vec<String>,
    pub params: Vec<crate::parser::ast::Param>,
    pub body: Vec<crate::parser::ast::Statement>,
    /// Scope the template was defined in; instantiations are checked there.
    pub def_scope: usize,
    pub def_depth: usize,
}

/// A collection instantiation (list, set or iterator element view).
#[derive(Debug)]
pub struct CollType {
    pub element: TypeInstance,
    /// Cached iterator type, so `iterator` returns one nominal type.
    pub iterator: RefCell<Option<TypeInstance>>,
}

impl CollType {
    pub fn new(element: TypeInstance) -> Self {
        CollType {
            element,
            iterator: RefCell::new(None),
        }
    }
}

#[derive(Debug)]
pub struct MapType {
    pub key: TypeInstance,
    pub value: TypeInstance,
    /// Cached `keys` set type and `values` list type.
    pub key_set: RefCell<Option<TypeInstance>>,
    pub value_list: RefCell<Option<TypeInstance>>,
}

impl MapType {
    pub fn new(key: TypeInstance, value: TypeInstance) -> Self {
        MapType {
            key,
            value,
            key_set: RefCell::new(None),
            value_list: RefCell::new(None),
        }
    }
}

#[derive(Debug)]
pub struct ArrayType {
    pub element: TypeInstance,
}

/// The builtin generic types of the `std` namespace, before instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTemplateKind {
    List,
    Set,
    Map,
    Iterator,
}

/// A fully resolved type.
#[derive(Debug, Clone)]
pub enum TypeInstance {
    Int,
    Long,
    Float,
    Double,
    Bool,
    Str,
    Void,
    /// Type of the bare `null` literal; assignable to any reference type.
    Null,
    Error,
    Array(Rc<ArrayType>),
    Class(Rc<ClassType>),
    Template(Rc<TemplateType>),
    Func(Rc<FunctionDescriptor>),
    List(Rc<CollType>),
    Set(Rc<CollType>),
    Iterator(Rc<CollType>),
    Map(Rc<MapType>),
    BuiltinTemplate(BuiltinTemplateKind),
    /// The `std` namespace object.
    Std,
    /// `std.console`.
    Console,
}

impl TypeInstance {
    pub fn storage_kind(&self) -> StorageKind {
        match self {
            TypeInstance::Int => StorageKind::Int,
            TypeInstance::Long => StorageKind::Long,
            TypeInstance::Float => StorageKind::Float,
            TypeInstance::Double => StorageKind::Double,
            TypeInstance::Bool => StorageKind::Bool,
            _ => StorageKind::Ref,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeInstance::Int | TypeInstance::Long | TypeInstance::Float | TypeInstance::Double
        )
    }

    /// Whether values of this type live in reference slots and may be null.
    pub fn is_ref(&self) -> bool {
        !matches!(
            self,
            TypeInstance::Int
                | TypeInstance::Long
                | TypeInstance::Float
                | TypeInstance::Double
                | TypeInstance::Bool
                | TypeInstance::Void
        )
    }

    /// Whether `value` of type `self` can be assigned into a target of type
    /// `target`: same type, or null into any reference type.
    pub fn assignable_to(&self, target: &TypeInstance) -> bool {
        if self == target {
            return true;
        }
        matches!(self, TypeInstance::Null) && target.is_ref()
    }
}

impl PartialEq for TypeInstance {
    fn eq(&self, other: &Self) -> bool {
        use TypeInstance::*;
        match (self, other) {
            (Int, Int)
            | (Long, Long)
            | (Float, Float)
            | (Double, Double)
            | (Bool, Bool)
            | (Str, Str)
            | (Void, Void)
            | (Null, Null)
            | (Error, Error)
            | (Std, Std)
            | (Console, Console) => true,
            (Array(a), Array(b)) => a.element == b.element,
            (Class(a), Class(b)) => Rc::ptr_eq(a, b),
            (Template(a), Template(b)) => Rc::ptr_eq(a, b),
            (List(a), List(b)) | (Set(a), Set(b)) | (Iterator(a), Iterator(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Map(a), Map(b)) => Rc::ptr_eq(a, b),
            (Func(a), Func(b)) => {
                a.ret == b.ret
                    && a.params.len() == b.params.len()
                    && a.params
                        .iter()
                        .zip(&b.params)
                        .all(|(x, y)| x.typ == y.typ)
            }
            (BuiltinTemplate(a), BuiltinTemplate(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for TypeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeInstance::Int => f.write_str("int"),
            TypeInstance::Long => f.write_str("long"),
            TypeInstance::Float => f.write_str("float"),
            TypeInstance::Double => f.write_str("double"),
            TypeInstance::Bool => f.write_str("bool"),
            TypeInstance::Str => f.write_str("string"),
            TypeInstance::Void => f.write_str("void"),
            TypeInstance::Null => f.write_str("null"),
            TypeInstance::Error => f.write_str("error"),
            TypeInstance::Array(a) => write!(f, "{}[]", a.element),
            TypeInstance::Class(c) => f.write_str(&c.name),
            TypeInstance::Template(t) => f.write_str(&t.name),
            TypeInstance::Func(d) => {
                f.write_str("function (")?;
                for (i, p) in d.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", p.typ)?;
                }
                write!(f, ") {}", d.ret)
            }
            TypeInstance::List(c) => write!(f, "List<{}>", c.element),
            TypeInstance::Set(c) => write!(f, "Set<{}>", c.element),
            TypeInstance::Iterator(c) => write!(f, "Iterator<{}>", c.element),
            TypeInstance::Map(m) => write!(f, "Map<{}, {}>", m.key, m.value),
            TypeInstance::BuiltinTemplate(k) => {
                f.write_str(match k {
                    BuiltinTemplateKind::List => "std.List",
                    BuiltinTemplateKind::Set => "std.Set",
                    BuiltinTemplateKind::Map => "std.Map",
                    BuiltinTemplateKind::Iterator => "std.Iterator",
                })
            }
            TypeInstance::Std => f.write_str("std"),
            TypeInstance::Console => f.write_str("std.Console"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_per_family() {
        let mut total = RuntimeMemoryTotal::default();
        assert_eq!(total.allocate(StorageKind::Int), 0);
        assert_eq!(total.allocate(StorageKind::Ref), 0);
        assert_eq!(total.allocate(StorageKind::Int), 1);
        assert_eq!(total.ints, 2);
        assert_eq!(total.refs, 1);
    }

    #[test]
    fn collection_identity_is_nominal() {
        let a = TypeInstance::List(Rc::new(CollType::new(TypeInstance::Int)));
        let b = TypeInstance::List(Rc::new(CollType::new(TypeInstance::Int)));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn null_assigns_to_refs_only() {
        assert!(TypeInstance::Null.assignable_to(&TypeInstance::Str));
        assert!(!TypeInstance::Null.assignable_to(&TypeInstance::Int));
    }
}
