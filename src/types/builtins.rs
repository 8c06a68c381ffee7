//! Builtin members and the `std` namespace.
//!
//! Builtin members are resolved at check time to a signature plus a
//! [`BuiltinMethod`] tag the evaluator dispatches on. They are
//! invocation-only: accessing one without calling it is a type error, which
//! the checker enforces.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::{LineCol, Result};
use crate::parser::ast::Modifiers;
use crate::runtime::instruction::BuiltinMethod;
use crate::runtime::memory::RefValue;

use super::context::{TypeContext, Variable};
use super::{
    BuiltinTemplateKind, CollType, FunctionDescriptor, MapType, ParamInfo, RuntimeMemoryTotal,
    TypeInstance,
};

/// Builds a throwaway signature for a builtin member. Builtins run without a
/// frame of their own, so the slot bookkeeping only orders the arguments.
fn desc(params: Vec<TypeInstance>, ret: TypeInstance) -> Rc<FunctionDescriptor> {
    let mut total = RuntimeMemoryTotal::default();
    let params = params
        .into_iter()
        .enumerate()
        .map(|(i, typ)| {
            let kind = typ.storage_kind();
            ParamInfo {
                name: format!("a{}", i),
                typ,
                kind,
                index: total.allocate(kind),
                default: None,
            }
        })
        .collect();
    Rc::new(FunctionDescriptor {
        params,
        ret,
        total: Cell::new(total),
    })
}

/// The nominal iterator type of a collection, created once per instantiation.
pub fn iterator_of(coll: &Rc<CollType>) -> TypeInstance {
    let mut cached = coll.iterator.borrow_mut();
    cached
        .get_or_insert_with(|| {
            TypeInstance::Iterator(Rc::new(CollType::new(coll.element.clone())))
        })
        .clone()
}

fn key_set_of(map: &Rc<MapType>) -> TypeInstance {
    let mut cached = map.key_set.borrow_mut();
    cached
        .get_or_insert_with(|| TypeInstance::Set(Rc::new(CollType::new(map.key.clone()))))
        .clone()
}

fn value_list_of(map: &Rc<MapType>) -> TypeInstance {
    let mut cached = map.value_list.borrow_mut();
    cached
        .get_or_insert_with(|| TypeInstance::List(Rc::new(CollType::new(map.value.clone()))))
        .clone()
}

/// Whether a type may key a set or map.
pub fn valid_key_type(typ: &TypeInstance) -> bool {
    matches!(
        typ,
        TypeInstance::Int | TypeInstance::Long | TypeInstance::Bool | TypeInstance::Str
    )
}

/// Resolves a builtin member of `recv`, returning its signature and the
/// evaluator tag.
pub fn field_of(
    recv: &TypeInstance,
    name: &str,
) -> Option<(Rc<FunctionDescriptor>, BuiltinMethod)> {
    use BuiltinMethod::*;
    use TypeInstance::*;
    let (d, m) = match (recv, name) {
        (Int, "toString") => (desc(vec![], Str), IntToString),
        (Int, "toLong") => (desc(vec![], Long), IntToLong),
        (Int, "toFloat") => (desc(vec![], Float), IntToFloat),
        (Int, "toDouble") => (desc(vec![], Double), IntToDouble),
        (Long, "toString") => (desc(vec![], Str), LongToString),
        (Long, "toInt") => (desc(vec![], Int), LongToInt),
        (Long, "toFloat") => (desc(vec![], Float), LongToFloat),
        (Long, "toDouble") => (desc(vec![], Double), LongToDouble),
        (Float, "toString") => (desc(vec![], Str), FloatToString),
        (Float, "toInt") => (desc(vec![], Int), FloatToInt),
        (Float, "toLong") => (desc(vec![], Long), FloatToLong),
        (Float, "toDouble") => (desc(vec![], Double), FloatToDouble),
        (Double, "toString") => (desc(vec![], Str), DoubleToString),
        (Double, "toInt") => (desc(vec![], Int), DoubleToInt),
        (Double, "toLong") => (desc(vec![], Long), DoubleToLong),
        (Double, "toFloat") => (desc(vec![], Float), DoubleToFloat),
        (Bool, "toString") => (desc(vec![], Str), BoolToString),
        (Str, "toString") => (desc(vec![], Str), StrToString),
        (Str, "length") => (desc(vec![], Int), StrLength),
        (Str, "substring") => (desc(vec![Int, Int], Str), StrSubstring),
        (Str, "indexOf") => (desc(vec![Str], Int), StrIndexOf),
        (Str, "contains") => (desc(vec![Str], Bool), StrContains),
        (Str, "startsWith") => (desc(vec![Str], Bool), StrStartsWith),
        (Str, "endsWith") => (desc(vec![Str], Bool), StrEndsWith),
        (Str, "trim") => (desc(vec![], Str), StrTrim),
        (Error, "message") => (desc(vec![], Str), ErrorMessage),
        (Error, "toString") => (desc(vec![], Str), ErrorToString),
        (List(coll), _) => {
            let elem = coll.element.clone();
            match name {
                "add" => (desc(vec![elem], Void), ListAdd),
                "get" => (desc(vec![Int], elem), ListGet),
                "set" => (desc(vec![Int, elem], Void), ListSet),
                "insert" => (desc(vec![Int, elem], Void), ListInsert),
                "removeAt" => (desc(vec![Int], elem), ListRemoveAt),
                "indexOf" => (desc(vec![elem], Int), ListIndexOf),
                "contains" => (desc(vec![elem], Bool), ListContains),
                "size" => (desc(vec![], Int), ListSize),
                "iterator" => (desc(vec![], iterator_of(coll)), ListIterator),
                "toString" => (desc(vec![], Str), ListToString),
                _ => return None,
            }
        }
        (Set(coll), _) => {
            let elem = coll.element.clone();
            match name {
                "add" => (desc(vec![elem], Bool), SetAdd),
                "remove" => (desc(vec![elem], Bool), SetRemove),
                "contains" => (desc(vec![elem], Bool), SetContains),
                "size" => (desc(vec![], Int), SetSize),
                "iterator" => (desc(vec![], iterator_of(coll)), SetIterator),
                "toString" => (desc(vec![], Str), SetToString),
                _ => return None,
            }
        }
        (Map(map), _) => {
            let key = map.key.clone();
            let value = map.value.clone();
            match name {
                "get" => (desc(vec![key], value), MapGet),
                "put" => (desc(vec![key, value], Void), MapPut),
                "remove" => (desc(vec![key], Void), MapRemove),
                "containsKey" => (desc(vec![key], Bool), MapContainsKey),
                "size" => (desc(vec![], Int), MapSize),
                "keys" => (desc(vec![], key_set_of(map)), MapKeys),
                "values" => (
                    desc(vec![], value_list_of(map)),
                    MapValues(map.value.storage_kind()),
                ),
                "toString" => (desc(vec![], Str), MapToString),
                _ => return None,
            }
        }
        (Iterator(coll), _) => match name {
            "hasNext" => (desc(vec![], Bool), IterHasNext),
            "next" => (desc(vec![], coll.element.clone()), IterNext),
            _ => return None,
        },
        _ => return None,
    };
    Some((d, m))
}

/// Whether `recv` has a builtin zero-argument `toString` returning string;
/// string concatenation uses this for its non-string operand.
pub fn has_to_string(recv: &TypeInstance) -> Option<BuiltinMethod> {
    match field_of(recv, "toString") {
        Some((d, m)) if d.params.is_empty() && d.ret == TypeInstance::Str => Some(m),
        _ => None,
    }
}

/// Registers type names and global values before a program is checked.
pub trait TypeProvider {
    /// Declares the provider's types and globals into the root scope,
    /// returning the globals so the interpreter can seed the root frame.
    fn install(&self, ctx: &mut TypeContext) -> Result<Vec<(Variable, RefValue)>>;
}

/// The `std` namespace: collection templates and the console.
#[derive(Debug, Default)]
pub struct StdTypes;

impl TypeProvider for StdTypes {
    fn install(&self, ctx: &mut TypeContext) -> Result<Vec<(Variable, RefValue)>> {
        for (name, kind) in [
            ("std.List", BuiltinTemplateKind::List),
            ("std.Set", BuiltinTemplateKind::Set),
            ("std.LinkedHashSet", BuiltinTemplateKind::Set),
            ("std.Map", BuiltinTemplateKind::Map),
            ("std.LinkedHashMap", BuiltinTemplateKind::Map),
            ("std.Iterator", BuiltinTemplateKind::Iterator),
        ] {
            ctx.declare_type(name, TypeInstance::BuiltinTemplate(kind), LineCol::EMPTY)?;
        }
        let std_var = ctx.declare_var(
            "std",
            TypeInstance::Std,
            Modifiers::empty().with(Modifiers::CONST),
            LineCol::EMPTY,
        )?;
        Ok(vec![(std_var, RefValue::Std)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_members_are_typed_by_element() {
        let coll = Rc::new(CollType::new(TypeInstance::Double));
        let list = TypeInstance::List(coll);
        let (d, m) = field_of(&list, "get").unwrap();
        assert_eq!(m, BuiltinMethod::ListGet);
        assert_eq!(d.ret, TypeInstance::Double);
        assert_eq!(d.params.len(), 1);
        assert!(field_of(&list, "push").is_none());
    }

    #[test]
    fn iterator_type_is_cached() {
        let coll = Rc::new(CollType::new(TypeInstance::Int));
        let a = iterator_of(&coll);
        let b = iterator_of(&coll);
        assert_eq!(a, b);
    }

    #[test]
    fn key_restrictions() {
        assert!(valid_key_type(&TypeInstance::Str));
        assert!(!valid_key_type(&TypeInstance::Double));
    }

    #[test]
    fn std_provider_declares_names() {
        let mut ctx = TypeContext::new();
        let globals = StdTypes.install(&mut ctx).unwrap();
        assert_eq!(globals.len(), 1);
        assert!(ctx.lookup_type("std.Map").is_some());
        assert!(ctx.lookup_var("std").is_some());
    }
}
