//! Runtime frames and values.
//!
//! A frame (`ActionContext`) holds one vector per storage family plus a
//! parent link; the parent chain mirrors the lexical scope chain because
//! closures and instances keep the frame they were created under. Reference
//! slots hold `RefValue`, a cheap-to-clone handle.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{LineCol, StackInfo};
use crate::types::RuntimeMemoryTotal;

use super::instruction::Instruction;

/// Shared handle to one frame.
pub type Ctx = Rc<RefCell<ActionContext>>;

/// One typed frame.
#[derive(Debug)]
pub struct ActionContext {
    pub parent: Option<Ctx>,
    pub ints: Vec<i32>,
    pub longs: Vec<i64>,
    pub floats: Vec<f32>,
    pub doubles: Vec<f64>,
    pub bools: Vec<bool>,
    pub refs: Vec<RefValue>,
    /// Set by `return`; unwinds statement sequences up to the invocation.
    pub return_flag: bool,
    pub break_flag: bool,
    pub continue_flag: bool,
}

impl ActionContext {
    /// Allocates a frame of the given shape, slots zeroed or null.
    pub fn new_ctx(total: RuntimeMemoryTotal, parent: Option<Ctx>) -> Ctx {
        Rc::new(RefCell::new(ActionContext {
            parent,
            ints: vec![0; total.ints],
            longs: vec![0; total.longs],
            floats: vec![0.0; total.floats],
            doubles: vec![0.0; total.doubles],
            bools: vec![false; total.bools],
            refs: vec![RefValue::Null; total.refs],
            return_flag: false,
            break_flag: false,
            continue_flag: false,
        }))
    }

    /// Walks `depth` parent links. The checker only emits depths that exist,
    /// so a missing parent is an internal fault.
    pub fn frame_at(ctx: &Ctx, depth: usize) -> std::result::Result<Ctx, Rc<ErrorValue>> {
        let mut cur = ctx.clone();
        for _ in 0..depth {
            let parent = cur.borrow().parent.clone();
            match parent {
                Some(p) => cur = p,
                None => {
                    return Err(Rc::new(ErrorValue {
                        message: "internal: frame depth out of range".to_string(),
                        line_col: LineCol::EMPTY,
                        stack: Vec::new(),
                    }))
                }
            }
        }
        Ok(cur)
    }

    pub fn any_flag(&self) -> bool {
        self.return_flag || self.break_flag || self.continue_flag
    }
}

/// A value held in a reference slot.
#[derive(Debug, Clone)]
pub enum RefValue {
    Null,
    Str(Rc<str>),
    /// A class instance: its field frame.
    Frame(Ctx),
    Func(Rc<FuncValue>),
    Error(Rc<ErrorValue>),
    ArrInt(Rc<RefCell<Vec<i32>>>),
    ArrLong(Rc<RefCell<Vec<i64>>>),
    ArrFloat(Rc<RefCell<Vec<f32>>>),
    ArrDouble(Rc<RefCell<Vec<f64>>>),
    ArrBool(Rc<RefCell<Vec<bool>>>),
    ArrRef(Rc<RefCell<Vec<RefValue>>>),
    List(Rc<RefCell<ListValue>>),
    Set(Rc<RefCell<SetValue>>),
    Map(Rc<RefCell<MapValue>>),
    Iter(Rc<RefCell<IterValue>>),
    /// The `std` namespace object.
    Std,
    Console,
}

impl RefValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RefValue::Null)
    }

    /// Identity comparison for `==` on reference types. Strings compare by
    /// value elsewhere; here two handles are equal when they share the
    /// allocation, and null equals only null.
    pub fn same(&self, other: &RefValue) -> bool {
        use RefValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Str(a), Str(b)) => Rc::ptr_eq(a, b),
            (Frame(a), Frame(b)) => Rc::ptr_eq(a, b),
            (Func(a), Func(b)) => Rc::ptr_eq(a, b),
            (Error(a), Error(b)) => Rc::ptr_eq(a, b),
            (ArrInt(a), ArrInt(b)) => Rc::ptr_eq(a, b),
            (ArrLong(a), ArrLong(b)) => Rc::ptr_eq(a, b),
            (ArrFloat(a), ArrFloat(b)) => Rc::ptr_eq(a, b),
            (ArrDouble(a), ArrDouble(b)) => Rc::ptr_eq(a, b),
            (ArrBool(a), ArrBool(b)) => Rc::ptr_eq(a, b),
            (ArrRef(a), ArrRef(b)) => Rc::ptr_eq(a, b),
            (List(a), List(b)) => Rc::ptr_eq(a, b),
            (Set(a), Set(b)) => Rc::ptr_eq(a, b),
            (Map(a), Map(b)) => Rc::ptr_eq(a, b),
            (Iter(a), Iter(b)) => Rc::ptr_eq(a, b),
            (Std, Std) | (Console, Console) => true,
            _ => false,
        }
    }

    /// Display form used by string concatenation fallbacks and the explorer.
    pub fn display(&self) -> String {
        match self {
            RefValue::Null => "null".to_string(),
            RefValue::Str(s) => s.to_string(),
            RefValue::Frame(_) => "[object]".to_string(),
            RefValue::Func(_) => "[function]".to_string(),
            RefValue::Error(e) => e.message.clone(),
            RefValue::ArrInt(a) => display_arr(&a.borrow(), |v| v.to_string()),
            RefValue::ArrLong(a) => display_arr(&a.borrow(), |v| v.to_string()),
            RefValue::ArrFloat(a) => display_arr(&a.borrow(), |v| format!("{:?}", v)),
            RefValue::ArrDouble(a) => display_arr(&a.borrow(), |v| format!("{:?}", v)),
            RefValue::ArrBool(a) => display_arr(&a.borrow(), |v| v.to_string()),
            RefValue::ArrRef(a) => display_arr(&a.borrow(), |v| v.display()),
            RefValue::List(l) => l.borrow().display(),
            RefValue::Set(s) => s.borrow().display(),
            RefValue::Map(m) => m.borrow().display(),
            RefValue::Iter(_) => "[iterator]".to_string(),
            RefValue::Std => "std".to_string(),
            RefValue::Console => "std.console".to_string(),
        }
    }
}

fn display_arr<T>(items: &[T], f: impl Fn(&T) -> String) -> String {
    let parts: Vec<String> = items.iter().map(|v| f(v)).collect();
    format!("[{}]", parts.join(", "))
}

/// A runtime error value; also what `throw` raises.
#[derive(Debug)]
pub struct ErrorValue {
    pub message: String,
    pub line_col: LineCol,
    pub stack: Vec<StackInfo>,
}

/// A function value: the invocation frame shape, the body, and the frame
/// captured where the definition executed.
#[derive(Debug)]
pub struct FuncValue {
    pub total: RuntimeMemoryTotal,
    pub body: Rc<Vec<Instruction>>,
    pub capture: Ctx,
    pub info: Rc<StackInfo>,
}

/// A loosely typed value used at builtin-collection boundaries. Frames only
/// ever store through the typed vectors; `Val` moves elements in and out of
/// collections.
#[derive(Debug, Clone)]
pub enum Val {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Ref(RefValue),
}

impl Val {
    pub fn display(&self) -> String {
        match self {
            Val::Int(v) => v.to_string(),
            Val::Long(v) => v.to_string(),
            Val::Float(v) => format!("{:?}", v),
            Val::Double(v) => format!("{:?}", v),
            Val::Bool(v) => v.to_string(),
            Val::Ref(v) => v.display(),
        }
    }

    fn same(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Long(a), Val::Long(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::Double(a), Val::Double(b)) => a == b,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Ref(RefValue::Str(a)), Val::Ref(RefValue::Str(b))) => a == b,
            (Val::Ref(a), Val::Ref(b)) => a.same(b),
            _ => false,
        }
    }
}

/// A `std.List` instantiation: one homogeneous vector per element family.
#[derive(Debug)]
pub enum ListValue {
    Ints(Vec<i32>),
    Longs(Vec<i64>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
    Bools(Vec<bool>),
    Refs(Vec<RefValue>),
}

impl ListValue {
    pub fn len(&self) -> usize {
        match self {
            ListValue::Ints(v) => v.len(),
            ListValue::Longs(v) => v.len(),
            ListValue::Floats(v) => v.len(),
            ListValue::Doubles(v) => v.len(),
            ListValue::Bools(v) => v.len(),
            ListValue::Refs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, val: Val) {
        match (self, val) {
            (ListValue::Ints(v), Val::Int(x)) => v.push(x),
            (ListValue::Longs(v), Val::Long(x)) => v.push(x),
            (ListValue::Floats(v), Val::Float(x)) => v.push(x),
            (ListValue::Doubles(v), Val::Double(x)) => v.push(x),
            (ListValue::Bools(v), Val::Bool(x)) => v.push(x),
            (ListValue::Refs(v), Val::Ref(x)) => v.push(x),
            _ => {}
        }
    }

    pub fn get(&self, index: usize) -> Option<Val> {
        match self {
            ListValue::Ints(v) => v.get(index).copied().map(Val::Int),
            ListValue::Longs(v) => v.get(index).copied().map(Val::Long),
            ListValue::Floats(v) => v.get(index).copied().map(Val::Float),
            ListValue::Doubles(v) => v.get(index).copied().map(Val::Double),
            ListValue::Bools(v) => v.get(index).copied().map(Val::Bool),
            ListValue::Refs(v) => v.get(index).cloned().map(Val::Ref),
        }
    }

    /// Returns false when the index is out of range.
    pub fn set(&mut self, index: usize, val: Val) -> bool {
        if index >= self.len() {
            return false;
        }
        match (self, val) {
            (ListValue::Ints(v), Val::Int(x)) => v[index] = x,
            (ListValue::Longs(v), Val::Long(x)) => v[index] = x,
            (ListValue::Floats(v), Val::Float(x)) => v[index] = x,
            (ListValue::Doubles(v), Val::Double(x)) => v[index] = x,
            (ListValue::Bools(v), Val::Bool(x)) => v[index] = x,
            (ListValue::Refs(v), Val::Ref(x)) => v[index] = x,
            _ => return false,
        }
        true
    }

    pub fn insert(&mut self, index: usize, val: Val) -> bool {
        if index > self.len() {
            return false;
        }
        match (self, val) {
            (ListValue::Ints(v), Val::Int(x)) => v.insert(index, x),
            (ListValue::Longs(v), Val::Long(x)) => v.insert(index, x),
            (ListValue::Floats(v), Val::Float(x)) => v.insert(index, x),
            (ListValue::Doubles(v), Val::Double(x)) => v.insert(index, x),
            (ListValue::Bools(v), Val::Bool(x)) => v.insert(index, x),
            (ListValue::Refs(v), Val::Ref(x)) => v.insert(index, x),
            _ => return false,
        }
        true
    }

    pub fn remove_at(&mut self, index: usize) -> Option<Val> {
        if index >= self.len() {
            return None;
        }
        Some(match self {
            ListValue::Ints(v) => Val::Int(v.remove(index)),
            ListValue::Longs(v) => Val::Long(v.remove(index)),
            ListValue::Floats(v) => Val::Float(v.remove(index)),
            ListValue::Doubles(v) => Val::Double(v.remove(index)),
            ListValue::Bools(v) => Val::Bool(v.remove(index)),
            ListValue::Refs(v) => Val::Ref(v.remove(index)),
        })
    }

    /// Index of the first equal element, or -1.
    pub fn index_of(&self, val: &Val) -> i32 {
        for i in 0..self.len() {
            if let Some(item) = self.get(i) {
                if item.same(val) {
                    return i as i32;
                }
            }
        }
        -1
    }

    pub fn contains(&self, val: &Val) -> bool {
        self.index_of(val) >= 0
    }

    pub fn display(&self) -> String {
        let parts: Vec<String> = (0..self.len())
            .filter_map(|i| self.get(i))
            .map(|v| v.display())
            .collect();
        format!("[{}]", parts.join(", "))
    }
}

/// A `std.Set` instantiation. Insertion order is kept for iteration and
/// display; keys are limited to the hashable families.
#[derive(Debug)]
pub enum SetValue {
    Ints { order: Vec<i32>, set: HashSet<i32> },
    Longs { order: Vec<i64>, set: HashSet<i64> },
    Bools { order: Vec<bool>, set: HashSet<bool> },
    Strs { order: Vec<Rc<str>>, set: HashSet<Rc<str>> },
}

impl SetValue {
    pub fn len(&self) -> usize {
        match self {
            SetValue::Ints { order, .. } => order.len(),
            SetValue::Longs { order, .. } => order.len(),
            SetValue::Bools { order, .. } => order.len(),
            SetValue::Strs { order, .. } => order.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when the key was newly added.
    pub fn add(&mut self, val: Val) -> bool {
        match (self, val) {
            (SetValue::Ints { order, set }, Val::Int(x)) => {
                let added = set.insert(x);
                if added {
                    order.push(x);
                }
                added
            }
            (SetValue::Longs { order, set }, Val::Long(x)) => {
                let added = set.insert(x);
                if added {
                    order.push(x);
                }
                added
            }
            (SetValue::Bools { order, set }, Val::Bool(x)) => {
                let added = set.insert(x);
                if added {
                    order.push(x);
                }
                added
            }
            (SetValue::Strs { order, set }, Val::Ref(RefValue::Str(x))) => {
                let added = set.insert(x.clone());
                if added {
                    order.push(x);
                }
                added
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, val: &Val) -> bool {
        match (self, val) {
            (SetValue::Ints { order, set }, Val::Int(x)) => {
                let removed = set.remove(x);
                if removed {
                    order.retain(|v| v != x);
                }
                removed
            }
            (SetValue::Longs { order, set }, Val::Long(x)) => {
                let removed = set.remove(x);
                if removed {
                    order.retain(|v| v != x);
                }
                removed
            }
            (SetValue::Bools { order, set }, Val::Bool(x)) => {
                let removed = set.remove(x);
                if removed {
                    order.retain(|v| v != x);
                }
                removed
            }
            (SetValue::Strs { order, set }, Val::Ref(RefValue::Str(x))) => {
                let removed = set.remove(x.as_ref());
                if removed {
                    order.retain(|v| v.as_ref() != x.as_ref());
                }
                removed
            }
            _ => false,
        }
    }

    pub fn contains(&self, val: &Val) -> bool {
        match (self, val) {
            (SetValue::Ints { set, .. }, Val::Int(x)) => set.contains(x),
            (SetValue::Longs { set, .. }, Val::Long(x)) => set.contains(x),
            (SetValue::Bools { set, .. }, Val::Bool(x)) => set.contains(x),
            (SetValue::Strs { set, .. }, Val::Ref(RefValue::Str(x))) => set.contains(x.as_ref()),
            _ => false,
        }
    }

    /// The element at insertion position `index`.
    pub fn get(&self, index: usize) -> Option<Val> {
        match self {
            SetValue::Ints { order, .. } => order.get(index).copied().map(Val::Int),
            SetValue::Longs { order, .. } => order.get(index).copied().map(Val::Long),
            SetValue::Bools { order, .. } => order.get(index).copied().map(Val::Bool),
            SetValue::Strs { order, .. } => order
                .get(index)
                .cloned()
                .map(|s| Val::Ref(RefValue::Str(s))),
        }
    }

    pub fn display(&self) -> String {
        let parts: Vec<String> = (0..self.len())
            .filter_map(|i| self.get(i))
            .map(|v| v.display())
            .collect();
        format!("[{}]", parts.join(", "))
    }
}

/// A `std.Map` instantiation: keys limited to the hashable families, values
/// loosely held as `Val`. Insertion order is kept.
#[derive(Debug)]
pub enum MapValue {
    Ints { order: Vec<i32>, map: HashMap<i32, Val> },
    Longs { order: Vec<i64>, map: HashMap<i64, Val> },
    Bools { order: Vec<bool>, map: HashMap<bool, Val> },
    Strs { order: Vec<Rc<str>>, map: HashMap<Rc<str>, Val> },
}

impl MapValue {
    pub fn len(&self) -> usize {
        match self {
            MapValue::Ints { order, .. } => order.len(),
            MapValue::Longs { order, .. } => order.len(),
            MapValue::Bools { order, .. } => order.len(),
            MapValue::Strs { order, .. } => order.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn put(&mut self, key: Val, value: Val) {
        match (self, key) {
            (MapValue::Ints { order, map }, Val::Int(k)) => {
                if map.insert(k, value).is_none() {
                    order.push(k);
                }
            }
            (MapValue::Longs { order, map }, Val::Long(k)) => {
                if map.insert(k, value).is_none() {
                    order.push(k);
                }
            }
            (MapValue::Bools { order, map }, Val::Bool(k)) => {
                if map.insert(k, value).is_none() {
                    order.push(k);
                }
            }
            (MapValue::Strs { order, map }, Val::Ref(RefValue::Str(k))) => {
                if map.insert(k.clone(), value).is_none() {
                    order.push(k);
                }
            }
            _ => {}
        }
    }

    pub fn get(&self, key: &Val) -> Option<Val> {
        match (self, key) {
            (MapValue::Ints { map, .. }, Val::Int(k)) => map.get(k).cloned(),
            (MapValue::Longs { map, .. }, Val::Long(k)) => map.get(k).cloned(),
            (MapValue::Bools { map, .. }, Val::Bool(k)) => map.get(k).cloned(),
            (MapValue::Strs { map, .. }, Val::Ref(RefValue::Str(k))) => {
                map.get(k.as_ref()).cloned()
            }
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &Val) -> Option<Val> {
        match (self, key) {
            (MapValue::Ints { order, map }, Val::Int(k)) => {
                let removed = map.remove(k);
                if removed.is_some() {
                    order.retain(|v| v != k);
                }
                removed
            }
            (MapValue::Longs { order, map }, Val::Long(k)) => {
                let removed = map.remove(k);
                if removed.is_some() {
                    order.retain(|v| v != k);
                }
                removed
            }
            (MapValue::Bools { order, map }, Val::Bool(k)) => {
                let removed = map.remove(k);
                if removed.is_some() {
                    order.retain(|v| v != k);
                }
                removed
            }
            (MapValue::Strs { order, map }, Val::Ref(RefValue::Str(k))) => {
                let removed = map.remove(k.as_ref());
                if removed.is_some() {
                    order.retain(|v| v.as_ref() != k.as_ref());
                }
                removed
            }
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &Val) -> bool {
        self.get(key).is_some()
    }

    pub fn key_at(&self, index: usize) -> Option<Val> {
        match self {
            MapValue::Ints { order, .. } => order.get(index).copied().map(Val::Int),
            MapValue::Longs { order, .. } => order.get(index).copied().map(Val::Long),
            MapValue::Bools { order, .. } => order.get(index).copied().map(Val::Bool),
            MapValue::Strs { order, .. } => order
                .get(index)
                .cloned()
                .map(|s| Val::Ref(RefValue::Str(s))),
        }
    }

    /// Snapshot of the keys, as a set sharing this map's key family.
    pub fn keys(&self) -> SetValue {
        match self {
            MapValue::Ints { order, .. } => SetValue::Ints {
                order: order.clone(),
                set: order.iter().copied().collect(),
            },
            MapValue::Longs { order, .. } => SetValue::Longs {
                order: order.clone(),
                set: order.iter().copied().collect(),
            },
            MapValue::Bools { order, .. } => SetValue::Bools {
                order: order.clone(),
                set: order.iter().copied().collect(),
            },
            MapValue::Strs { order, .. } => SetValue::Strs {
                order: order.clone(),
                set: order.iter().cloned().collect(),
            },
        }
    }

    /// Snapshot of the values in key insertion order.
    pub fn values(&self) -> Vec<Val> {
        (0..self.len())
            .filter_map(|i| self.key_at(i))
            .filter_map(|k| self.get(&k))
            .collect()
    }

    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            if let Some(k) = self.key_at(i) {
                if let Some(v) = self.get(&k) {
                    parts.push(format!("{}={}", k.display(), v.display()));
                }
            }
        }
        format!("{{{}}}", parts.join(", "))
    }
}

/// A live cursor over a list or a set, by insertion position.
#[derive(Debug)]
pub enum IterValue {
    List { source: Rc<RefCell<ListValue>>, pos: usize },
    Set { source: Rc<RefCell<SetValue>>, pos: usize },
}

impl IterValue {
    pub fn has_next(&self) -> bool {
        match self {
            IterValue::List { source, pos } => *pos < source.borrow().len(),
            IterValue::Set { source, pos } => *pos < source.borrow().len(),
        }
    }

    pub fn next(&mut self) -> Option<Val> {
        match self {
            IterValue::List { source, pos } => {
                let val = source.borrow().get(*pos);
                if val.is_some() {
                    *pos += 1;
                }
                val
            }
            IterValue::Set { source, pos } => {
                let val = source.borrow().get(*pos);
                if val.is_some() {
                    *pos += 1;
                }
                val
            }
        }
    }
}

/// Last computed value, one register per storage family.
#[derive(Debug)]
pub struct ValueHolder {
    pub int_value: i32,
    pub long_value: i64,
    pub float_value: f32,
    pub double_value: f64,
    pub bool_value: bool,
    pub ref_value: RefValue,
}

impl Default for ValueHolder {
    fn default() -> Self {
        ValueHolder {
            int_value: 0,
            long_value: 0,
            float_value: 0.0,
            double_value: 0.0,
            bool_value: false,
            ref_value: RefValue::Null,
        }
    }
}

/// Per-run state: the value registers, the call stack for error traces, and
/// the console sink.
pub struct Execution {
    pub values: ValueHolder,
    pub stack: Vec<StackInfo>,
    pub output: Box<dyn FnMut(&str)>,
}

impl Execution {
    pub fn new(output: Box<dyn FnMut(&str)>) -> Self {
        Execution {
            values: ValueHolder::default(),
            stack: Vec::new(),
            output,
        }
    }

    /// Builds a runtime error carrying the current call stack.
    pub fn raise(&self, message: impl Into<String>, line_col: LineCol) -> Rc<ErrorValue> {
        Rc::new(ErrorValue {
            message: message.into(),
            line_col,
            stack: self.stack.clone(),
        })
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("values", &self.values)
            .field("stack", &self.stack)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_walk_follows_parents() {
        let root = ActionContext::new_ctx(
            RuntimeMemoryTotal {
                ints: 1,
                ..Default::default()
            },
            None,
        );
        root.borrow_mut().ints[0] = 42;
        let child = ActionContext::new_ctx(RuntimeMemoryTotal::default(), Some(root.clone()));
        let found = ActionContext::frame_at(&child, 1).unwrap();
        assert_eq!(found.borrow().ints[0], 42);
        assert!(ActionContext::frame_at(&child, 2).is_err());
    }

    #[test]
    fn set_keeps_insertion_order() {
        let mut set = SetValue::Ints {
            order: Vec::new(),
            set: HashSet::new(),
        };
        assert!(set.add(Val::Int(3)));
        assert!(set.add(Val::Int(1)));
        assert!(!set.add(Val::Int(3)));
        assert_eq!(set.display(), "[3, 1]");
        assert!(set.remove(&Val::Int(3)));
        assert_eq!(set.display(), "[1]");
    }

    #[test]
    fn map_string_keys() {
        let mut map = MapValue::Strs {
            order: Vec::new(),
            map: HashMap::new(),
        };
        map.put(Val::Ref(RefValue::Str(Rc::from("a"))), Val::Int(1));
        map.put(Val::Ref(RefValue::Str(Rc::from("b"))), Val::Int(2));
        map.put(Val::Ref(RefValue::Str(Rc::from("a"))), Val::Int(3));
        assert_eq!(map.len(), 2);
        assert_eq!(map.display(), "{a=3, b=2}");
        assert!(map.contains_key(&Val::Ref(RefValue::Str(Rc::from("b")))));
    }

    #[test]
    fn iterator_walks_a_live_list() {
        let list = Rc::new(RefCell::new(ListValue::Ints(vec![1, 2])));
        let mut iter = IterValue::List {
            source: list.clone(),
            pos: 0,
        };
        assert!(iter.has_next());
        assert!(matches!(iter.next(), Some(Val::Int(1))));
        list.borrow_mut().add(Val::Int(3));
        assert!(matches!(iter.next(), Some(Val::Int(2))));
        assert!(matches!(iter.next(), Some(Val::Int(3))));
        assert!(!iter.has_next());
    }
}
