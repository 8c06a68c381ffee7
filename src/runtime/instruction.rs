//! The instruction tree and its evaluator.
//!
//! The checker lowers every statement and expression into plain-data
//! `Instruction` nodes; evaluation walks the tree against a frame chain.
//! Computed values travel through the per-family registers of
//! [`Execution`]; raised errors travel as `Err(Rc<ErrorValue>)` and unwind
//! until an error-handling region catches them.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{LineCol, StackInfo};
use crate::types::{RuntimeMemoryTotal, StorageKind};

use super::memory::{
    ActionContext, Ctx, ErrorValue, Execution, FuncValue, IterValue, ListValue, MapValue,
    RefValue, SetValue, Val,
};

/// Outcome of evaluating one node.
pub type ExecRes = std::result::Result<(), Rc<ErrorValue>>;

// each script call recurses through several evaluator frames, so the cap
// must stay well below what the host stack holds in a debug build
const MAX_CALL_DEPTH: usize = 256;

/// A primitive storage family: slot access, register access and typed
/// arrays, implemented for `i32`, `i64`, `f32`, `f64` and `bool`.
pub trait Prim: Copy + Default + PartialEq + PartialOrd + std::fmt::Debug + 'static {
    fn get_slot(frame: &ActionContext, index: usize) -> Self;
    fn set_slot(frame: &mut ActionContext, index: usize, v: Self);
    fn held(exec: &Execution) -> Self;
    fn hold(exec: &mut Execution, v: Self);
    fn new_arr(len: usize) -> RefValue;
    fn arr_len(r: &RefValue) -> Option<usize>;
    fn arr_get(r: &RefValue, index: usize) -> Option<Self>;
    fn arr_set(r: &RefValue, index: usize, v: Self) -> bool;
}

/// Arithmetic on a primitive family. Integer add/sub/mul wrap; division by
/// zero reports through `None`.
pub trait Num: Prim {
    fn add(a: Self, b: Self) -> Self;
    fn sub(a: Self, b: Self) -> Self;
    fn mul(a: Self, b: Self) -> Self;
    fn div(a: Self, b: Self) -> Option<Self>;
    fn rem(a: Self, b: Self) -> Option<Self>;
    fn neg(a: Self) -> Self;
}

macro_rules! impl_prim {
    ($t:ty, $slot:ident, $reg:ident, $arr:ident) => {
        impl Prim for $t {
            fn get_slot(frame: &ActionContext, index: usize) -> Self {
                frame.$slot[index]
            }
            fn set_slot(frame: &mut ActionContext, index: usize, v: Self) {
                frame.$slot[index] = v;
            }
            fn held(exec: &Execution) -> Self {
                exec.values.$reg
            }
            fn hold(exec: &mut Execution, v: Self) {
                exec.values.$reg = v;
            }
            fn new_arr(len: usize) -> RefValue {
                RefValue::$arr(Rc::new(RefCell::new(vec![Default::default(); len])))
            }
            fn arr_len(r: &RefValue) -> Option<usize> {
                match r {
                    RefValue::$arr(a) => Some(a.borrow().len()),
                    _ => None,
                }
            }
            fn arr_get(r: &RefValue, index: usize) -> Option<Self> {
                match r {
                    RefValue::$arr(a) => a.borrow().get(index).copied(),
                    _ => None,
                }
            }
            fn arr_set(r: &RefValue, index: usize, v: Self) -> bool {
                match r {
                    RefValue::$arr(a) => {
                        let mut a = a.borrow_mut();
                        if index < a.len() {
                            a[index] = v;
                            true
                        } else {
                            false
                        }
                    }
                    _ => false,
                }
            }
        }
    };
}

impl_prim!(i32, ints, int_value, ArrInt);
impl_prim!(i64, longs, long_value, ArrLong);
impl_prim!(f32, floats, float_value, ArrFloat);
impl_prim!(f64, doubles, double_value, ArrDouble);
impl_prim!(bool, bools, bool_value, ArrBool);

macro_rules! impl_num_int {
    ($t:ty) => {
        impl Num for $t {
            fn add(a: Self, b: Self) -> Self {
                a.wrapping_add(b)
            }
            fn sub(a: Self, b: Self) -> Self {
                a.wrapping_sub(b)
            }
            fn mul(a: Self, b: Self) -> Self {
                a.wrapping_mul(b)
            }
            fn div(a: Self, b: Self) -> Option<Self> {
                if b == 0 {
                    None
                } else {
                    Some(a.wrapping_div(b))
                }
            }
            fn rem(a: Self, b: Self) -> Option<Self> {
                if b == 0 {
                    None
                } else {
                    Some(a.wrapping_rem(b))
                }
            }
            fn neg(a: Self) -> Self {
                a.wrapping_neg()
            }
        }
    };
}

macro_rules! impl_num_float {
    ($t:ty) => {
        impl Num for $t {
            fn add(a: Self, b: Self) -> Self {
                a + b
            }
            fn sub(a: Self, b: Self) -> Self {
                a - b
            }
            fn mul(a: Self, b: Self) -> Self {
                a * b
            }
            fn div(a: Self, b: Self) -> Option<Self> {
                Some(a / b)
            }
            fn rem(a: Self, b: Self) -> Option<Self> {
                Some(a % b)
            }
            fn neg(a: Self) -> Self {
                -a
            }
        }
    };
}

impl_num_int!(i32);
impl_num_int!(i64);
impl_num_float!(f32);
impl_num_float!(f64);

/// Memory traffic for one primitive family.
#[derive(Debug)]
pub enum MemOp<T: Prim> {
    Literal(T),
    Get {
        depth: usize,
        index: usize,
    },
    Set {
        depth: usize,
        index: usize,
        value: Box<Instruction>,
    },
    GetField {
        target: Box<Instruction>,
        index: usize,
        line_col: LineCol,
    },
    SetField {
        target: Box<Instruction>,
        index: usize,
        value: Box<Instruction>,
        line_col: LineCol,
    },
    GetIndex {
        arr: Box<Instruction>,
        index: Box<Instruction>,
        line_col: LineCol,
    },
    SetIndex {
        arr: Box<Instruction>,
        index: Box<Instruction>,
        value: Box<Instruction>,
        line_col: LineCol,
    },
    NewArray {
        len: Box<Instruction>,
        line_col: LineCol,
    },
}

impl<T: Prim> MemOp<T> {
    fn execute(&self, ctx: &Ctx, exec: &mut Execution) -> ExecRes {
        match self {
            MemOp::Literal(v) => {
                T::hold(exec, *v);
                Ok(())
            }
            MemOp::Get { depth, index } => {
                let frame = ActionContext::frame_at(ctx, *depth)?;
                let v = T::get_slot(&frame.borrow(), *index);
                T::hold(exec, v);
                Ok(())
            }
            MemOp::Set {
                depth,
                index,
                value,
            } => {
                value.execute(ctx, exec)?;
                let v = T::held(exec);
                let frame = ActionContext::frame_at(ctx, *depth)?;
                T::set_slot(&mut frame.borrow_mut(), *index, v);
                Ok(())
            }
            MemOp::GetField {
                target,
                index,
                line_col,
            } => {
                let obj = eval_frame(target, ctx, exec, *line_col)?;
                let v = T::get_slot(&obj.borrow(), *index);
                T::hold(exec, v);
                Ok(())
            }
            MemOp::SetField {
                target,
                index,
                value,
                line_col,
            } => {
                let obj = eval_frame(target, ctx, exec, *line_col)?;
                value.execute(ctx, exec)?;
                let v = T::held(exec);
                T::set_slot(&mut obj.borrow_mut(), *index, v);
                Ok(())
            }
            MemOp::GetIndex {
                arr,
                index,
                line_col,
            } => {
                let (r, i) = eval_indexing(arr, index, ctx, exec, *line_col)?;
                let len = T::arr_len(&r)
                    .ok_or_else(|| exec.raise("internal: array type mismatch", *line_col))?;
                check_bounds(i, len, exec, *line_col)?;
                if let Some(v) = T::arr_get(&r, i as usize) {
                    T::hold(exec, v);
                }
                Ok(())
            }
            MemOp::SetIndex {
                arr,
                index,
                value,
                line_col,
            } => {
                let (r, i) = eval_indexing(arr, index, ctx, exec, *line_col)?;
                let len = T::arr_len(&r)
                    .ok_or_else(|| exec.raise("internal: array type mismatch", *line_col))?;
                check_bounds(i, len, exec, *line_col)?;
                value.execute(ctx, exec)?;
                let v = T::held(exec);
                T::arr_set(&r, i as usize, v);
                Ok(())
            }
            MemOp::NewArray { len, line_col } => {
                len.execute(ctx, exec)?;
                let n = exec.values.int_value;
                if n < 0 {
                    return Err(exec.raise(format!("negative array length: {}", n), *line_col));
                }
                exec.values.ref_value = T::new_arr(n as usize);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

/// Arithmetic and comparison nodes. The numeric family is not part of the
/// data; the enclosing [`Instruction`] variant selects it at evaluation.
#[derive(Debug)]
pub enum NumCalc {
    Bin {
        op: ArithOp,
        left: Box<Instruction>,
        right: Box<Instruction>,
        line_col: LineCol,
    },
    Cmp {
        op: CmpOp,
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    Neg {
        value: Box<Instruction>,
    },
}

impl NumCalc {
    fn execute<T: Num>(&self, ctx: &Ctx, exec: &mut Execution) -> ExecRes {
        match self {
            NumCalc::Bin {
                op,
                left,
                right,
                line_col,
            } => {
                left.execute(ctx, exec)?;
                let a = T::held(exec);
                right.execute(ctx, exec)?;
                let b = T::held(exec);
                let v = match op {
                    ArithOp::Add => T::add(a, b),
                    ArithOp::Sub => T::sub(a, b),
                    ArithOp::Mul => T::mul(a, b),
                    ArithOp::Div => T::div(a, b)
                        .ok_or_else(|| exec.raise("divide by zero", *line_col))?,
                    ArithOp::Mod => T::rem(a, b)
                        .ok_or_else(|| exec.raise("divide by zero", *line_col))?,
                };
                T::hold(exec, v);
                Ok(())
            }
            NumCalc::Cmp { op, left, right } => {
                left.execute(ctx, exec)?;
                let a = T::held(exec);
                right.execute(ctx, exec)?;
                let b = T::held(exec);
                exec.values.bool_value = match op {
                    CmpOp::Gt => a > b,
                    CmpOp::Ge => a >= b,
                    CmpOp::Lt => a < b,
                    CmpOp::Le => a <= b,
                    CmpOp::Eq => a == b,
                    CmpOp::Ne => a != b,
                };
                Ok(())
            }
            NumCalc::Neg { value } => {
                value.execute(ctx, exec)?;
                let v = T::neg(T::held(exec));
                T::hold(exec, v);
                Ok(())
            }
        }
    }
}

/// One argument of an invocation: which callee slot it fills.
#[derive(Debug)]
pub struct ArgSet {
    pub kind: StorageKind,
    pub index: usize,
    pub value: Instruction,
}

/// One argument of a builtin call, tagged with its storage family.
#[derive(Debug)]
pub struct ArgIns {
    pub kind: StorageKind,
    pub inst: Instruction,
}

/// Builtin members, resolved at check time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMethod {
    IntToString,
    LongToString,
    FloatToString,
    DoubleToString,
    BoolToString,
    IntToLong,
    IntToFloat,
    IntToDouble,
    LongToInt,
    LongToFloat,
    LongToDouble,
    FloatToInt,
    FloatToLong,
    FloatToDouble,
    DoubleToInt,
    DoubleToLong,
    DoubleToFloat,
    StrToString,
    StrLength,
    StrSubstring,
    StrIndexOf,
    StrContains,
    StrStartsWith,
    StrEndsWith,
    StrTrim,
    ErrorMessage,
    ErrorToString,
    ListAdd,
    ListGet,
    ListSet,
    ListInsert,
    ListRemoveAt,
    ListIndexOf,
    ListContains,
    ListSize,
    ListIterator,
    ListToString,
    SetAdd,
    SetRemove,
    SetContains,
    SetSize,
    SetIterator,
    SetToString,
    MapGet,
    MapPut,
    MapRemove,
    MapContainsKey,
    MapSize,
    MapKeys,
    /// Carries the value family, so an empty snapshot still knows its shape.
    MapValues(StorageKind),
    MapToString,
    IterHasNext,
    IterNext,
}

/// Key family of a set or map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Int,
    Long,
    Bool,
    Str,
}

/// Which collection a `new` produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollNew {
    List(StorageKind),
    Set(KeyKind),
    Map(KeyKind),
}

/// One evaluable node.
#[derive(Debug)]
pub enum Instruction {
    NoOp,
    IntOp(MemOp<i32>),
    LongOp(MemOp<i64>),
    FloatOp(MemOp<f32>),
    DoubleOp(MemOp<f64>),
    BoolOp(MemOp<bool>),
    IntCalc(NumCalc),
    LongCalc(NumCalc),
    FloatCalc(NumCalc),
    DoubleCalc(NumCalc),
    Not(Box<Instruction>),
    And(Box<Instruction>, Box<Instruction>),
    Or(Box<Instruction>, Box<Instruction>),
    BoolCmp {
        ne: bool,
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    StrLiteral(Rc<str>),
    LoadNull,
    LoadConsole,
    RefGet {
        depth: usize,
        index: usize,
    },
    RefSet {
        depth: usize,
        index: usize,
        value: Box<Instruction>,
    },
    RefGetField {
        target: Box<Instruction>,
        index: usize,
        line_col: LineCol,
    },
    RefSetField {
        target: Box<Instruction>,
        index: usize,
        value: Box<Instruction>,
        line_col: LineCol,
    },
    RefGetIndex {
        arr: Box<Instruction>,
        index: Box<Instruction>,
        line_col: LineCol,
    },
    RefSetIndex {
        arr: Box<Instruction>,
        index: Box<Instruction>,
        value: Box<Instruction>,
        line_col: LineCol,
    },
    RefNewArray {
        len: Box<Instruction>,
        line_col: LineCol,
    },
    /// Identity comparison on reference slots; null equals only null.
    RefCmp {
        ne: bool,
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    /// Value comparison on strings.
    StrCmp {
        ne: bool,
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    /// Both sides already produce strings; the checker inserts `toString`
    /// calls for non-string operands.
    StrConcat {
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    ArrayLen {
        arr: Box<Instruction>,
        line_col: LineCol,
    },
    If {
        cond: Box<Instruction>,
        then: Vec<Instruction>,
        else_: Vec<Instruction>,
    },
    While {
        cond: Box<Instruction>,
        body: Vec<Instruction>,
    },
    For {
        init: Vec<Instruction>,
        cond: Box<Instruction>,
        incr: Vec<Instruction>,
        body: Vec<Instruction>,
    },
    Break,
    Continue,
    Return {
        value: Option<Box<Instruction>>,
    },
    Throw {
        value: Box<Instruction>,
        is_message: bool,
        line_col: LineCol,
    },
    ErrorHandling {
        try_: Vec<Instruction>,
        /// Reference slot of the `err` binding in the current frame.
        err_index: usize,
        error: Vec<Instruction>,
        success: Vec<Instruction>,
    },
    /// Setup statements followed by the expression producing the value;
    /// json array construction routes through a hidden slot this way.
    Sequence {
        insts: Vec<Instruction>,
        result: Box<Instruction>,
    },
    /// Writes a function value capturing the current frame into a local
    /// reference slot.
    FuncDef {
        index: usize,
        total: RuntimeMemoryTotal,
        body: Rc<Vec<Instruction>>,
        info: Rc<StackInfo>,
    },
    Invoke {
        target: Box<Instruction>,
        args: Vec<ArgSet>,
        line_col: LineCol,
    },
    /// Constructs a class instance. `depth` frames up from here sits the
    /// frame the class was defined under; it becomes the instance's parent.
    NewInstance {
        depth: usize,
        total: RuntimeMemoryTotal,
        args: Vec<ArgSet>,
        body: Rc<Vec<Instruction>>,
        info: Rc<StackInfo>,
        line_col: LineCol,
    },
    InvokeBuiltin {
        recv: Box<Instruction>,
        recv_kind: StorageKind,
        ret_kind: StorageKind,
        method: BuiltinMethod,
        args: Vec<ArgIns>,
        line_col: LineCol,
    },
    NewCollection {
        kind: CollNew,
        capacity: Box<Instruction>,
        line_col: LineCol,
    },
    ConsoleLog {
        arg: Box<Instruction>,
    },
}

/// Runs a statement sequence, stopping early when a control flag is set on
/// the frame.
pub fn run_seq(insts: &[Instruction], ctx: &Ctx, exec: &mut Execution) -> ExecRes {
    for inst in insts {
        inst.execute(ctx, exec)?;
        if ctx.borrow().any_flag() {
            break;
        }
    }
    Ok(())
}

fn eval_frame(
    target: &Instruction,
    ctx: &Ctx,
    exec: &mut Execution,
    line_col: LineCol,
) -> std::result::Result<Ctx, Rc<ErrorValue>> {
    target.execute(ctx, exec)?;
    match exec.values.ref_value.clone() {
        RefValue::Frame(obj) => Ok(obj),
        RefValue::Null => Err(exec.raise("field access on null", line_col)),
        _ => Err(exec.raise("internal: field receiver is not an object", line_col)),
    }
}

fn eval_indexing(
    arr: &Instruction,
    index: &Instruction,
    ctx: &Ctx,
    exec: &mut Execution,
    line_col: LineCol,
) -> std::result::Result<(RefValue, i32), Rc<ErrorValue>> {
    arr.execute(ctx, exec)?;
    let r = exec.values.ref_value.clone();
    if r.is_null() {
        return Err(exec.raise("index access on null", line_col));
    }
    index.execute(ctx, exec)?;
    Ok((r, exec.values.int_value))
}

fn check_bounds(i: i32, len: usize, exec: &Execution, line_col: LineCol) -> ExecRes {
    if i < 0 || i as usize >= len {
        return Err(exec.raise(format!("array index out of bounds: {}", i), line_col));
    }
    Ok(())
}

fn arr_len_any(r: &RefValue) -> Option<usize> {
    match r {
        RefValue::ArrInt(a) => Some(a.borrow().len()),
        RefValue::ArrLong(a) => Some(a.borrow().len()),
        RefValue::ArrFloat(a) => Some(a.borrow().len()),
        RefValue::ArrDouble(a) => Some(a.borrow().len()),
        RefValue::ArrBool(a) => Some(a.borrow().len()),
        RefValue::ArrRef(a) => Some(a.borrow().len()),
        _ => None,
    }
}

fn read_holder(exec: &Execution, kind: StorageKind) -> Val {
    match kind {
        StorageKind::Int => Val::Int(exec.values.int_value),
        StorageKind::Long => Val::Long(exec.values.long_value),
        StorageKind::Float => Val::Float(exec.values.float_value),
        StorageKind::Double => Val::Double(exec.values.double_value),
        StorageKind::Bool => Val::Bool(exec.values.bool_value),
        StorageKind::Ref => Val::Ref(exec.values.ref_value.clone()),
    }
}

fn hold_val(exec: &mut Execution, val: Val) {
    match val {
        Val::Int(v) => exec.values.int_value = v,
        Val::Long(v) => exec.values.long_value = v,
        Val::Float(v) => exec.values.float_value = v,
        Val::Double(v) => exec.values.double_value = v,
        Val::Bool(v) => exec.values.bool_value = v,
        Val::Ref(v) => exec.values.ref_value = v,
    }
}

fn write_slot(frame: &Ctx, kind: StorageKind, index: usize, val: Val) {
    let mut f = frame.borrow_mut();
    match (kind, val) {
        (StorageKind::Int, Val::Int(v)) => f.ints[index] = v,
        (StorageKind::Long, Val::Long(v)) => f.longs[index] = v,
        (StorageKind::Float, Val::Float(v)) => f.floats[index] = v,
        (StorageKind::Double, Val::Double(v)) => f.doubles[index] = v,
        (StorageKind::Bool, Val::Bool(v)) => f.bools[index] = v,
        (StorageKind::Ref, Val::Ref(v)) => f.refs[index] = v,
        _ => {}
    }
}

fn eval_string(
    inst: &Instruction,
    ctx: &Ctx,
    exec: &mut Execution,
) -> std::result::Result<Rc<str>, Rc<ErrorValue>> {
    inst.execute(ctx, exec)?;
    match &exec.values.ref_value {
        RefValue::Str(s) => Ok(s.clone()),
        RefValue::Null => Ok(Rc::from("null")),
        other => Ok(Rc::from(other.display())),
    }
}

impl Instruction {
    pub fn execute(&self, ctx: &Ctx, exec: &mut Execution) -> ExecRes {
        match self {
            Instruction::NoOp => Ok(()),
            Instruction::IntOp(op) => op.execute(ctx, exec),
            Instruction::LongOp(op) => op.execute(ctx, exec),
            Instruction::FloatOp(op) => op.execute(ctx, exec),
            Instruction::DoubleOp(op) => op.execute(ctx, exec),
            Instruction::BoolOp(op) => op.execute(ctx, exec),
            Instruction::IntCalc(op) => op.execute::<i32>(ctx, exec),
            Instruction::LongCalc(op) => op.execute::<i64>(ctx, exec),
            Instruction::FloatCalc(op) => op.execute::<f32>(ctx, exec),
            Instruction::DoubleCalc(op) => op.execute::<f64>(ctx, exec),
            Instruction::Not(inner) => {
                inner.execute(ctx, exec)?;
                exec.values.bool_value = !exec.values.bool_value;
                Ok(())
            }
            Instruction::And(left, right) => {
                left.execute(ctx, exec)?;
                if exec.values.bool_value {
                    right.execute(ctx, exec)?;
                }
                Ok(())
            }
            Instruction::Or(left, right) => {
                left.execute(ctx, exec)?;
                if !exec.values.bool_value {
                    right.execute(ctx, exec)?;
                }
                Ok(())
            }
            Instruction::BoolCmp { ne, left, right } => {
                left.execute(ctx, exec)?;
                let a = exec.values.bool_value;
                right.execute(ctx, exec)?;
                let b = exec.values.bool_value;
                exec.values.bool_value = (a == b) != *ne;
                Ok(())
            }
            Instruction::StrLiteral(s) => {
                exec.values.ref_value = RefValue::Str(s.clone());
                Ok(())
            }
            Instruction::LoadNull => {
                exec.values.ref_value = RefValue::Null;
                Ok(())
            }
            Instruction::LoadConsole => {
                exec.values.ref_value = RefValue::Console;
                Ok(())
            }
            Instruction::RefGet { depth, index } => {
                let frame = ActionContext::frame_at(ctx, *depth)?;
                let v = frame.borrow().refs[*index].clone();
                exec.values.ref_value = v;
                Ok(())
            }
            Instruction::RefSet {
                depth,
                index,
                value,
            } => {
                value.execute(ctx, exec)?;
                let v = exec.values.ref_value.clone();
                let frame = ActionContext::frame_at(ctx, *depth)?;
                frame.borrow_mut().refs[*index] = v;
                Ok(())
            }
            Instruction::RefGetField {
                target,
                index,
                line_col,
            } => {
                let obj = eval_frame(target, ctx, exec, *line_col)?;
                let v = obj.borrow().refs[*index].clone();
                exec.values.ref_value = v;
                Ok(())
            }
            Instruction::RefSetField {
                target,
                index,
                value,
                line_col,
            } => {
                let obj = eval_frame(target, ctx, exec, *line_col)?;
                value.execute(ctx, exec)?;
                let v = exec.values.ref_value.clone();
                obj.borrow_mut().refs[*index] = v;
                Ok(())
            }
            Instruction::RefGetIndex {
                arr,
                index,
                line_col,
            } => {
                let (r, i) = eval_indexing(arr, index, ctx, exec, *line_col)?;
                match &r {
                    RefValue::ArrRef(a) => {
                        let a = a.borrow();
                        check_bounds(i, a.len(), exec, *line_col)?;
                        exec.values.ref_value = a[i as usize].clone();
                        Ok(())
                    }
                    _ => Err(exec.raise("internal: array type mismatch", *line_col)),
                }
            }
            Instruction::RefSetIndex {
                arr,
                index,
                value,
                line_col,
            } => {
                let (r, i) = eval_indexing(arr, index, ctx, exec, *line_col)?;
                match &r {
                    RefValue::ArrRef(a) => {
                        check_bounds(i, a.borrow().len(), exec, *line_col)?;
                        value.execute(ctx, exec)?;
                        a.borrow_mut()[i as usize] = exec.values.ref_value.clone();
                        Ok(())
                    }
                    _ => Err(exec.raise("internal: array type mismatch", *line_col)),
                }
            }
            Instruction::RefNewArray { len, line_col } => {
                len.execute(ctx, exec)?;
                let n = exec.values.int_value;
                if n < 0 {
                    return Err(exec.raise(format!("negative array length: {}", n), *line_col));
                }
                exec.values.ref_value =
                    RefValue::ArrRef(Rc::new(RefCell::new(vec![RefValue::Null; n as usize])));
                Ok(())
            }
            Instruction::RefCmp { ne, left, right } => {
                left.execute(ctx, exec)?;
                let a = exec.values.ref_value.clone();
                right.execute(ctx, exec)?;
                let b = exec.values.ref_value.clone();
                exec.values.bool_value = a.same(&b) != *ne;
                Ok(())
            }
            Instruction::StrCmp { ne, left, right } => {
                left.execute(ctx, exec)?;
                let a = exec.values.ref_value.clone();
                right.execute(ctx, exec)?;
                let b = exec.values.ref_value.clone();
                let eq = match (&a, &b) {
                    (RefValue::Str(x), RefValue::Str(y)) => x == y,
                    (RefValue::Null, RefValue::Null) => true,
                    _ => false,
                };
                exec.values.bool_value = eq != *ne;
                Ok(())
            }
            Instruction::StrConcat { left, right } => {
                let a = eval_string(left, ctx, exec)?;
                let b = eval_string(right, ctx, exec)?;
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(&a);
                s.push_str(&b);
                exec.values.ref_value = RefValue::Str(Rc::from(s));
                Ok(())
            }
            Instruction::ArrayLen { arr, line_col } => {
                arr.execute(ctx, exec)?;
                let r = exec.values.ref_value.clone();
                if r.is_null() {
                    return Err(exec.raise("length access on null", *line_col));
                }
                match arr_len_any(&r) {
                    Some(len) => {
                        exec.values.int_value = len as i32;
                        Ok(())
                    }
                    None => Err(exec.raise("internal: array type mismatch", *line_col)),
                }
            }
            Instruction::If { cond, then, else_ } => {
                cond.execute(ctx, exec)?;
                if exec.values.bool_value {
                    run_seq(then, ctx, exec)
                } else {
                    run_seq(else_, ctx, exec)
                }
            }
            Instruction::While { cond, body } => loop {
                cond.execute(ctx, exec)?;
                if !exec.values.bool_value {
                    return Ok(());
                }
                run_seq(body, ctx, exec)?;
                let mut frame = ctx.borrow_mut();
                if frame.continue_flag {
                    frame.continue_flag = false;
                } else if frame.break_flag {
                    frame.break_flag = false;
                    return Ok(());
                } else if frame.return_flag {
                    return Ok(());
                }
            },
            Instruction::For {
                init,
                cond,
                incr,
                body,
            } => {
                run_seq(init, ctx, exec)?;
                loop {
                    cond.execute(ctx, exec)?;
                    if !exec.values.bool_value {
                        return Ok(());
                    }
                    run_seq(body, ctx, exec)?;
                    {
                        let mut frame = ctx.borrow_mut();
                        if frame.continue_flag {
                            frame.continue_flag = false;
                        } else if frame.break_flag {
                            frame.break_flag = false;
                            return Ok(());
                        } else if frame.return_flag {
                            return Ok(());
                        }
                    }
                    run_seq(incr, ctx, exec)?;
                }
            }
            Instruction::Break => {
                ctx.borrow_mut().break_flag = true;
                Ok(())
            }
            Instruction::Continue => {
                ctx.borrow_mut().continue_flag = true;
                Ok(())
            }
            Instruction::Return { value } => {
                if let Some(value) = value {
                    value.execute(ctx, exec)?;
                }
                ctx.borrow_mut().return_flag = true;
                Ok(())
            }
            Instruction::Throw {
                value,
                is_message,
                line_col,
            } => {
                value.execute(ctx, exec)?;
                match exec.values.ref_value.clone() {
                    RefValue::Str(s) if *is_message => Err(exec.raise(s.to_string(), *line_col)),
                    RefValue::Error(e) if !*is_message => Err(e),
                    RefValue::Null => Err(exec.raise("throw on null", *line_col)),
                    _ => Err(exec.raise("internal: throw value type mismatch", *line_col)),
                }
            }
            Instruction::ErrorHandling {
                try_,
                err_index,
                error,
                success,
            } => match run_seq(try_, ctx, exec) {
                Ok(()) => {
                    if ctx.borrow().any_flag() {
                        return Ok(());
                    }
                    run_seq(success, ctx, exec)
                }
                Err(e) => {
                    ctx.borrow_mut().refs[*err_index] = RefValue::Error(e);
                    run_seq(error, ctx, exec)
                }
            },
            Instruction::Sequence { insts, result } => {
                for inst in insts {
                    inst.execute(ctx, exec)?;
                }
                result.execute(ctx, exec)
            }
            Instruction::FuncDef {
                index,
                total,
                body,
                info,
            } => {
                let func = FuncValue {
                    total: *total,
                    body: body.clone(),
                    capture: ctx.clone(),
                    info: info.clone(),
                };
                ctx.borrow_mut().refs[*index] = RefValue::Func(Rc::new(func));
                Ok(())
            }
            Instruction::Invoke {
                target,
                args,
                line_col,
            } => {
                target.execute(ctx, exec)?;
                let func = match exec.values.ref_value.clone() {
                    RefValue::Func(f) => f,
                    RefValue::Null => {
                        return Err(exec.raise("invoking a null function", *line_col))
                    }
                    _ => return Err(exec.raise("internal: invoking a non-function", *line_col)),
                };
                if exec.stack.len() >= MAX_CALL_DEPTH {
                    return Err(exec.raise("stack overflow", *line_col));
                }
                let mut vals = Vec::with_capacity(args.len());
                for arg in args {
                    arg.value.execute(ctx, exec)?;
                    vals.push(read_holder(exec, arg.kind));
                }
                let frame = ActionContext::new_ctx(func.total, Some(func.capture.clone()));
                for (arg, val) in args.iter().zip(vals) {
                    write_slot(&frame, arg.kind, arg.index, val);
                }
                exec.stack.push((*func.info).clone().at(*line_col));
                let res = run_seq(&func.body, &frame, exec);
                exec.stack.pop();
                res
            }
            Instruction::NewInstance {
                depth,
                total,
                args,
                body,
                info,
                line_col,
            } => {
                if exec.stack.len() >= MAX_CALL_DEPTH {
                    return Err(exec.raise("stack overflow", *line_col));
                }
                let parent = ActionContext::frame_at(ctx, *depth)?;
                let mut vals = Vec::with_capacity(args.len());
                for arg in args {
                    arg.value.execute(ctx, exec)?;
                    vals.push(read_holder(exec, arg.kind));
                }
                let frame = ActionContext::new_ctx(*total, Some(parent));
                for (arg, val) in args.iter().zip(vals) {
                    write_slot(&frame, arg.kind, arg.index, val);
                }
                exec.stack.push((**info).clone().at(*line_col));
                let res = run_seq(body, &frame, exec);
                exec.stack.pop();
                res?;
                exec.values.ref_value = RefValue::Frame(frame);
                Ok(())
            }
            Instruction::InvokeBuiltin {
                recv,
                recv_kind,
                ret_kind,
                method,
                args,
                line_col,
            } => {
                recv.execute(ctx, exec)?;
                let recv_val = read_holder(exec, *recv_kind);
                let mut vals = Vec::with_capacity(args.len());
                for arg in args {
                    arg.inst.execute(ctx, exec)?;
                    vals.push(read_holder(exec, arg.kind));
                }
                execute_builtin(*method, recv_val, vals, *ret_kind, exec, *line_col)
            }
            Instruction::NewCollection {
                kind,
                capacity,
                line_col,
            } => {
                capacity.execute(ctx, exec)?;
                let n = exec.values.int_value;
                if n < 0 {
                    return Err(exec.raise(format!("negative capacity: {}", n), *line_col));
                }
                let n = n as usize;
                exec.values.ref_value = match kind {
                    CollNew::List(elem) => {
                        RefValue::List(Rc::new(RefCell::new(new_list(*elem, n))))
                    }
                    CollNew::Set(key) => RefValue::Set(Rc::new(RefCell::new(new_set(*key, n)))),
                    CollNew::Map(key) => RefValue::Map(Rc::new(RefCell::new(new_map(*key, n)))),
                };
                Ok(())
            }
            Instruction::ConsoleLog { arg } => {
                let s = eval_string(arg, ctx, exec)?;
                (exec.output)(&s);
                Ok(())
            }
        }
    }
}

fn new_list(elem: StorageKind, capacity: usize) -> ListValue {
    match elem {
        StorageKind::Int => ListValue::Ints(Vec::with_capacity(capacity)),
        StorageKind::Long => ListValue::Longs(Vec::with_capacity(capacity)),
        StorageKind::Float => ListValue::Floats(Vec::with_capacity(capacity)),
        StorageKind::Double => ListValue::Doubles(Vec::with_capacity(capacity)),
        StorageKind::Bool => ListValue::Bools(Vec::with_capacity(capacity)),
        StorageKind::Ref => ListValue::Refs(Vec::with_capacity(capacity)),
    }
}

fn new_set(key: KeyKind, capacity: usize) -> SetValue {
    match key {
        KeyKind::Int => SetValue::Ints {
            order: Vec::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
        },
        KeyKind::Long => SetValue::Longs {
            order: Vec::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
        },
        KeyKind::Bool => SetValue::Bools {
            order: Vec::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
        },
        KeyKind::Str => SetValue::Strs {
            order: Vec::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
        },
    }
}

fn new_map(key: KeyKind, capacity: usize) -> MapValue {
    match key {
        KeyKind::Int => MapValue::Ints {
            order: Vec::with_capacity(capacity),
            map: HashMap::with_capacity(capacity),
        },
        KeyKind::Long => MapValue::Longs {
            order: Vec::with_capacity(capacity),
            map: HashMap::with_capacity(capacity),
        },
        KeyKind::Bool => MapValue::Bools {
            order: Vec::with_capacity(capacity),
            map: HashMap::with_capacity(capacity),
        },
        KeyKind::Str => MapValue::Strs {
            order: Vec::with_capacity(capacity),
            map: HashMap::with_capacity(capacity),
        },
    }
}

fn expect_str(
    recv: &Val,
    exec: &Execution,
    line_col: LineCol,
) -> std::result::Result<Rc<str>, Rc<ErrorValue>> {
    match recv {
        Val::Ref(RefValue::Str(s)) => Ok(s.clone()),
        Val::Ref(RefValue::Null) => Err(exec.raise("method call on null", line_col)),
        _ => Err(exec.raise("internal: receiver type mismatch", line_col)),
    }
}

macro_rules! expect_recv {
    ($name:ident, $variant:ident, $inner:ty) => {
        fn $name(
            recv: &Val,
            exec: &Execution,
            line_col: LineCol,
        ) -> std::result::Result<Rc<RefCell<$inner>>, Rc<ErrorValue>> {
            match recv {
                Val::Ref(RefValue::$variant(v)) => Ok(v.clone()),
                Val::Ref(RefValue::Null) => Err(exec.raise("method call on null", line_col)),
                _ => Err(exec.raise("internal: receiver type mismatch", line_col)),
            }
        }
    };
}

expect_recv!(expect_list, List, ListValue);
expect_recv!(expect_set, Set, SetValue);
expect_recv!(expect_map, Map, MapValue);
expect_recv!(expect_iter, Iter, IterValue);

fn expect_error(
    recv: &Val,
    exec: &Execution,
    line_col: LineCol,
) -> std::result::Result<Rc<ErrorValue>, Rc<ErrorValue>> {
    match recv {
        Val::Ref(RefValue::Error(e)) => Ok(e.clone()),
        Val::Ref(RefValue::Null) => Err(exec.raise("method call on null", line_col)),
        _ => Err(exec.raise("internal: receiver type mismatch", line_col)),
    }
}

fn want_int(
    args: &[Val],
    i: usize,
    exec: &Execution,
    line_col: LineCol,
) -> std::result::Result<i32, Rc<ErrorValue>> {
    match args.get(i) {
        Some(Val::Int(v)) => Ok(*v),
        _ => Err(exec.raise("internal: argument type mismatch", line_col)),
    }
}

fn want_str(
    args: &[Val],
    i: usize,
    exec: &Execution,
    line_col: LineCol,
) -> std::result::Result<Rc<str>, Rc<ErrorValue>> {
    match args.get(i) {
        Some(Val::Ref(RefValue::Str(s))) => Ok(s.clone()),
        Some(Val::Ref(RefValue::Null)) => Err(exec.raise("string argument is null", line_col)),
        _ => Err(exec.raise("internal: argument type mismatch", line_col)),
    }
}

fn want_any(
    args: &[Val],
    i: usize,
    exec: &Execution,
    line_col: LineCol,
) -> std::result::Result<Val, Rc<ErrorValue>> {
    args.get(i)
        .cloned()
        .ok_or_else(|| exec.raise("internal: missing argument", line_col))
}

fn hold_str(exec: &mut Execution, s: String) {
    exec.values.ref_value = RefValue::Str(Rc::from(s));
}

fn execute_builtin(
    method: BuiltinMethod,
    recv: Val,
    args: Vec<Val>,
    ret_kind: StorageKind,
    exec: &mut Execution,
    lc: LineCol,
) -> ExecRes {
    use BuiltinMethod::*;
    match method {
        IntToString | LongToString | FloatToString | DoubleToString | BoolToString => {
            hold_str(exec, recv.display());
            Ok(())
        }
        IntToLong | FloatToLong | DoubleToLong => {
            exec.values.long_value = match recv {
                Val::Int(v) => v as i64,
                Val::Float(v) => v as i64,
                Val::Double(v) => v as i64,
                _ => 0,
            };
            Ok(())
        }
        LongToInt | FloatToInt | DoubleToInt => {
            exec.values.int_value = match recv {
                Val::Long(v) => v as i32,
                Val::Float(v) => v as i32,
                Val::Double(v) => v as i32,
                _ => 0,
            };
            Ok(())
        }
        IntToFloat | LongToFloat | DoubleToFloat => {
            exec.values.float_value = match recv {
                Val::Int(v) => v as f32,
                Val::Long(v) => v as f32,
                Val::Double(v) => v as f32,
                _ => 0.0,
            };
            Ok(())
        }
        IntToDouble | LongToDouble | FloatToDouble => {
            exec.values.double_value = match recv {
                Val::Int(v) => v as f64,
                Val::Long(v) => v as f64,
                Val::Float(v) => v as f64,
                _ => 0.0,
            };
            Ok(())
        }
        StrToString => {
            let s = expect_str(&recv, exec, lc)?;
            exec.values.ref_value = RefValue::Str(s);
            Ok(())
        }
        StrLength => {
            let s = expect_str(&recv, exec, lc)?;
            exec.values.int_value = s.chars().count() as i32;
            Ok(())
        }
        StrSubstring => {
            let s = expect_str(&recv, exec, lc)?;
            let start = want_int(&args, 0, exec, lc)?;
            let end = want_int(&args, 1, exec, lc)?;
            let len = s.chars().count() as i32;
            if start < 0 || end < start || end > len {
                return Err(exec.raise(
                    format!("substring range out of bounds: {}..{}", start, end),
                    lc,
                ));
            }
            let sub: String = s
                .chars()
                .skip(start as usize)
                .take((end - start) as usize)
                .collect();
            hold_str(exec, sub);
            Ok(())
        }
        StrIndexOf => {
            let s = expect_str(&recv, exec, lc)?;
            let needle = want_str(&args, 0, exec, lc)?;
            exec.values.int_value = match s.find(needle.as_ref()) {
                Some(off) => s[..off].chars().count() as i32,
                None => -1,
            };
            Ok(())
        }
        StrContains => {
            let s = expect_str(&recv, exec, lc)?;
            let needle = want_str(&args, 0, exec, lc)?;
            exec.values.bool_value = s.contains(needle.as_ref());
            Ok(())
        }
        StrStartsWith => {
            let s = expect_str(&recv, exec, lc)?;
            let prefix = want_str(&args, 0, exec, lc)?;
            exec.values.bool_value = s.starts_with(prefix.as_ref());
            Ok(())
        }
        StrEndsWith => {
            let s = expect_str(&recv, exec, lc)?;
            let suffix = want_str(&args, 0, exec, lc)?;
            exec.values.bool_value = s.ends_with(suffix.as_ref());
            Ok(())
        }
        StrTrim => {
            let s = expect_str(&recv, exec, lc)?;
            hold_str(exec, s.trim().to_string());
            Ok(())
        }
        ErrorMessage | ErrorToString => {
            let e = expect_error(&recv, exec, lc)?;
            hold_str(exec, e.message.clone());
            Ok(())
        }
        ListAdd => {
            let list = expect_list(&recv, exec, lc)?;
            let val = want_any(&args, 0, exec, lc)?;
            list.borrow_mut().add(val);
            Ok(())
        }
        ListGet => {
            let list = expect_list(&recv, exec, lc)?;
            let i = want_int(&args, 0, exec, lc)?;
            let val = if i >= 0 {
                list.borrow().get(i as usize)
            } else {
                None
            };
            match val {
                Some(v) => {
                    hold_val(exec, v);
                    Ok(())
                }
                None => Err(exec.raise(format!("list index out of bounds: {}", i), lc)),
            }
        }
        ListSet => {
            let list = expect_list(&recv, exec, lc)?;
            let i = want_int(&args, 0, exec, lc)?;
            let val = want_any(&args, 1, exec, lc)?;
            if i < 0 || !list.borrow_mut().set(i as usize, val) {
                return Err(exec.raise(format!("list index out of bounds: {}", i), lc));
            }
            Ok(())
        }
        ListInsert => {
            let list = expect_list(&recv, exec, lc)?;
            let i = want_int(&args, 0, exec, lc)?;
            let val = want_any(&args, 1, exec, lc)?;
            if i < 0 || !list.borrow_mut().insert(i as usize, val) {
                return Err(exec.raise(format!("list index out of bounds: {}", i), lc));
            }
            Ok(())
        }
        ListRemoveAt => {
            let list = expect_list(&recv, exec, lc)?;
            let i = want_int(&args, 0, exec, lc)?;
            let val = if i >= 0 {
                list.borrow_mut().remove_at(i as usize)
            } else {
                None
            };
            match val {
                Some(v) => {
                    hold_val(exec, v);
                    Ok(())
                }
                None => Err(exec.raise(format!("list index out of bounds: {}", i), lc)),
            }
        }
        ListIndexOf => {
            let list = expect_list(&recv, exec, lc)?;
            let val = want_any(&args, 0, exec, lc)?;
            exec.values.int_value = list.borrow().index_of(&val);
            Ok(())
        }
        ListContains => {
            let list = expect_list(&recv, exec, lc)?;
            let val = want_any(&args, 0, exec, lc)?;
            exec.values.bool_value = list.borrow().contains(&val);
            Ok(())
        }
        ListSize => {
            let list = expect_list(&recv, exec, lc)?;
            exec.values.int_value = list.borrow().len() as i32;
            Ok(())
        }
        ListIterator => {
            let list = expect_list(&recv, exec, lc)?;
            exec.values.ref_value = RefValue::Iter(Rc::new(RefCell::new(IterValue::List {
                source: list,
                pos: 0,
            })));
            Ok(())
        }
        ListToString => {
            let list = expect_list(&recv, exec, lc)?;
            let s = list.borrow().display();
            hold_str(exec, s);
            Ok(())
        }
        SetAdd => {
            let set = expect_set(&recv, exec, lc)?;
            let val = want_any(&args, 0, exec, lc)?;
            exec.values.bool_value = set.borrow_mut().add(val);
            Ok(())
        }
        SetRemove => {
            let set = expect_set(&recv, exec, lc)?;
            let val = want_any(&args, 0, exec, lc)?;
            exec.values.bool_value = set.borrow_mut().remove(&val);
            Ok(())
        }
        SetContains => {
            let set = expect_set(&recv, exec, lc)?;
            let val = want_any(&args, 0, exec, lc)?;
            exec.values.bool_value = set.borrow().contains(&val);
            Ok(())
        }
        SetSize => {
            let set = expect_set(&recv, exec, lc)?;
            exec.values.int_value = set.borrow().len() as i32;
            Ok(())
        }
        SetIterator => {
            let set = expect_set(&recv, exec, lc)?;
            exec.values.ref_value = RefValue::Iter(Rc::new(RefCell::new(IterValue::Set {
                source: set,
                pos: 0,
            })));
            Ok(())
        }
        SetToString => {
            let set = expect_set(&recv, exec, lc)?;
            let s = set.borrow().display();
            hold_str(exec, s);
            Ok(())
        }
        MapGet => {
            let map = expect_map(&recv, exec, lc)?;
            let key = want_any(&args, 0, exec, lc)?;
            let found = map.borrow().get(&key);
            match found {
                Some(v) => {
                    hold_val(exec, v);
                    Ok(())
                }
                None if ret_kind == StorageKind::Ref => {
                    exec.values.ref_value = RefValue::Null;
                    Ok(())
                }
                None => Err(exec.raise(format!("no such key: {}", key.display()), lc)),
            }
        }
        MapPut => {
            let map = expect_map(&recv, exec, lc)?;
            let key = want_any(&args, 0, exec, lc)?;
            let val = want_any(&args, 1, exec, lc)?;
            map.borrow_mut().put(key, val);
            Ok(())
        }
        MapRemove => {
            let map = expect_map(&recv, exec, lc)?;
            let key = want_any(&args, 0, exec, lc)?;
            map.borrow_mut().remove(&key);
            Ok(())
        }
        MapContainsKey => {
            let map = expect_map(&recv, exec, lc)?;
            let key = want_any(&args, 0, exec, lc)?;
            exec.values.bool_value = map.borrow().contains_key(&key);
            Ok(())
        }
        MapSize => {
            let map = expect_map(&recv, exec, lc)?;
            exec.values.int_value = map.borrow().len() as i32;
            Ok(())
        }
        MapKeys => {
            let map = expect_map(&recv, exec, lc)?;
            let keys = map.borrow().keys();
            exec.values.ref_value = RefValue::Set(Rc::new(RefCell::new(keys)));
            Ok(())
        }
        MapValues(kind) => {
            let map = expect_map(&recv, exec, lc)?;
            let vals = map.borrow().values();
            let mut list = new_list(kind, vals.len());
            for v in vals {
                list.add(v);
            }
            exec.values.ref_value = RefValue::List(Rc::new(RefCell::new(list)));
            Ok(())
        }
        MapToString => {
            let map = expect_map(&recv, exec, lc)?;
            let s = map.borrow().display();
            hold_str(exec, s);
            Ok(())
        }
        IterHasNext => {
            let iter = expect_iter(&recv, exec, lc)?;
            exec.values.bool_value = iter.borrow().has_next();
            Ok(())
        }
        IterNext => {
            let iter = expect_iter(&recv, exec, lc)?;
            let val = iter.borrow_mut().next();
            match val {
                Some(v) => {
                    hold_val(exec, v);
                    Ok(())
                }
                None => Err(exec.raise("iterator has no more elements", lc)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec() -> Execution {
        Execution::new(Box::new(|_| {}))
    }

    fn frame(ints: usize, refs: usize) -> Ctx {
        ActionContext::new_ctx(
            RuntimeMemoryTotal {
                ints,
                refs,
                ..Default::default()
            },
            None,
        )
    }

    #[test]
    fn arithmetic_and_registers() {
        let ctx = frame(1, 0);
        let mut ex = exec();
        // x = 2 * 3 + 4
        let inst = Instruction::IntOp(MemOp::Set {
            depth: 0,
            index: 0,
            value: Box::new(Instruction::IntCalc(NumCalc::Bin {
                op: ArithOp::Add,
                left: Box::new(Instruction::IntCalc(NumCalc::Bin {
                    op: ArithOp::Mul,
                    left: Box::new(Instruction::IntOp(MemOp::Literal(2))),
                    right: Box::new(Instruction::IntOp(MemOp::Literal(3))),
                    line_col: LineCol::EMPTY,
                })),
                right: Box::new(Instruction::IntOp(MemOp::Literal(4))),
                line_col: LineCol::EMPTY,
            })),
        });
        inst.execute(&ctx, &mut ex).unwrap();
        assert_eq!(ctx.borrow().ints[0], 10);
    }

    #[test]
    fn divide_by_zero_raises() {
        let ctx = frame(0, 0);
        let mut ex = exec();
        let inst = Instruction::IntCalc(NumCalc::Bin {
            op: ArithOp::Div,
            left: Box::new(Instruction::IntOp(MemOp::Literal(1))),
            right: Box::new(Instruction::IntOp(MemOp::Literal(0))),
            line_col: LineCol::new(3, 5),
        });
        let err = inst.execute(&ctx, &mut ex).unwrap_err();
        assert_eq!(err.message, "divide by zero");
        assert_eq!(err.line_col, LineCol::new(3, 5));
    }

    #[test]
    fn while_loop_with_break() {
        // x = 0; while true { x += 1; if x >= 3 break }
        let ctx = frame(1, 0);
        let mut ex = exec();
        let body = vec![
            Instruction::IntOp(MemOp::Set {
                depth: 0,
                index: 0,
                value: Box::new(Instruction::IntCalc(NumCalc::Bin {
                    op: ArithOp::Add,
                    left: Box::new(Instruction::IntOp(MemOp::Get { depth: 0, index: 0 })),
                    right: Box::new(Instruction::IntOp(MemOp::Literal(1))),
                    line_col: LineCol::EMPTY,
                })),
            }),
            Instruction::If {
                cond: Box::new(Instruction::IntCalc(NumCalc::Cmp {
                    op: CmpOp::Ge,
                    left: Box::new(Instruction::IntOp(MemOp::Get { depth: 0, index: 0 })),
                    right: Box::new(Instruction::IntOp(MemOp::Literal(3))),
                })),
                then: vec![Instruction::Break],
                else_: vec![],
            },
        ];
        let inst = Instruction::While {
            cond: Box::new(Instruction::BoolOp(MemOp::Literal(true))),
            body,
        };
        inst.execute(&ctx, &mut ex).unwrap();
        assert_eq!(ctx.borrow().ints[0], 3);
        assert!(!ctx.borrow().break_flag);
    }

    #[test]
    fn error_handling_binds_the_error() {
        let ctx = frame(0, 1);
        let mut ex = exec();
        let inst = Instruction::ErrorHandling {
            try_: vec![Instruction::Throw {
                value: Box::new(Instruction::StrLiteral(Rc::from("boom"))),
                is_message: true,
                line_col: LineCol::new(1, 1),
            }],
            err_index: 0,
            error: vec![],
            success: vec![Instruction::BoolOp(MemOp::Literal(true))],
        };
        ex.values.bool_value = false;
        inst.execute(&ctx, &mut ex).unwrap();
        assert!(!ex.values.bool_value);
        let refs = ctx.borrow();
        match &refs.refs[0] {
            RefValue::Error(e) => assert_eq!(e.message, "boom"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn closure_reads_the_captured_frame() {
        // global: x at int[0], f at ref[0]; f() returns x
        let ctx = frame(1, 1);
        ctx.borrow_mut().ints[0] = 7;
        let mut ex = exec();
        let def = Instruction::FuncDef {
            index: 0,
            total: RuntimeMemoryTotal::default(),
            body: Rc::new(vec![Instruction::Return {
                value: Some(Box::new(Instruction::IntOp(MemOp::Get {
                    depth: 1,
                    index: 0,
                }))),
            }]),
            info: Rc::new(StackInfo::new("", "f", LineCol::EMPTY)),
        };
        def.execute(&ctx, &mut ex).unwrap();
        let call = Instruction::Invoke {
            target: Box::new(Instruction::RefGet { depth: 0, index: 0 }),
            args: vec![],
            line_col: LineCol::EMPTY,
        };
        call.execute(&ctx, &mut ex).unwrap();
        assert_eq!(ex.values.int_value, 7);
    }

    #[test]
    fn builtin_list_roundtrip() {
        let ctx = frame(0, 0);
        let mut ex = exec();
        Instruction::NewCollection {
            kind: CollNew::List(StorageKind::Int),
            capacity: Box::new(Instruction::IntOp(MemOp::Literal(4))),
            line_col: LineCol::EMPTY,
        }
        .execute(&ctx, &mut ex)
        .unwrap();
        let list = ex.values.ref_value.clone();
        for v in [5, 6] {
            Instruction::InvokeBuiltin {
                recv: Box::new(Instruction::StrLiteral(Rc::from(""))),
                recv_kind: StorageKind::Ref,
                ret_kind: StorageKind::Ref,
                method: BuiltinMethod::ListAdd,
                args: vec![ArgIns {
                    kind: StorageKind::Int,
                    inst: Instruction::IntOp(MemOp::Literal(v)),
                }],
                line_col: LineCol::EMPTY,
            };
            // drive through the dispatcher directly to reuse the handle
            execute_builtin(
                BuiltinMethod::ListAdd,
                Val::Ref(list.clone()),
                vec![Val::Int(v)],
                StorageKind::Ref,
                &mut ex,
                LineCol::EMPTY,
            )
            .unwrap();
        }
        execute_builtin(
            BuiltinMethod::ListToString,
            Val::Ref(list),
            vec![],
            StorageKind::Ref,
            &mut ex,
            LineCol::EMPTY,
        )
        .unwrap();
        match &ex.values.ref_value {
            RefValue::Str(s) => assert_eq!(s.as_ref(), "[5, 6]"),
            other => panic!("expected string, got {:?}", other),
        }
    }
}
