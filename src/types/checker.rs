//! The type checker. Single pass: checking an expression or statement also
//! lowers it to instructions, so a checked program is a runnable program.

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use crate::error::{Error, LineCol, Result, StackInfo};
use crate::parser::ast::{
    BinOpKind, Expr, JsonArg, Modifiers, Param, Statement, Type, UnaryOpKind,
};
use crate::runtime::explorer::{ExplorerVar, MemoryExplorer};
use crate::runtime::instruction::{
    ArgIns, ArgSet, ArithOp, CmpOp, CollNew, Instruction, KeyKind, MemOp, NumCalc,
};

use super::builtins::{self, valid_key_type};
use super::context::{ScopeKind, TypeContext, Variable};
use super::{
    ArrayType, BuiltinTemplateKind, ClassField, ClassType, CollType, FunctionDescriptor,
    MapType, ParamInfo, RuntimeMemoryTotal, StorageKind, TemplateType, TypeInstance,
};

/// A checked expression: its type, and the instruction computing it.
pub struct TypedExpr {
    pub typ: TypeInstance,
    pub inst: Instruction,
}

/// A checked program, ready to execute against a root frame of shape
/// `total`.
#[derive(Debug)]
pub struct CompiledProgram {
    pub instructions: Vec<Instruction>,
    pub total: RuntimeMemoryTotal,
    pub explorer: Rc<MemoryExplorer>,
}

/// An assignment target, resolved to a store location.
enum Lv {
    Var {
        kind: StorageKind,
        depth: usize,
        index: usize,
    },
    Field {
        kind: StorageKind,
        target: Instruction,
        index: usize,
        line_col: LineCol,
    },
    Index {
        kind: StorageKind,
        arr: Instruction,
        index: Instruction,
        line_col: LineCol,
    },
}

pub struct Checker {
    ctx: TypeContext,
}

impl Default for Checker {
    fn default() -> Self {
        Checker::new()
    }
}

impl Checker {
    pub fn new() -> Self {
        Checker {
            ctx: TypeContext::new(),
        }
    }

    /// The scope context; providers and host bindings install through it
    /// before checking starts.
    pub fn context_mut(&mut self) -> &mut TypeContext {
        &mut self.ctx
    }

    /// Checks a whole document, producing the executable program.
    pub fn check_program(&mut self, stmts: &[Statement]) -> Result<CompiledProgram> {
        debug!(statements = stmts.len(), "type checking program");
        let instructions = self.check_statements(stmts)?;
        let global = self.ctx.current_scope();
        Ok(CompiledProgram {
            instructions,
            total: self.ctx.total_of(global),
            explorer: self.build_explorer(global),
        })
    }

    fn check_statements(&mut self, stmts: &[Statement]) -> Result<Vec<Instruction>> {
        let mut insts = Vec::with_capacity(stmts.len());
        let mut done = false;
        for stmt in stmts {
            if done {
                return Err(Error::type_error("unreachable statement", stmt.line_col()));
            }
            insts.push(self.check_statement(stmt)?);
            if terminates(stmt) {
                done = true;
            }
        }
        Ok(insts)
    }

    fn check_statement(&mut self, stmt: &Statement) -> Result<Instruction> {
        match stmt {
            Statement::Expr(e) => Ok(self.check_expr(e, None)?.inst),
            Statement::VariableDefinition {
                name,
                value,
                modifiers,
                line_col,
            } => {
                let te = self.check_expr(value, None)?;
                match te.typ {
                    TypeInstance::Void => {
                        return Err(Error::type_error(
                            "cannot define a variable from a void expression",
                            *line_col,
                        ))
                    }
                    TypeInstance::Null => {
                        return Err(Error::type_error(
                            "cannot infer a type from null, use a typed null",
                            *line_col,
                        ))
                    }
                    _ => {}
                }
                let var = self
                    .ctx
                    .declare_var(name, te.typ, *modifiers, *line_col)?;
                Ok(set_var_inst(var.kind, 0, var.index, te.inst))
            }
            Statement::FunctionDefinition {
                name,
                params,
                return_type,
                body,
                modifiers,
                line_col,
            } => self.check_function(name, params, return_type, body, *modifiers, *line_col),
            Statement::ClassDefinition {
                name, params, body, ..
            } => {
                self.check_class(name, params, body, stmt.line_col())?;
                Ok(Instruction::NoOp)
            }
            Statement::TemplateClassDefinition {
                type_params,
                name,
                params,
                body,
                line_col,
                ..
            } => {
                let template = Rc::new(TemplateType {
                    name: name.clone(),
                    type_params: type_params.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    def_scope: self.ctx.current_scope(),
                    def_depth: self.ctx.mem_depth(),
                });
                self.ctx
                    .declare_type(name, TypeInstance::Template(template), *line_col)?;
                Ok(Instruction::NoOp)
            }
            Statement::TemplateTypeInstantiation {
                alias,
                template,
                args,
                line_col,
            } => {
                self.check_instantiation(alias, template, args, *line_col)?;
                Ok(Instruction::NoOp)
            }
            Statement::For {
                init,
                cond,
                incr,
                body,
                line_col,
            } => {
                self.ctx.push_block(ScopeKind::Loop);
                let mut init_insts = Vec::with_capacity(init.len());
                for s in init {
                    init_insts.push(self.check_statement(s)?);
                }
                let cond = self.check_bool(cond, *line_col)?;
                self.ctx.push_block(ScopeKind::Block);
                let body = self.check_statements(body)?;
                self.ctx.pop();
                let mut incr_insts = Vec::with_capacity(incr.len());
                for s in incr {
                    incr_insts.push(self.check_statement(s)?);
                }
                self.ctx.pop();
                Ok(Instruction::For {
                    init: init_insts,
                    cond: Box::new(cond),
                    incr: incr_insts,
                    body,
                })
            }
            Statement::While {
                cond,
                body,
                line_col,
            } => {
                let cond = self.check_bool(cond, *line_col)?;
                self.ctx.push_block(ScopeKind::Loop);
                let body = self.check_statements(body)?;
                self.ctx.pop();
                Ok(Instruction::While {
                    cond: Box::new(cond),
                    body,
                })
            }
            Statement::If {
                cond,
                then,
                else_,
                line_col,
            } => {
                let cond = self.check_bool(cond, *line_col)?;
                self.ctx.push_block(ScopeKind::Block);
                let then = self.check_statements(then)?;
                self.ctx.pop();
                self.ctx.push_block(ScopeKind::Block);
                let else_ = self.check_statements(else_)?;
                self.ctx.pop();
                Ok(Instruction::If {
                    cond: Box::new(cond),
                    then,
                    else_,
                })
            }
            Statement::Break { line_col } => {
                if !self.ctx.in_loop() {
                    return Err(Error::type_error("'break' outside of a loop", *line_col));
                }
                Ok(Instruction::Break)
            }
            Statement::Continue { line_col } => {
                if !self.ctx.in_loop() {
                    return Err(Error::type_error(
                        "'continue' outside of a loop",
                        *line_col,
                    ));
                }
                Ok(Instruction::Continue)
            }
            Statement::Return { value, line_col } => {
                let ret = self.ctx.function_ret().ok_or_else(|| {
                    Error::type_error("'return' outside of a function", *line_col)
                })?;
                match (value, ret) {
                    (None, TypeInstance::Void) => Ok(Instruction::Return { value: None }),
                    (Some(_), TypeInstance::Void) => Err(Error::type_error(
                        "cannot return a value from a void function",
                        *line_col,
                    )),
                    (None, ret) => Err(Error::type_error(
                        format!("missing return value, expected {}", ret),
                        *line_col,
                    )),
                    (Some(value), ret) => {
                        let te = self.check_expr(value, Some(&ret))?;
                        if !te.typ.assignable_to(&ret) {
                            return Err(Error::type_error(
                                format!("cannot return {}, expected {}", te.typ, ret),
                                *line_col,
                            ));
                        }
                        Ok(Instruction::Return {
                            value: Some(Box::new(te.inst)),
                        })
                    }
                }
            }
            Statement::Throw { value, line_col } => match value {
                None => {
                    let (var, depth) = self
                        .ctx
                        .lookup_var("err")
                        .filter(|(v, _)| v.typ == TypeInstance::Error)
                        .ok_or_else(|| {
                            Error::type_error("no error to rethrow", *line_col)
                        })?;
                    Ok(Instruction::Throw {
                        value: Box::new(get_var_inst(StorageKind::Ref, depth, var.index)),
                        is_message: false,
                        line_col: *line_col,
                    })
                }
                Some(value) => {
                    let te = self.check_expr(value, None)?;
                    let is_message = match te.typ {
                        TypeInstance::Str => true,
                        TypeInstance::Error => false,
                        other => {
                            return Err(Error::type_error(
                                format!("can only throw a string or an error, got {}", other),
                                *line_col,
                            ))
                        }
                    };
                    Ok(Instruction::Throw {
                        value: Box::new(te.inst),
                        is_message,
                        line_col: *line_col,
                    })
                }
            },
            Statement::ErrorHandling {
                try_,
                error,
                success,
                line_col,
            } => {
                // the guarded statements stay in the enclosing region, so
                // their variables survive the construct; only `err` is
                // confined to the error branch
                let try_ = self.check_statements(try_)?;
                self.ctx.push_block(ScopeKind::Block);
                let err_var = self.ctx.declare_var(
                    "err",
                    TypeInstance::Error,
                    Modifiers::empty().with(Modifiers::CONST),
                    *line_col,
                )?;
                let error = self.check_statements(error)?;
                self.ctx.pop();
                self.ctx.push_block(ScopeKind::Block);
                let success = self.check_statements(success)?;
                self.ctx.pop();
                Ok(Instruction::ErrorHandling {
                    try_,
                    err_index: err_var.index,
                    error,
                    success,
                })
            }
        }
    }

    fn check_function(
        &mut self,
        name: &str,
        params: &[Param],
        return_type: &Type,
        body: &[Statement],
        modifiers: Modifiers,
        line_col: LineCol,
    ) -> Result<Instruction> {
        let ret = self.resolve_type(return_type)?;
        let param_infos = self.resolve_params(params)?;
        // plain access invokes with no arguments, so there is nothing to
        // fill the parameters with
        if modifiers.is_executable() && !param_infos.is_empty() {
            return Err(Error::type_error(
                format!("executable function '{}' cannot take parameters", name),
                line_col,
            ));
        }
        let desc = Rc::new(FunctionDescriptor {
            params: param_infos.clone(),
            ret: ret.clone(),
            total: Cell::new(RuntimeMemoryTotal::default()),
        });
        let var = self.ctx.declare_var(
            name,
            TypeInstance::Func(desc.clone()),
            modifiers,
            line_col,
        )?;
        let type_name = self
            .ctx
            .enclosing_class()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        self.ctx.push_frame(ScopeKind::Function { ret: ret.clone() });
        for info in &param_infos {
            self.ctx
                .declare_var(&info.name, info.typ.clone(), Modifiers::empty(), line_col)?;
        }
        let insts = self.check_statements(body)?;
        if ret != TypeInstance::Void && !block_returns(body) {
            return Err(Error::type_error(
                format!("function '{}' may finish without returning {}", name, ret),
                line_col,
            ));
        }
        let scope = self.ctx.current_scope();
        let total = self.ctx.total_of(scope);
        desc.total.set(total);
        self.ctx.pop();
        Ok(Instruction::FuncDef {
            index: var.index,
            total,
            body: Rc::new(insts),
            info: Rc::new(StackInfo::new(type_name, name, line_col)),
        })
    }

    /// Checks a class body and registers the class under `name` in the
    /// current scope. Shared between plain classes and template
    /// instantiations.
    fn check_class(
        &mut self,
        name: &str,
        params: &[Param],
        body: &[Statement],
        line_col: LineCol,
    ) -> Result<Rc<ClassType>> {
        let class = Rc::new(ClassType {
            name: name.to_string(),
            params: std::cell::RefCell::new(Vec::new()),
            fields: std::cell::RefCell::new(Vec::new()),
            total: std::cell::RefCell::new(RuntimeMemoryTotal::default()),
            body: std::cell::RefCell::new(Rc::new(Vec::new())),
            def_depth: self.ctx.mem_depth(),
            explorer: std::cell::RefCell::new(None),
        });
        // declared before the parameters resolve so fields may refer to the
        // class itself
        self.ctx
            .declare_type(name, TypeInstance::Class(class.clone()), line_col)?;
        let param_infos = self.resolve_params(params)?;
        *class.params.borrow_mut() = param_infos.clone();
        self.ctx.push_frame(ScopeKind::Class {
            class: class.clone(),
        });
        for info in &param_infos {
            self.ctx
                .declare_var(&info.name, info.typ.clone(), Modifiers::empty(), line_col)?;
        }
        let insts = self.check_statements(body)?;
        let scope = self.ctx.current_scope();
        let vars = self.ctx.vars_of(scope);
        *class.fields.borrow_mut() = vars
            .iter()
            .map(|v| ClassField {
                name: v.name.clone(),
                typ: v.typ.clone(),
                kind: v.kind,
                index: v.index,
                modifiers: v.modifiers,
            })
            .collect();
        *class.total.borrow_mut() = self.ctx.total_of(scope);
        *class.body.borrow_mut() = Rc::new(insts);
        *class.explorer.borrow_mut() = Some(self.build_explorer(scope));
        self.ctx.pop();
        Ok(class)
    }

    fn check_instantiation(
        &mut self,
        alias: &str,
        template: &Type,
        args: &[Type],
        line_col: LineCol,
    ) -> Result<()> {
        let t = self.ctx.lookup_type(&template.name).ok_or_else(|| {
            Error::type_error(
                format!("type not found: {}", template.name),
                template.line_col,
            )
        })?;
        let resolved: Vec<TypeInstance> = args
            .iter()
            .map(|a| self.resolve_type(a))
            .collect::<Result<_>>()?;
        let typ = match t {
            TypeInstance::BuiltinTemplate(kind) => {
                let expected = if kind == BuiltinTemplateKind::Map { 2 } else { 1 };
                if resolved.len() != expected {
                    return Err(Error::type_error(
                        format!(
                            "{} takes {} type argument(s), got {}",
                            template.name,
                            expected,
                            resolved.len()
                        ),
                        line_col,
                    ));
                }
                match kind {
                    BuiltinTemplateKind::List => {
                        TypeInstance::List(Rc::new(CollType::new(resolved[0].clone())))
                    }
                    BuiltinTemplateKind::Set => {
                        if !valid_key_type(&resolved[0]) {
                            return Err(Error::type_error(
                                "set elements must be int, long, bool or string",
                                line_col,
                            ));
                        }
                        TypeInstance::Set(Rc::new(CollType::new(resolved[0].clone())))
                    }
                    BuiltinTemplateKind::Map => {
                        if !valid_key_type(&resolved[0]) {
                            return Err(Error::type_error(
                                "map keys must be int, long, bool or string",
                                line_col,
                            ));
                        }
                        TypeInstance::Map(Rc::new(MapType::new(
                            resolved[0].clone(),
                            resolved[1].clone(),
                        )))
                    }
                    BuiltinTemplateKind::Iterator => {
                        TypeInstance::Iterator(Rc::new(CollType::new(resolved[0].clone())))
                    }
                }
            }
            TypeInstance::Template(tmpl) => {
                if resolved.len() != tmpl.type_params.len() {
                    return Err(Error::type_error(
                        format!(
                            "{} takes {} type argument(s), got {}",
                            tmpl.name,
                            tmpl.type_params.len(),
                            resolved.len()
                        ),
                        line_col,
                    ));
                }
                // the instantiation is checked in the template's defining
                // scope, with the type parameters bound
                let prev = self.ctx.enter(tmpl.def_scope);
                self.ctx.push_block(ScopeKind::Block);
                let mut declare = || -> Result<Rc<ClassType>> {
                    for (param, arg) in tmpl.type_params.iter().zip(&resolved) {
                        self.ctx.declare_type(param, arg.clone(), line_col)?;
                    }
                    self.check_class(alias, &tmpl.params, &tmpl.body, line_col)
                };
                let class = declare();
                self.ctx.pop();
                self.ctx.enter(prev);
                TypeInstance::Class(class?)
            }
            other => {
                return Err(Error::type_error(
                    format!("{} is not a template type", other),
                    line_col,
                ))
            }
        };
        self.ctx.declare_type(alias, typ, line_col)
    }

    fn check_bool(&mut self, cond: &Expr, line_col: LineCol) -> Result<Instruction> {
        let te = self.check_expr(cond, Some(&TypeInstance::Bool))?;
        if te.typ != TypeInstance::Bool {
            return Err(Error::type_error(
                format!("condition must be bool, got {}", te.typ),
                line_col,
            ));
        }
        Ok(te.inst)
    }

    fn check_expr(&mut self, expr: &Expr, hint: Option<&TypeInstance>) -> Result<TypedExpr> {
        match expr {
            Expr::IntLiteral { value, .. } => Ok(match hint {
                Some(TypeInstance::Long) => typed(
                    TypeInstance::Long,
                    Instruction::LongOp(MemOp::Literal(*value as i64)),
                ),
                Some(TypeInstance::Float) => typed(
                    TypeInstance::Float,
                    Instruction::FloatOp(MemOp::Literal(*value as f32)),
                ),
                Some(TypeInstance::Double) => typed(
                    TypeInstance::Double,
                    Instruction::DoubleOp(MemOp::Literal(*value as f64)),
                ),
                _ => typed(TypeInstance::Int, Instruction::IntOp(MemOp::Literal(*value))),
            }),
            Expr::LongLiteral { value, .. } => Ok(typed(
                TypeInstance::Long,
                Instruction::LongOp(MemOp::Literal(*value)),
            )),
            Expr::FloatLiteral { value, .. } => Ok(match hint {
                Some(TypeInstance::Float) => typed(
                    TypeInstance::Float,
                    Instruction::FloatOp(MemOp::Literal(*value as f32)),
                ),
                _ => typed(
                    TypeInstance::Double,
                    Instruction::DoubleOp(MemOp::Literal(*value)),
                ),
            }),
            Expr::BoolLiteral { value, .. } => Ok(typed(
                TypeInstance::Bool,
                Instruction::BoolOp(MemOp::Literal(*value)),
            )),
            Expr::StringLiteral { value, .. } => Ok(typed(
                TypeInstance::Str,
                Instruction::StrLiteral(Rc::from(value.as_str())),
            )),
            Expr::NullLiteral {
                type_: Some(t),
                line_col,
            } => {
                let typ = self.resolve_type(t)?;
                if matches!(typ, TypeInstance::Template(_)) {
                    return Err(Error::type_error(
                        "template types must be instantiated with let",
                        *line_col,
                    ));
                }
                if !typ.is_ref() {
                    return Err(Error::type_error(
                        format!("{} is not a reference type", typ),
                        *line_col,
                    ));
                }
                Ok(typed(typ, Instruction::LoadNull))
            }
            Expr::NullLiteral {
                type_: None, ..
            } => match hint {
                Some(h) if h.is_ref() => Ok(typed(h.clone(), Instruction::LoadNull)),
                _ => Ok(typed(TypeInstance::Null, Instruction::LoadNull)),
            },
            Expr::Access {
                name,
                from: None,
                line_col,
            } => {
                let (var, depth) = self.ctx.lookup_var(name).ok_or_else(|| {
                    Error::type_error(format!("variable not found: {}", name), *line_col)
                })?;
                if var.modifiers.is_executable() {
                    if let TypeInstance::Func(desc) = &var.typ {
                        return Ok(typed(
                            desc.ret.clone(),
                            Instruction::Invoke {
                                target: Box::new(get_var_inst(
                                    StorageKind::Ref,
                                    depth,
                                    var.index,
                                )),
                                args: Vec::new(),
                                line_col: *line_col,
                            },
                        ));
                    }
                }
                Ok(typed(
                    var.typ.clone(),
                    get_var_inst(var.kind, depth, var.index),
                ))
            }
            Expr::Access {
                name,
                from: Some(from),
                line_col,
            } => {
                let fe = self.check_expr(from, None)?;
                self.check_member_access(fe, name, *line_col)
            }
            Expr::BinOp {
                op,
                left,
                right,
                line_col,
            } => self.check_binop(*op, left, right, *line_col),
            Expr::Unary {
                op,
                expr: inner,
                line_col,
            } => match op {
                UnaryOpKind::Not => {
                    let te = self.check_expr(inner, Some(&TypeInstance::Bool))?;
                    if te.typ != TypeInstance::Bool {
                        return Err(Error::type_error(
                            format!("'!' takes bool, got {}", te.typ),
                            *line_col,
                        ));
                    }
                    Ok(typed(TypeInstance::Bool, Instruction::Not(Box::new(te.inst))))
                }
                UnaryOpKind::Positive | UnaryOpKind::Negative => {
                    let te = self.check_expr(inner, hint)?;
                    if !te.typ.is_numeric() {
                        return Err(Error::type_error(
                            format!("'{}' takes a number, got {}", op, te.typ),
                            *line_col,
                        ));
                    }
                    if *op == UnaryOpKind::Positive {
                        return Ok(te);
                    }
                    let inst = neg_inst(&te.typ, te.inst);
                    Ok(typed(te.typ, inst))
                }
            },
            Expr::Assignment {
                target,
                value,
                line_col,
            } => {
                let (typ, lv) = self.check_lvalue(target)?;
                let ve = self.check_expr(value, Some(&typ))?;
                if !ve.typ.assignable_to(&typ) {
                    return Err(Error::type_error(
                        format!("cannot assign {} to {}", ve.typ, typ),
                        *line_col,
                    ));
                }
                Ok(typed(typ, store_inst(lv, ve.inst)))
            }
            Expr::OpAssignment {
                op,
                target,
                value,
                line_col,
            } => {
                let (typ, lv) = self.check_lvalue(target)?;
                let read = self.check_expr(target, None)?;
                let ve = self.check_expr(value, Some(&typ))?;
                let combined = if typ == TypeInstance::Str && *op == BinOpKind::Plus {
                    Instruction::StrConcat {
                        left: Box::new(read.inst),
                        right: Box::new(self.to_string_inst(ve, *line_col)?),
                    }
                } else if typ.is_numeric() && ve.typ == typ && op.is_arith() {
                    bin_num_inst(&typ, arith_op(*op), read.inst, ve.inst, *line_col)
                } else {
                    return Err(Error::type_error(
                        format!("cannot apply '{}=' to {} and {}", op, typ, ve.typ),
                        *line_col,
                    ));
                };
                Ok(typed(typ, store_inst(lv, combined)))
            }
            Expr::Invocation {
                target,
                args,
                line_col,
            } => self.check_invocation(target, args, *line_col),
            Expr::AccessIndex {
                from,
                index,
                line_col,
            } => {
                let fe = self.check_expr(from, None)?;
                let arr = match &fe.typ {
                    TypeInstance::Array(a) => a.clone(),
                    other => {
                        return Err(Error::type_error(
                            format!("{} cannot be indexed", other),
                            *line_col,
                        ))
                    }
                };
                let ie = self.check_expr(index, Some(&TypeInstance::Int))?;
                if ie.typ != TypeInstance::Int {
                    return Err(Error::type_error(
                        format!("array index must be int, got {}", ie.typ),
                        *line_col,
                    ));
                }
                let kind = arr.element.storage_kind();
                Ok(typed(
                    arr.element.clone(),
                    get_index_inst(kind, fe.inst, ie.inst, *line_col),
                ))
            }
            Expr::NewInstance {
                type_,
                args,
                line_col,
            } => self.check_new(type_, args, *line_col),
            Expr::NewInstanceWithJson {
                type_,
                json,
                line_col,
            } => {
                let typ = self.resolve_type(type_)?;
                match typ {
                    TypeInstance::Class(class) => self.check_json_new(class, json, *line_col),
                    other => Err(Error::type_error(
                        format!("json construction requires a class type, got {}", other),
                        *line_col,
                    )),
                }
            }
            Expr::NewArray {
                element,
                len,
                line_col,
            } => {
                let elem = self.resolve_type(element)?;
                if elem == TypeInstance::Void {
                    return Err(Error::type_error("cannot create a void array", *line_col));
                }
                let le = self.check_expr(len, Some(&TypeInstance::Int))?;
                if le.typ != TypeInstance::Int {
                    return Err(Error::type_error(
                        format!("array length must be int, got {}", le.typ),
                        *line_col,
                    ));
                }
                let inst = new_array_inst(elem.storage_kind(), le.inst, *line_col);
                Ok(typed(
                    TypeInstance::Array(Rc::new(ArrayType { element: elem })),
                    inst,
                ))
            }
        }
    }

    fn check_member_access(
        &mut self,
        fe: TypedExpr,
        name: &str,
        line_col: LineCol,
    ) -> Result<TypedExpr> {
        match &fe.typ {
            TypeInstance::Std => match name {
                "console" => Ok(typed(TypeInstance::Console, Instruction::LoadConsole)),
                _ => Err(Error::type_error(
                    format!("unknown member '{}' of std", name),
                    line_col,
                )),
            },
            TypeInstance::Class(class) => {
                let field = self.class_field(class, name, line_col)?;
                if field.modifiers.is_executable() {
                    if let TypeInstance::Func(desc) = &field.typ {
                        return Ok(typed(
                            desc.ret.clone(),
                            Instruction::Invoke {
                                target: Box::new(get_field_inst(
                                    StorageKind::Ref,
                                    fe.inst,
                                    field.index,
                                    line_col,
                                )),
                                args: Vec::new(),
                                line_col,
                            },
                        ));
                    }
                }
                Ok(typed(
                    field.typ.clone(),
                    get_field_inst(field.kind, fe.inst, field.index, line_col),
                ))
            }
            TypeInstance::Array(_) if name == "length" => Ok(typed(
                TypeInstance::Int,
                Instruction::ArrayLen {
                    arr: Box::new(fe.inst),
                    line_col,
                },
            )),
            other => {
                if builtins::field_of(other, name).is_some() {
                    Err(Error::type_error(
                        format!("builtin member '{}' must be invoked", name),
                        line_col,
                    ))
                } else {
                    Err(Error::type_error(
                        format!("unknown member '{}' of {}", name, other),
                        line_col,
                    ))
                }
            }
        }
    }

    fn class_field(
        &self,
        class: &Rc<ClassType>,
        name: &str,
        line_col: LineCol,
    ) -> Result<ClassField> {
        let field = class.field(name).ok_or_else(|| {
            Error::type_error(
                format!("no field '{}' on {}", name, class.name),
                line_col,
            )
        })?;
        if field.modifiers.is_private() {
            let inside = self
                .ctx
                .enclosing_class()
                .map(|c| Rc::ptr_eq(&c, class))
                .unwrap_or(false);
            if !inside {
                return Err(Error::type_error(
                    format!("field '{}' of {} is private", name, class.name),
                    line_col,
                ));
            }
        }
        Ok(field)
    }

    fn check_binop(
        &mut self,
        op: BinOpKind,
        left: &Expr,
        right: &Expr,
        line_col: LineCol,
    ) -> Result<TypedExpr> {
        match op {
            BinOpKind::LogicAnd | BinOpKind::LogicOr => {
                let l = self.check_bool(left, line_col)?;
                let r = self.check_bool(right, line_col)?;
                let inst = if op == BinOpKind::LogicAnd {
                    Instruction::And(Box::new(l), Box::new(r))
                } else {
                    Instruction::Or(Box::new(l), Box::new(r))
                };
                Ok(typed(TypeInstance::Bool, inst))
            }
            BinOpKind::CmpEq | BinOpKind::CmpNe => {
                let ne = op == BinOpKind::CmpNe;
                let lt = self.check_expr(left, None)?;
                let rt = self.check_expr(right, Some(&lt.typ))?;
                let cmp = if ne { CmpOp::Ne } else { CmpOp::Eq };
                let str_pair = matches!(
                    (&lt.typ, &rt.typ),
                    (TypeInstance::Str, TypeInstance::Str)
                        | (TypeInstance::Str, TypeInstance::Null)
                        | (TypeInstance::Null, TypeInstance::Str)
                );
                let ref_pair = lt.typ.is_ref()
                    && rt.typ.is_ref()
                    && (lt.typ == rt.typ
                        || matches!(lt.typ, TypeInstance::Null)
                        || matches!(rt.typ, TypeInstance::Null));
                let inst = if lt.typ.is_numeric() && lt.typ == rt.typ {
                    let typ = lt.typ.clone();
                    cmp_num_inst(&typ, cmp, lt.inst, rt.inst)
                } else if lt.typ.is_numeric() && rt.typ.is_numeric() {
                    let (typ, l, r) = self.widen_pair(left, right, lt, rt, line_col)?;
                    cmp_num_inst(&typ, cmp, l, r)
                } else if str_pair {
                    Instruction::StrCmp {
                        ne,
                        left: Box::new(lt.inst),
                        right: Box::new(rt.inst),
                    }
                } else if lt.typ == TypeInstance::Bool && rt.typ == TypeInstance::Bool {
                    Instruction::BoolCmp {
                        ne,
                        left: Box::new(lt.inst),
                        right: Box::new(rt.inst),
                    }
                } else if ref_pair {
                    Instruction::RefCmp {
                        ne,
                        left: Box::new(lt.inst),
                        right: Box::new(rt.inst),
                    }
                } else {
                    return Err(Error::type_error(
                        format!("cannot compare {} and {}", lt.typ, rt.typ),
                        line_col,
                    ));
                };
                Ok(typed(TypeInstance::Bool, inst))
            }
            BinOpKind::Gt | BinOpKind::Ge | BinOpKind::Lt | BinOpKind::Le => {
                let lt = self.check_expr(left, None)?;
                let rt = self.check_expr(right, Some(&lt.typ))?;
                if !lt.typ.is_numeric() || !rt.typ.is_numeric() {
                    return Err(Error::type_error(
                        format!("cannot compare {} and {}", lt.typ, rt.typ),
                        line_col,
                    ));
                }
                let (typ, l, r) = self.widen_pair(left, right, lt, rt, line_col)?;
                Ok(typed(
                    TypeInstance::Bool,
                    cmp_num_inst(&typ, cmp_op(op), l, r),
                ))
            }
            BinOpKind::Plus => {
                let lt = self.check_expr(left, None)?;
                if lt.typ == TypeInstance::Str {
                    let rt = self.check_expr(right, None)?;
                    let r = self.to_string_inst(rt, line_col)?;
                    return Ok(typed(
                        TypeInstance::Str,
                        Instruction::StrConcat {
                            left: Box::new(lt.inst),
                            right: Box::new(r),
                        },
                    ));
                }
                let rt = self.check_expr(right, Some(&lt.typ))?;
                if rt.typ == TypeInstance::Str {
                    let l = self.to_string_inst(lt, line_col)?;
                    return Ok(typed(
                        TypeInstance::Str,
                        Instruction::StrConcat {
                            left: Box::new(l),
                            right: Box::new(rt.inst),
                        },
                    ));
                }
                if !lt.typ.is_numeric() || !rt.typ.is_numeric() {
                    return Err(Error::type_error(
                        format!("cannot add {} and {}", lt.typ, rt.typ),
                        line_col,
                    ));
                }
                let (typ, l, r) = self.widen_pair(left, right, lt, rt, line_col)?;
                let inst = bin_num_inst(&typ, ArithOp::Add, l, r, line_col);
                Ok(typed(typ, inst))
            }
            BinOpKind::Minus | BinOpKind::Multiply | BinOpKind::Divide | BinOpKind::Mod => {
                let lt = self.check_expr(left, None)?;
                let rt = self.check_expr(right, Some(&lt.typ))?;
                if !lt.typ.is_numeric() || !rt.typ.is_numeric() {
                    return Err(Error::type_error(
                        format!("cannot apply '{}' to {} and {}", op, lt.typ, rt.typ),
                        line_col,
                    ));
                }
                let (typ, l, r) = self.widen_pair(left, right, lt, rt, line_col)?;
                let inst = bin_num_inst(&typ, arith_op(op), l, r, line_col);
                Ok(typed(typ, inst))
            }
        }
    }

    /// Reconciles numeric operand types: they must match, except a numeric
    /// literal adopts the other side's type.
    fn widen_pair(
        &mut self,
        left: &Expr,
        right: &Expr,
        lt: TypedExpr,
        rt: TypedExpr,
        line_col: LineCol,
    ) -> Result<(TypeInstance, Instruction, Instruction)> {
        if lt.typ == rt.typ {
            return Ok((lt.typ, lt.inst, rt.inst));
        }
        if is_numeric_literal(left) {
            let lt2 = self.check_expr(left, Some(&rt.typ))?;
            if lt2.typ == rt.typ {
                return Ok((rt.typ, lt2.inst, rt.inst));
            }
        }
        if is_numeric_literal(right) {
            let rt2 = self.check_expr(right, Some(&lt.typ))?;
            if rt2.typ == lt.typ {
                return Ok((lt.typ, lt.inst, rt2.inst));
            }
        }
        Err(Error::type_error(
            format!("operand type mismatch: {} and {}", lt.typ, rt.typ),
            line_col,
        ))
    }

    /// Coerces a checked expression to string: strings pass through, null
    /// renders as "null", anything with a zero-argument `toString` returning
    /// string gets it inserted.
    fn to_string_inst(&mut self, te: TypedExpr, line_col: LineCol) -> Result<Instruction> {
        match &te.typ {
            TypeInstance::Str | TypeInstance::Null => Ok(te.inst),
            TypeInstance::Class(class) => {
                let field = self.class_field(class, "toString", line_col).map_err(|_| {
                    Error::type_error(
                        format!("{} has no toString", class.name),
                        line_col,
                    )
                })?;
                match &field.typ {
                    TypeInstance::Func(desc)
                        if desc.params.is_empty() && desc.ret == TypeInstance::Str =>
                    {
                        Ok(Instruction::Invoke {
                            target: Box::new(get_field_inst(
                                StorageKind::Ref,
                                te.inst,
                                field.index,
                                line_col,
                            )),
                            args: Vec::new(),
                            line_col,
                        })
                    }
                    _ => Err(Error::type_error(
                        format!("{} has no zero-argument toString returning string", class.name),
                        line_col,
                    )),
                }
            }
            other => match builtins::has_to_string(other) {
                Some(method) => Ok(Instruction::InvokeBuiltin {
                    recv: Box::new(te.inst),
                    recv_kind: other.storage_kind(),
                    ret_kind: StorageKind::Ref,
                    method,
                    args: Vec::new(),
                    line_col,
                }),
                None => Err(Error::type_error(
                    format!("no string representation for {}", other),
                    line_col,
                )),
            },
        }
    }

    fn check_lvalue(&mut self, target: &Expr) -> Result<(TypeInstance, Lv)> {
        match target {
            Expr::Access {
                name,
                from: None,
                line_col,
            } => {
                let (var, depth) = self.ctx.lookup_var(name).ok_or_else(|| {
                    Error::type_error(format!("variable not found: {}", name), *line_col)
                })?;
                self.assignable_binding(&var, name, *line_col)?;
                Ok((
                    var.typ.clone(),
                    Lv::Var {
                        kind: var.kind,
                        depth,
                        index: var.index,
                    },
                ))
            }
            Expr::Access {
                name,
                from: Some(from),
                line_col,
            } => {
                let fe = self.check_expr(from, None)?;
                match &fe.typ {
                    TypeInstance::Class(class) => {
                        let field = self.class_field(class, name, *line_col)?;
                        if field.modifiers.is_const() {
                            return Err(Error::type_error(
                                format!("field '{}' is const", name),
                                *line_col,
                            ));
                        }
                        if field.modifiers.is_executable() {
                            return Err(Error::type_error(
                                format!("cannot assign to computed member '{}'", name),
                                *line_col,
                            ));
                        }
                        Ok((
                            field.typ.clone(),
                            Lv::Field {
                                kind: field.kind,
                                target: fe.inst,
                                index: field.index,
                                line_col: *line_col,
                            },
                        ))
                    }
                    other => Err(Error::type_error(
                        format!("cannot assign to member '{}' of {}", name, other),
                        *line_col,
                    )),
                }
            }
            Expr::AccessIndex {
                from,
                index,
                line_col,
            } => {
                let fe = self.check_expr(from, None)?;
                let arr = match &fe.typ {
                    TypeInstance::Array(a) => a.clone(),
                    other => {
                        return Err(Error::type_error(
                            format!("{} cannot be indexed", other),
                            *line_col,
                        ))
                    }
                };
                let ie = self.check_expr(index, Some(&TypeInstance::Int))?;
                if ie.typ != TypeInstance::Int {
                    return Err(Error::type_error(
                        format!("array index must be int, got {}", ie.typ),
                        *line_col,
                    ));
                }
                Ok((
                    arr.element.clone(),
                    Lv::Index {
                        kind: arr.element.storage_kind(),
                        arr: fe.inst,
                        index: ie.inst,
                        line_col: *line_col,
                    },
                ))
            }
            other => Err(Error::type_error(
                "expression is not assignable",
                other.line_col(),
            )),
        }
    }

    fn assignable_binding(&self, var: &Variable, name: &str, line_col: LineCol) -> Result<()> {
        if var.modifiers.is_const() {
            return Err(Error::type_error(
                format!("cannot assign to const '{}'", name),
                line_col,
            ));
        }
        if var.modifiers.is_executable() {
            return Err(Error::type_error(
                format!("cannot assign to computed member '{}'", name),
                line_col,
            ));
        }
        Ok(())
    }

    fn check_invocation(
        &mut self,
        target: &Expr,
        args: &[Expr],
        line_col: LineCol,
    ) -> Result<TypedExpr> {
        if let Expr::Access { name, from, .. } = target {
            match from {
                None => {
                    let (var, depth) = self.ctx.lookup_var(name).ok_or_else(|| {
                        Error::type_error(format!("variable not found: {}", name), line_col)
                    })?;
                    if var.modifiers.is_executable() {
                        return Err(Error::type_error(
                            format!("'{}' is computed and is invoked on access", name),
                            line_col,
                        ));
                    }
                    let desc = match &var.typ {
                        TypeInstance::Func(d) => d.clone(),
                        other => {
                            return Err(Error::type_error(
                                format!("'{}' is not a function, it is {}", name, other),
                                line_col,
                            ))
                        }
                    };
                    let target_inst = get_var_inst(StorageKind::Ref, depth, var.index);
                    return self.invoke_descriptor(&desc, target_inst, args, line_col);
                }
                Some(from) => {
                    let fe = self.check_expr(from, None)?;
                    match &fe.typ {
                        TypeInstance::Console if name == "log" => {
                            if args.len() != 1 {
                                return Err(Error::type_error(
                                    "console.log takes one argument",
                                    line_col,
                                ));
                            }
                            let ae = self.check_expr(&args[0], Some(&TypeInstance::Str))?;
                            let arg = self.to_string_inst(ae, line_col)?;
                            return Ok(typed(
                                TypeInstance::Void,
                                Instruction::ConsoleLog {
                                    arg: Box::new(arg),
                                },
                            ));
                        }
                        TypeInstance::Class(class) => {
                            let field = self.class_field(class, name, line_col)?;
                            if field.modifiers.is_executable() {
                                return Err(Error::type_error(
                                    format!("'{}' is computed and is invoked on access", name),
                                    line_col,
                                ));
                            }
                            let desc = match &field.typ {
                                TypeInstance::Func(d) => d.clone(),
                                other => {
                                    return Err(Error::type_error(
                                        format!("'{}' is not a function, it is {}", name, other),
                                        line_col,
                                    ))
                                }
                            };
                            let target_inst = get_field_inst(
                                StorageKind::Ref,
                                fe.inst,
                                field.index,
                                line_col,
                            );
                            return self.invoke_descriptor(&desc, target_inst, args, line_col);
                        }
                        other => {
                            if let Some((desc, method)) = builtins::field_of(other, name) {
                                let recv_kind = other.storage_kind();
                                return self.invoke_builtin(
                                    recv_kind, fe.inst, desc, method, args, line_col,
                                );
                            }
                            return Err(Error::type_error(
                                format!("unknown member '{}' of {}", name, other),
                                line_col,
                            ));
                        }
                    }
                }
            }
        }
        let te = self.check_expr(target, None)?;
        match te.typ.clone() {
            TypeInstance::Func(desc) => self.invoke_descriptor(&desc, te.inst, args, line_col),
            other => Err(Error::type_error(
                format!("{} is not invocable", other),
                line_col,
            )),
        }
    }

    fn check_args(
        &mut self,
        params: &[ParamInfo],
        args: &[Expr],
        line_col: LineCol,
    ) -> Result<Vec<Instruction>> {
        if args.len() > params.len() {
            return Err(Error::type_error(
                format!("expected {} argument(s), got {}", params.len(), args.len()),
                line_col,
            ));
        }
        let mut insts = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            // trailing parameters with defaults may be omitted
            let default_expr;
            let arg = match args.get(i) {
                Some(arg) => arg,
                None => match &param.default {
                    Some(default) => {
                        default_expr = default.clone();
                        &default_expr
                    }
                    None => {
                        return Err(Error::type_error(
                            format!("expected {} argument(s), got {}", params.len(), args.len()),
                            line_col,
                        ))
                    }
                },
            };
            let ae = self.check_expr(arg, Some(&param.typ))?;
            if !ae.typ.assignable_to(&param.typ) {
                return Err(Error::type_error(
                    format!(
                        "cannot pass {} for parameter '{}' of type {}",
                        ae.typ, param.name, param.typ
                    ),
                    arg.line_col(),
                ));
            }
            insts.push(ae.inst);
        }
        Ok(insts)
    }

    fn invoke_descriptor(
        &mut self,
        desc: &Rc<FunctionDescriptor>,
        target_inst: Instruction,
        args: &[Expr],
        line_col: LineCol,
    ) -> Result<TypedExpr> {
        let insts = self.check_args(&desc.params, args, line_col)?;
        let args = desc
            .params
            .iter()
            .zip(insts)
            .map(|(p, value)| ArgSet {
                kind: p.kind,
                index: p.index,
                value,
            })
            .collect();
        Ok(typed(
            desc.ret.clone(),
            Instruction::Invoke {
                target: Box::new(target_inst),
                args,
                line_col,
            },
        ))
    }

    fn invoke_builtin(
        &mut self,
        recv_kind: StorageKind,
        recv: Instruction,
        desc: Rc<FunctionDescriptor>,
        method: crate::runtime::instruction::BuiltinMethod,
        args: &[Expr],
        line_col: LineCol,
    ) -> Result<TypedExpr> {
        let insts = self.check_args(&desc.params, args, line_col)?;
        let args = desc
            .params
            .iter()
            .zip(insts)
            .map(|(p, inst)| ArgIns { kind: p.kind, inst })
            .collect();
        Ok(typed(
            desc.ret.clone(),
            Instruction::InvokeBuiltin {
                recv: Box::new(recv),
                recv_kind,
                ret_kind: desc.ret.storage_kind(),
                method,
                args,
                line_col,
            },
        ))
    }

    fn check_new(&mut self, type_: &Type, args: &[Expr], line_col: LineCol) -> Result<TypedExpr> {
        let typ = self.resolve_type(type_)?;
        match &typ {
            TypeInstance::Class(class) => {
                let inst = self.construct_class(class.clone(), |me| {
                    me.check_args(&class.params.borrow(), args, line_col)
                }, line_col)?;
                Ok(typed(typ.clone(), inst))
            }
            TypeInstance::List(coll) => {
                let capacity = self.check_capacity(args, line_col)?;
                Ok(typed(
                    typ.clone(),
                    Instruction::NewCollection {
                        kind: CollNew::List(coll.element.storage_kind()),
                        capacity: Box::new(capacity),
                        line_col,
                    },
                ))
            }
            TypeInstance::Set(coll) => {
                let capacity = self.check_capacity(args, line_col)?;
                Ok(typed(
                    typ.clone(),
                    Instruction::NewCollection {
                        kind: CollNew::Set(key_kind(&coll.element)?),
                        capacity: Box::new(capacity),
                        line_col,
                    },
                ))
            }
            TypeInstance::Map(map) => {
                let capacity = self.check_capacity(args, line_col)?;
                Ok(typed(
                    typ.clone(),
                    Instruction::NewCollection {
                        kind: CollNew::Map(key_kind(&map.key)?),
                        capacity: Box::new(capacity),
                        line_col,
                    },
                ))
            }
            TypeInstance::Iterator(_) => Err(Error::type_error(
                "iterators cannot be constructed, take one from a collection",
                line_col,
            )),
            TypeInstance::Template(_) | TypeInstance::BuiltinTemplate(_) => {
                Err(Error::type_error(
                    "template types must be instantiated with let before construction",
                    line_col,
                ))
            }
            other => Err(Error::type_error(
                format!("cannot construct {}", other),
                line_col,
            )),
        }
    }

    fn check_capacity(&mut self, args: &[Expr], line_col: LineCol) -> Result<Instruction> {
        if args.is_empty() {
            return Ok(Instruction::IntOp(MemOp::Literal(16)));
        }
        if args.len() != 1 {
            return Err(Error::type_error(
                "collection constructors take at most one capacity argument",
                line_col,
            ));
        }
        let ae = self.check_expr(&args[0], Some(&TypeInstance::Int))?;
        if ae.typ != TypeInstance::Int {
            return Err(Error::type_error(
                format!("capacity must be int, got {}", ae.typ),
                line_col,
            ));
        }
        Ok(ae.inst)
    }

    /// Emits class construction once the argument instructions are known.
    fn construct_class(
        &mut self,
        class: Rc<ClassType>,
        args: impl FnOnce(&mut Self) -> Result<Vec<Instruction>>,
        line_col: LineCol,
    ) -> Result<Instruction> {
        let insts = args(self)?;
        let params = class.params.borrow();
        let args = params
            .iter()
            .zip(insts)
            .map(|(p, value)| ArgSet {
                kind: p.kind,
                index: p.index,
                value,
            })
            .collect();
        let depth = self.ctx.mem_depth() - class.def_depth;
        Ok(Instruction::NewInstance {
            depth,
            total: *class.total.borrow(),
            args,
            body: class.body.borrow().clone(),
            info: Rc::new(StackInfo::new(class.name.clone(), "<init>", line_col)),
            line_col,
        })
    }

    fn check_json_new(
        &mut self,
        class: Rc<ClassType>,
        json: &JsonArg,
        line_col: LineCol,
    ) -> Result<TypedExpr> {
        let entries = match json {
            JsonArg::Object(entries, _) => entries,
            other => {
                return Err(Error::type_error(
                    "json construction takes an object",
                    other.line_col(),
                ))
            }
        };
        let params = class.params.borrow().clone();
        // keys match parameter names, with any leading underscore on the
        // parameter stripped
        let mut used = vec![false; entries.len()];
        let mut arg_insts = Vec::with_capacity(params.len());
        for param in &params {
            let plain = param.name.strip_prefix('_').unwrap_or(&param.name);
            let found = entries
                .iter()
                .position(|(key, _, _)| key == &param.name || key == plain);
            let inst = match found {
                Some(i) => {
                    used[i] = true;
                    self.check_json_arg(&param.typ, &entries[i].1)?
                }
                None => match &param.default {
                    Some(default) => {
                        let de = self.check_expr(default, Some(&param.typ))?;
                        if !de.typ.assignable_to(&param.typ) {
                            return Err(Error::type_error(
                                format!(
                                    "default for '{}' is {}, expected {}",
                                    param.name, de.typ, param.typ
                                ),
                                line_col,
                            ));
                        }
                        de.inst
                    }
                    None => {
                        return Err(Error::type_error(
                            format!("missing argument for parameter '{}'", param.name),
                            line_col,
                        ))
                    }
                },
            };
            arg_insts.push(inst);
        }
        if let Some(i) = used.iter().position(|u| !u) {
            return Err(Error::type_error(
                format!("no parameter named '{}' on {}", entries[i].0, class.name),
                entries[i].2,
            ));
        }
        let inst = self.construct_class(class.clone(), |_| Ok(arg_insts), line_col)?;
        Ok(typed(TypeInstance::Class(class), inst))
    }

    fn check_json_arg(&mut self, typ: &TypeInstance, arg: &JsonArg) -> Result<Instruction> {
        match arg {
            JsonArg::Expr(e) => {
                let te = self.check_expr(e, Some(typ))?;
                if !te.typ.assignable_to(typ) {
                    return Err(Error::type_error(
                        format!("cannot use {} as {}", te.typ, typ),
                        e.line_col(),
                    ));
                }
                Ok(te.inst)
            }
            JsonArg::Object(..) => match typ {
                TypeInstance::Class(class) => Ok(self
                    .check_json_new(class.clone(), arg, arg.line_col())?
                    .inst),
                other => Err(Error::type_error(
                    format!("nested object cannot build {}", other),
                    arg.line_col(),
                )),
            },
            JsonArg::Array(elems, line_col) => {
                let elem_typ = match typ {
                    TypeInstance::Array(a) => a.element.clone(),
                    other => {
                        return Err(Error::type_error(
                            format!("nested array cannot build {}", other),
                            *line_col,
                        ))
                    }
                };
                // the array fills through a hidden slot so element writes
                // have a stable target
                let tmp = self.ctx.declare_tmp(typ.clone())?;
                let kind = elem_typ.storage_kind();
                let mut insts = Vec::with_capacity(elems.len() + 1);
                insts.push(Instruction::RefSet {
                    depth: 0,
                    index: tmp.index,
                    value: Box::new(new_array_inst(
                        kind,
                        Instruction::IntOp(MemOp::Literal(elems.len() as i32)),
                        *line_col,
                    )),
                });
                for (i, elem) in elems.iter().enumerate() {
                    let value = self.check_json_arg(&elem_typ, elem)?;
                    insts.push(set_index_inst(
                        kind,
                        Instruction::RefGet {
                            depth: 0,
                            index: tmp.index,
                        },
                        Instruction::IntOp(MemOp::Literal(i as i32)),
                        value,
                        *line_col,
                    ));
                }
                Ok(Instruction::Sequence {
                    insts,
                    result: Box::new(Instruction::RefGet {
                        depth: 0,
                        index: tmp.index,
                    }),
                })
            }
        }
    }

    fn resolve_params(&mut self, params: &[Param]) -> Result<Vec<ParamInfo>> {
        let mut total = RuntimeMemoryTotal::default();
        params
            .iter()
            .map(|p| {
                let typ = self.resolve_type(&p.type_)?;
                if typ == TypeInstance::Void {
                    return Err(Error::type_error(
                        format!("parameter '{}' cannot be void", p.name),
                        p.line_col,
                    ));
                }
                let kind = typ.storage_kind();
                Ok(ParamInfo {
                    name: p.name.clone(),
                    typ,
                    kind,
                    index: total.allocate(kind),
                    default: p.default.clone(),
                })
            })
            .collect()
    }

    fn resolve_type(&self, t: &Type) -> Result<TypeInstance> {
        let mut name = t.name.as_str();
        let mut dims = 0;
        while let Some(stripped) = name.strip_suffix("[]") {
            name = stripped.trim_end();
            dims += 1;
        }
        let mut typ = self.ctx.lookup_type(name).ok_or_else(|| {
            Error::type_error(format!("type not found: {}", name), t.line_col)
        })?;
        if dims > 0 && typ == TypeInstance::Void {
            return Err(Error::type_error("cannot create a void array", t.line_col));
        }
        for _ in 0..dims {
            typ = TypeInstance::Array(Rc::new(ArrayType { element: typ }));
        }
        Ok(typ)
    }

    fn build_explorer(&self, scope: usize) -> Rc<MemoryExplorer> {
        let vars = self
            .ctx
            .vars_of(scope)
            .into_iter()
            .filter(|v| !v.name.starts_with("$tmp$"))
            .map(|v| ExplorerVar {
                name: v.name.clone(),
                type_name: v.typ.to_string(),
                modifiers: v.modifiers,
                kind: v.kind,
                index: v.index,
                nested: match &v.typ {
                    TypeInstance::Class(c) => c.explorer.borrow().clone(),
                    _ => None,
                },
            })
            .collect();
        Rc::new(MemoryExplorer::new(vars))
    }
}

fn typed(typ: TypeInstance, inst: Instruction) -> TypedExpr {
    TypedExpr { typ, inst }
}

fn store_inst(lv: Lv, value: Instruction) -> Instruction {
    match lv {
        Lv::Var { kind, depth, index } => set_var_inst(kind, depth, index, value),
        Lv::Field {
            kind,
            target,
            index,
            line_col,
        } => set_field_inst(kind, target, index, value, line_col),
        Lv::Index {
            kind,
            arr,
            index,
            line_col,
        } => set_index_inst(kind, arr, index, value, line_col),
    }
}

fn key_kind(typ: &TypeInstance) -> Result<KeyKind> {
    Ok(match typ {
        TypeInstance::Int => KeyKind::Int,
        TypeInstance::Long => KeyKind::Long,
        TypeInstance::Bool => KeyKind::Bool,
        TypeInstance::Str => KeyKind::Str,
        other => {
            return Err(Error::type_error(
                format!("{} cannot key a collection", other),
                LineCol::EMPTY,
            ))
        }
    })
}

fn is_numeric_literal(e: &Expr) -> bool {
    match e {
        Expr::IntLiteral { .. } | Expr::LongLiteral { .. } | Expr::FloatLiteral { .. } => true,
        Expr::Unary {
            op: UnaryOpKind::Negative | UnaryOpKind::Positive,
            expr,
            ..
        } => is_numeric_literal(expr),
        _ => false,
    }
}

fn arith_op(op: BinOpKind) -> ArithOp {
    match op {
        BinOpKind::Plus => ArithOp::Add,
        BinOpKind::Minus => ArithOp::Sub,
        BinOpKind::Multiply => ArithOp::Mul,
        BinOpKind::Divide => ArithOp::Div,
        _ => ArithOp::Mod,
    }
}

fn cmp_op(op: BinOpKind) -> CmpOp {
    match op {
        BinOpKind::Gt => CmpOp::Gt,
        BinOpKind::Ge => CmpOp::Ge,
        BinOpKind::Lt => CmpOp::Lt,
        BinOpKind::Le => CmpOp::Le,
        BinOpKind::CmpEq => CmpOp::Eq,
        _ => CmpOp::Ne,
    }
}

fn get_var_inst(kind: StorageKind, depth: usize, index: usize) -> Instruction {
    match kind {
        StorageKind::Int => Instruction::IntOp(MemOp::Get { depth, index }),
        StorageKind::Long => Instruction::LongOp(MemOp::Get { depth, index }),
        StorageKind::Float => Instruction::FloatOp(MemOp::Get { depth, index }),
        StorageKind::Double => Instruction::DoubleOp(MemOp::Get { depth, index }),
        StorageKind::Bool => Instruction::BoolOp(MemOp::Get { depth, index }),
        StorageKind::Ref => Instruction::RefGet { depth, index },
    }
}

fn set_var_inst(kind: StorageKind, depth: usize, index: usize, value: Instruction) -> Instruction {
    let value = Box::new(value);
    match kind {
        StorageKind::Int => Instruction::IntOp(MemOp::Set {
            depth,
            index,
            value,
        }),
        StorageKind::Long => Instruction::LongOp(MemOp::Set {
            depth,
            index,
            value,
        }),
        StorageKind::Float => Instruction::FloatOp(MemOp::Set {
            depth,
            index,
            value,
        }),
        StorageKind::Double => Instruction::DoubleOp(MemOp::Set {
            depth,
            index,
            value,
        }),
        StorageKind::Bool => Instruction::BoolOp(MemOp::Set {
            depth,
            index,
            value,
        }),
        StorageKind::Ref => Instruction::RefSet {
            depth,
            index,
            value,
        },
    }
}

fn get_field_inst(
    kind: StorageKind,
    target: Instruction,
    index: usize,
    line_col: LineCol,
) -> Instruction {
    let target = Box::new(target);
    match kind {
        StorageKind::Int => Instruction::IntOp(MemOp::GetField {
            target,
            index,
            line_col,
        }),
        StorageKind::Long => Instruction::LongOp(MemOp::GetField {
            target,
            index,
            line_col,
        }),
        StorageKind::Float => Instruction::FloatOp(MemOp::GetField {
            target,
            index,
            line_col,
        }),
        StorageKind::Double => Instruction::DoubleOp(MemOp::GetField {
            target,
            index,
            line_col,
        }),
        StorageKind::Bool => Instruction::BoolOp(MemOp::GetField {
            target,
            index,
            line_col,
        }),
        StorageKind::Ref => Instruction::RefGetField {
            target,
            index,
            line_col,
        },
    }
}

fn set_field_inst(
    kind: StorageKind,
    target: Instruction,
    index: usize,
    value: Instruction,
    line_col: LineCol,
) -> Instruction {
    let target = Box::new(target);
    let value = Box::new(value);
    match kind {
        StorageKind::Int => Instruction::IntOp(MemOp::SetField {
            target,
            index,
            value,
            line_col,
        }),
        StorageKind::Long => Instruction::LongOp(MemOp::SetField {
            target,
            index,
            value,
            line_col,
        }),
        StorageKind::Float => Instruction::FloatOp(MemOp::SetField {
            target,
            index,
            value,
            line_col,
        }),
        StorageKind::Double => Instruction::DoubleOp(MemOp::SetField {
            target,
            index,
            value,
            line_col,
        }),
        StorageKind::Bool => Instruction::BoolOp(MemOp::SetField {
            target,
            index,
            value,
            line_col,
        }),
        StorageKind::Ref => Instruction::RefSetField {
            target,
            index,
            value,
            line_col,
        },
    }
}

fn get_index_inst(
    kind: StorageKind,
    arr: Instruction,
    index: Instruction,
    line_col: LineCol,
) -> Instruction {
    let arr = Box::new(arr);
    let index = Box::new(index);
    match kind {
        StorageKind::Int => Instruction::IntOp(MemOp::GetIndex {
            arr,
            index,
            line_col,
        }),
        StorageKind::Long => Instruction::LongOp(MemOp::GetIndex {
            arr,
            index,
            line_col,
        }),
        StorageKind::Float => Instruction::FloatOp(MemOp::GetIndex {
            arr,
            index,
            line_col,
        }),
        StorageKind::Double => Instruction::DoubleOp(MemOp::GetIndex {
            arr,
            index,
            line_col,
        }),
        StorageKind::Bool => Instruction::BoolOp(MemOp::GetIndex {
            arr,
            index,
            line_col,
        }),
        StorageKind::Ref => Instruction::RefGetIndex {
            arr,
            index,
            line_col,
        },
    }
}

fn set_index_inst(
    kind: StorageKind,
    arr: Instruction,
    index: Instruction,
    value: Instruction,
    line_col: LineCol,
) -> Instruction {
    let arr = Box::new(arr);
    let index = Box::new(index);
    let value = Box::new(value);
    match kind {
        StorageKind::Int => Instruction::IntOp(MemOp::SetIndex {
            arr,
            index,
            value,
            line_col,
        }),
        StorageKind::Long => Instruction::LongOp(MemOp::SetIndex {
            arr,
            index,
            value,
            line_col,
        }),
        StorageKind::Float => Instruction::FloatOp(MemOp::SetIndex {
            arr,
            index,
            value,
            line_col,
        }),
        StorageKind::Double => Instruction::DoubleOp(MemOp::SetIndex {
            arr,
            index,
            value,
            line_col,
        }),
        StorageKind::Bool => Instruction::BoolOp(MemOp::SetIndex {
            arr,
            index,
            value,
            line_col,
        }),
        StorageKind::Ref => Instruction::RefSetIndex {
            arr,
            index,
            value,
            line_col,
        },
    }
}

fn new_array_inst(kind: StorageKind, len: Instruction, line_col: LineCol) -> Instruction {
    let len = Box::new(len);
    match kind {
        StorageKind::Int => Instruction::IntOp(MemOp::NewArray { len, line_col }),
        StorageKind::Long => Instruction::LongOp(MemOp::NewArray { len, line_col }),
        StorageKind::Float => Instruction::FloatOp(MemOp::NewArray { len, line_col }),
        StorageKind::Double => Instruction::DoubleOp(MemOp::NewArray { len, line_col }),
        StorageKind::Bool => Instruction::BoolOp(MemOp::NewArray { len, line_col }),
        StorageKind::Ref => Instruction::RefNewArray { len, line_col },
    }
}

fn bin_num_inst(
    typ: &TypeInstance,
    op: ArithOp,
    left: Instruction,
    right: Instruction,
    line_col: LineCol,
) -> Instruction {
    let left = Box::new(left);
    let right = Box::new(right);
    match typ {
        TypeInstance::Int => Instruction::IntCalc(NumCalc::Bin {
            op,
            left,
            right,
            line_col,
        }),
        TypeInstance::Long => Instruction::LongCalc(NumCalc::Bin {
            op,
            left,
            right,
            line_col,
        }),
        TypeInstance::Float => Instruction::FloatCalc(NumCalc::Bin {
            op,
            left,
            right,
            line_col,
        }),
        _ => Instruction::DoubleCalc(NumCalc::Bin {
            op,
            left,
            right,
            line_col,
        }),
    }
}

fn cmp_num_inst(
    typ: &TypeInstance,
    op: CmpOp,
    left: Instruction,
    right: Instruction,
) -> Instruction {
    let left = Box::new(left);
    let right = Box::new(right);
    match typ {
        TypeInstance::Int => Instruction::IntCalc(NumCalc::Cmp { op, left, right }),
        TypeInstance::Long => Instruction::LongCalc(NumCalc::Cmp { op, left, right }),
        TypeInstance::Float => Instruction::FloatCalc(NumCalc::Cmp { op, left, right }),
        _ => Instruction::DoubleCalc(NumCalc::Cmp { op, left, right }),
    }
}

fn neg_inst(typ: &TypeInstance, value: Instruction) -> Instruction {
    let value = Box::new(value);
    match typ {
        TypeInstance::Int => Instruction::IntCalc(NumCalc::Neg { value }),
        TypeInstance::Long => Instruction::LongCalc(NumCalc::Neg { value }),
        TypeInstance::Float => Instruction::FloatCalc(NumCalc::Neg { value }),
        _ => Instruction::DoubleCalc(NumCalc::Neg { value }),
    }
}

/// Whether every path through `stmts` leaves via `return` or `throw`.
fn block_returns(stmts: &[Statement]) -> bool {
    stmts.iter().any(returns)
}

fn returns(stmt: &Statement) -> bool {
    match stmt {
        Statement::Return { .. } | Statement::Throw { .. } => true,
        Statement::If { then, else_, .. } => {
            !else_.is_empty() && block_returns(then) && block_returns(else_)
        }
        Statement::While { cond, body, .. } => {
            matches!(cond, Expr::BoolLiteral { value: true, .. }) && !contains_break(body)
        }
        Statement::ErrorHandling {
            error, success, ..
        } => block_returns(error) && block_returns(success),
        _ => false,
    }
}

/// A `break` reachable at this nesting level, not crossing into inner loops.
fn contains_break(stmts: &[Statement]) -> bool {
    stmts.iter().any(|s| match s {
        Statement::Break { .. } => true,
        Statement::If { then, else_, .. } => contains_break(then) || contains_break(else_),
        Statement::ErrorHandling {
            try_,
            error,
            success,
            ..
        } => contains_break(try_) || contains_break(error) || contains_break(success),
        _ => false,
    })
}

/// Whether code after `stmt` in the same block is unreachable.
fn terminates(stmt: &Statement) -> bool {
    matches!(stmt, Statement::Break { .. } | Statement::Continue { .. }) || returns(stmt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::{parse_object, ParserOptions};
    use crate::parser::stmt::StatementParser;
    use crate::source::CharCursor;
    use crate::types::builtins::{StdTypes, TypeProvider};

    fn compile(src: &str) -> Result<CompiledProgram> {
        let mut cs = CharCursor::new(src);
        let obj = parse_object(&mut cs, &ParserOptions::program())?;
        let stmts = StatementParser::parse_document(&obj)?;
        let mut checker = Checker::new();
        StdTypes.install(checker.context_mut())?;
        checker.check_program(&stmts)
    }

    #[test]
    fn variable_slots_per_family() {
        let program = compile("{\nvar\na: 1\nvar\nb: 2.0\nvar\nc: \"x\"\n}").unwrap();
        assert_eq!(program.total.ints, 1);
        assert_eq!(program.total.doubles, 1);
        assert_eq!(program.total.refs, 2); // c plus the std binding
    }

    #[test]
    fn duplicate_definition_rejected() {
        let err = compile("{\nvar\na: 1\nvar\na: 2\n}").unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn operands_must_match() {
        assert!(compile("{\nvar\na: 1 + 2\n}").is_ok());
        assert!(compile("{\nvar\na: 1.0 + 2\n}").is_ok());
        let err = compile("{\nvar\ns: \"x\"\nvar\na: s - 1\n}").unwrap_err();
        assert!(err.to_string().contains("cannot apply"));
    }

    #[test]
    fn string_concat_inserts_to_string() {
        assert!(compile("{\nvar\ns: \"n = \" + 42\n}").is_ok());
        assert!(compile("{\nvar\ns: 42 + \" items\"\n}").is_ok());
    }

    #[test]
    fn code_after_return_is_unreachable() {
        let err = compile("{\nfunction\nf: {}\nvoid: { return\nvar\na: 1 }\n}").unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn non_void_function_must_return() {
        let err = compile("{\nfunction\nf: {}\nint: { var\na: 1 }\n}").unwrap_err();
        assert!(err.to_string().contains("without returning"));
    }

    #[test]
    fn while_true_counts_as_returning() {
        assert!(
            compile("{\nfunction\nf: {}\nint: { while: true\ndo: { var\na: 1 } }\n}").is_ok()
        );
        let err =
            compile("{\nfunction\nf: {}\nint: { while: true\ndo: { break } }\n}").unwrap_err();
        assert!(err.to_string().contains("without returning"));
    }

    #[test]
    fn let_instantiations_are_nominal() {
        let err = compile(
            "{\nlet\nA: { std.List: [int] }\nlet\nB: { std.List: [int] }\n\
             var\na: new A:[4]\nvar\nb: new B:[4]\na: b\n}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot assign"));
    }

    #[test]
    fn map_keys_are_restricted() {
        let err = compile("{\nlet\nM: { std.Map: [double, int] }\n}").unwrap_err();
        assert!(err.to_string().contains("map keys"));
    }

    #[test]
    fn template_class_checks_per_instantiation() {
        assert!(compile(
            "{\ntemplate: { T }\nclass\nBox: { value: T }\ndo: {\n\
             function\nget: {}\nT: { return: value }\n}\n\
             let\nIntBox: { Box: [int] }\n\
             var\nb: new IntBox:[42]\nvar\nv: b.get:[]\nvar\nw: v + 1\n}",
        )
        .is_ok());
    }

    #[test]
    fn private_fields_are_enclosed() {
        let err = compile(
            "{\nclass\nC: {}\ndo: { private\nvar\nx: 1 }\nvar\nc: new C\nvar\ny: c.x\n}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("private"));
    }

    #[test]
    fn const_rejects_assignment() {
        let err = compile("{\nconst\nvar\na: 1\na: 2\n}").unwrap_err();
        assert!(err.to_string().contains("const"));
    }

    #[test]
    fn executable_member_invokes_on_access() {
        assert!(compile(
            "{\nclass\nC: {}\ndo: {\npublic\nexecutable\nfunction\nnow: {}\nint: { return: 42 }\n}\n\
             var\nc: new C\nvar\nn: c.now\nvar\nm: n + 1\n}",
        )
        .is_ok());
    }

    #[test]
    fn error_region_binds_err() {
        assert!(compile(
            "{\nvar\nx: 0\nvar\ny: 10 / x\n\
             if: err != null\nthen: { var\nm: err.message:[] }\nelse: { x: 1 }\n}",
        )
        .is_ok());
        // err is not visible outside the error region
        let err = compile("{\nvar\ne: err\n}").unwrap_err();
        assert!(err.to_string().contains("variable not found"));
    }

    #[test]
    fn builtin_members_require_invocation() {
        let err = compile("{\nvar\ns: \"abc\"\nvar\nl: s.length\n}").unwrap_err();
        assert!(err.to_string().contains("must be invoked"));
        assert!(compile("{\nvar\ns: \"abc\"\nvar\nl: s.length:[]\n}").is_ok());
    }

    #[test]
    fn json_construction_uses_defaults() {
        assert!(compile(
            "{\nclass\nP: { x: int, y: int = 0 }\ndo: {}\nvar\np: new P { x: 1 }\n}",
        )
        .is_ok());
        let err = compile(
            "{\nclass\nP: { x: int = 0 }\ndo: {}\nvar\np: new P { y: 1 }\n}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("no parameter named"));
    }

    #[test]
    fn arrays_are_structural() {
        assert!(compile(
            "{\nvar\na: new int[3]\na[0]: 5\nvar\nn: a.length\nvar\nb: a\nb: new int[1]\n}",
        )
        .is_ok());
    }
}
