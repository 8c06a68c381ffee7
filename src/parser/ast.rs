//! Abstract syntax. Plain data; the checker owns all derived information.

use std::fmt;

use crate::error::LineCol;

/// Binary operators, grouped by precedence level (higher binds tighter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    Multiply,
    Divide,
    Mod,
    Plus,
    Minus,
    Gt,
    Ge,
    Lt,
    Le,
    CmpEq,
    CmpNe,
    LogicAnd,
    LogicOr,
}

impl BinOpKind {
    pub fn precedence(self) -> i32 {
        match self {
            BinOpKind::Multiply | BinOpKind::Divide | BinOpKind::Mod => 5,
            BinOpKind::Plus | BinOpKind::Minus => 4,
            BinOpKind::Gt
            | BinOpKind::Ge
            | BinOpKind::Lt
            | BinOpKind::Le
            | BinOpKind::CmpEq
            | BinOpKind::CmpNe => 3,
            BinOpKind::LogicAnd => 2,
            BinOpKind::LogicOr => 1,
        }
    }

    pub fn is_arith(self) -> bool {
        matches!(
            self,
            BinOpKind::Multiply
                | BinOpKind::Divide
                | BinOpKind::Mod
                | BinOpKind::Plus
                | BinOpKind::Minus
        )
    }
}

impl fmt::Display for BinOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOpKind::Multiply => "*",
            BinOpKind::Divide => "/",
            BinOpKind::Mod => "%",
            BinOpKind::Plus => "+",
            BinOpKind::Minus => "-",
            BinOpKind::Gt => ">",
            BinOpKind::Ge => ">=",
            BinOpKind::Lt => "<",
            BinOpKind::Le => "<=",
            BinOpKind::CmpEq => "==",
            BinOpKind::CmpNe => "!=",
            BinOpKind::LogicAnd => "&&",
            BinOpKind::LogicOr => "||",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Positive,
    Negative,
    Not,
}

impl fmt::Display for UnaryOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOpKind::Positive => "+",
            UnaryOpKind::Negative => "-",
            UnaryOpKind::Not => "!",
        })
    }
}

/// A surface type reference: a dotted name optionally carrying `[]` array
/// suffixes, resolved by the checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub name: String,
    pub line_col: LineCol,
}

impl Type {
    pub fn new(name: impl Into<String>, line_col: LineCol) -> Self {
        Type {
            name: name.into(),
            line_col,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Declaration modifiers as a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers(pub u32);

impl Modifiers {
    pub const PUBLIC: u32 = 1;
    pub const PRIVATE: u32 = 2;
    pub const CONST: u32 = 4;
    pub const EXECUTABLE: u32 = 8;

    pub fn empty() -> Self {
        Modifiers(0)
    }

    pub fn with(self, flag: u32) -> Self {
        Modifiers(self.0 | flag)
    }

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_const(self) -> bool {
        self.contains(Self::CONST)
    }

    pub fn is_executable(self) -> bool {
        self.contains(Self::EXECUTABLE)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A declared parameter: `name: "type"` or `name: "type = default"`.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub type_: Type,
    pub default: Option<Expr>,
    pub line_col: LineCol,
}

/// A JSON-template argument of `new T: { ... }` construction. String leaves
/// of the form `"${expr}"` have already been expression-parsed.
#[derive(Debug, Clone)]
pub enum JsonArg {
    Expr(Expr),
    Array(Vec<JsonArg>, LineCol),
    Object(Vec<(String, JsonArg, LineCol)>, LineCol),
}

impl JsonArg {
    pub fn line_col(&self) -> LineCol {
        match self {
            JsonArg::Expr(e) => e.line_col(),
            JsonArg::Array(_, lc) | JsonArg::Object(_, lc) => *lc,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral {
        value: i32,
        line_col: LineCol,
    },
    LongLiteral {
        value: i64,
        line_col: LineCol,
    },
    FloatLiteral {
        value: f64,
        line_col: LineCol,
    },
    BoolLiteral {
        value: bool,
        line_col: LineCol,
    },
    StringLiteral {
        value: String,
        line_col: LineCol,
    },
    /// `null`, optionally typed (`x: "TypeName"` with a null-parsing key).
    NullLiteral {
        type_: Option<Type>,
        line_col: LineCol,
    },
    /// `name` or `from.name`.
    Access {
        name: String,
        from: Option<Box<Expr>>,
        line_col: LineCol,
    },
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
        line_col: LineCol,
    },
    Unary {
        op: UnaryOpKind,
        expr: Box<Expr>,
        line_col: LineCol,
    },
    Assignment {
        target: Box<Expr>,
        value: Box<Expr>,
        line_col: LineCol,
    },
    /// `target op= value`.
    OpAssignment {
        op: BinOpKind,
        target: Box<Expr>,
        value: Box<Expr>,
        line_col: LineCol,
    },
    /// `target:[args]` or statement-level `key: [args]`.
    Invocation {
        target: Box<Expr>,
        args: Vec<Expr>,
        line_col: LineCol,
    },
    AccessIndex {
        from: Box<Expr>,
        index: Box<Expr>,
        line_col: LineCol,
    },
    /// `new T` / `new T:[args]`.
    NewInstance {
        type_: Type,
        args: Vec<Expr>,
        line_col: LineCol,
    },
    /// `new T: { ... }`. The template is boxed because its leaves hold
    /// expressions again.
    NewInstanceWithJson {
        type_: Type,
        json: Box<JsonArg>,
        line_col: LineCol,
    },
    /// `new Elem[len]`, `element` keeping any further `[]` dimensions.
    NewArray {
        element: Type,
        len: Box<Expr>,
        line_col: LineCol,
    },
}

impl Expr {
    pub fn line_col(&self) -> LineCol {
        match self {
            Expr::IntLiteral { line_col, .. }
            | Expr::LongLiteral { line_col, .. }
            | Expr::FloatLiteral { line_col, .. }
            | Expr::BoolLiteral { line_col, .. }
            | Expr::StringLiteral { line_col, .. }
            | Expr::NullLiteral { line_col, .. }
            | Expr::Access { line_col, .. }
            | Expr::BinOp { line_col, .. }
            | Expr::Unary { line_col, .. }
            | Expr::Assignment { line_col, .. }
            | Expr::OpAssignment { line_col, .. }
            | Expr::Invocation { line_col, .. }
            | Expr::AccessIndex { line_col, .. }
            | Expr::NewInstance { line_col, .. }
            | Expr::NewInstanceWithJson { line_col, .. }
            | Expr::NewArray { line_col, .. } => *line_col,
        }
    }

    /// Whether the node is syntactically an assignment target. The checker
    /// still rejects const bindings and computed properties.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expr::Access { .. } | Expr::AccessIndex { .. })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntLiteral { value, .. } => write!(f, "{}", value),
            Expr::LongLiteral { value, .. } => write!(f, "{}", value),
            Expr::FloatLiteral { value, .. } => write!(f, "{:?}", value),
            Expr::BoolLiteral { value, .. } => write!(f, "{}", value),
            Expr::StringLiteral { value, .. } => write!(f, "{:?}", value),
            Expr::NullLiteral { type_: None, .. } => f.write_str("null"),
            Expr::NullLiteral {
                type_: Some(t), ..
            } => write!(f, "null: {}", t),
            Expr::Access {
                name, from: None, ..
            } => f.write_str(name),
            Expr::Access {
                name,
                from: Some(from),
                ..
            } => write!(f, "{}.{}", from, name),
            Expr::BinOp {
                op, left, right, ..
            } => write!(f, "({} {} {})", left, op, right),
            Expr::Unary { op, expr, .. } => write!(f, "({}{})", op, expr),
            Expr::Assignment { target, value, .. } => write!(f, "{} = {}", target, value),
            Expr::OpAssignment {
                op, target, value, ..
            } => write!(f, "{} {}= {}", target, op, value),
            Expr::Invocation { target, args, .. } => {
                write!(f, "{}:[", target)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                f.write_str("]")
            }
            Expr::AccessIndex { from, index, .. } => write!(f, "{}[{}]", from, index),
            Expr::NewInstance { type_, args, .. } => {
                write!(f, "new {}:[", type_)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                f.write_str("]")
            }
            Expr::NewInstanceWithJson { type_, .. } => write!(f, "new {}: {{...}}", type_),
            Expr::NewArray { element, len, .. } => write!(f, "new {}[{}]", element, len),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Statement {
    Expr(Expr),
    VariableDefinition {
        name: String,
        value: Expr,
        modifiers: Modifiers,
        line_col: LineCol,
    },
    FunctionDefinition {
        name: String,
        params: Vec<Param>,
        return_type: Type,
        body: Vec<Statement>,
        modifiers: Modifiers,
        line_col: LineCol,
    },
    ClassDefinition {
        name: String,
        params: Vec<Param>,
        body: Vec<Statement>,
        modifiers: Modifiers,
        line_col: LineCol,
    },
    TemplateClassDefinition {
        type_params: Vec<String>,
        name: String,
        params: Vec<Param>,
        body: Vec<Statement>,
        modifiers: Modifiers,
        line_col: LineCol,
    },
    /// `let Alias = { Template: [typeargs] }`.
    TemplateTypeInstantiation {
        alias: String,
        template: Type,
        args: Vec<Type>,
        line_col: LineCol,
    },
    For {
        init: Vec<Statement>,
        cond: Expr,
        incr: Vec<Statement>,
        body: Vec<Statement>,
        line_col: LineCol,
    },
    While {
        cond: Expr,
        body: Vec<Statement>,
        line_col: LineCol,
    },
    If {
        cond: Expr,
        then: Vec<Statement>,
        else_: Vec<Statement>,
        line_col: LineCol,
    },
    Break {
        line_col: LineCol,
    },
    Continue {
        line_col: LineCol,
    },
    Return {
        value: Option<Expr>,
        line_col: LineCol,
    },
    Throw {
        value: Option<Expr>,
        line_col: LineCol,
    },
    /// Regrouped `if: err != null` region: run `try_`, on a raised error run
    /// `error` with `err` bound, otherwise run `success`.
    ErrorHandling {
        try_: Vec<Statement>,
        error: Vec<Statement>,
        success: Vec<Statement>,
        line_col: LineCol,
    },
}

impl Statement {
    pub fn line_col(&self) -> LineCol {
        match self {
            Statement::Expr(e) => e.line_col(),
            Statement::VariableDefinition { line_col, .. }
            | Statement::FunctionDefinition { line_col, .. }
            | Statement::ClassDefinition { line_col, .. }
            | Statement::TemplateClassDefinition { line_col, .. }
            | Statement::TemplateTypeInstantiation { line_col, .. }
            | Statement::For { line_col, .. }
            | Statement::While { line_col, .. }
            | Statement::If { line_col, .. }
            | Statement::Break { line_col }
            | Statement::Continue { line_col }
            | Statement::Return { line_col, .. }
            | Statement::Throw { line_col, .. }
            | Statement::ErrorHandling { line_col, .. } => *line_col,
        }
    }
}

/// Whether `cond` is structurally the error check that opens an
/// error-handling region: `err != null` or `null != err`, with a bare `err`
/// access and a bare untyped `null`.
pub fn is_error_check(cond: &Expr) -> bool {
    fn bare_err(e: &Expr) -> bool {
        matches!(e, Expr::Access { name, from: None, .. } if name == "err")
    }
    fn bare_null(e: &Expr) -> bool {
        matches!(e, Expr::NullLiteral { type_: None, .. })
    }
    match cond {
        Expr::BinOp {
            op: BinOpKind::CmpNe,
            left,
            right,
            ..
        } => (bare_err(left) && bare_null(right)) || (bare_null(left) && bare_err(right)),
        _ => false,
    }
}
