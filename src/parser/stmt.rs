//! Statement parser.
//!
//! Statements are read off the entry list of a program object. Reserved keys
//! open productions; keywords are value-less entries, so `var x: 1` arrives
//! as the entries `var`(null) and `x`(1) and the production consumes the
//! following entries it needs. Any other key is an expression statement:
//! assignment, op-assignment (either spelling), invocation when the value is
//! an array, or a bare expression when the entry has no value.
//!
//! An `if` whose condition is structurally `err != null` retroactively
//! regroups everything after the previous error-handling region into a new
//! one: those statements become the try region, the `then` block the error
//! region (with `err` bound), the `else` block the success region.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, LineCol, Result};
use crate::json::{Entry, Json, JsonObject};

use super::ast::{is_error_check, Expr, Modifiers, Param, Statement, Type};
use super::expr::{convert_json_template, ExprParser};

lazy_static! {
    static ref NAME: Regex = Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]*$").unwrap();
}

fn validate_name(name: &str, line_col: LineCol) -> Result<()> {
    if NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::parse(format!("invalid name: {}", name), line_col))
    }
}

/// A dotted type name, optionally with trailing `[]` suffixes.
fn validate_type_name(name: &str, line_col: LineCol) -> Result<()> {
    let mut base = name;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped;
    }
    if base.is_empty() || !base.split('.').all(|part| NAME.is_match(part)) {
        return Err(Error::parse(
            format!("invalid type name: {}", name),
            line_col,
        ));
    }
    Ok(())
}

fn require_null(key: &str, value: &Json) -> Result<()> {
    if value.is_null() {
        Ok(())
    } else {
        Err(Error::parse(
            format!("expecting no value for '{}'", key),
            value.line_col(),
        ))
    }
}

/// Converts an entry value into an expression. Strings are expression text;
/// scalars are literals.
pub fn json_to_expr(value: &Json) -> Result<Expr> {
    Ok(match value {
        Json::Null(lc) => Expr::NullLiteral {
            type_: None,
            line_col: *lc,
        },
        Json::Bool(b, lc) => Expr::BoolLiteral {
            value: *b,
            line_col: *lc,
        },
        Json::Int(n, lc) => Expr::IntLiteral {
            value: *n,
            line_col: *lc,
        },
        Json::Long(n, lc) => Expr::LongLiteral {
            value: *n,
            line_col: *lc,
        },
        Json::Double(d, lc) => Expr::FloatLiteral {
            value: *d,
            line_col: *lc,
        },
        Json::Str(s, lc) => ExprParser::new(s, *lc).parse()?,
        Json::Array(_, lc) => {
            return Err(Error::parse("unexpected array in expression position", *lc))
        }
        Json::Object(obj) => {
            return Err(Error::parse(
                "unexpected object in expression position",
                obj.line_col,
            ))
        }
    })
}

/// Parser over one statement list (the program document or a nested block).
pub struct StatementParser<'a> {
    entries: &'a [Entry],
    idx: usize,
}

impl<'a> StatementParser<'a> {
    pub fn new(entries: &'a [Entry]) -> Self {
        StatementParser { entries, idx: 0 }
    }

    /// Parses a whole program document.
    pub fn parse_document(obj: &'a JsonObject) -> Result<Vec<Statement>> {
        StatementParser::new(&obj.entries).parse()
    }

    /// Parses all remaining entries, applying the error-handling regroup.
    pub fn parse(&mut self) -> Result<Vec<Statement>> {
        let mut result = Vec::new();
        while self.idx < self.entries.len() {
            let stmt = self.parse_one()?;
            match stmt {
                Statement::If {
                    cond,
                    then,
                    else_,
                    line_col,
                } if is_error_check(&cond) => {
                    let start = result
                        .iter()
                        .rposition(|s| matches!(s, Statement::ErrorHandling { .. }))
                        .map(|i| i + 1)
                        .unwrap_or(0);
                    let try_ = result.split_off(start);
                    if try_.is_empty() {
                        return Err(Error::parse(
                            "no statements to run before error handling",
                            line_col,
                        ));
                    }
                    result.push(Statement::ErrorHandling {
                        try_,
                        error: then,
                        success: else_,
                        line_col,
                    });
                }
                other => result.push(other),
            }
        }
        Ok(result)
    }

    fn next_any(&mut self) -> Option<(&'a str, &'a Json, LineCol)> {
        let e = self.entries.get(self.idx)?;
        self.idx += 1;
        Some((e.key.as_str(), &e.value, e.line_col))
    }

    fn next_entry(&mut self, what: &str, after: LineCol) -> Result<(&'a str, &'a Json, LineCol)> {
        self.next_any().ok_or_else(|| {
            Error::parse(format!("unexpected end of block, expecting {}", what), after)
        })
    }

    fn peek_entry(&self) -> Option<(&'a str, &'a Json, LineCol)> {
        let e = self.entries.get(self.idx)?;
        Some((e.key.as_str(), &e.value, e.line_col))
    }

    fn parse_block(&self, value: &'a Json, what: &str) -> Result<Vec<Statement>> {
        match value.as_object() {
            Some(obj) => StatementParser::new(&obj.entries).parse(),
            None => Err(Error::parse(
                format!("expecting a block for {}", what),
                value.line_col(),
            )),
        }
    }

    fn parse_one(&mut self) -> Result<Statement> {
        let (key, value, lc) = match self.next_any() {
            Some(e) => e,
            None => {
                return Err(Error::parse(
                    "unexpected end of block",
                    LineCol::EMPTY,
                ))
            }
        };
        self.dispatch(key, value, lc, Modifiers::empty())
    }

    fn dispatch(
        &mut self,
        key: &'a str,
        value: &'a Json,
        lc: LineCol,
        modifiers: Modifiers,
    ) -> Result<Statement> {
        match key {
            "public" | "private" | "const" | "executable" => {
                require_null(key, value)?;
                let flag = match key {
                    "public" => Modifiers::PUBLIC,
                    "private" => Modifiers::PRIVATE,
                    "const" => Modifiers::CONST,
                    _ => Modifiers::EXECUTABLE,
                };
                if modifiers.contains(flag) {
                    return Err(Error::parse(format!("duplicate modifier '{}'", key), lc));
                }
                let modifiers = modifiers.with(flag);
                if modifiers.is_public() && modifiers.is_private() {
                    return Err(Error::parse(
                        "'public' conflicts with 'private'",
                        lc,
                    ));
                }
                let (k, v, l) = self.next_entry("a declaration after modifiers", lc)?;
                self.dispatch(k, v, l, modifiers)
            }
            "var" => {
                require_null(key, value)?;
                if modifiers.is_executable() {
                    return Err(Error::parse(
                        "'executable' can only decorate functions",
                        lc,
                    ));
                }
                self.parse_var(lc, modifiers)
            }
            "function" => {
                require_null(key, value)?;
                if modifiers.is_const() {
                    return Err(Error::parse("'const' can only decorate variables", lc));
                }
                self.parse_function(lc, modifiers)
            }
            "class" => {
                require_null(key, value)?;
                self.check_type_modifiers(modifiers, lc)?;
                self.parse_class(lc, modifiers, Vec::new())
            }
            "template" => {
                self.check_type_modifiers(modifiers, lc)?;
                self.parse_template(value, lc, modifiers)
            }
            "let" => {
                require_null(key, value)?;
                self.reject_modifiers(modifiers, key, lc)?;
                self.parse_let(lc)
            }
            "new" => {
                require_null(key, value)?;
                self.reject_modifiers(modifiers, key, lc)?;
                self.parse_new(lc)
            }
            "for" => {
                self.reject_modifiers(modifiers, key, lc)?;
                self.parse_for(value, lc)
            }
            "while" => {
                self.reject_modifiers(modifiers, key, lc)?;
                self.parse_while(value, lc)
            }
            "if" => {
                self.reject_modifiers(modifiers, key, lc)?;
                self.parse_if(value, lc)
            }
            "break" => {
                self.reject_modifiers(modifiers, key, lc)?;
                require_null(key, value)?;
                Ok(Statement::Break { line_col: lc })
            }
            "continue" => {
                self.reject_modifiers(modifiers, key, lc)?;
                require_null(key, value)?;
                Ok(Statement::Continue { line_col: lc })
            }
            "return" => {
                self.reject_modifiers(modifiers, key, lc)?;
                let v = if value.is_null() {
                    None
                } else {
                    Some(json_to_expr(value)?)
                };
                Ok(Statement::Return {
                    value: v,
                    line_col: lc,
                })
            }
            "throw" => {
                self.reject_modifiers(modifiers, key, lc)?;
                let v = if value.is_null() {
                    None
                } else {
                    Some(json_to_expr(value)?)
                };
                Ok(Statement::Throw {
                    value: v,
                    line_col: lc,
                })
            }
            _ => {
                self.reject_modifiers(modifiers, key, lc)?;
                self.parse_expr_statement(key, value, lc)
            }
        }
    }

    fn reject_modifiers(&self, modifiers: Modifiers, key: &str, lc: LineCol) -> Result<()> {
        if modifiers.is_empty() {
            Ok(())
        } else {
            Err(Error::parse(
                format!("modifiers cannot decorate '{}'", key),
                lc,
            ))
        }
    }

    fn check_type_modifiers(&self, modifiers: Modifiers, lc: LineCol) -> Result<()> {
        if modifiers.is_const() {
            return Err(Error::parse("'const' can only decorate variables", lc));
        }
        if modifiers.is_executable() {
            return Err(Error::parse(
                "'executable' can only decorate functions",
                lc,
            ));
        }
        Ok(())
    }

    fn parse_var(&mut self, kw: LineCol, modifiers: Modifiers) -> Result<Statement> {
        let (name, value, lc) = self.next_entry("a variable name after 'var'", kw)?;
        validate_name(name, lc)?;
        if value.is_null() {
            return Err(Error::parse(
                format!("expecting a value for variable '{}'", name),
                lc,
            ));
        }
        Ok(Statement::VariableDefinition {
            name: name.to_string(),
            value: json_to_expr(value)?,
            modifiers,
            line_col: kw,
        })
    }

    fn parse_function(&mut self, kw: LineCol, modifiers: Modifiers) -> Result<Statement> {
        let (name, params_val, name_lc) = self.next_entry("a function signature", kw)?;
        validate_name(name, name_lc)?;
        let params_obj = params_val.as_object().ok_or_else(|| {
            Error::parse(
                format!("expecting parameters for function '{}'", name),
                params_val.line_col(),
            )
        })?;
        let params = parse_params(params_obj)?;
        let (ret, body_val, ret_lc) =
            self.next_entry("the return type and body of the function", name_lc)?;
        validate_type_name(ret, ret_lc)?;
        let body = self.parse_block(body_val, "the function body")?;
        Ok(Statement::FunctionDefinition {
            name: name.to_string(),
            params,
            return_type: Type::new(ret, ret_lc),
            body,
            modifiers,
            line_col: kw,
        })
    }

    fn parse_class(
        &mut self,
        kw: LineCol,
        modifiers: Modifiers,
        type_params: Vec<String>,
    ) -> Result<Statement> {
        let (name, params_val, name_lc) = self.next_entry("a class name", kw)?;
        validate_name(name, name_lc)?;
        let params_obj = params_val.as_object().ok_or_else(|| {
            Error::parse(
                format!("expecting constructor parameters for class '{}'", name),
                params_val.line_col(),
            )
        })?;
        let params = parse_params(params_obj)?;
        let (do_key, body_val, do_lc) = self.next_entry("the 'do' block of the class", name_lc)?;
        if do_key != "do" {
            return Err(Error::parse(
                format!("expecting 'do' for the class body but got '{}'", do_key),
                do_lc,
            ));
        }
        let body = self.parse_block(body_val, "the class body")?;
        if type_params.is_empty() {
            Ok(Statement::ClassDefinition {
                name: name.to_string(),
                params,
                body,
                modifiers,
                line_col: kw,
            })
        } else {
            Ok(Statement::TemplateClassDefinition {
                type_params,
                name: name.to_string(),
                params,
                body,
                modifiers,
                line_col: kw,
            })
        }
    }

    fn parse_template(
        &mut self,
        value: &'a Json,
        kw: LineCol,
        modifiers: Modifiers,
    ) -> Result<Statement> {
        let obj = value.as_object().ok_or_else(|| {
            Error::parse("expecting type parameters for 'template'", value.line_col())
        })?;
        let mut type_params = Vec::new();
        for e in &obj.entries {
            require_null(&e.key, &e.value)?;
            validate_name(&e.key, e.line_col)?;
            if type_params.contains(&e.key) {
                return Err(Error::parse(
                    format!("duplicate type parameter '{}'", e.key),
                    e.line_col,
                ));
            }
            type_params.push(e.key.clone());
        }
        if type_params.is_empty() {
            return Err(Error::parse("expecting at least one type parameter", kw));
        }
        let (k, v, l) = self.next_entry("'class' after 'template'", kw)?;
        if k != "class" {
            return Err(Error::parse(
                format!("expecting 'class' after 'template' but got '{}'", k),
                l,
            ));
        }
        require_null(k, v)?;
        self.parse_class(l, modifiers, type_params)
    }

    fn parse_let(&mut self, kw: LineCol) -> Result<Statement> {
        let (alias, value, lc) = self.next_entry("a type alias after 'let'", kw)?;
        validate_name(alias, lc)?;
        let obj = value.as_object().ok_or_else(|| {
            Error::parse(
                "expecting { Template: [type arguments] } for 'let'",
                value.line_col(),
            )
        })?;
        if obj.entries.len() != 1 {
            return Err(Error::parse(
                "expecting exactly one template in 'let'",
                obj.line_col,
            ));
        }
        let e = &obj.entries[0];
        validate_type_name(&e.key, e.line_col)?;
        let args_json = e.value.as_array().ok_or_else(|| {
            Error::parse(
                format!("expecting type arguments for template '{}'", e.key),
                e.value.line_col(),
            )
        })?;
        let mut args = Vec::new();
        for a in args_json {
            match a {
                Json::Str(s, slc) => {
                    validate_type_name(s.trim(), *slc)?;
                    args.push(Type::new(s.trim(), *slc));
                }
                other => {
                    return Err(Error::parse(
                        format!("expecting a type name but got {}", other.type_name()),
                        other.line_col(),
                    ))
                }
            }
        }
        if args.is_empty() {
            return Err(Error::parse("expecting at least one type argument", lc));
        }
        Ok(Statement::TemplateTypeInstantiation {
            alias: alias.to_string(),
            template: Type::new(e.key.clone(), e.line_col),
            args,
            line_col: kw,
        })
    }

    fn parse_new(&mut self, kw: LineCol) -> Result<Statement> {
        let (raw_key, value, lc) = self.next_entry("a type to construct", kw)?;
        let mut key = raw_key;
        let mut offset = 0u32;
        while key.len() >= 2 && key.starts_with('(') && key.ends_with(')') {
            key = &key[1..key.len() - 1];
            offset += 1;
        }
        let type_pos = lc.add_col(offset);
        let expr = if let Some(open) = key.find('[') {
            let element = &key[..open];
            validate_type_name(element, type_pos)?;
            let mut depth = 1usize;
            let mut close = None;
            for (i, c) in key.char_indices().skip(open + 1) {
                match c {
                    '[' => depth += 1,
                    ']' => {
                        depth -= 1;
                        if depth == 0 {
                            close = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let close = close
                .ok_or_else(|| Error::parse("unbalanced '[' in array construction", type_pos))?;
            let len_text = &key[open + 1..close];
            if len_text.trim().is_empty() {
                return Err(Error::parse("expecting an array length", type_pos));
            }
            let len_pos = type_pos.add_col(key[..open + 1].chars().count() as u32);
            let len = ExprParser::new(len_text, len_pos).parse()?;
            let mut element = element.to_string();
            let mut rest = &key[close + 1..];
            while let Some(r) = rest.strip_prefix("[]") {
                element.push_str("[]");
                rest = r;
            }
            if !rest.is_empty() {
                return Err(Error::parse(
                    format!("invalid array construction: {}", raw_key),
                    type_pos,
                ));
            }
            require_null(raw_key, value)?;
            Expr::NewArray {
                element: Type::new(element, type_pos),
                len: Box::new(len),
                line_col: kw,
            }
        } else {
            validate_type_name(key, type_pos)?;
            let type_ = Type::new(key, type_pos);
            match value {
                Json::Null(_) => Expr::NewInstance {
                    type_,
                    args: Vec::new(),
                    line_col: kw,
                },
                Json::Array(elems, _) => {
                    let args = elems.iter().map(json_to_expr).collect::<Result<Vec<_>>>()?;
                    Expr::NewInstance {
                        type_,
                        args,
                        line_col: kw,
                    }
                }
                Json::Object(_) => Expr::NewInstanceWithJson {
                    type_,
                    json: Box::new(convert_json_template(value)?),
                    line_col: kw,
                },
                other => {
                    return Err(Error::parse(
                        format!(
                            "expecting construction arguments but got {}",
                            other.type_name()
                        ),
                        other.line_col(),
                    ))
                }
            }
        };
        Ok(Statement::Expr(expr))
    }

    fn parse_for(&mut self, value: &'a Json, kw: LineCol) -> Result<Statement> {
        let elems = value.as_array().ok_or_else(|| {
            Error::parse(
                "expecting [init, condition, increment] for 'for'",
                value.line_col(),
            )
        })?;
        if elems.len() != 3 {
            return Err(Error::parse(
                format!(
                    "expecting [init, condition, increment] for 'for' but got {} elements",
                    elems.len()
                ),
                value.line_col(),
            ));
        }
        let init = self.for_part(&elems[0])?;
        if elems[1].is_null() {
            return Err(Error::parse(
                "expecting the loop condition",
                elems[1].line_col(),
            ));
        }
        let cond = json_to_expr(&elems[1])?;
        let incr = self.for_part(&elems[2])?;
        let (do_key, body_val, do_lc) = self.next_entry("the 'do' block of the loop", kw)?;
        if do_key != "do" {
            return Err(Error::parse(
                format!("expecting 'do' for the loop body but got '{}'", do_key),
                do_lc,
            ));
        }
        let body = self.parse_block(body_val, "the loop body")?;
        Ok(Statement::For {
            init,
            cond,
            incr,
            body,
            line_col: kw,
        })
    }

    fn for_part(&self, part: &'a Json) -> Result<Vec<Statement>> {
        match part {
            Json::Null(_) => Ok(Vec::new()),
            Json::Object(obj) => StatementParser::new(&obj.entries).parse(),
            other => Ok(vec![Statement::Expr(json_to_expr(other)?)]),
        }
    }

    fn parse_while(&mut self, value: &'a Json, kw: LineCol) -> Result<Statement> {
        if value.is_null() {
            return Err(Error::parse("expecting the loop condition", kw));
        }
        let cond = json_to_expr(value)?;
        let (do_key, body_val, do_lc) = self.next_entry("the 'do' block of the loop", kw)?;
        if do_key != "do" {
            return Err(Error::parse(
                format!("expecting 'do' for the loop body but got '{}'", do_key),
                do_lc,
            ));
        }
        let body = self.parse_block(body_val, "the loop body")?;
        Ok(Statement::While {
            cond,
            body,
            line_col: kw,
        })
    }

    fn parse_if(&mut self, value: &'a Json, kw: LineCol) -> Result<Statement> {
        if value.is_null() {
            return Err(Error::parse("expecting the condition for 'if'", kw));
        }
        let cond = json_to_expr(value)?;
        let (then_key, then_val, then_lc) = self.next_entry("'then' after 'if'", kw)?;
        if then_key != "then" {
            return Err(Error::parse(
                format!("expecting 'then' after 'if' but got '{}'", then_key),
                then_lc,
            ));
        }
        let then = self.parse_block(then_val, "the 'then' block")?;
        let mut else_ = Vec::new();
        if let Some(("else", else_val, else_lc)) = self.peek_entry() {
            self.idx += 1;
            match else_val {
                Json::Object(obj) => {
                    else_ = StatementParser::new(&obj.entries).parse()?;
                }
                Json::Null(_) => {
                    // else-if chain
                    let (k, v, l) = self.next_entry("'if' after 'else'", else_lc)?;
                    if k != "if" {
                        return Err(Error::parse(
                            format!("expecting a block or 'if' after 'else' but got '{}'", k),
                            l,
                        ));
                    }
                    let inner = self.parse_if(v, l)?;
                    if is_error_check(&cond) {
                        return Err(Error::parse(
                            "error handling cannot take an else-if branch",
                            else_lc,
                        ));
                    }
                    if let Statement::If { cond: inner_cond, .. } = &inner {
                        if is_error_check(inner_cond) {
                            return Err(Error::parse(
                                "error handling cannot be used as an else-if branch",
                                l,
                            ));
                        }
                    }
                    else_ = vec![inner];
                }
                other => {
                    return Err(Error::parse(
                        format!(
                            "expecting a block or 'if' after 'else' but got {}",
                            other.type_name()
                        ),
                        other.line_col(),
                    ))
                }
            }
        }
        Ok(Statement::If {
            cond,
            then,
            else_,
            line_col: kw,
        })
    }

    fn parse_expr_statement(
        &mut self,
        key: &'a str,
        value: &'a Json,
        lc: LineCol,
    ) -> Result<Statement> {
        if let Some(op) = single_op(key) {
            // a bare operator key only makes sense right after a null-valued
            // entry, which consumed it already
            let _ = op;
            return Err(Error::parse(
                format!("unexpected operator entry '{}'", key),
                lc,
            ));
        }
        // trailing-operator spelling: `x+: 1`
        if key.len() > 1 {
            let last = key.chars().last().unwrap_or(' ');
            if let Some(op) = single_op(&last.to_string()) {
                let target_text = &key[..key.len() - last.len_utf8()];
                let target = ExprParser::new(target_text, lc).parse()?;
                if !target.is_assignable() {
                    return Err(Error::parse(
                        format!("{} is not assignable", target),
                        target.line_col(),
                    ));
                }
                if value.is_null() {
                    return Err(Error::parse(
                        "expecting a value for the op-assignment",
                        lc,
                    ));
                }
                return Ok(Statement::Expr(Expr::OpAssignment {
                    op,
                    target: Box::new(target),
                    value: Box::new(json_to_expr(value)?),
                    line_col: lc,
                }));
            }
        }
        // split spelling: `x += 1` arrives as x(null) followed by +(1)
        if value.is_null() {
            if let Some((next_key, next_val, next_lc)) = self.peek_entry() {
                if let Some(op) = single_op(next_key) {
                    self.idx += 1;
                    let target = ExprParser::new(key, lc).parse()?;
                    if !target.is_assignable() {
                        return Err(Error::parse(
                            format!("{} is not assignable", target),
                            target.line_col(),
                        ));
                    }
                    if next_val.is_null() {
                        return Err(Error::parse(
                            "expecting a value for the op-assignment",
                            next_lc,
                        ));
                    }
                    return Ok(Statement::Expr(Expr::OpAssignment {
                        op,
                        target: Box::new(target),
                        value: Box::new(json_to_expr(next_val)?),
                        line_col: next_lc,
                    }));
                }
            }
        }
        let expr = ExprParser::new(key, lc).parse()?;
        match value {
            Json::Null(_) => Ok(Statement::Expr(expr)),
            Json::Array(elems, alc) => {
                let args = elems.iter().map(json_to_expr).collect::<Result<Vec<_>>>()?;
                Ok(Statement::Expr(Expr::Invocation {
                    target: Box::new(expr),
                    args,
                    line_col: *alc,
                }))
            }
            Json::Str(s, slc)
                if matches!(
                    expr,
                    Expr::NullLiteral { type_: None, .. }
                ) =>
            {
                validate_type_name(s.trim(), *slc)?;
                Ok(Statement::Expr(Expr::NullLiteral {
                    type_: Some(Type::new(s.trim(), *slc)),
                    line_col: lc,
                }))
            }
            other => {
                if !expr.is_assignable() {
                    return Err(Error::parse(
                        format!("{} is not assignable", expr),
                        expr.line_col(),
                    ));
                }
                Ok(Statement::Expr(Expr::Assignment {
                    target: Box::new(expr),
                    value: Box::new(json_to_expr(other)?),
                    line_col: lc,
                }))
            }
        }
    }
}

fn single_op(key: &str) -> Option<super::ast::BinOpKind> {
    use super::ast::BinOpKind;
    Some(match key {
        "+" => BinOpKind::Plus,
        "-" => BinOpKind::Minus,
        "*" => BinOpKind::Multiply,
        "/" => BinOpKind::Divide,
        "%" => BinOpKind::Mod,
        _ => return None,
    })
}

/// Parameter list: each entry is `name: type` or `name: type = default`.
fn parse_params(obj: &JsonObject) -> Result<Vec<Param>> {
    let mut params = Vec::new();
    for e in &obj.entries {
        validate_name(&e.key, e.line_col)?;
        if params.iter().any(|p: &Param| p.name == e.key) {
            return Err(Error::parse(
                format!("duplicate parameter '{}'", e.key),
                e.line_col,
            ));
        }
        let (s, slc) = match &e.value {
            Json::Str(s, slc) => (s.as_str(), *slc),
            Json::Null(_) => {
                return Err(Error::parse(
                    format!("expecting a type for parameter '{}'", e.key),
                    e.line_col,
                ))
            }
            other => {
                return Err(Error::parse(
                    format!(
                        "expecting a type for parameter '{}' but got {}",
                        e.key,
                        other.type_name()
                    ),
                    other.line_col(),
                ))
            }
        };
        let (type_text, default) = match s.find('=') {
            Some(i) => {
                let default_text = &s[i + 1..];
                let offset = s[..i + 1].chars().count() as u32;
                let default = ExprParser::new(default_text, slc.add_col(offset)).parse()?;
                (s[..i].trim_end(), Some(default))
            }
            None => (s.trim_end(), None),
        };
        validate_type_name(type_text, slc)?;
        params.push(Param {
            name: e.key.clone(),
            type_: Type::new(type_text, slc),
            default,
            line_col: e.line_col,
        });
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::{parse_object, ParserOptions};
    use crate::source::CharCursor;

    fn parse(text: &str) -> Vec<Statement> {
        try_parse(text).unwrap()
    }

    fn try_parse(text: &str) -> Result<Vec<Statement>> {
        let mut cs = CharCursor::new(text);
        let obj = parse_object(&mut cs, &ParserOptions::program())?;
        StatementParser::parse_document(&obj)
    }

    #[test]
    fn variable_definition() {
        let stmts = parse("{var\nx: 1 + 2}");
        match &stmts[0] {
            Statement::VariableDefinition { name, value, .. } => {
                assert_eq!(name, "x");
                assert_eq!(value.to_string(), "(1 + 2)");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn class_with_params_and_defaults() {
        let stmts = parse(
            "{\nclass\nPoint: { x: int, y: int = 0 }\ndo: {\nfunction\nnorm: {} int: { return: x }\n}\n}",
        );
        match &stmts[0] {
            Statement::ClassDefinition {
                name, params, body, ..
            } => {
                assert_eq!(name, "Point");
                assert_eq!(params.len(), 2);
                assert_eq!(params[0].type_.name, "int");
                assert!(params[0].default.is_none());
                assert_eq!(params[1].default.as_ref().unwrap().to_string(), "0");
                assert!(matches!(body[0], Statement::FunctionDefinition { .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn if_else_chain() {
        let stmts = parse(
            "{\nif: a > 1\nthen: { x: 1 }\nelse\nif: a > 0\nthen: { x: 2 }\nelse: { x: 3 }\n}",
        );
        match &stmts[0] {
            Statement::If { else_, .. } => match &else_[0] {
                Statement::If { else_, .. } => assert_eq!(else_.len(), 1),
                other => panic!("unexpected: {:?}", other),
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn error_handling_regroup() {
        let stmts = parse(
            "{\nvar\nx: f:[1]\ng: []\nif: err != null\nthen: { h: [] }\nelse: { k: [] }\n}",
        );
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Statement::ErrorHandling {
                try_,
                error,
                success,
                ..
            } => {
                assert_eq!(try_.len(), 2);
                assert_eq!(error.len(), 1);
                assert_eq!(success.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn error_handling_needs_preceding_statements() {
        assert!(try_parse("{\nif: err != null\nthen: { h: [] }\n}").is_err());
    }

    #[test]
    fn op_assignment_spellings() {
        for text in ["{x += 2}", "{x +: 2}"] {
            let stmts = parse(text);
            match &stmts[0] {
                Statement::Expr(Expr::OpAssignment { op, target, .. }) => {
                    assert_eq!(op.to_string(), "+");
                    assert_eq!(target.to_string(), "x");
                }
                other => panic!("unexpected for {}: {:?}", text, other),
            }
        }
    }

    #[test]
    fn invocation_statement() {
        let stmts = parse("{std.console.log: [\"hi\"]}");
        match &stmts[0] {
            Statement::Expr(Expr::Invocation { target, args, .. }) => {
                assert_eq!(target.to_string(), "std.console.log");
                assert_eq!(args[0].to_string(), "\"hi\"");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn for_loop() {
        let stmts = parse("{\nfor: [ { var\ni: 0 }, i < 10, i += 1 ]\ndo: { total += i }\n}");
        match &stmts[0] {
            Statement::For {
                init, incr, body, ..
            } => {
                assert!(matches!(init[0], Statement::VariableDefinition { .. }));
                assert!(matches!(
                    incr[0],
                    Statement::Expr(Expr::OpAssignment { .. })
                ));
                assert!(matches!(
                    body[0],
                    Statement::Expr(Expr::OpAssignment { .. })
                ));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn template_and_let() {
        let stmts = parse(
            "{\ntemplate: { T }\nclass\nBox: { value: T }\ndo: {}\nlet\nIntBox: { Box: [int] }\n}",
        );
        match &stmts[0] {
            Statement::TemplateClassDefinition {
                type_params, name, ..
            } => {
                assert_eq!(type_params, &vec!["T".to_string()]);
                assert_eq!(name, "Box");
            }
            other => panic!("unexpected: {:?}", other),
        }
        match &stmts[1] {
            Statement::TemplateTypeInstantiation {
                alias,
                template,
                args,
                ..
            } => {
                assert_eq!(alias, "IntBox");
                assert_eq!(template.name, "Box");
                assert_eq!(args[0].name, "int");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn new_statement_forms() {
        let stmts = parse("{\nnew\nPoint: [1, 2]\nnew\nint[16]\n}");
        assert!(matches!(
            stmts[0],
            Statement::Expr(Expr::NewInstance { .. })
        ));
        assert!(matches!(stmts[1], Statement::Expr(Expr::NewArray { .. })));
    }

    #[test]
    fn break_takes_no_value() {
        assert!(try_parse("{while: true\ndo: { break: 1 }}").is_err());
        assert!(try_parse("{while: true\ndo: { break }}").is_ok());
    }

    #[test]
    fn typed_null_statement() {
        let stmts = parse("{null: Point}");
        match &stmts[0] {
            Statement::Expr(Expr::NullLiteral { type_: Some(t), .. }) => {
                assert_eq!(t.name, "Point");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn modifiers() {
        let stmts = parse("{\nprivate\nconst\nvar\nx: 1\n}");
        match &stmts[0] {
            Statement::VariableDefinition { modifiers, .. } => {
                assert!(modifiers.is_private());
                assert!(modifiers.is_const());
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(try_parse("{public\nprivate\nvar\nx: 1}").is_err());
        assert!(try_parse("{const\nfunction\nf: {} void: {}}").is_err());
    }
}
