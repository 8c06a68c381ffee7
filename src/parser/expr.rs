//! Pratt expression parser.
//!
//! Operands land on an expression stack; binary operators wait on an
//! operator stack and fold whenever an incoming operator does not bind
//! tighter than the stack top (equal precedence folds, so operators are
//! left-associative). Unary operators collect on their own stack and wrap
//! the operand after its postfix chain (`.field`, `:[args]`, `[index]`)
//! completes, before any binary folding.

use crate::error::{Error, LineCol, Result};
use crate::json::Json;
use crate::lexer::{Token, TokenKind, TokenValue, Tokenizer};
use crate::source::CharCursor;

use super::ast::{BinOpKind, Expr, JsonArg, Type, UnaryOpKind};

/// Token kinds on which a sub-expression may end. The end token is never
/// consumed; the caller owns it.
#[derive(Debug, Clone, Copy, Default)]
struct Ends {
    eof: bool,
    right_par: bool,
    right_bracket: bool,
    comma: bool,
}

impl Ends {
    fn eof() -> Self {
        Ends {
            eof: true,
            ..Ends::default()
        }
    }

    fn contains(&self, kind: TokenKind) -> bool {
        match kind {
            TokenKind::RightPar => self.right_par,
            TokenKind::RightBracket => self.right_bracket,
            TokenKind::Comma => self.comma,
            _ => false,
        }
    }
}

#[derive(Default)]
struct Frame {
    expr_stack: Vec<Expr>,
    op_stack: Vec<(BinOpKind, LineCol)>,
    unary_stack: Vec<(UnaryOpKind, LineCol)>,
}

impl Frame {
    fn apply_unary(&mut self) {
        while let Some((op, line_col)) = self.unary_stack.pop() {
            if let Some(top) = self.expr_stack.pop() {
                self.expr_stack.push(Expr::Unary {
                    op,
                    expr: Box::new(top),
                    line_col,
                });
            }
        }
    }

    fn fold(&mut self, min_prec: i32) -> Result<()> {
        while let Some(&(op, line_col)) = self.op_stack.last() {
            if op.precedence() < min_prec {
                break;
            }
            self.op_stack.pop();
            let right = self.expr_stack.pop();
            let left = self.expr_stack.pop();
            match (left, right) {
                (Some(left), Some(right)) => self.expr_stack.push(Expr::BinOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    line_col,
                }),
                _ => {
                    return Err(Error::parse(
                        format!("missing operand for operator {}", op),
                        line_col,
                    ))
                }
            }
        }
        Ok(())
    }
}

fn binop_of(kind: TokenKind) -> Option<BinOpKind> {
    Some(match kind {
        TokenKind::Multiply => BinOpKind::Multiply,
        TokenKind::Divide => BinOpKind::Divide,
        TokenKind::Mod => BinOpKind::Mod,
        TokenKind::Plus => BinOpKind::Plus,
        TokenKind::Minus => BinOpKind::Minus,
        TokenKind::Gt => BinOpKind::Gt,
        TokenKind::Ge => BinOpKind::Ge,
        TokenKind::Lt => BinOpKind::Lt,
        TokenKind::Le => BinOpKind::Le,
        TokenKind::CmpEq => BinOpKind::CmpEq,
        TokenKind::CmpNe => BinOpKind::CmpNe,
        TokenKind::LogicAnd => BinOpKind::LogicAnd,
        TokenKind::LogicOr => BinOpKind::LogicOr,
        _ => return None,
    })
}

fn op_assign_of(kind: TokenKind) -> Option<BinOpKind> {
    Some(match kind {
        TokenKind::PlusAssign => BinOpKind::Plus,
        TokenKind::MinusAssign => BinOpKind::Minus,
        TokenKind::MultiplyAssign => BinOpKind::Multiply,
        TokenKind::DivideAssign => BinOpKind::Divide,
        TokenKind::ModAssign => BinOpKind::Mod,
        _ => return None,
    })
}

/// Parser for one expression fragment at a known document offset.
pub struct ExprParser {
    tokenizer: Tokenizer,
}

impl ExprParser {
    /// Creates a parser for `text`, whose first character sits at `start` in
    /// the program document.
    pub fn new(text: &str, start: LineCol) -> Self {
        ExprParser {
            tokenizer: Tokenizer::new(text, start),
        }
    }

    /// Parses the whole fragment into one expression.
    pub fn parse(&mut self) -> Result<Expr> {
        let expr = self.parse_sub(Ends::eof())?;
        match self.tokenizer.peek(1)? {
            None => Ok(expr),
            Some(t) => Err(Error::parse(
                format!("unexpected trailing token: {}", t.raw),
                t.line_col,
            )),
        }
    }

    fn next_required(&mut self, what: &str) -> Result<Token> {
        let line_col = self.tokenizer.current_line_col();
        self.tokenizer.next()?.ok_or_else(|| {
            Error::parse(format!("unexpected eof, expecting {}", what), line_col)
        })
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        let tok = self.next_required(what)?;
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(Error::parse(
                format!("expecting {} but got {}", what, tok.raw),
                tok.line_col,
            ))
        }
    }

    fn parse_sub(&mut self, ends: Ends) -> Result<Expr> {
        let mut fr = Frame::default();
        'operand: loop {
            // one operand, with unary prefixes
            loop {
                let tok = self.next_required("an expression")?;
                let line_col = tok.line_col;
                match tok.kind {
                    TokenKind::Int => {
                        let value = match tok.value {
                            Some(TokenValue::Int(v)) => v,
                            _ => 0,
                        };
                        fr.expr_stack.push(Expr::IntLiteral { value, line_col });
                        break;
                    }
                    TokenKind::Long => {
                        let value = match tok.value {
                            Some(TokenValue::Long(v)) => v,
                            _ => 0,
                        };
                        fr.expr_stack.push(Expr::LongLiteral { value, line_col });
                        break;
                    }
                    TokenKind::Double => {
                        let value = match tok.value {
                            Some(TokenValue::Double(v)) => v,
                            _ => 0.0,
                        };
                        fr.expr_stack.push(Expr::FloatLiteral { value, line_col });
                        break;
                    }
                    TokenKind::Bool => {
                        let value = matches!(tok.value, Some(TokenValue::Bool(true)));
                        fr.expr_stack.push(Expr::BoolLiteral { value, line_col });
                        break;
                    }
                    TokenKind::Str => {
                        let value = match tok.value {
                            Some(TokenValue::Str(s)) => s,
                            _ => String::new(),
                        };
                        fr.expr_stack.push(Expr::StringLiteral { value, line_col });
                        break;
                    }
                    TokenKind::Null => {
                        fr.expr_stack.push(Expr::NullLiteral {
                            type_: None,
                            line_col,
                        });
                        break;
                    }
                    TokenKind::VarName => {
                        fr.expr_stack.push(Expr::Access {
                            name: tok.raw,
                            from: None,
                            line_col,
                        });
                        break;
                    }
                    TokenKind::New => {
                        let e = self.parse_new(line_col)?;
                        fr.expr_stack.push(e);
                        break;
                    }
                    TokenKind::Plus => {
                        fr.unary_stack.push((UnaryOpKind::Positive, line_col));
                    }
                    TokenKind::Minus => {
                        fr.unary_stack.push((UnaryOpKind::Negative, line_col));
                    }
                    TokenKind::LogicNot => {
                        fr.unary_stack.push((UnaryOpKind::Not, line_col));
                    }
                    TokenKind::LeftPar => {
                        let inner = self.parse_sub(Ends {
                            right_par: true,
                            ..Ends::default()
                        })?;
                        self.expect(TokenKind::RightPar, "')'")?;
                        fr.expr_stack.push(inner);
                        break;
                    }
                    _ => {
                        return Err(Error::parse(
                            format!("unexpected token: {}", tok.raw),
                            line_col,
                        ))
                    }
                }
            }
            // postfix chain, then a binary operator or the end
            loop {
                let (kind, line_col, raw) = match self.tokenizer.peek(1)? {
                    Some(t) => (t.kind, t.line_col, t.raw.clone()),
                    None => {
                        if ends.eof {
                            fr.apply_unary();
                            fr.fold(0)?;
                            return finish(fr);
                        }
                        return Err(Error::parse(
                            "unexpected eof in expression",
                            self.tokenizer.current_line_col(),
                        ));
                    }
                };
                if ends.contains(kind) {
                    fr.apply_unary();
                    fr.fold(0)?;
                    return finish(fr);
                }
                if let Some(op) = binop_of(kind) {
                    self.tokenizer.next()?;
                    fr.apply_unary();
                    fr.fold(op.precedence())?;
                    fr.op_stack.push((op, line_col));
                    continue 'operand;
                }
                if let Some(op) = op_assign_of(kind) {
                    fr.apply_unary();
                    if !fr.op_stack.is_empty()
                        || !fr.unary_stack.is_empty()
                        || fr.expr_stack.len() != 1
                    {
                        return Err(Error::parse(
                            format!("invalid position for {}", raw),
                            line_col,
                        ));
                    }
                    self.tokenizer.next()?;
                    let target = fr.expr_stack.pop().ok_or_else(|| {
                        Error::parse(format!("missing target for {}", raw), line_col)
                    })?;
                    if !target.is_assignable() {
                        return Err(Error::parse(
                            format!("{} is not assignable", target),
                            target.line_col(),
                        ));
                    }
                    let value = self.parse_sub(ends)?;
                    return Ok(Expr::OpAssignment {
                        op,
                        target: Box::new(target),
                        value: Box::new(value),
                        line_col,
                    });
                }
                match kind {
                    TokenKind::Dot => {
                        self.tokenizer.next()?;
                        let field = self.expect(TokenKind::VarName, "a field name")?;
                        let from = fr.expr_stack.pop().ok_or_else(|| {
                            Error::parse("missing expression before '.'", line_col)
                        })?;
                        fr.expr_stack.push(Expr::Access {
                            name: field.raw,
                            from: Some(Box::new(from)),
                            line_col: field.line_col,
                        });
                    }
                    TokenKind::LeftBracket => {
                        self.tokenizer.next()?;
                        let index = self.parse_sub(Ends {
                            right_bracket: true,
                            ..Ends::default()
                        })?;
                        self.expect(TokenKind::RightBracket, "']'")?;
                        let from = fr.expr_stack.pop().ok_or_else(|| {
                            Error::parse("missing expression before '['", line_col)
                        })?;
                        fr.expr_stack.push(Expr::AccessIndex {
                            from: Box::new(from),
                            index: Box::new(index),
                            line_col,
                        });
                    }
                    TokenKind::Colon => {
                        self.tokenizer.next()?;
                        let args = self.parse_arguments()?;
                        let target = fr.expr_stack.pop().ok_or_else(|| {
                            Error::parse("missing expression before ':'", line_col)
                        })?;
                        fr.expr_stack.push(Expr::Invocation {
                            target: Box::new(target),
                            args,
                            line_col,
                        });
                    }
                    _ => {
                        return Err(Error::parse(
                            format!("unexpected token: {}", raw),
                            line_col,
                        ))
                    }
                }
            }
        }
    }

    /// `[arg, arg, ...]` after an invocation colon.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        self.expect(TokenKind::LeftBracket, "'[' for invocation arguments")?;
        let mut args = Vec::new();
        if let Some(t) = self.tokenizer.peek(1)? {
            if t.kind == TokenKind::RightBracket {
                self.tokenizer.next()?;
                return Ok(args);
            }
        }
        loop {
            args.push(self.parse_sub(Ends {
                comma: true,
                right_bracket: true,
                ..Ends::default()
            })?);
            let tok = self.next_required("',' or ']'")?;
            match tok.kind {
                TokenKind::Comma => {}
                TokenKind::RightBracket => break,
                _ => {
                    return Err(Error::parse(
                        format!("expecting ',' or ']' but got {}", tok.raw),
                        tok.line_col,
                    ))
                }
            }
        }
        Ok(args)
    }

    /// Construction after the `new` keyword: `new T`, `new T:[args]`,
    /// `new T:{json}`, `new T{json}` or `new Elem[len]` with trailing `[]`
    /// dimensions.
    fn parse_new(&mut self, new_pos: LineCol) -> Result<Expr> {
        let first = self.expect(TokenKind::VarName, "a type name")?;
        let type_pos = first.line_col;
        let mut name = first.raw;
        loop {
            match self.tokenizer.peek(1)? {
                Some(t) if t.kind == TokenKind::Dot => {
                    self.tokenizer.next()?;
                    let part = self.expect(TokenKind::VarName, "a type name")?;
                    name.push('.');
                    name.push_str(&part.raw);
                }
                _ => break,
            }
        }
        let next_kind = self.tokenizer.peek(1)?.map(|t| t.kind);
        match next_kind {
            Some(TokenKind::Colon) => {
                self.tokenizer.next()?;
                match self.tokenizer.peek(1)?.map(|t| t.kind) {
                    Some(TokenKind::LeftBracket) => {
                        let args = self.parse_arguments()?;
                        Ok(Expr::NewInstance {
                            type_: Type::new(name, type_pos),
                            args,
                            line_col: new_pos,
                        })
                    }
                    Some(TokenKind::LeftBrace) => {
                        let obj = self.tokenizer.take_json_object()?;
                        let json = convert_json_template(&Json::Object(obj))?;
                        Ok(Expr::NewInstanceWithJson {
                            type_: Type::new(name, type_pos),
                            json: Box::new(json),
                            line_col: new_pos,
                        })
                    }
                    _ => Err(Error::parse(
                        "expecting '[' or '{' after ':' in construction",
                        self.tokenizer.current_line_col(),
                    )),
                }
            }
            Some(TokenKind::LeftBrace) => {
                let obj = self.tokenizer.take_json_object()?;
                let json = convert_json_template(&Json::Object(obj))?;
                Ok(Expr::NewInstanceWithJson {
                    type_: Type::new(name, type_pos),
                    json: Box::new(json),
                    line_col: new_pos,
                })
            }
            Some(TokenKind::LeftBracket) => {
                self.tokenizer.next()?;
                let len = self.parse_sub(Ends {
                    right_bracket: true,
                    ..Ends::default()
                })?;
                self.expect(TokenKind::RightBracket, "']'")?;
                // trailing empty bracket pairs add array dimensions
                loop {
                    let one = self.tokenizer.peek(1)?.map(|t| t.kind);
                    let two = self.tokenizer.peek(2)?.map(|t| t.kind);
                    if one == Some(TokenKind::LeftBracket) && two == Some(TokenKind::RightBracket)
                    {
                        self.tokenizer.next()?;
                        self.tokenizer.next()?;
                        name.push_str("[]");
                    } else {
                        break;
                    }
                }
                Ok(Expr::NewArray {
                    element: Type::new(name, type_pos),
                    len: Box::new(len),
                    line_col: new_pos,
                })
            }
            _ => Ok(Expr::NewInstance {
                type_: Type::new(name, type_pos),
                args: Vec::new(),
                line_col: new_pos,
            }),
        }
    }
}

fn finish(mut fr: Frame) -> Result<Expr> {
    match (fr.expr_stack.pop(), fr.expr_stack.pop()) {
        (Some(e), None) => Ok(e),
        (Some(e), Some(_)) | (None, Some(e)) => Err(Error::parse(
            "invalid expression: dangling operand",
            e.line_col(),
        )),
        (None, None) => Err(Error::parse("empty expression", LineCol::EMPTY)),
    }
}

/// Converts a JSON template of `new T: { ... }` into construction arguments.
/// String leaves of the form `"${expr}"` are parsed as expressions at their
/// document position; everything else stays literal.
pub fn convert_json_template(json: &Json) -> Result<JsonArg> {
    Ok(match json {
        Json::Null(lc) => JsonArg::Expr(Expr::NullLiteral {
            type_: None,
            line_col: *lc,
        }),
        Json::Bool(b, lc) => JsonArg::Expr(Expr::BoolLiteral {
            value: *b,
            line_col: *lc,
        }),
        Json::Int(n, lc) => JsonArg::Expr(Expr::IntLiteral {
            value: *n,
            line_col: *lc,
        }),
        Json::Long(n, lc) => JsonArg::Expr(Expr::LongLiteral {
            value: *n,
            line_col: *lc,
        }),
        Json::Double(d, lc) => JsonArg::Expr(Expr::FloatLiteral {
            value: *d,
            line_col: *lc,
        }),
        Json::Str(s, lc) => {
            // program-mode values arrive raw; a fully quoted segment is a
            // string literal, possibly an interpolation escape
            let (content, content_pos) = if s.starts_with('"') || s.starts_with('\'') {
                let mut sub = CharCursor::with_start(s, *lc);
                let (c, p) = crate::json::parse_string_literal(&mut sub)?;
                if sub.has_next() {
                    return Err(Error::parse(
                        format!("invalid string in construction: {}", s),
                        *lc,
                    ));
                }
                (c, p)
            } else {
                (s.clone(), *lc)
            };
            if content.len() >= 3 && content.starts_with("${") && content.ends_with('}') {
                let inner = &content[2..content.len() - 1];
                let expr = ExprParser::new(inner, content_pos.add_col(2)).parse()?;
                JsonArg::Expr(expr)
            } else {
                JsonArg::Expr(Expr::StringLiteral {
                    value: content,
                    line_col: content_pos,
                })
            }
        }
        Json::Array(elems, lc) => JsonArg::Array(
            elems
                .iter()
                .map(convert_json_template)
                .collect::<Result<Vec<_>>>()?,
            *lc,
        ),
        Json::Object(obj) => JsonArg::Object(
            obj.entries
                .iter()
                .map(|e| Ok((e.key.clone(), convert_json_template(&e.value)?, e.line_col)))
                .collect::<Result<Vec<_>>>()?,
            obj.line_col,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Expr {
        ExprParser::new(text, LineCol::new(1, 1)).parse().unwrap()
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(parse("1 + 2 * 3").to_string(), "(1 + (2 * 3))");
        assert_eq!(parse("1 - 2 - 3").to_string(), "((1 - 2) - 3)");
        assert_eq!(parse("(1 + 2) * 3").to_string(), "((1 + 2) * 3)");
        assert_eq!(
            parse("a > 1 && b < 2 || c == 3").to_string(),
            "(((a > 1) && (b < 2)) || (c == 3))"
        );
    }

    #[test]
    fn unary_wraps_postfix_chain() {
        assert_eq!(parse("-a.b * c").to_string(), "((-a.b) * c)");
        assert_eq!(parse("!f:[x]").to_string(), "(!f:[x])");
        assert_eq!(parse("- -1").to_string(), "(-(-1))");
    }

    #[test]
    fn postfix_chain() {
        assert_eq!(parse("a.b[0].c:[1, 2]").to_string(), "a.b[0].c:[1, 2]");
    }

    #[test]
    fn op_assign_in_expression() {
        assert_eq!(parse("a += 1 + 2").to_string(), "a += (1 + 2)");
        assert!(ExprParser::new("1 += 2", LineCol::new(1, 1)).parse().is_err());
        assert!(ExprParser::new("a + b += 2", LineCol::new(1, 1))
            .parse()
            .is_err());
    }

    #[test]
    fn construction_forms() {
        assert_eq!(parse("new Point:[1, 2]").to_string(), "new Point:[1, 2]");
        assert_eq!(parse("new a.b.C").to_string(), "new a.b.C:[]");
        assert_eq!(parse("new int[5]").to_string(), "new int[5]");
        assert_eq!(parse("new int[n][]").to_string(), "new int[][n]");
        match parse("new Point: { x: 1, y: \"${a + 1}\" }") {
            Expr::NewInstanceWithJson { json, .. } => match *json {
                JsonArg::Object(entries, _) => {
                    assert_eq!(entries.len(), 2);
                    assert!(matches!(entries[0].1, JsonArg::Expr(Expr::IntLiteral { .. })));
                    assert!(matches!(entries[1].1, JsonArg::Expr(Expr::BinOp { .. })));
                }
                other => panic!("unexpected: {:?}", other),
            },
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_dangling_operator() {
        assert!(ExprParser::new("1 +", LineCol::new(1, 1)).parse().is_err());
        assert!(ExprParser::new("* 1", LineCol::new(1, 1)).parse().is_err());
    }
}
