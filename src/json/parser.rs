//! The permissive JSON parser.
//!
//! One parser, driven by [`ParserOptions`]. With everything off it is a
//! strict JSON reader; [`ParserOptions::program`] enables the relaxations the
//! statement grammar depends on. The important one is unquoted string values:
//! a value that is not structurally an object, array or quoted string is
//! scanned as a quote-aware segment and classified afterwards, so `x: 12`
//! yields an int while `x: 1 + 2` yields the raw string `"1 + 2"` for the
//! expression parser.

use crate::error::{Error, LineCol, Result};
use crate::source::{CharCursor, Chars};

/// Syntax relaxations. All off = strict JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParserOptions {
    /// Object keys without quotes.
    pub key_no_quotes: bool,
    /// String values without quotes (segment scan + classification).
    pub string_value_no_quotes: bool,
    /// Entries/elements separated by line breaks instead of commas.
    pub allow_omitting_commas: bool,
    /// A key followed by a separator or line break forms an entry with a
    /// null value.
    pub allow_entry_without_value: bool,
    /// `key { ... }` without a colon.
    pub allow_omitting_colon_before_braces: bool,
    /// `=` accepted where `:` is expected.
    pub equals_as_colon: bool,
    /// `;` accepted where `,` is expected.
    pub semicolon_as_comma: bool,
    /// Single-quoted strings.
    pub string_single_quotes: bool,
}

impl ParserOptions {
    /// Strict JSON, for data documents (explorer snapshots).
    pub fn data() -> Self {
        ParserOptions::default()
    }

    /// All relaxations on, for program documents.
    pub fn program() -> Self {
        ParserOptions {
            key_no_quotes: true,
            string_value_no_quotes: true,
            allow_omitting_commas: true,
            allow_entry_without_value: true,
            allow_omitting_colon_before_braces: true,
            equals_as_colon: true,
            semicolon_as_comma: true,
            string_single_quotes: true,
        }
    }
}

/// Parses `text` as one strict JSON value; trailing content is an error.
pub fn parse(text: &str) -> Result<super::Json> {
    let mut cs = CharCursor::new(text);
    let opts = ParserOptions::data();
    let value = parse_value(&mut cs, &opts)?;
    ensure_eof(&mut cs)?;
    Ok(value)
}

/// Parses one value from `cs`, leaving the cursor after it.
pub fn parse_with<C: Chars>(cs: &mut C, opts: &ParserOptions) -> Result<super::Json> {
    parse_value(cs, opts)
}

/// Parses a full document that must be a single object, then requires eof.
pub fn parse_object<C: Chars>(cs: &mut C, opts: &ParserOptions) -> Result<super::JsonObject> {
    cs.skip_blank()?;
    let open = cs.line_col();
    match cs.peek(1) {
        Some('{') => {
            cs.advance();
        }
        Some(c) => {
            return Err(Error::parse(
                format!("expecting '{{' but got '{}'", c),
                open,
            ))
        }
        None => return Err(Error::parse("expecting '{' but got eof", open)),
    }
    let obj = parse_object_body(cs, opts, open)?;
    ensure_eof(cs)?;
    Ok(obj)
}

fn ensure_eof<C: Chars>(cs: &mut C) -> Result<()> {
    cs.skip_blank()?;
    match cs.peek(1) {
        None => Ok(()),
        Some(c) => Err(Error::parse(
            format!("unexpected trailing content: '{}'", c),
            cs.line_col(),
        )),
    }
}

fn skip_inline<C: Chars>(cs: &mut C) {
    while let Some(c) = cs.peek(1) {
        if c == ' ' || c == '\t' || c == '\r' {
            cs.advance();
        } else {
            break;
        }
    }
}

fn is_quote(c: char, opts: &ParserOptions) -> bool {
    c == '"' || (c == '\'' && opts.string_single_quotes)
}

fn parse_value<C: Chars>(cs: &mut C, opts: &ParserOptions) -> Result<super::Json> {
    cs.skip_blank()?;
    let pos = cs.line_col();
    match cs.peek(1) {
        None => Err(Error::parse("unexpected eof when reading a value", pos)),
        Some('{') => {
            cs.advance();
            Ok(super::Json::Object(parse_object_body(cs, opts, pos)?))
        }
        Some('[') => {
            cs.advance();
            parse_array_body(cs, opts, pos)
        }
        Some(c) => {
            if opts.string_value_no_quotes {
                let segment = scan_segment(cs, opts)?;
                classify_segment(&segment, pos)
            } else if is_quote(c, opts) {
                let (content, content_pos) = parse_string_literal(cs)?;
                Ok(super::Json::Str(content, content_pos))
            } else if c == '-' || c.is_ascii_digit() {
                parse_strict_number(cs, pos)
            } else if c.is_ascii_alphabetic() {
                parse_strict_keyword(cs, pos)
            } else {
                Err(Error::parse(
                    format!("invalid character for a value: '{}'", c),
                    pos,
                ))
            }
        }
    }
}

/// Object body, the opening brace already consumed. Public because the
/// tokenizer hands over here for `new T: { ... }` construction embedded in
/// expressions.
pub fn parse_object_body<C: Chars>(
    cs: &mut C,
    opts: &ParserOptions,
    open: LineCol,
) -> Result<super::JsonObject> {
    let mut entries = Vec::new();
    loop {
        cs.skip_blank()?;
        match cs.peek(1) {
            None => {
                return Err(Error::parse(
                    "unexpected eof, expecting '}'",
                    cs.line_col(),
                ))
            }
            Some('}') => {
                cs.advance();
                break;
            }
            _ => {}
        }
        let entry_pos = cs.line_col();
        let key = parse_key(cs, opts)?;
        skip_inline(cs);
        let value = match cs.peek(1) {
            Some(':') => {
                cs.advance();
                parse_value(cs, opts)?
            }
            Some('=') if opts.equals_as_colon => {
                cs.advance();
                parse_value(cs, opts)?
            }
            Some('{') if opts.allow_omitting_colon_before_braces => {
                let brace = cs.line_col();
                cs.advance();
                super::Json::Object(parse_object_body(cs, opts, brace)?)
            }
            // anything else leaves the entry value-less; the next character
            // then starts a separator or the next key, which is what turns
            // `x += 2` into the entry pair x(null), +(2)
            _ if opts.allow_entry_without_value => super::Json::Null(entry_pos),
            _ => {
                return Err(Error::parse(
                    format!("expecting ':' after object key \"{}\"", key),
                    cs.line_col(),
                ))
            }
        };
        entries.push(super::Entry {
            key,
            value,
            line_col: entry_pos,
        });
        skip_inline(cs);
        match cs.peek(1) {
            Some(',') => {
                cs.advance();
            }
            Some(';') if opts.semicolon_as_comma => {
                cs.advance();
            }
            Some('}') => {
                cs.advance();
                break;
            }
            Some('\n') if opts.allow_omitting_commas => {
                cs.advance();
            }
            None => {
                return Err(Error::parse(
                    "unexpected eof, expecting '}'",
                    cs.line_col(),
                ))
            }
            Some(_) if opts.allow_omitting_commas => {}
            Some(c) => {
                return Err(Error::parse(
                    format!("expecting ',' or '}}' but got '{}'", c),
                    cs.line_col(),
                ))
            }
        }
    }
    Ok(super::JsonObject {
        entries,
        line_col: open,
    })
}

fn parse_key<C: Chars>(cs: &mut C, opts: &ParserOptions) -> Result<String> {
    let pos = cs.line_col();
    match cs.peek(1) {
        Some(c) if is_quote(c, opts) || c == '"' => {
            let (content, _) = parse_string_literal(cs)?;
            Ok(content)
        }
        Some(_) if opts.key_no_quotes => {
            let mut key = String::new();
            while let Some(c) = cs.peek(1) {
                let terminator = c.is_whitespace()
                    || c == ':'
                    || c == ','
                    || c == '{'
                    || c == '}'
                    || (c == '=' && opts.equals_as_colon)
                    || (c == ';' && opts.semicolon_as_comma);
                if terminator {
                    break;
                }
                key.push(c);
                cs.advance();
            }
            if key.is_empty() {
                Err(Error::parse("expecting an object key", pos))
            } else {
                Ok(key)
            }
        }
        Some(c) => Err(Error::parse(
            format!("expecting '\"' for an object key but got '{}'", c),
            pos,
        )),
        None => Err(Error::parse("unexpected eof, expecting an object key", pos)),
    }
}

fn parse_array_body<C: Chars>(
    cs: &mut C,
    opts: &ParserOptions,
    open: LineCol,
) -> Result<super::Json> {
    let mut elems = Vec::new();
    loop {
        cs.skip_blank()?;
        match cs.peek(1) {
            None => {
                return Err(Error::parse(
                    "unexpected eof, expecting ']'",
                    cs.line_col(),
                ))
            }
            Some(']') => {
                cs.advance();
                break;
            }
            _ => {}
        }
        elems.push(parse_value(cs, opts)?);
        skip_inline(cs);
        match cs.peek(1) {
            Some(',') => {
                cs.advance();
            }
            Some(';') if opts.semicolon_as_comma => {
                cs.advance();
            }
            Some(']') => {
                cs.advance();
                break;
            }
            Some('\n') if opts.allow_omitting_commas => {
                cs.advance();
            }
            None => {
                return Err(Error::parse(
                    "unexpected eof, expecting ']'",
                    cs.line_col(),
                ))
            }
            Some(_) if opts.allow_omitting_commas => {}
            Some(c) => {
                return Err(Error::parse(
                    format!("expecting ',' or ']' but got '{}'", c),
                    cs.line_col(),
                ))
            }
        }
    }
    Ok(super::Json::Array(elems, open))
}

/// Scans one unquoted value segment. The segment ends at a comma, line break
/// or closing bracket at nesting depth zero; quoted substrings and nested
/// `()`/`[]`/`{}` pairs are carried through verbatim so expression text like
/// `new Point: { x: 1, y: 2 }` survives as one value.
fn scan_segment<C: Chars>(cs: &mut C, opts: &ParserOptions) -> Result<String> {
    let mut out = String::new();
    let mut par = 0u32;
    let mut bracket = 0u32;
    let mut brace = 0u32;
    loop {
        let depth0 = par == 0 && bracket == 0 && brace == 0;
        match cs.peek(1) {
            None => break,
            Some('\n') if depth0 => break,
            Some(',') if depth0 => break,
            Some(';') if depth0 && opts.semicolon_as_comma => break,
            Some('}') => {
                if brace == 0 {
                    break;
                }
                brace -= 1;
                out.push('}');
                cs.advance();
            }
            Some(']') => {
                if bracket == 0 {
                    break;
                }
                bracket -= 1;
                out.push(']');
                cs.advance();
            }
            Some(')') => {
                if par == 0 {
                    break;
                }
                par -= 1;
                out.push(')');
                cs.advance();
            }
            Some('{') => {
                brace += 1;
                out.push('{');
                cs.advance();
            }
            Some('[') => {
                bracket += 1;
                out.push('[');
                cs.advance();
            }
            Some('(') => {
                par += 1;
                out.push('(');
                cs.advance();
            }
            Some(q) if q == '"' || q == '\'' => {
                let start = cs.line_col();
                out.push(q);
                cs.advance();
                loop {
                    match cs.advance() {
                        None => return Err(Error::parse("unexpected eof in string", start)),
                        Some('\n') => {
                            return Err(Error::parse("unexpected end of line in string", start))
                        }
                        Some('\\') => {
                            out.push('\\');
                            match cs.advance() {
                                None => {
                                    return Err(Error::parse("unexpected eof in string", start))
                                }
                                Some(c) => out.push(c),
                            }
                        }
                        Some(c) => {
                            out.push(c);
                            if c == q {
                                break;
                            }
                        }
                    }
                }
            }
            Some(c) => {
                out.push(c);
                cs.advance();
            }
        }
    }
    Ok(out)
}

fn classify_segment(segment: &str, pos: LineCol) -> Result<super::Json> {
    let trimmed = segment.trim_end();
    if trimmed.is_empty() {
        return Err(Error::parse("expecting a value", pos));
    }
    match trimmed {
        "null" => return Ok(super::Json::Null(pos)),
        "true" => return Ok(super::Json::Bool(true, pos)),
        "false" => return Ok(super::Json::Bool(false, pos)),
        _ => {}
    }
    let mut chars = trimmed.chars();
    let first = chars.next().unwrap_or(' ');
    let digits = if first == '-' { chars.as_str() } else { trimmed };
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return match trimmed.parse::<i64>() {
            Ok(n) => Ok(int_or_long(n, pos)),
            Err(_) => Err(Error::parse("integer value out of range", pos)),
        };
    }
    let numeric_chars = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if numeric_chars
        && (first == '-' || first.is_ascii_digit())
        && trimmed.contains(['.', 'e', 'E'])
    {
        if let Ok(d) = trimmed.parse::<f64>() {
            return Ok(super::Json::Double(d, pos));
        }
    }
    // quoted segments stay raw: the expression layer decides whether
    // `"x"` is a string literal, so `name: "x"` and `name: "x" + y` both
    // reach it as source text
    Ok(super::Json::Str(trimmed.to_string(), pos))
}

fn int_or_long(n: i64, pos: LineCol) -> super::Json {
    match i32::try_from(n) {
        Ok(i) => super::Json::Int(i, pos),
        Err(_) => super::Json::Long(n, pos),
    }
}

fn parse_strict_number<C: Chars>(cs: &mut C, pos: LineCol) -> Result<super::Json> {
    let mut text = String::new();
    while let Some(c) = cs.peek(1) {
        if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
            text.push(c);
            cs.advance();
        } else {
            break;
        }
    }
    if let Ok(n) = text.parse::<i64>() {
        return Ok(int_or_long(n, pos));
    }
    match text.parse::<f64>() {
        Ok(d) => Ok(super::Json::Double(d, pos)),
        Err(_) => Err(Error::parse(format!("illegal number: {}", text), pos)),
    }
}

fn parse_strict_keyword<C: Chars>(cs: &mut C, pos: LineCol) -> Result<super::Json> {
    let mut word = String::new();
    while let Some(c) = cs.peek(1) {
        if c.is_ascii_alphabetic() {
            word.push(c);
            cs.advance();
        } else {
            break;
        }
    }
    match word.as_str() {
        "null" => Ok(super::Json::Null(pos)),
        "true" => Ok(super::Json::Bool(true, pos)),
        "false" => Ok(super::Json::Bool(false, pos)),
        _ => Err(Error::parse(format!("invalid value: {}", word), pos)),
    }
}

/// Reads a quoted string literal, the cursor positioned at the opening quote
/// (single or double). Returns the decoded content and the position of the
/// first content character.
pub fn parse_string_literal<C: Chars>(cs: &mut C) -> Result<(String, LineCol)> {
    let quote_pos = cs.line_col();
    let quote = match cs.advance() {
        Some(c) if c == '"' || c == '\'' => c,
        _ => return Err(Error::parse("expecting a string quote", quote_pos)),
    };
    let content_pos = cs.line_col();
    let mut out = String::new();
    loop {
        match cs.advance() {
            None => return Err(Error::parse("unexpected eof in string", quote_pos)),
            Some(c) if c == quote => break,
            Some('\n') => return Err(Error::parse("unexpected end of line in string", quote_pos)),
            Some('\\') => {
                let escape_pos = cs.line_col();
                match cs.advance() {
                    Some('"') => out.push('"'),
                    Some('\'') => out.push('\''),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            let digit = cs
                                .advance()
                                .and_then(|c| c.to_digit(16))
                                .ok_or_else(|| {
                                    Error::parse("invalid unicode escape", escape_pos)
                                })?;
                            code = code * 16 + digit;
                        }
                        match char::from_u32(code) {
                            Some(c) => out.push(c),
                            None => {
                                return Err(Error::parse("invalid unicode escape", escape_pos))
                            }
                        }
                    }
                    Some(c) => {
                        return Err(Error::parse(
                            format!("invalid escape character: '{}'", c),
                            escape_pos,
                        ))
                    }
                    None => return Err(Error::parse("unexpected eof in string", quote_pos)),
                }
            }
            Some(c) => out.push(c),
        }
    }
    Ok((out, content_pos))
}

#[cfg(test)]
mod tests {
    use super::super::Json;
    use super::*;

    fn program(text: &str) -> super::super::JsonObject {
        let mut cs = CharCursor::new(text);
        parse_object(&mut cs, &ParserOptions::program()).unwrap()
    }

    #[test]
    fn strict_rejects_unquoted() {
        assert!(parse("{a: 1}").is_err());
        assert!(parse("{\"a\": 1}").is_ok());
    }

    #[test]
    fn strict_values() {
        let v = parse("{\"a\": [1, 2.5, true, null, \"s\", 4294967296]}").unwrap();
        let obj = v.as_object().unwrap();
        let arr = obj.get("a").unwrap().as_array().unwrap();
        assert!(matches!(arr[0], Json::Int(1, _)));
        assert!(matches!(arr[1], Json::Double(d, _) if d == 2.5));
        assert!(matches!(arr[2], Json::Bool(true, _)));
        assert!(arr[3].is_null());
        assert_eq!(arr[4].as_str(), Some("s"));
        assert!(matches!(arr[5], Json::Long(4294967296, _)));
    }

    #[test]
    fn segment_classification() {
        let obj = program("{a: 12\nb: 1 + 2\nc: null\nd: 2.5\ne: \"x\"\nf: \"x\" + y}");
        assert!(matches!(obj.get("a"), Some(Json::Int(12, _))));
        assert_eq!(obj.get("b").unwrap().as_str(), Some("1 + 2"));
        assert!(obj.get("c").unwrap().is_null());
        assert!(matches!(obj.get("d"), Some(Json::Double(d, _)) if *d == 2.5));
        assert_eq!(obj.get("e").unwrap().as_str(), Some("\"x\""));
        assert_eq!(obj.get("f").unwrap().as_str(), Some("\"x\" + y"));
    }

    #[test]
    fn keyword_entries_have_null_values() {
        let obj = program("{var\nx: 1 + 2}");
        assert_eq!(obj.entries[0].key, "var");
        assert!(obj.entries[0].value.is_null());
        assert_eq!(obj.entries[1].key, "x");
        assert_eq!(obj.entries[1].value.as_str(), Some("1 + 2"));
    }

    #[test]
    fn op_assign_splits_into_two_entries() {
        // '=' terminates the key, so `x += 2` reads as x(null) then +(2)
        let obj = program("{x += 2}");
        assert_eq!(obj.entries[0].key, "x");
        assert!(obj.entries[0].value.is_null());
        assert_eq!(obj.entries[1].key, "+");
        assert!(matches!(obj.entries[1].value, Json::Int(2, _)));
    }

    #[test]
    fn trailing_operator_key() {
        let obj = program("{x+: 2}");
        assert_eq!(obj.entries[0].key, "x+");
        assert!(matches!(obj.entries[0].value, Json::Int(2, _)));
    }

    #[test]
    fn nested_construction_survives_as_one_segment() {
        let obj = program("{var\np: new Point: { x: 1, y: 2 }\n}");
        assert_eq!(
            obj.entries[1].value.as_str(),
            Some("new Point: { x: 1, y: 2 }")
        );
    }

    #[test]
    fn equals_and_semicolon_aliases() {
        let obj = program("{a = 1; b = 2}");
        assert!(matches!(obj.get("a"), Some(Json::Int(1, _))));
        assert!(matches!(obj.get("b"), Some(Json::Int(2, _))));
    }

    #[test]
    fn omitted_colon_before_braces() {
        let obj = program("{do {x: 1}}");
        let inner = obj.get("do").unwrap().as_object().unwrap();
        assert!(matches!(inner.get("x"), Some(Json::Int(1, _))));
    }

    #[test]
    fn string_positions_point_at_content() {
        let v = parse("{\"a\": \"xy\"}").unwrap();
        match v.as_object().unwrap().get("a") {
            Some(Json::Str(s, lc)) => {
                assert_eq!(s, "xy");
                // quote at column 7, content at column 8
                assert_eq!(*lc, LineCol::new(1, 8));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn round_trip_strict() {
        let text = "{\"a\":[1,2.5,\"s\"],\"b\":{\"c\":null}}";
        let v = parse(text).unwrap();
        let back = parse(&v.stringify()).unwrap();
        assert!(v.data_eq(&back));
    }
}
