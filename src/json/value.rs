//! The positioned JSON value tree.

use crate::error::LineCol;

/// A JSON value. Each variant records where its content begins; string nodes
/// record the position of the first content character (after the opening
/// quote, when there is one), so expression parsing of a string value can use
/// the position directly.
#[derive(Debug, Clone)]
pub enum Json {
    Null(LineCol),
    Bool(bool, LineCol),
    /// Integer fitting in 32 bits.
    Int(i32, LineCol),
    /// Integer requiring 64 bits.
    Long(i64, LineCol),
    Double(f64, LineCol),
    Str(String, LineCol),
    Array(Vec<Json>, LineCol),
    Object(JsonObject),
}

/// An object: an ordered entry list. Duplicate keys are preserved, the
/// statement parser depends on reading entries in source order.
#[derive(Debug, Clone)]
pub struct JsonObject {
    pub entries: Vec<Entry>,
    /// Position of the opening brace.
    pub line_col: LineCol,
}

/// One `key: value` entry. A value-less entry (permissive mode) holds
/// [`Json::Null`] at the key's position.
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: String,
    pub value: Json,
    /// Position of the key.
    pub line_col: LineCol,
}

impl Json {
    /// Position where this value's content begins.
    pub fn line_col(&self) -> LineCol {
        match self {
            Json::Null(lc)
            | Json::Bool(_, lc)
            | Json::Int(_, lc)
            | Json::Long(_, lc)
            | Json::Double(_, lc)
            | Json::Str(_, lc)
            | Json::Array(_, lc) => *lc,
            Json::Object(obj) => obj.line_col,
        }
    }

    /// A short name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Json::Null(_) => "null",
            Json::Bool(..) => "bool",
            Json::Int(..) => "int",
            Json::Long(..) => "long",
            Json::Double(..) => "double",
            Json::Str(..) => "string",
            Json::Array(..) => "array",
            Json::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Json::Null(_))
    }

    pub fn as_object(&self) -> Option<&JsonObject> {
        match self {
            Json::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Json]> {
        match self {
            Json::Array(elems, _) => Some(elems),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Json::Str(s, _) => Some(s),
            _ => None,
        }
    }

    /// Compact JSON text.
    pub fn stringify(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, None, 0);
        out
    }

    /// Indented JSON text (two-space indent).
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, Some(2), 0);
        out
    }

    fn write(&self, out: &mut String, indent: Option<usize>, depth: usize) {
        match self {
            Json::Null(_) => out.push_str("null"),
            Json::Bool(b, _) => out.push_str(if *b { "true" } else { "false" }),
            Json::Int(n, _) => out.push_str(&n.to_string()),
            Json::Long(n, _) => out.push_str(&n.to_string()),
            // {:?} keeps the trailing ".0" so doubles stay doubles
            Json::Double(d, _) => out.push_str(&format!("{:?}", d)),
            Json::Str(s, _) => write_string(out, s),
            Json::Array(elems, _) => {
                out.push('[');
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    newline_indent(out, indent, depth + 1);
                    elem.write(out, indent, depth + 1);
                }
                if !elems.is_empty() {
                    newline_indent(out, indent, depth);
                }
                out.push(']');
            }
            Json::Object(obj) => {
                out.push('{');
                for (i, entry) in obj.entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    newline_indent(out, indent, depth + 1);
                    write_string(out, &entry.key);
                    out.push(':');
                    if indent.is_some() {
                        out.push(' ');
                    }
                    entry.value.write(out, indent, depth + 1);
                }
                if !obj.entries.is_empty() {
                    newline_indent(out, indent, depth);
                }
                out.push('}');
            }
        }
    }

    /// Bridges to `serde_json` for host consumption. Positions are dropped;
    /// duplicate object keys keep the last value.
    pub fn to_serde(&self) -> serde_json::Value {
        match self {
            Json::Null(_) => serde_json::Value::Null,
            Json::Bool(b, _) => serde_json::Value::Bool(*b),
            Json::Int(n, _) => serde_json::Value::Number((*n).into()),
            Json::Long(n, _) => serde_json::Value::Number((*n).into()),
            Json::Double(d, _) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Json::Str(s, _) => serde_json::Value::String(s.clone()),
            Json::Array(elems, _) => {
                serde_json::Value::Array(elems.iter().map(Json::to_serde).collect())
            }
            Json::Object(obj) => {
                let mut map = serde_json::Map::new();
                for entry in &obj.entries {
                    map.insert(entry.key.clone(), entry.value.to_serde());
                }
                serde_json::Value::Object(map)
            }
        }
    }

    /// Structural equality ignoring positions. Objects compare entries in
    /// order.
    pub fn data_eq(&self, other: &Json) -> bool {
        match (self, other) {
            (Json::Null(_), Json::Null(_)) => true,
            (Json::Bool(a, _), Json::Bool(b, _)) => a == b,
            (Json::Int(a, _), Json::Int(b, _)) => a == b,
            (Json::Long(a, _), Json::Long(b, _)) => a == b,
            (Json::Double(a, _), Json::Double(b, _)) => a == b,
            (Json::Str(a, _), Json::Str(b, _)) => a == b,
            (Json::Array(a, _), Json::Array(b, _)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.data_eq(y))
            }
            (Json::Object(a), Json::Object(b)) => {
                a.entries.len() == b.entries.len()
                    && a.entries
                        .iter()
                        .zip(&b.entries)
                        .all(|(x, y)| x.key == y.key && x.value.data_eq(&y.value))
            }
            _ => false,
        }
    }
}

fn newline_indent(out: &mut String, indent: Option<usize>, depth: usize) {
    if let Some(width) = indent {
        out.push('\n');
        for _ in 0..width * depth {
            out.push(' ');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

impl JsonObject {
    /// Entry list in source order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Value of the first entry with `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Json> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lc() -> LineCol {
        LineCol::EMPTY
    }

    #[test]
    fn stringify_escapes_and_keeps_double_suffix() {
        let v = Json::Object(JsonObject {
            entries: vec![
                Entry {
                    key: "s".to_string(),
                    value: Json::Str("a\"b\n".to_string(), lc()),
                    line_col: lc(),
                },
                Entry {
                    key: "d".to_string(),
                    value: Json::Double(1.0, lc()),
                    line_col: lc(),
                },
            ],
            line_col: lc(),
        });
        assert_eq!(v.stringify(), "{\"s\":\"a\\\"b\\n\",\"d\":1.0}");
    }

    #[test]
    fn serde_bridge() {
        let v = Json::Array(vec![Json::Int(1, lc()), Json::Long(1 << 40, lc())], lc());
        assert_eq!(v.to_serde(), serde_json::json!([1, 1099511627776i64]));
    }
}
