//! Reflective access to checked frames.
//!
//! The checker records, per frame-owning scope, where each named variable
//! lives; an explorer then reads live values out of a running frame without
//! re-checking anything. Class explorers nest so instance fields are
//! reachable from the variable that holds the instance.

use std::rc::Rc;

use crate::error::{Error, LineCol, Result};
use crate::json::{Entry, Json, JsonObject};
use crate::parser::ast::Modifiers;
use crate::types::StorageKind;

use super::memory::{Ctx, ListValue, MapValue, RefValue, SetValue, Val};

/// One named slot of a frame.
#[derive(Debug, Clone)]
pub struct ExplorerVar {
    pub name: String,
    /// Display form of the declared type.
    pub type_name: String,
    pub modifiers: Modifiers,
    pub kind: StorageKind,
    pub index: usize,
    /// Field layout of the instance, when the declared type is a class.
    pub nested: Option<Rc<MemoryExplorer>>,
}

/// The layout of one frame-owning scope.
#[derive(Debug)]
pub struct MemoryExplorer {
    vars: Vec<ExplorerVar>,
}

impl MemoryExplorer {
    pub fn new(vars: Vec<ExplorerVar>) -> Self {
        MemoryExplorer { vars }
    }

    /// Named variables of the frame, in slot order per family.
    pub fn list_variables(&self) -> &[ExplorerVar] {
        &self.vars
    }

    /// The current value of `name` in `frame` as a document value. Values
    /// with no data representation come back as their display string.
    pub fn get(&self, name: &str, frame: &Ctx) -> Result<Json> {
        let var = self
            .vars
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::runtime(format!("no such variable: {}", name)))?;
        Ok(self
            .value_json(var, frame)
            .unwrap_or_else(|| Json::Str(self.raw_display(var, frame), LineCol::EMPTY)))
    }

    /// Snapshot of the frame as a document: public variables whose values
    /// have a data representation.
    pub fn to_json(&self, frame: &Ctx) -> Json {
        let mut entries = Vec::new();
        for var in &self.vars {
            if var.modifiers.is_private() {
                continue;
            }
            if let Some(value) = self.value_json(var, frame) {
                entries.push(Entry {
                    key: var.name.clone(),
                    value,
                    line_col: LineCol::EMPTY,
                });
            }
        }
        Json::Object(JsonObject {
            entries,
            line_col: LineCol::EMPTY,
        })
    }

    /// Human-readable dump of every named variable, one line each, nested
    /// instances indented.
    pub fn inspect(&self, frame: &Ctx) -> String {
        let mut out = String::new();
        self.inspect_into(frame, 0, &mut out);
        out
    }

    fn inspect_into(&self, frame: &Ctx, depth: usize, out: &mut String) {
        for var in &self.vars {
            for _ in 0..depth {
                out.push_str("  ");
            }
            out.push_str(&var.name);
            out.push_str(": ");
            out.push_str(&var.type_name);
            let nested_frame = match (&var.nested, var.kind) {
                (Some(_), StorageKind::Ref) => match &frame.borrow().refs[var.index] {
                    RefValue::Frame(obj) => Some(obj.clone()),
                    _ => None,
                },
                _ => None,
            };
            match (&var.nested, nested_frame) {
                (Some(nested), Some(obj)) => {
                    out.push('\n');
                    nested.inspect_into(&obj, depth + 1, out);
                }
                _ => {
                    out.push_str(" = ");
                    out.push_str(&self.raw_display(var, frame));
                    out.push('\n');
                }
            }
        }
    }

    fn raw_display(&self, var: &ExplorerVar, frame: &Ctx) -> String {
        let f = frame.borrow();
        match var.kind {
            StorageKind::Int => f.ints[var.index].to_string(),
            StorageKind::Long => f.longs[var.index].to_string(),
            StorageKind::Float => format!("{:?}", f.floats[var.index]),
            StorageKind::Double => format!("{:?}", f.doubles[var.index]),
            StorageKind::Bool => f.bools[var.index].to_string(),
            StorageKind::Ref => f.refs[var.index].display(),
        }
    }

    fn value_json(&self, var: &ExplorerVar, frame: &Ctx) -> Option<Json> {
        let f = frame.borrow();
        let lc = LineCol::EMPTY;
        Some(match var.kind {
            StorageKind::Int => Json::Int(f.ints[var.index], lc),
            StorageKind::Long => Json::Long(f.longs[var.index], lc),
            StorageKind::Float => Json::Double(f.floats[var.index] as f64, lc),
            StorageKind::Double => Json::Double(f.doubles[var.index], lc),
            StorageKind::Bool => Json::Bool(f.bools[var.index], lc),
            StorageKind::Ref => {
                let value = f.refs[var.index].clone();
                drop(f);
                return ref_json(&value, var.nested.as_deref());
            }
        })
    }
}

fn ref_json(value: &RefValue, nested: Option<&MemoryExplorer>) -> Option<Json> {
    let lc = LineCol::EMPTY;
    Some(match value {
        RefValue::Null => Json::Null(lc),
        RefValue::Str(s) => Json::Str(s.to_string(), lc),
        RefValue::Frame(obj) => nested?.to_json(obj),
        RefValue::ArrInt(a) => Json::Array(
            a.borrow().iter().map(|v| Json::Int(*v, lc)).collect(),
            lc,
        ),
        RefValue::ArrLong(a) => Json::Array(
            a.borrow().iter().map(|v| Json::Long(*v, lc)).collect(),
            lc,
        ),
        RefValue::ArrFloat(a) => Json::Array(
            a.borrow()
                .iter()
                .map(|v| Json::Double(*v as f64, lc))
                .collect(),
            lc,
        ),
        RefValue::ArrDouble(a) => Json::Array(
            a.borrow().iter().map(|v| Json::Double(*v, lc)).collect(),
            lc,
        ),
        RefValue::ArrBool(a) => Json::Array(
            a.borrow().iter().map(|v| Json::Bool(*v, lc)).collect(),
            lc,
        ),
        RefValue::List(list) => list_json(&list.borrow())?,
        RefValue::Set(set) => set_json(&set.borrow())?,
        RefValue::Map(map) => map_json(&map.borrow())?,
        _ => return None,
    })
}

fn val_json(val: &Val) -> Option<Json> {
    let lc = LineCol::EMPTY;
    Some(match val {
        Val::Int(v) => Json::Int(*v, lc),
        Val::Long(v) => Json::Long(*v, lc),
        Val::Float(v) => Json::Double(*v as f64, lc),
        Val::Double(v) => Json::Double(*v, lc),
        Val::Bool(v) => Json::Bool(*v, lc),
        Val::Ref(r) => return ref_json(r, None),
    })
}

fn list_json(list: &ListValue) -> Option<Json> {
    let elems: Option<Vec<Json>> = (0..list.len())
        .filter_map(|i| list.get(i))
        .map(|v| val_json(&v))
        .collect();
    Some(Json::Array(elems?, LineCol::EMPTY))
}

fn set_json(set: &SetValue) -> Option<Json> {
    let elems: Option<Vec<Json>> = (0..set.len())
        .filter_map(|i| set.get(i))
        .map(|v| val_json(&v))
        .collect();
    Some(Json::Array(elems?, LineCol::EMPTY))
}

fn map_json(map: &MapValue) -> Option<Json> {
    let mut entries = Vec::with_capacity(map.len());
    for i in 0..map.len() {
        let key = map.key_at(i)?;
        let value = map.get(&key)?;
        entries.push(Entry {
            key: key.display(),
            value: val_json(&value)?,
            line_col: LineCol::EMPTY,
        });
    }
    Some(Json::Object(JsonObject {
        entries,
        line_col: LineCol::EMPTY,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::memory::ActionContext;
    use crate::types::RuntimeMemoryTotal;

    fn var(name: &str, type_name: &str, kind: StorageKind, index: usize) -> ExplorerVar {
        ExplorerVar {
            name: name.to_string(),
            type_name: type_name.to_string(),
            modifiers: Modifiers::empty(),
            kind,
            index,
            nested: None,
        }
    }

    #[test]
    fn snapshot_skips_private_and_opaque() {
        let frame = ActionContext::new_ctx(
            RuntimeMemoryTotal {
                ints: 1,
                refs: 2,
                ..Default::default()
            },
            None,
        );
        frame.borrow_mut().ints[0] = 9;
        frame.borrow_mut().refs[0] = RefValue::Str(Rc::from("hi"));
        // refs[1] stays null but is private
        let mut secret = var("secret", "string", StorageKind::Ref, 1);
        secret.modifiers = Modifiers::empty().with(Modifiers::PRIVATE);
        let explorer = MemoryExplorer::new(vec![
            var("n", "int", StorageKind::Int, 0),
            var("s", "string", StorageKind::Ref, 0),
            secret,
        ]);
        let snapshot = explorer.to_json(&frame);
        assert_eq!(snapshot.stringify(), "{\"n\":9,\"s\":\"hi\"}");
    }

    #[test]
    fn nested_instance_appears_inline() {
        let inner = ActionContext::new_ctx(
            RuntimeMemoryTotal {
                ints: 1,
                ..Default::default()
            },
            None,
        );
        inner.borrow_mut().ints[0] = 3;
        let outer = ActionContext::new_ctx(
            RuntimeMemoryTotal {
                refs: 1,
                ..Default::default()
            },
            None,
        );
        outer.borrow_mut().refs[0] = RefValue::Frame(inner);
        let mut holder = var("p", "Point", StorageKind::Ref, 0);
        holder.nested = Some(Rc::new(MemoryExplorer::new(vec![var(
            "x",
            "int",
            StorageKind::Int,
            0,
        )])));
        let explorer = MemoryExplorer::new(vec![holder]);
        assert_eq!(explorer.to_json(&outer).stringify(), "{\"p\":{\"x\":3}}");
        let got = explorer.get("p", &outer).unwrap();
        assert!(got.as_object().is_some());
        assert!(explorer.get("missing", &outer).is_err());
    }
}
