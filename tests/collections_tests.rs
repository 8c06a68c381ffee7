//! End-to-end tests for the `std` collection templates: lists, sets, maps
//! and iterators.

use jsonpl::{Ctx, Error, Interpreter, InterpreterBuilder, Json};

fn run(program: &str) -> (Interpreter, Ctx) {
    let interp = InterpreterBuilder::new()
        .compile(program)
        .expect("compile failed");
    let frame = interp.execute().expect("execution failed");
    (interp, frame)
}

fn compile_err(program: &str) -> Error {
    InterpreterBuilder::new()
        .compile(program)
        .err()
        .expect("expected a compile error")
}

fn get(interp: &Interpreter, frame: &Ctx, name: &str) -> Json {
    interp.explorer().get(name, frame).expect("variable lookup")
}

fn get_int(interp: &Interpreter, frame: &Ctx, name: &str) -> i32 {
    match get(interp, frame, name) {
        Json::Int(v, _) => v,
        other => panic!("expected int for {}, got {:?}", name, other),
    }
}

fn get_str(interp: &Interpreter, frame: &Ctx, name: &str) -> String {
    match get(interp, frame, name) {
        Json::Str(v, _) => v,
        other => panic!("expected string for {}, got {:?}", name, other),
    }
}

fn get_bool(interp: &Interpreter, frame: &Ctx, name: &str) -> bool {
    match get(interp, frame, name) {
        Json::Bool(v, _) => v,
        other => panic!("expected bool for {}, got {:?}", name, other),
    }
}

#[test]
fn list_grows_and_indexes() {
    let program = "{\nlet\nIntList: { std.List: [int] }\n\
        var\nxs: new IntList\n\
        xs.add: [10]\nxs.add: [30]\nxs.insert: [1, 20]\n\
        var\na: xs.get:[0]\nvar\nb: xs.get:[1]\nvar\nc: xs.get:[2]\n\
        var\nn: xs.size:[]\n\
        var\ni: xs.indexOf:[30]\nvar\nhas: xs.contains:[20]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "a"), 10);
    assert_eq!(get_int(&i, &f, "b"), 20);
    assert_eq!(get_int(&i, &f, "c"), 30);
    assert_eq!(get_int(&i, &f, "n"), 3);
    assert_eq!(get_int(&i, &f, "i"), 2);
    assert!(get_bool(&i, &f, "has"));
}

#[test]
fn list_set_and_remove() {
    let program = "{\nlet\nIntList: { std.List: [int] }\n\
        var\nxs: new IntList:[16]\n\
        xs.add: [1]\nxs.add: [2]\nxs.add: [3]\n\
        xs.set: [0, 9]\n\
        var\ndropped: xs.removeAt:[1]\n\
        var\nn: xs.size:[]\nvar\nfirst: xs.get:[0]\nvar\nlast: xs.get:[1]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "dropped"), 2);
    assert_eq!(get_int(&i, &f, "n"), 2);
    assert_eq!(get_int(&i, &f, "first"), 9);
    assert_eq!(get_int(&i, &f, "last"), 3);
}

#[test]
fn list_snapshot_and_to_string() {
    let program = "{\nlet\nIntList: { std.List: [int] }\n\
        var\nxs: new IntList\nxs.add: [1]\nxs.add: [2]\n\
        var\ns: xs.toString:[]\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "s"), "[1, 2]");
    match get(&i, &f, "xs") {
        Json::Array(elems, _) => {
            assert_eq!(elems.len(), 2);
            assert!(elems[0].data_eq(&Json::Int(1, jsonpl::LineCol::EMPTY)));
        }
        other => panic!("expected array snapshot, got {:?}", other),
    }
}

#[test]
fn set_deduplicates_and_keeps_insertion_order() {
    let program = "{\nlet\nStrSet: { std.Set: [string] }\n\
        var\ns: new StrSet\n\
        var\nfirst: s.add:[\"b\"]\n\
        s.add: [\"a\"]\n\
        var\nagain: s.add:[\"b\"]\n\
        var\nn: s.size:[]\nvar\nhas: s.contains:[\"a\"]\n\
        var\ntext: s.toString:[]\n\
        var\ngone: s.remove:[\"a\"]\nvar\nm: s.size:[]\n}";
    let (i, f) = run(program);
    assert!(get_bool(&i, &f, "first"));
    assert!(!get_bool(&i, &f, "again"));
    assert_eq!(get_int(&i, &f, "n"), 2);
    assert!(get_bool(&i, &f, "has"));
    assert_eq!(get_str(&i, &f, "text"), "[b, a]");
    assert!(get_bool(&i, &f, "gone"));
    assert_eq!(get_int(&i, &f, "m"), 1);
}

#[test]
fn map_stores_and_snapshots_in_insertion_order() {
    let program = "{\nlet\nCounts: { std.Map: [string, int] }\n\
        var\nm: new Counts\n\
        m.put: [\"a\", 1]\nm.put: [\"b\", 2]\nm.put: [\"a\", 3]\n\
        var\na: m.get:[\"a\"]\nvar\nn: m.size:[]\n\
        var\nhas: m.containsKey:[\"b\"]\n\
        var\ntext: m.toString:[]\n\
        m.remove: [\"b\"]\nvar\nafter: m.size:[]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "a"), 3);
    assert_eq!(get_int(&i, &f, "n"), 2);
    assert!(get_bool(&i, &f, "has"));
    assert_eq!(get_str(&i, &f, "text"), "{a=3, b=2}");
    assert_eq!(get_int(&i, &f, "after"), 1);
    match get(&i, &f, "m") {
        Json::Object(obj) => {
            assert_eq!(obj.entries.len(), 1);
            assert_eq!(obj.entries[0].key, "a");
        }
        other => panic!("expected object snapshot, got {:?}", other),
    }
}

#[test]
fn map_keys_and_values_are_snapshots() {
    let program = "{\nlet\nCounts: { std.Map: [string, int] }\n\
        var\nm: new Counts\nm.put: [\"x\", 7]\nm.put: [\"y\", 8]\n\
        var\nks: m.keys:[]\nvar\nvs: m.values:[]\n\
        m.put: [\"z\", 9]\n\
        var\nkn: ks.size:[]\nvar\nvn: vs.size:[]\n\
        var\nv0: vs.get:[0]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "kn"), 2);
    assert_eq!(get_int(&i, &f, "vn"), 2);
    assert_eq!(get_int(&i, &f, "v0"), 7);
}

#[test]
fn missing_primitive_value_raises() {
    let program = "{\nlet\nCounts: { std.Map: [string, int] }\n\
        var\nm: new Counts\nvar\nx: m.get:[\"nope\"]\n}";
    let interp = InterpreterBuilder::new().compile(program).unwrap();
    let err = interp.execute().unwrap_err();
    assert!(err.to_string().contains("no such key"));
}

#[test]
fn missing_reference_value_is_null() {
    let program = "{\nlet\nNames: { std.Map: [int, string] }\n\
        var\nm: new Names\nm.put: [1, \"one\"]\n\
        var\nmissing: m.get:[2] == null\nvar\nfound: m.get:[1]\n}";
    let (i, f) = run(program);
    assert!(get_bool(&i, &f, "missing"));
    assert_eq!(get_str(&i, &f, "found"), "one");
}

#[test]
fn iterators_walk_lists_and_sets() {
    let program = "{\nlet\nIntList: { std.List: [int] }\n\
        let\nIntSet: { std.Set: [int] }\n\
        var\nxs: new IntList\nxs.add: [1]\nxs.add: [2]\nxs.add: [3]\n\
        var\nsum: 0\n\
        var\nit: xs.iterator:[]\n\
        while: it.hasNext:[]\ndo: { sum += it.next:[] }\n\
        var\nss: new IntSet\nss.add: [10]\nss.add: [20]\nss.add: [10]\n\
        var\nssum: 0\n\
        var\nsit: ss.iterator:[]\n\
        while: sit.hasNext:[]\ndo: { ssum += sit.next:[] }\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "sum"), 6);
    assert_eq!(get_int(&i, &f, "ssum"), 30);
}

#[test]
fn each_let_is_its_own_type() {
    let err = compile_err(
        "{\nlet\nA: { std.List: [int] }\nlet\nB: { std.List: [int] }\n\
         var\na: new A\na: new B\n}",
    );
    assert!(err.to_string().contains("cannot assign"));
}

#[test]
fn set_elements_are_restricted_to_key_families() {
    let err = compile_err("{\nlet\nBad: { std.Set: [double] }\n}");
    assert!(err.to_string().contains("int, long, bool or string"));
}

#[test]
fn collection_members_require_invocation() {
    let err = compile_err(
        "{\nlet\nIntList: { std.List: [int] }\nvar\nxs: new IntList\nvar\nn: xs.size\n}",
    );
    assert!(err.to_string().contains("must be invoked"));
}

#[test]
fn linked_aliases_name_the_same_templates() {
    let program = "{\nlet\nS: { std.LinkedHashSet: [int] }\n\
        let\nM: { std.LinkedHashMap: [string, bool] }\n\
        var\ns: new S\ns.add: [1]\n\
        var\nm: new M\nm.put: [\"on\", true]\n\
        var\nn: s.size:[]\nvar\nb: m.get:[\"on\"]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "n"), 1);
    assert!(get_bool(&i, &f, "b"));
}
