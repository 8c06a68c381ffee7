//! End-to-end tests for classes: construction, fields, methods, computed
//! members, json construction and template instantiation.

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

#[test]
fn construction_and_field_access() {
    let program = "{\nclass\nPoint: { x: int, y: int }\ndo: {}\n\
        var\np: new Point:[3, 4]\n\
        var\na: p.x\np.y: 7\nvar\nb: p.y\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "a"), 3);
    assert_eq!(get_int(&i, &f, "b"), 7);
}

#[test]
fn methods_see_instance_fields() {
    let program = "{\nclass\nPoint: { x: int, y: int }\ndo: {\n\
        function\nsum: {}\nint: { return: x + y }\n\
        function\nscale: { by: int }\nvoid: {\nx *= by\ny *= by\n}\n}\n\
        var\np: new Point:[3, 4]\n\
        var\nbefore: p.sum:[]\n\
        p.scale: [10]\n\
        var\nafter: p.sum:[]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "before"), 7);
    assert_eq!(get_int(&i, &f, "after"), 70);
}

#[test]
fn constructor_defaults_apply() {
    let program = "{\nclass\nConn: { host: string, port: int = 80 }\ndo: {}\n\
        var\nc: new Conn:[\"example.org\"]\nvar\np: c.port\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "p"), 80);
}

#[test]
fn json_construction_matches_by_name() {
    let program = "{\nclass\nSize: { w: int, h: int }\ndo: {}\n\
        class\nRect: { pos: int[], size: Size, name: string = \"rect\" }\ndo: {}\n\
        var\nr: new Rect {\npos: [3, 4]\nsize: { w: 10, h: 20 }\n}\n\
        var\nx: r.pos[0]\nvar\nw: r.size.w\nvar\nn: r.name\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "x"), 3);
    assert_eq!(get_int(&i, &f, "w"), 10);
    assert_eq!(get_str(&i, &f, "n"), "rect");
}

#[test]
fn json_construction_interpolates_expressions() {
    let program = "{\nclass\nBox: { n: int }\ndo: {}\n\
        var\na: 20\n\
        var\nb: new Box { n: \"${a + 1}\" }\n\
        var\nx: b.n\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "x"), 21);
}

#[test]
fn json_construction_rejects_unknown_keys() {
    let err = compile_err(
        "{\nclass\nP: { x: int = 0 }\ndo: {}\nvar\np: new P { y: 1 }\n}",
    );
    assert!(err.to_string().contains("no parameter named"));
}

#[test]
fn private_members_stay_inside() {
    let program = "{\nclass\nCounter: {}\ndo: {\n\
        private\nvar\nn: 0\n\
        function\nbump: {}\nint: {\nn += 1\nreturn: n\n}\n}\n\
        var\nc: new Counter\nc.bump: []\nvar\nx: c.bump:[]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "x"), 2);

    let err = compile_err(
        "{\nclass\nCounter: {}\ndo: { private\nvar\nn: 0 }\n\
         var\nc: new Counter\nvar\nx: c.n\n}",
    );
    assert!(err.to_string().contains("private"));
}

#[test]
fn executable_members_compute_on_access() {
    let program = "{\nclass\nTemp: { celsius: double }\ndo: {\n\
        executable\nfunction\nfahrenheit: {}\ndouble: {\n\
        return: celsius * 1.8 + 32.0\n}\n}\n\
        var\nt: new Temp:[100.0]\nvar\nfh: t.fahrenheit\n}";
    let (i, f) = run(program);
    match get(&i, &f, "fh") {
        Json::Double(v, _) => assert_eq!(v, 212.0),
        other => panic!("expected double, got {:?}", other),
    }
}

#[test]
fn to_string_joins_concatenation() {
    let program = "{\nclass\nPoint: { x: int, y: int }\ndo: {\n\
        function\ntoString: {}\nstring: {\n\
        return: \"(\" + x + \", \" + y + \")\"\n}\n}\n\
        var\np: new Point:[3, 4]\nvar\ns: \"at \" + p\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "s"), "at (3, 4)");
}

#[test]
fn templates_instantiate_per_let() {
    let program = "{\ntemplate: { T }\nclass\nBox: { value: T }\ndo: {\n\
        function\nget: {}\nT: { return: value }\n\
        function\nput: { v: T }\nvoid: { value: v }\n}\n\
        let\nIntBox: { Box: [int] }\n\
        let\nStrBox: { Box: [string] }\n\
        var\na: new IntBox:[42]\n\
        var\nb: new StrBox:[\"hi\"]\n\
        a.put: [7]\n\
        var\nx: a.get:[]\nvar\ny: b.get:[]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "x"), 7);
    assert_eq!(get_str(&i, &f, "y"), "hi");
}

#[test]
fn distinct_lets_are_distinct_types() {
    let err = compile_err(
        "{\ntemplate: { T }\nclass\nBox: { value: T }\ndo: {}\n\
         let\nA: { Box: [int] }\nlet\nB: { Box: [int] }\n\
         var\na: new A:[1]\na: new B:[2]\n}",
    );
    assert!(err.to_string().contains("cannot assign"));
}

#[test]
fn instances_nest_in_snapshots() {
    let program = "{\nclass\nInner: { n: int }\ndo: {}\n\
        class\nOuter: { inner: Inner, tag: string }\ndo: {}\n\
        var\no: new Outer { inner: { n: 5 }, tag: \"t\" }\n}";
    let (i, f) = run(program);
    match get(&i, &f, "o") {
        Json::Object(obj) => {
            let inner = obj.get("inner").expect("inner entry");
            assert!(inner.as_object().is_some());
        }
        other => panic!("expected object, got {:?}", other),
    }
}

#[test]
fn null_fields_compare_by_identity() {
    let program = "{\nclass\nNode: { next: Node = null }\ndo: {}\n\
        var\na: new Node\nvar\nb: new Node { next: \"${a}\" }\n\
        var\nend: a.next == null\nvar\nlinked: b.next == a\n}";
    let (i, f) = run(program);
    assert!(matches!(get(&i, &f, "end"), Json::Bool(true, _)));
    assert!(matches!(get(&i, &f, "linked"), Json::Bool(true, _)));
}

#[test]
fn bare_template_leaves_stay_data() {
    // an unquoted leaf is a raw string, not a variable reference; only the
    // "${expr}" form reaches the expression parser
    let err = compile_err(
        "{\nclass\nNode: { next: Node = null }\ndo: {}\n\
         var\na: new Node\nvar\nb: new Node { next: a }\n}",
    );
    assert!(err.to_string().contains("cannot use string as Node"));
}

#[test]
fn executable_members_cannot_take_parameters() {
    let err = compile_err(
        "{\nclass\nTemp: {}\ndo: {\n\
         executable\nfunction\nscaled: { by: int }\nint: { return: by }\n}\n}",
    );
    assert!(err.to_string().contains("cannot take parameters"));
}
