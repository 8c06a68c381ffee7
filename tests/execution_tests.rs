//! End-to-end tests for the core language: variables, arithmetic, control
//! flow, functions and closures.

use jsonpl::{Ctx, Interpreter, InterpreterBuilder, Json};

/// Compiles and runs a program, returning the interpreter and the global
/// frame of the finished run.
fn run(program: &str) -> (Interpreter, Ctx) {
    let interp = InterpreterBuilder::new()
        .compile(program)
        .expect("compile failed");
    let frame = interp.execute().expect("execution failed");
    (interp, frame)
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
fn arithmetic_and_precedence() {
    let (i, f) = run("{\nvar\nx: 1 + 2 * 3\nvar\ny: (1 + 2) * 3\nvar\nz: 7 % 4\n}");
    assert_eq!(get_int(&i, &f, "x"), 7);
    assert_eq!(get_int(&i, &f, "y"), 9);
    assert_eq!(get_int(&i, &f, "z"), 3);
}

#[test]
fn integer_arithmetic_wraps() {
    let (i, f) = run("{\nvar\nmax: 2147483647\nvar\nx: max + 1\n}");
    assert_eq!(get_int(&i, &f, "x"), i32::MIN);
}

#[test]
fn long_and_double_families() {
    let (i, f) = run(
        "{\nvar\nbig: 3000000000000\nvar\nmore: big + 1\nvar\nd: 1.5 + 0.25\nvar\nhalf: 1.0 / 2\n}",
    );
    match get(&i, &f, "more") {
        Json::Long(v, _) => assert_eq!(v, 3000000000001),
        other => panic!("expected long, got {:?}", other),
    }
    match get(&i, &f, "d") {
        Json::Double(v, _) => assert_eq!(v, 1.75),
        other => panic!("expected double, got {:?}", other),
    }
    match get(&i, &f, "half") {
        Json::Double(v, _) => assert_eq!(v, 0.5),
        other => panic!("expected double, got {:?}", other),
    }
}

#[test]
fn if_else_chain() {
    let program = "{\nvar\ngrade: 83\nvar\nlabel: \"\"\n\
        if: grade > 90\nthen: { label: \"a\" }\n\
        else\nif: grade > 80\nthen: { label: \"b\" }\n\
        else: { label: \"c\" }\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "label"), "b");
}

#[test]
fn while_loop_with_break_and_continue() {
    let program = "{\nvar\nsum: 0\nvar\ni: 0\n\
        while: true\ndo: {\n\
        i += 1\n\
        if: i > 10\nthen: { break }\n\
        if: i % 2 == 1\nthen: { continue }\n\
        sum += i\n}\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "sum"), 30); // 2+4+6+8+10
}

#[test]
fn for_loop_sums() {
    let program =
        "{\nvar\ntotal: 0\nfor: [ { var\ni: 1 }, i <= 10, i += 1 ]\ndo: { total += i }\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "total"), 55);
}

#[test]
fn functions_and_recursion() {
    let program = "{\nfunction\nfib: { n: int }\nint: {\n\
        if: n < 2\nthen: { return: n }\n\
        return: fib:[n - 1] + fib:[n - 2]\n}\n\
        var\nx: fib:[10]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "x"), 55);
}

#[test]
fn nested_functions_capture_the_enclosing_frame() {
    let program = "{\nfunction\nouter: {}\nint: {\n\
        var\nn: 10\n\
        function\nadd: { d: int }\nvoid: { n += d }\n\
        add: [5]\nadd: [7]\n\
        return: n\n}\n\
        var\nx: outer:[]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "x"), 22);
}

#[test]
fn op_assignment_both_spellings() {
    let (i, f) = run("{\nvar\nx: 10\nx += 5\nx -: 3\nvar\ny: 2\ny *= 8\n}");
    assert_eq!(get_int(&i, &f, "x"), 12);
    assert_eq!(get_int(&i, &f, "y"), 16);
}

#[test]
fn string_operations() {
    let program = "{\nvar\ns: \"hello, world\"\n\
        var\nup: s.substring:[0, 5]\n\
        var\nn: s.length:[]\n\
        var\ni: s.indexOf:[\"world\"]\n\
        var\nhas: s.contains:[\"lo, w\"]\n\
        var\ntrimmed: \"  pad  \".trim:[]\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "up"), "hello");
    assert_eq!(get_int(&i, &f, "n"), 12);
    assert_eq!(get_int(&i, &f, "i"), 7);
    assert_eq!(get_str(&i, &f, "trimmed"), "pad");
    assert!(matches!(get(&i, &f, "has"), Json::Bool(true, _)));
}

#[test]
fn string_concat_converts_operands() {
    let program = "{\nvar\nn: 6\nvar\ns: \"got \" + n + \" items, \" + 2.5 + \"kg\"\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "s"), "got 6 items, 2.5kg");
}

#[test]
fn unicode_strings_count_characters() {
    let program = "{\nvar\ns: \"héllo wörld\"\nvar\nn: s.length:[]\n\
        var\ni: s.indexOf:[\"wörld\"]\nvar\nsub: s.substring:[6, 11]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "n"), 11);
    assert_eq!(get_int(&i, &f, "i"), 6);
    assert_eq!(get_str(&i, &f, "sub"), "wörld");
}

#[test]
fn numeric_conversions() {
    let program = "{\nvar\nx: 65\nvar\nl: x.toLong:[]\nvar\nd: x.toDouble:[]\n\
        var\nback: d.toInt:[]\nvar\ntext: x.toString:[]\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "text"), "65");
    assert_eq!(get_int(&i, &f, "back"), 65);
}

#[test]
fn arrays_read_and_write() {
    let program = "{\nvar\na: new int[4]\n\
        for: [ { var\ni: 0 }, i < a.length, i += 1 ]\ndo: { a[i]: i * i }\n\
        var\nlast: a[3]\nvar\nn: a.length\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "last"), 9);
    assert_eq!(get_int(&i, &f, "n"), 4);
    match get(&i, &f, "a") {
        Json::Array(elems, _) => assert_eq!(elems.len(), 4),
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn executable_variables_invoke_on_access() {
    let program = "{\nvar\ncalls: 0\n\
        executable\nfunction\nnext: {}\nint: {\ncalls += 1\nreturn: calls\n}\n\
        var\na: next\nvar\nb: next\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "a"), 1);
    assert_eq!(get_int(&i, &f, "b"), 2);
}

#[test]
fn logic_operators() {
    let program = "{\nvar\nt: 1 < 2 && 2 < 3\nvar\nu: 1 > 2 || 3 > 2\nvar\nv: !(1 == 1)\n}";
    let (i, f) = run(program);
    assert!(matches!(get(&i, &f, "t"), Json::Bool(true, _)));
    assert!(matches!(get(&i, &f, "u"), Json::Bool(true, _)));
    assert!(matches!(get(&i, &f, "v"), Json::Bool(false, _)));
}

#[test]
fn fresh_frame_per_execution() {
    let interp = InterpreterBuilder::new()
        .compile("{\nvar\nx: 0\nx += 1\n}")
        .unwrap();
    let first = interp.execute().unwrap();
    let second = interp.execute().unwrap();
    let a = interp.explorer().get("x", &first).unwrap();
    let b = interp.explorer().get("x", &second).unwrap();
    assert!(a.data_eq(&b));
    assert!(matches!(a, Json::Int(1, _)));
}
