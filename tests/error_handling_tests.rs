//! End-to-end tests for error-handling regions, throw/rethrow and the
//! script-level trace on uncaught errors.

use jsonpl::{Ctx, Error, Interpreter, InterpreterBuilder, Json};

fn run(program: &str) -> (Interpreter, Ctx) {
    let interp = InterpreterBuilder::new()
        .compile(program)
        .expect("compile failed");
    let frame = interp.execute().expect("execution failed");
    (interp, frame)
}

fn run_err(program: &str) -> Error {
    let interp = InterpreterBuilder::new()
        .compile(program)
        .expect("compile failed");
    interp.execute().err().expect("expected a runtime error")
}

fn get_str(interp: &Interpreter, frame: &Ctx, name: &str) -> String {
    match interp.explorer().get(name, frame).expect("variable lookup") {
        Json::Str(v, _) => v,
        other => panic!("expected string for {}, got {:?}", name, other),
    }
}

fn get_int(interp: &Interpreter, frame: &Ctx, name: &str) -> i32 {
    match interp.explorer().get(name, frame).expect("variable lookup") {
        Json::Int(v, _) => v,
        other => panic!("expected int for {}, got {:?}", name, other),
    }
}

#[test]
fn guarded_region_catches() {
    let program = "{\nvar\nx: 0\nvar\nmsg: \"\"\n\
        var\ny: 10 / x\n\
        if: err != null\nthen: { msg: err.message:[] }\n\
        else: { msg: \"ok\" }\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "msg"), "divide by zero");
}

#[test]
fn success_branch_runs_without_error() {
    let program = "{\nvar\nx: 5\nvar\nmsg: \"\"\n\
        var\ny: 10 / x\n\
        if: err != null\nthen: { msg: err.message:[] }\n\
        else: { msg: \"ok\" }\n\
        var\nz: y\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "msg"), "ok");
    assert_eq!(get_int(&i, &f, "z"), 2);
}

#[test]
fn thrown_strings_become_errors() {
    let program = "{\nvar\nmsg: \"\"\n\
        throw: \"boom\"\n\
        if: err != null\nthen: { msg: err.message:[] }\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "msg"), "boom");
}

#[test]
fn error_to_string_includes_message() {
    let program = "{\nvar\ntext: \"\"\n\
        throw: \"kaput\"\n\
        if: err != null\nthen: { text: err.toString:[] }\n}";
    let (i, f) = run(program);
    assert!(get_str(&i, &f, "text").contains("kaput"));
}

#[test]
fn bare_throw_rethrows_to_the_caller() {
    let program = "{\nfunction\nrisky: {}\nvoid: {\n\
        var\nx: 0\nvar\ny: 1 / x\n\
        if: err != null\nthen: { throw }\n}\n\
        var\nmsg: \"\"\n\
        risky: []\n\
        if: err != null\nthen: { msg: err.message:[] }\n}";
    let (i, f) = run(program);
    assert_eq!(get_str(&i, &f, "msg"), "divide by zero");
}

#[test]
fn handled_errors_do_not_propagate() {
    let program = "{\nvar\nafter: 0\n\
        throw: \"contained\"\n\
        if: err != null\nthen: {}\n\
        after: 1\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "after"), 1);
}

#[test]
fn regions_nest() {
    let program = "{\nfunction\ninner: {}\nint: {\n\
        var\nx: 0\nvar\ny: 1 / x\n\
        if: err != null\nthen: { return: -1 }\n\
        return: y\n}\n\
        var\nmsg: \"\"\n\
        var\ngot: inner:[]\n\
        if: err != null\nthen: { msg: \"outer\" }\n\
        else: { msg: \"clean\" }\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "got"), -1);
    assert_eq!(get_str(&i, &f, "msg"), "clean");
}

#[test]
fn uncaught_errors_name_the_site() {
    let err = run_err(
        "{\nclass\nWidget: {}\ndo: {\n\
         function\nexplode: {}\nvoid: { throw: \"kaput\" }\n}\n\
         var\nw: new Widget\nw.explode: []\n}",
    );
    let text = err.to_string();
    assert!(text.contains("kaput"));
    assert!(text.contains("Widget#explode"));
    assert!(text.contains(" at "));
}

#[test]
fn runaway_recursion_overflows() {
    // must surface as the catchable runtime error, never a host abort
    let err = run_err(
        "{\nfunction\ndown: { n: int }\nint: {\nreturn: down:[n + 1]\n}\n\
         var\nx: down:[0]\n}",
    );
    assert!(err.to_string().contains("stack overflow"));
}

#[test]
fn recursion_under_the_cap_completes() {
    let program = "{\nfunction\ncount: { n: int }\nint: {\n\
        if: n >= 200\nthen: { return: n }\n\
        return: count:[n + 1]\n}\n\
        var\nx: count:[0]\n}";
    let (i, f) = run(program);
    assert_eq!(get_int(&i, &f, "x"), 200);
}

#[test]
fn err_is_invisible_outside_the_region() {
    let err = InterpreterBuilder::new()
        .compile("{\nvar\nx: 1\nvar\ny: err\n}")
        .err()
        .expect("expected a compile error");
    assert!(err.to_string().contains("err"));
}
