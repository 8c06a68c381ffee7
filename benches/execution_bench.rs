use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jsonpl::InterpreterBuilder;

fn compile_benchmark(c: &mut Criterion) {
    let source = r#"{
        function
        fib: { n: int }
        int: {
            if: n < 2
            then: { return: n }
            return: fib:[n - 1] + fib:[n - 2]
        }
        var
        x: fib:[10]
    }"#;

    c.bench_function("compile fib program", |b| {
        b.iter(|| {
            InterpreterBuilder::new()
                .compile(black_box(source))
                .unwrap()
        })
    });
}

fn execute_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");

    let fib = InterpreterBuilder::new()
        .compile(
            r#"{
            function
            fib: { n: int }
            int: {
                if: n < 2
                then: { return: n }
                return: fib:[n - 1] + fib:[n - 2]
            }
            var
            x: fib:[15]
        }"#,
        )
        .unwrap();
    group.bench_function("fib 15", |b| b.iter(|| black_box(fib.execute().unwrap())));

    for size in [100, 1000].iter() {
        let source = format!(
            "{{\nvar\nsum: 0\nfor: [ {{ var\ni: 0 }}, i < {}, i += 1 ]\ndo: {{ sum += i }}\n}}",
            size
        );
        let interp = InterpreterBuilder::new().compile(&source).unwrap();
        group.bench_with_input(BenchmarkId::new("loop_sum", size), size, |b, _| {
            b.iter(|| black_box(interp.execute().unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, compile_benchmark, execute_benchmark);
criterion_main!(benches);
