//! Benchmarks comparing the evaluation strategies on one formula.
//!
//! Compiled evaluation pays for code generation once; the other strategies start from the
//! cached parse tree on every call.

use casebook_formula::{
    parse_expression, EvalContext, EvaluationStrategy, Formula, FormulaOptions, SimpleContext,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::rc::Rc;

const SOURCE: &str = "price > 100 ? round(price * (1 - discount), 2) : max(price, floor_price) + fee";

fn context() -> Rc<SimpleContext> {
    Rc::new(
        SimpleContext::with_standard_functions()
            .with_variable("price", 120)
            .with_variable("discount", 0.15)
            .with_variable("floor_price", 20)
            .with_variable("fee", "2.5"),
    )
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse", |b| b.iter(|| parse_expression(black_box(SOURCE))));
}

fn bench_strategies(c: &mut Criterion) {
    let context = context();
    let eval = EvalContext::new();
    let mut group = c.benchmark_group("evaluate");

    for (label, strategy) in [
        ("compiled", EvaluationStrategy::Compiled),
        ("direct", EvaluationStrategy::Direct),
        ("postfix", EvaluationStrategy::Postfix),
    ] {
        let formula = Formula::new(SOURCE)
            .with_context(context.clone())
            .with_options(FormulaOptions { strategy });
        // warm the caches
        let _ = formula.run(&eval);
        group.bench_function(label, |b| b.iter(|| black_box(formula.run(&eval))));
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let context = context();
    let formula = Formula::new(SOURCE).with_context(context);
    c.bench_function("compile", |b| {
        b.iter(|| {
            formula.invalidate_context();
            black_box(formula.compiled())
        })
    });
}

criterion_group!(benches, bench_parse, bench_strategies, bench_compile);
criterion_main!(benches);
