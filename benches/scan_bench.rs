// Criterion benchmark suite: write-time and scan-time costs.
//
// Run: cargo bench
// Specific group: cargo bench -- scan
// HTML report: target/criterion/report/index.html

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use recurve::charclass::CharClass;
use recurve::prelude::*;
use recurve::tree::{self, Node};

fn patterns() -> Vec<(&'static str, Node)> {
    vec![
        ("literal", tree::lit("hello world")),
        (
            "dot_star",
            tree::concat([tree::lit("foo"), tree::star(tree::any()), tree::lit("bar")]),
        ),
        (
            "alternation",
            tree::alt([
                tree::lit("alpha"),
                tree::lit("beta"),
                tree::lit("gamma"),
                tree::lit("delta"),
            ]),
        ),
        (
            "char_class",
            tree::plus(tree::set(CharClass::from_ranges([
                ('a', 'z'),
                ('A', 'Z'),
                ('0', '9'),
            ]))),
        ),
        (
            "backref",
            tree::concat([
                tree::group(1, tree::plus(tree::set(CharClass::word()))),
                tree::plus(tree::set(CharClass::space())),
                tree::backref(1),
            ]),
        ),
        (
            "anchored",
            tree::concat([tree::text_begin(), tree::lit("GET "), tree::plus(tree::any())]),
        ),
    ]
}

fn haystack() -> String {
    let mut s = String::new();
    for i in 0..200 {
        s.push_str("the quick brown fox jumps over the lazy dog ");
        if i % 17 == 0 {
            s.push_str("foo filler bar alpha word word ");
        }
    }
    s.push_str("hello world");
    s
}

// ---------------------------------------------------------------------------
// 1. write -- tree lowering cost
// ---------------------------------------------------------------------------

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    for (name, root) in patterns() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &root, |b, root| {
            b.iter(|| {
                let re = Regex::new(black_box(root)).unwrap();
                black_box(&re);
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 2. scan -- first-match search over a long haystack
// ---------------------------------------------------------------------------

fn bench_scan(c: &mut Criterion) {
    let text = haystack();
    let mut group = c.benchmark_group("scan");
    for (name, root) in patterns() {
        let re = Regex::new(&root).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &re, |b, re| {
            b.iter(|| {
                let m = re.find(black_box(&text)).unwrap();
                black_box(m.is_some());
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 3. iterate -- all matches including empty-match bumping
// ---------------------------------------------------------------------------

fn bench_iterate(c: &mut Criterion) {
    let text = haystack();
    let word = Regex::new(&tree::plus(tree::set(CharClass::word()))).unwrap();
    c.bench_function("iterate/words", |b| {
        b.iter(|| {
            let n = word.find_iter(black_box(&text)).count();
            black_box(n);
        });
    });
}

criterion_group!(benches, bench_write, bench_scan, bench_iterate);
criterion_main!(benches);
