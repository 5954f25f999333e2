use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use simulado_core::parser::{parse_bank_str, validate_bank};

fn make_bank(questions: usize) -> String {
    let mut s = String::from(
        "[bank]\nid = \"bench\"\nname = \"Bench\"\ndefault_subject = \"Matemática\"\n",
    );
    for i in 0..questions {
        s.push_str(&format!(
            r#"
[[questions]]
id = "q{i}"
title = "Questão {i}"
statement = "Quanto é {i} + 1?"
correct = "a"
tags = ["aritmética"]

[[questions.alternatives]]
id = "a"
text = "{}"

[[questions.alternatives]]
id = "b"
text = "{i}"
"#,
            i + 1
        ));
    }
    s
}

fn bench_parse_bank(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_bank");
    let path = Path::new("bench.toml");

    for size in [10, 200] {
        let content = make_bank(size);
        group.bench_function(format!("{size}_questions"), |b| {
            b.iter(|| parse_bank_str(black_box(&content), path))
        });
    }

    group.finish();
}

fn bench_validate_bank(c: &mut Criterion) {
    let bank = parse_bank_str(&make_bank(200), Path::new("bench.toml")).unwrap();
    c.bench_function("validate_bank_200", |b| {
        b.iter(|| validate_bank(black_box(&bank)))
    });
}

criterion_group!(benches, bench_parse_bank, bench_validate_bank);
criterion_main!(benches);
