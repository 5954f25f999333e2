use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use simulado_core::model::{AnswerRecord, Difficulty, Question};
use simulado_core::selector::shuffle_and_truncate;
use simulado_core::statistics::{question_rollup, subject_rollup};

fn make_pool(n: usize) -> Vec<Question> {
    let now = Utc::now();
    (0..n)
        .map(|i| Question {
            id: format!("q{i}"),
            title: "Questão".into(),
            statement: "Enunciado".into(),
            alternatives: vec![],
            correct_alternative: "a".into(),
            explanation: None,
            subject: "Matemática".into(),
            exam_board: None,
            exam_year: None,
            exam_type: None,
            difficulty: Difficulty::Medium,
            tags: vec![],
            success_rate: 0.0,
            total_attempts: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

fn make_answers(n: usize) -> Vec<AnswerRecord> {
    let now = Utc::now();
    (0..n)
        .map(|i| AnswerRecord {
            id: format!("a{i}"),
            user_id: "u1".into(),
            question_id: format!("q{}", i % 50),
            subject: "Matemática".into(),
            simulado_id: None,
            selected_alternative: "a".into(),
            is_correct: i % 3 != 0,
            time_spent: if i % 4 == 0 { None } else { Some(30 + (i % 60) as u32) },
            created_at: now,
        })
        .collect()
}

fn bench_shuffle(c: &mut Criterion) {
    let mut group = c.benchmark_group("shuffle_and_truncate");

    for (pool_size, total) in [(20usize, 20u32), (100, 20), (1000, 100)] {
        let pool = make_pool(pool_size);
        group.bench_function(format!("pool={pool_size},total={total}"), |b| {
            let mut rng = StdRng::seed_from_u64(1);
            b.iter(|| shuffle_and_truncate(black_box(pool.clone()), total, &mut rng))
        });
    }

    group.finish();
}

fn bench_rollups(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollups");

    for n in [10usize, 1_000, 10_000] {
        let answers = make_answers(n);
        group.bench_function(format!("question/{n}"), |b| {
            b.iter(|| question_rollup(black_box(&answers)))
        });
        group.bench_function(format!("subject/{n}"), |b| {
            b.iter(|| subject_rollup(black_box(&answers)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_shuffle, bench_rollups);
criterion_main!(benches);
