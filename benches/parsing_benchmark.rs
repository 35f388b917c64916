use book_tagger::services::prompt::build_prompt;
use book_tagger::{parse_tags, Book};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sample_books(count: usize) -> Vec<Book> {
    (0..count)
        .rev()
        .map(|i| Book::with_id(i as i64, format!("Title {}", i), format!("Author {}", i)))
        .collect()
}

fn sample_answer(count: usize) -> String {
    let entries: Vec<String> = (0..count)
        .map(|i| format!(r#""Title {}": ["Fiction", "Science Fiction", "Space Opera", "Politics"]"#, i))
        .collect();
    format!("```json\n{{{}}}\n```", entries.join(", "))
}

fn benchmark_parse_small(c: &mut Criterion) {
    let answer = r#"{"Dune": ["Sci-Fi", "Fiction"], "Emma": ["Romance", "Classic"]}"#;

    c.bench_function("parse_tags_small", |b| b.iter(|| parse_tags(black_box(answer))));
}

fn benchmark_parse_batch(c: &mut Criterion) {
    let answer = sample_answer(40);

    c.bench_function("parse_tags_batch", |b| b.iter(|| parse_tags(black_box(&answer))));
}

fn benchmark_parse_invalid(c: &mut Criterion) {
    let answer = "I'm sorry, I could not find information about these books.".repeat(10);

    c.bench_function("parse_tags_invalid", |b| b.iter(|| parse_tags(black_box(&answer))));
}

fn benchmark_build_prompt(c: &mut Criterion) {
    let books = sample_books(40);

    c.bench_function("build_prompt_batch", |b| b.iter(|| build_prompt(black_box(&books))));
}

criterion_group!(
    benches,
    benchmark_parse_small,
    benchmark_parse_batch,
    benchmark_parse_invalid,
    benchmark_build_prompt
);
criterion_main!(benches);
