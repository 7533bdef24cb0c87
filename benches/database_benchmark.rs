use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use std::thread;
use tessera::{
    Database, Document, Enquire, QueryParser, Stem, TermGenerator, WritableDatabase, Config,
    DB_CREATE_OR_OVERWRITE, FLAG_DEFAULT,
};

const WORDS: [&str; 12] = [
    "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "runs", "slow", "red", "river",
];

/// Helper to create test documents
fn create_test_document(generator: &mut TermGenerator, id: u64, content_size: usize) -> Document {
    let mut rng = rand::thread_rng();
    let content: String = (0..content_size)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ");

    generator.set_document(Document::new());
    generator.index_text(&format!("Document {}", id), 1, "S").unwrap();
    generator.increase_termpos(100);
    generator.index_text(&content, 1, "").unwrap();
    let mut doc = generator.take_document();
    doc.set_data(content);
    doc.add_value(0, format!("{:06}", rng.gen_range(0..100_000)));
    doc.add_value(1, format!("category_{}", id % 10));
    doc
}

fn generator() -> TermGenerator {
    let mut generator = TermGenerator::new();
    generator.set_stemmer(Stem::new("english").unwrap());
    generator
}

fn populated(count: u64) -> Database {
    let mut generator = generator();
    let mut db = WritableDatabase::in_memory();
    for i in 0..count {
        db.add_document(create_test_document(&mut generator, i, 100)).unwrap();
    }
    db.commit().unwrap();
    db.reader()
}

/// Benchmark single document insertion
fn bench_single_insert(c: &mut Criterion) {
    let mut generator = generator();
    let mut db = WritableDatabase::in_memory();

    c.bench_function("single_document_insert", |b| {
        let mut id = 0;
        b.iter(|| {
            let doc = create_test_document(&mut generator, id, 100);
            db.add_document(doc).unwrap();
            id += 1;
        });
    });
}

/// Benchmark batch insertion followed by a durable commit
fn bench_batch_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_commit");
    group.sample_size(20);

    for batch_size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &batch_size| {
            let dir = tempfile::tempdir().unwrap();
            let config = Config::default().no_sync();
            let mut db = WritableDatabase::open_with_config(dir.path(), DB_CREATE_OR_OVERWRITE, config).unwrap();
            let mut generator = generator();
            let mut id_counter = 0u64;

            b.iter(|| {
                for _ in 0..batch_size {
                    db.add_document(create_test_document(&mut generator, id_counter, 100)).unwrap();
                    id_counter += 1;
                }
                db.commit().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark search performance
fn bench_search(c: &mut Criterion) {
    let db = populated(1000);
    let mut parser = QueryParser::new();
    parser.set_stemmer(Stem::new("english").unwrap());

    let mut group = c.benchmark_group("search");
    for (name, text) in [
        ("simple_term_search", "fox"),
        ("boolean_and_search", "quick AND brown"),
        ("boolean_or_search", "lazy OR river"),
        ("and_not_search", "fox AND NOT dog"),
        ("phrase_search", "\"quick brown\""),
        ("near_search", "fox NEAR/3 dog"),
    ] {
        let query = parser.parse_query(text, FLAG_DEFAULT, "").unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut enquire = Enquire::new(&db);
                enquire.set_query(query.clone(), 0);
                black_box(enquire.get_mset(0, 10).unwrap());
            });
        });
    }

    let query = parser.parse_query("fox OR dog", FLAG_DEFAULT, "").unwrap();
    group.bench_function("sort_by_value", |b| {
        b.iter(|| {
            let mut enquire = Enquire::new(&db);
            enquire.set_query(query.clone(), 0);
            enquire.set_sort_by_value(0, false);
            black_box(enquire.get_mset(0, 10).unwrap());
        });
    });
    group.bench_function("collapse_by_category", |b| {
        b.iter(|| {
            let mut enquire = Enquire::new(&db);
            enquire.set_query(query.clone(), 0);
            enquire.set_collapse_key(Some(1));
            black_box(enquire.get_mset(0, 10).unwrap());
        });
    });
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut parser = QueryParser::new();
    parser.set_stemmer(Stem::new("english").unwrap());
    c.bench_function("parse_query", |b| {
        b.iter(|| {
            parser
                .parse_query(black_box("+quick (brown OR red) -lazy \"fox jumps\""), FLAG_DEFAULT, "")
                .unwrap()
        });
    });
}

/// Readers matching on the same snapshot from several threads
fn bench_concurrent_search(c: &mut Criterion) {
    let db = populated(1000);
    let mut parser = QueryParser::new();
    let query = parser.parse_query("quick OR fox", FLAG_DEFAULT, "").unwrap();

    let mut group = c.benchmark_group("concurrent_search");
    for threads in [2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let db = db.clone();
                        let query = query.clone();
                        thread::spawn(move || {
                            let mut enquire = Enquire::new(&db);
                            enquire.set_query(query, 0);
                            enquire.get_mset(0, 10).unwrap().size()
                        })
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.join().unwrap());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_batch_commit,
    bench_search,
    bench_parse,
    bench_concurrent_search
);
criterion_main!(benches);
