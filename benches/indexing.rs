use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logscan::indexing::{IndexOperation, LineIndex, OperationContext};
use logscan::search::{search_lines, CompileOptions, CompiledExpression, Pattern};
use logscan::IndexingConfig;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tempfile::NamedTempFile;

fn create_log_file(size_kb: usize) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    let target_size = size_kb * 1024;
    let mut current_size = 0;
    let mut line_num = 0;

    let log_levels = ["DEBUG", "INFO", "WARN", "ERROR"];
    let services = ["auth", "database", "cache", "payment"];

    while current_size < target_size {
        let line = format!(
            "[2024-09-02T10:{:02}:{:02}] {}\t{}: request {} took {}ms user_{}\n",
            (line_num / 60) % 60,
            line_num % 60,
            log_levels[line_num % log_levels.len()],
            services[line_num % services.len()],
            line_num,
            line_num % 997,
            line_num % 1000
        );
        temp_file
            .write_all(line.as_bytes())
            .expect("Failed to write log line");
        current_size += line.len();
        line_num += 1;
    }
    temp_file.flush().expect("Failed to flush temp file");
    temp_file
}

fn index_file(file: &NamedTempFile, config: &IndexingConfig) -> LineIndex {
    let index = LineIndex::new();
    let interrupt = AtomicBool::new(false);
    let ctx = OperationContext {
        path: file.path(),
        index: &index,
        interrupt: &interrupt,
        config,
    };
    IndexOperation::FullIndex {
        forced_encoding: None,
    }
    .run(&ctx, &mut |_| {});
    index
}

fn bench_full_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_index");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    for size_kb in [1024, 16 * 1024] {
        let file = create_log_file(size_kb);
        group.throughput(Throughput::Bytes((size_kb * 1024) as u64));
        for block_size in [64 * 1024, 1024 * 1024] {
            let config = IndexingConfig {
                block_size,
                ..IndexingConfig::default()
            };
            group.bench_with_input(
                BenchmarkId::new(format!("{size_kb}KB"), block_size),
                &config,
                |b, config| {
                    b.iter(|| {
                        let index = index_file(&file, config);
                        let lines = index.read().line_count();
                        black_box(lines)
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    group.sample_size(10);

    let file = create_log_file(8 * 1024);
    let config = IndexingConfig::default();
    let index = index_file(&file, &config);
    let line_count = index.read().line_count();

    let cases = [
        ("literal", vec![Pattern::new("ERROR")], true),
        ("literal_regex_engine", vec![Pattern::new("ERROR")], false),
        (
            "literal_combination",
            vec![Pattern::new("payment"), Pattern::new("DEBUG").exclude()],
            true,
        ),
        ("regex", vec![Pattern::new(r"took 9\d\dms")], true),
    ];

    for (name, patterns, allow_automaton) in cases {
        let expression =
            CompiledExpression::compile_with(&patterns, CompileOptions { allow_automaton })
                .expect("valid pattern");
        group.bench_function(name, |b| {
            b.iter(|| {
                let found = search_lines(
                    file.path(),
                    &index,
                    &expression,
                    0..line_count,
                    config.search_chunk_lines,
                )
                .expect("search succeeds");
                black_box(found.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_index, bench_filter);
criterion_main!(benches);
