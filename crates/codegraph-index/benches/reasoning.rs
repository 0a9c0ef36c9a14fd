use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio_util::sync::CancellationToken;

use codegraph_index::extractor::extract_file;
use codegraph_index::indexer::{CodeIndexer, FileTree, IndexerConfig};
use codegraph_index::languages::Lang;
use codegraph_index::reasoning::{ReasoningConfig, explore};
use codegraph_index::relations::build_relationships;
use codegraph_index::store::GraphStore;
use codegraph_llm::local::LocalHashEmbedder;

/// A module of `n` functions where each calls the next.
fn generate_module(n: usize) -> String {
    let mut src = String::new();
    for i in 0..n {
        src.push_str(&format!(
            "def step_{i}(value):\n    \"\"\"Stage {i} of the pipeline.\"\"\"\n    return step_{}(value + {i})\n\n",
            i + 1
        ));
    }
    src.push_str(&format!("def step_{n}(value):\n    return value\n"));
    src
}

fn generate_tree(files: usize, per_file: usize) -> FileTree {
    (0..files)
        .map(|f| (format!("pkg/stage{f}.py"), generate_module(per_file)))
        .collect()
}

fn extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_file");
    for n in [10, 100, 500] {
        let src = generate_module(n);
        group.throughput(Throughput::Bytes(src.len() as u64));
        group.bench_with_input(BenchmarkId::new("python", n), &src, |b, src| {
            b.iter(|| extract_file("pkg/stage.py", black_box(src), Lang::Python));
        });
    }
    group.finish();
}

fn relationships(c: &mut Criterion) {
    let files: Vec<_> = generate_tree(20, 50)
        .iter()
        .filter_map(|(path, src)| extract_file(path, src, Lang::Python).ok())
        .collect();
    c.bench_function("build_relationships_20x50", |b| {
        b.iter(|| build_relationships(black_box(&files)));
    });
}

fn reasoning(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let provider = Arc::new(LocalHashEmbedder::new(256));
    let store = Arc::new(GraphStore::new());
    let indexer = CodeIndexer::new(Arc::clone(&store), Arc::clone(&provider), IndexerConfig::default());
    rt.block_on(indexer.index_tree("bench", generate_tree(20, 50), &CancellationToken::new()))
        .unwrap();
    let snapshot = store.snapshot("bench").unwrap();
    let config = ReasoningConfig::default();

    c.bench_function("explore_1000_entities", |b| {
        b.iter(|| {
            rt.block_on(explore(
                provider.as_ref(),
                &snapshot,
                black_box("what does step 42 of the pipeline call?"),
                &config,
                &CancellationToken::new(),
                tokio::time::Instant::now() + Duration::from_secs(30),
            ))
        });
    });
}

criterion_group!(benches, extraction, relationships, reasoning);
criterion_main!(benches);
