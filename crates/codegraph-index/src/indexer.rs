//! Repository indexing orchestrator: extract → relate → build → embed → publish.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use codegraph_llm::LlmProvider;

use crate::embedding::{EmbeddingIndex, EmbeddingRecord, content_hash, embedding_text};
use crate::error::{IndexError, ParseError, Result};
use crate::extractor::{FileExtraction, extract_file};
use crate::graph::CodeGraph;
use crate::languages::{Lang, detect_language, is_indexable};
use crate::relations::{all_entities, build_relationships};
use crate::store::{GraphStore, RepositorySnapshot, line_slice};

/// Checked-out repository contents: relative path → file text.
pub type FileTree = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Files larger than this are skipped and recorded as errors.
    pub max_file_bytes: usize,
    pub embed_concurrency: usize,
    pub max_embedding_chars: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            embed_concurrency: 8,
            max_embedding_chars: 2000,
        }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub repository_id: String,
    pub version: u64,
    pub files_scanned: usize,
    pub files_indexed: usize,
    /// Ignored paths and files without a supported language.
    pub files_skipped: usize,
    pub entity_count: usize,
    pub edge_count: usize,
    pub edges_dropped: usize,
    pub embeddings_created: usize,
    pub embeddings_reused: usize,
    pub errors: Vec<ParseError>,
    pub duration_ms: u64,
}

/// Turns file trees into committed snapshots of one [`GraphStore`].
pub struct CodeIndexer<P> {
    store: Arc<GraphStore>,
    provider: Arc<P>,
    config: IndexerConfig,
}

impl<P: LlmProvider> CodeIndexer<P> {
    #[must_use]
    pub fn new(store: Arc<GraphStore>, provider: Arc<P>, config: IndexerConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Index a whole tree and atomically replace the repository's snapshot.
    /// Files that fail to parse are skipped and listed in the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree is empty, nothing in it could be indexed,
    /// the run was cancelled, or embedding failed. The previous snapshot stays
    /// in place in every error case.
    pub async fn index_tree(
        &self,
        repository_id: &str,
        tree: FileTree,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        if tree.is_empty() {
            return Err(IndexError::EmptyTree);
        }

        let mut report = IndexReport {
            repository_id: repository_id.to_owned(),
            ..IndexReport::default()
        };

        let mut set = JoinSet::new();
        for (path, source) in tree {
            report.files_scanned += 1;
            let Some(lang) = is_indexable(&path)
                .then(|| detect_language(Path::new(&path)))
                .flatten()
            else {
                report.files_skipped += 1;
                continue;
            };
            if source.len() > self.config.max_file_bytes {
                tracing::warn!(file = %path, bytes = source.len(), "file too large, skipping");
                report.errors.push(ParseError::new(
                    path,
                    format!("file exceeds {} bytes", self.config.max_file_bytes),
                ));
                continue;
            }
            set.spawn_blocking(move || {
                let result = extract_guarded(&path, &source, lang, extract_file);
                (path, source, result)
            });
        }

        if set.is_empty() {
            return Err(IndexError::NoIndexableFiles {
                skipped: report.files_skipped,
                failed: report.errors.len(),
            });
        }
        tracing::info!(
            repository = repository_id,
            files = set.len(),
            skipped = report.files_skipped,
            "indexing started"
        );

        let mut files: Vec<FileExtraction> = Vec::new();
        let mut sources = BTreeMap::new();
        loop {
            let joined = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    set.abort_all();
                    tracing::info!(repository = repository_id, "indexing cancelled during extraction");
                    return Err(IndexError::Cancelled);
                }
                joined = set.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            let (path, source, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!("extraction task failed: {e}");
                    continue;
                }
            };
            match result {
                Ok(extraction) => {
                    tracing::debug!(file = %path, entities = extraction.entities.len(), "file extracted");
                    sources.insert(path, source);
                    files.push(extraction);
                }
                Err(e) => {
                    tracing::warn!(file = %path, "{e}");
                    report.errors.push(e);
                }
            }
        }

        if files.is_empty() {
            return Err(IndexError::NoIndexableFiles {
                skipped: report.files_skipped,
                failed: report.errors.len(),
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        report.errors.sort_by(|a, b| a.path.cmp(&b.path));
        report.files_indexed = files.len();

        let edges = build_relationships(&files);
        let (graph, stats) = CodeGraph::build(all_entities(&files), edges);
        drop(files);
        report.entity_count = graph.len();
        report.edge_count = graph.edges().len();
        report.edges_dropped = stats.dropped_edges();

        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let embeddings = if self.provider.supports_embeddings() {
            Some(
                self.embed_entities(repository_id, &graph, &sources, &mut report, cancel)
                    .await?,
            )
        } else {
            tracing::warn!(
                repository = repository_id,
                provider = self.provider.name(),
                "provider has no embeddings; publishing graph without embedding index"
            );
            None
        };

        let snapshot = self.store.publish(RepositorySnapshot {
            repository_id: repository_id.to_owned(),
            version: self.store.next_version(),
            graph,
            embeddings,
            sources,
        });
        report.version = snapshot.version;
        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

        tracing::info!(
            repository = repository_id,
            version = report.version,
            files = report.files_indexed,
            entities = report.entity_count,
            edges = report.edge_count,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "indexing complete"
        );
        Ok(report)
    }

    /// Embed every entity, reusing vectors from the current snapshot when the
    /// entity id and embedded text are unchanged.
    async fn embed_entities(
        &self,
        repository_id: &str,
        graph: &CodeGraph,
        sources: &BTreeMap<String, String>,
        report: &mut IndexReport,
        cancel: &CancellationToken,
    ) -> Result<EmbeddingIndex> {
        let previous = self.store.snapshot(repository_id);
        let reusable = previous
            .as_ref()
            .and_then(|s| s.embeddings.as_ref())
            .map(EmbeddingIndex::reusable)
            .unwrap_or_default();

        let mut records = Vec::with_capacity(graph.len());
        let mut pending = Vec::new();
        for entity in graph.entities() {
            let body = sources
                .get(&entity.file_path)
                .map(|src| line_slice(src, entity.start_line, entity.end_line));
            let text = embedding_text(entity, body.as_deref(), self.config.max_embedding_chars);
            let hash = content_hash(&text);
            if let Some(vector) = reusable.get(&(entity.id.as_str(), hash.as_str())) {
                records.push(EmbeddingRecord {
                    entity_id: entity.id.clone(),
                    vector: vector.to_vec(),
                    content_hash: hash,
                });
            } else {
                pending.push((entity.id.clone(), text, hash));
            }
        }
        report.embeddings_reused = records.len();

        let concurrency = self.config.embed_concurrency.max(1);
        let provider = &self.provider;
        let created = futures::stream::iter(pending)
            .map(|(entity_id, text, hash)| async move {
                provider.embed(&text).await.map(|vector| EmbeddingRecord {
                    entity_id,
                    vector,
                    content_hash: hash,
                })
            })
            .buffered(concurrency)
            .try_collect::<Vec<_>>();

        let created = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(repository = repository_id, "indexing cancelled during embedding");
                return Err(IndexError::Cancelled);
            }
            created = created => created?,
        };
        report.embeddings_created = created.len();
        tracing::debug!(
            repository = repository_id,
            created = report.embeddings_created,
            reused = report.embeddings_reused,
            "embeddings ready"
        );

        records.extend(created);
        records.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        EmbeddingIndex::new(records)
    }
}

type ExtractFn = fn(&str, &str, Lang) -> std::result::Result<FileExtraction, ParseError>;

/// Runs `extract`, recording a panic as a per-file error.
fn extract_guarded(
    path: &str,
    source: &str,
    lang: Lang,
    extract: ExtractFn,
) -> std::result::Result<FileExtraction, ParseError> {
    std::panic::catch_unwind(|| extract(path, source, lang)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_owned());
        Err(ParseError::new(path, format!("extractor panicked: {reason}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EdgeKind, EntityKind};
    use codegraph_llm::mock::MockProvider;

    const APP: &str = "def foo():\n    x = 1\n    y = 2\n    bar()\n    return x\n\ndef bar():\n    a = 1\n    b = 2\n    return a + b\n";

    fn indexer(provider: MockProvider) -> (Arc<GraphStore>, CodeIndexer<MockProvider>) {
        let store = Arc::new(GraphStore::new());
        let indexer = CodeIndexer::new(
            Arc::clone(&store),
            Arc::new(provider),
            IndexerConfig::default(),
        );
        (store, indexer)
    }

    fn tree(files: &[(&str, &str)]) -> FileTree {
        files
            .iter()
            .map(|(p, s)| ((*p).to_owned(), (*s).to_owned()))
            .collect()
    }

    #[tokio::test]
    async fn indexes_single_module_scenario() {
        let (store, indexer) = indexer(MockProvider::default());
        let report = indexer
            .index_tree("r", tree(&[("app.py", APP)]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 1);
        let snapshot = store.snapshot("r").unwrap();
        let functions: Vec<_> = snapshot
            .graph
            .entities()
            .iter()
            .filter(|e| e.kind == EntityKind::Function)
            .collect();
        assert_eq!(functions.len(), 2);
        let contains = snapshot
            .graph
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::Contains)
            .count();
        assert_eq!(contains, 2);
        let calls: Vec<_> = snapshot
            .graph
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::Calls)
            .collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(snapshot.graph.get(&calls[0].source).unwrap().name, "foo");
        assert_eq!(snapshot.graph.get(&calls[0].target).unwrap().name, "bar");
        assert_eq!(report.embeddings_created, report.entity_count);
    }

    #[tokio::test]
    async fn one_bad_file_among_ten_is_recorded() {
        let mut files: Vec<(String, String)> = (0..9)
            .map(|i| (format!("pkg/mod{i}.py"), format!("def f{i}():\n    return {i}\n")))
            .collect();
        files.push(("pkg/broken.py".into(), "def oops(:\n    pass\n".into()));
        let tree: FileTree = files.into_iter().collect();

        let (store, indexer) = indexer(MockProvider::default());
        let report = indexer
            .index_tree("r", tree, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_scanned, 10);
        assert_eq!(report.files_indexed, 9);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "pkg/broken.py");
        let snapshot = store.snapshot("r").unwrap();
        assert_eq!(snapshot.graph.stats().file_count, 9);
    }

    #[tokio::test]
    async fn empty_and_unsupported_trees_fail() {
        let (store, indexer) = indexer(MockProvider::default());
        let cancel = CancellationToken::new();
        assert!(matches!(
            indexer.index_tree("r", FileTree::new(), &cancel).await,
            Err(IndexError::EmptyTree)
        ));
        let only_docs = tree(&[("README.md", "# hi"), ("node_modules/x/index.js", "f()")]);
        assert!(matches!(
            indexer.index_tree("r", only_docs, &cancel).await,
            Err(IndexError::NoIndexableFiles { skipped: 2, failed: 0 })
        ));
        assert!(store.snapshot("r").is_none());
    }

    #[tokio::test]
    async fn oversize_files_are_recorded() {
        let store = Arc::new(GraphStore::new());
        let indexer = CodeIndexer::new(
            Arc::clone(&store),
            Arc::new(MockProvider::default()),
            IndexerConfig {
                max_file_bytes: 16,
                ..IndexerConfig::default()
            },
        );
        let files = tree(&[("big.py", APP), ("small.py", "X = 1\n")]);
        let report = indexer
            .index_tree("r", files, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 1);
        assert!(report.errors[0].message.contains("exceeds"));
    }

    #[tokio::test]
    async fn reindexing_reuses_embeddings_and_is_deterministic() {
        let (store, indexer) = indexer(MockProvider::default());
        let cancel = CancellationToken::new();
        let first = indexer
            .index_tree("r", tree(&[("app.py", APP)]), &cancel)
            .await
            .unwrap();
        let before = store.snapshot("r").unwrap();
        let second = indexer
            .index_tree("r", tree(&[("app.py", APP)]), &cancel)
            .await
            .unwrap();
        let after = store.snapshot("r").unwrap();

        assert_eq!(second.embeddings_reused, first.embeddings_created);
        assert_eq!(second.embeddings_created, 0);
        assert!(after.version > before.version);
        assert_eq!(before.graph.entities(), after.graph.entities());
        assert_eq!(before.graph.edges(), after.graph.edges());
        assert_eq!(
            before.embeddings.as_ref().unwrap().records(),
            after.embeddings.as_ref().unwrap().records()
        );
    }

    #[tokio::test]
    async fn provider_without_embeddings_publishes_graph_only() {
        let (store, indexer) = indexer(MockProvider::default().without_embeddings());
        indexer
            .index_tree("r", tree(&[("app.py", APP)]), &CancellationToken::new())
            .await
            .unwrap();
        let snapshot = store.snapshot("r").unwrap();
        assert!(snapshot.embeddings.is_none());
        assert!(!snapshot.graph.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_keeps_previous_snapshot() {
        let (store, indexer) = indexer(MockProvider::default());
        let cancel = CancellationToken::new();
        indexer
            .index_tree("r", tree(&[("app.py", APP)]), &cancel)
            .await
            .unwrap();
        let version = store.snapshot("r").unwrap().version;

        let failing = CodeIndexer::new(
            Arc::clone(&store),
            Arc::new(MockProvider::default().failing_embeddings()),
            IndexerConfig::default(),
        );
        let err = failing
            .index_tree("r", tree(&[("other.py", APP)]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert_eq!(store.snapshot("r").unwrap().version, version);
    }

    #[tokio::test]
    async fn cancelled_run_publishes_nothing() {
        let (store, indexer) = indexer(MockProvider::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = indexer
            .index_tree("r", tree(&[("app.py", APP)]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Cancelled));
        assert!(store.snapshot("r").is_none());
    }

    #[test]
    fn extractor_panic_is_recorded_for_its_file() {
        fn exploding(
            _: &str,
            _: &str,
            _: Lang,
        ) -> std::result::Result<FileExtraction, ParseError> {
            panic!("unexpected node kind");
        }

        let err = extract_guarded("bad.py", APP, Lang::Python, exploding).unwrap_err();
        assert_eq!(err.path, "bad.py");
        assert!(err.message.contains("unexpected node kind"), "{}", err.message);

        let ok = extract_guarded("app.py", APP, Lang::Python, extract_file).unwrap();
        assert_eq!(ok.entities.len(), 3);
    }

    #[test]
    fn default_config() {
        let config = IndexerConfig::default();
        assert_eq!(config.max_file_bytes, 1_048_576);
        assert_eq!(config.embed_concurrency, 8);
    }
}
