//! Versioned per-repository graph snapshots behind an atomic swap.
//!
//! Readers clone an `Arc` to the snapshot they start with and keep using it
//! even if a newer indexing run replaces it in the meantime.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingIndex, EmbeddingRecord};
use crate::entity::{EdgeKind, Entity, Relationship};
use crate::error::{QueryError, Result};
use crate::graph::{BuildStats, CodeGraph, Direction, Reached, Subgraph};

/// One committed indexing result. Never mutated after publication.
#[derive(Debug)]
pub struct RepositorySnapshot {
    pub repository_id: String,
    pub version: u64,
    pub graph: CodeGraph,
    /// `None` when the run could not embed (provider without embeddings).
    pub embeddings: Option<EmbeddingIndex>,
    /// File contents by path, used for citation slices.
    pub sources: BTreeMap<String, String>,
}

impl RepositorySnapshot {
    /// Verbatim lines `start_line..=end_line` of the entity's file.
    #[must_use]
    pub fn source_slice(&self, entity: &Entity) -> Option<String> {
        let source = self.sources.get(&entity.file_path)?;
        Some(line_slice(source, entity.start_line, entity.end_line))
    }
}

/// Lines `start..=end` (1-based) of `source`, joined with `\n`.
#[must_use]
pub fn line_slice(source: &str, start: usize, end: usize) -> String {
    source
        .lines()
        .skip(start.saturating_sub(1))
        .take((end + 1).saturating_sub(start.max(1)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// On-disk form of a snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    repository_id: String,
    version: u64,
    entities: Vec<Entity>,
    edges: Vec<Relationship>,
    #[serde(default)]
    embeddings: Option<Vec<EmbeddingRecord>>,
    #[serde(default)]
    sources: BTreeMap<String, String>,
}

pub struct GraphStore {
    snapshots: RwLock<HashMap<String, Arc<RepositorySnapshot>>>,
    version: AtomicU64,
}

impl GraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
        }
    }

    /// Next snapshot version; strictly increasing across repositories.
    #[must_use]
    pub fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Replace the repository's graph with a fresh one built from `entities`
    /// and `edges`. The new snapshot carries no embedding index.
    pub fn upsert_repository_graph(
        &self,
        repository_id: &str,
        entities: Vec<Entity>,
        edges: Vec<Relationship>,
    ) -> (Arc<RepositorySnapshot>, BuildStats) {
        let (graph, stats) = CodeGraph::build(entities, edges);
        let snapshot = self.publish(RepositorySnapshot {
            repository_id: repository_id.to_owned(),
            version: self.next_version(),
            graph,
            embeddings: None,
            sources: BTreeMap::new(),
        });
        (snapshot, stats)
    }

    /// Install `snapshot`, replacing any previous one for its repository.
    pub fn publish(&self, snapshot: RepositorySnapshot) -> Arc<RepositorySnapshot> {
        let snapshot = Arc::new(snapshot);
        let previous = self
            .snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.repository_id.clone(), Arc::clone(&snapshot));
        tracing::debug!(
            repository = %snapshot.repository_id,
            version = snapshot.version,
            replaced = previous.map(|p| p.version),
            nodes = snapshot.graph.len(),
            "snapshot published"
        );
        snapshot
    }

    /// The currently committed snapshot, if any.
    #[must_use]
    pub fn snapshot(&self, repository_id: &str) -> Option<Arc<RepositorySnapshot>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(repository_id)
            .cloned()
    }

    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if the repository or node is absent.
    pub fn get_node(&self, repository_id: &str, node_id: &str) -> std::result::Result<Entity, QueryError> {
        let snapshot = self.require(repository_id)?;
        snapshot
            .graph
            .get(node_id)
            .cloned()
            .ok_or_else(|| QueryError::node_not_found(node_id))
    }

    /// Nodes reachable from `node_id` within `depth` hops, with their depth.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if the repository or node is absent.
    pub fn neighbors(
        &self,
        repository_id: &str,
        node_id: &str,
        kinds: &[EdgeKind],
        direction: Direction,
        depth: usize,
    ) -> std::result::Result<Vec<(Entity, usize)>, QueryError> {
        let snapshot = self.require(repository_id)?;
        snapshot
            .graph
            .neighbors(node_id, kinds, direction, depth)
            .map(|reached| {
                reached
                    .into_iter()
                    .map(|Reached { entity, depth }| (entity.clone(), depth))
                    .collect()
            })
            .ok_or_else(|| QueryError::node_not_found(node_id))
    }

    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if the repository is absent.
    pub fn subgraph<S: AsRef<str>>(
        &self,
        repository_id: &str,
        node_ids: &[S],
    ) -> std::result::Result<Subgraph, QueryError> {
        Ok(self.require(repository_id)?.graph.subgraph(node_ids))
    }

    /// Write the repository's snapshot as JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository has no snapshot or writing fails.
    pub async fn save(&self, repository_id: &str, path: &Path) -> Result<()> {
        let snapshot = self.snapshot(repository_id).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no snapshot for repository {repository_id}"),
            )
        })?;
        let file = SnapshotFile {
            repository_id: snapshot.repository_id.clone(),
            version: snapshot.version,
            entities: snapshot.graph.entities().to_vec(),
            edges: snapshot.graph.edges().to_vec(),
            embeddings: snapshot.embeddings.as_ref().map(|e| e.records().to_vec()),
            sources: snapshot.sources.clone(),
        };
        let json = serde_json::to_vec(&file)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        tracing::info!(repository = repository_id, path = %path.display(), "snapshot saved");
        Ok(())
    }

    /// Load a snapshot file and publish it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or its
    /// embedding vectors disagree in dimension.
    pub async fn load(&self, path: &Path) -> Result<Arc<RepositorySnapshot>> {
        let bytes = tokio::fs::read(path).await?;
        let file: SnapshotFile = serde_json::from_slice(&bytes)?;
        let embeddings = file.embeddings.map(EmbeddingIndex::new).transpose()?;
        let (graph, stats) = CodeGraph::build(file.entities, file.edges);
        if stats.dropped_edges() > 0 {
            tracing::warn!(dropped = stats.dropped_edges(), path = %path.display(), "snapshot had invalid edges");
        }
        self.version.fetch_max(file.version, Ordering::Relaxed);
        Ok(self.publish(RepositorySnapshot {
            repository_id: file.repository_id,
            version: file.version,
            graph,
            embeddings,
            sources: file.sources,
        }))
    }

    fn require(&self, repository_id: &str) -> std::result::Result<Arc<RepositorySnapshot>, QueryError> {
        self.snapshot(repository_id)
            .ok_or_else(|| QueryError::repository_not_found(repository_id))
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("version", &self.version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
