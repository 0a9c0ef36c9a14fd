//! `CodeGraphService`: the surface consumed by API and CLI layers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use codegraph_llm::LlmProvider;

use crate::composer::{QueryResponse, compose};
use crate::entity::{EdgeKind, Entity, Relationship};
use crate::error::{QueryError, Result};
use crate::graph::{Direction, GraphStats, Subgraph};
use crate::indexer::{CodeIndexer, FileTree, IndexReport, IndexerConfig};
use crate::reasoning::{ReasoningConfig, explore};
use crate::status::{StatusSink, StatusUpdate, TracingStatusSink};
use crate::store::{GraphStore, RepositorySnapshot};

/// Whole-graph view returned by [`CodeGraphService::get_graph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<Entity>,
    pub edges: Vec<Relationship>,
    pub stats: GraphStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub node: Entity,
    pub score: f32,
}

pub struct CodeGraphService<P> {
    provider: Arc<P>,
    store: Arc<GraphStore>,
    indexer_config: IndexerConfig,
    reasoning: ReasoningConfig,
    completion_timeout: Duration,
    status: Arc<dyn StatusSink>,
}

impl<P: LlmProvider> CodeGraphService<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, store: Arc<GraphStore>) -> Self {
        Self {
            provider,
            store,
            indexer_config: IndexerConfig::default(),
            reasoning: ReasoningConfig::default(),
            completion_timeout: Duration::from_secs(60),
            status: Arc::new(TracingStatusSink),
        }
    }

    #[must_use]
    pub fn with_indexer_config(mut self, config: IndexerConfig) -> Self {
        self.indexer_config = config;
        self
    }

    #[must_use]
    pub fn with_reasoning_config(mut self, config: ReasoningConfig) -> Self {
        self.reasoning = config;
        self
    }

    #[must_use]
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    #[must_use]
    pub fn reasoning_config(&self) -> &ReasoningConfig {
        &self.reasoning
    }

    /// # Errors
    ///
    /// See [`CodeGraphService::index_with_cancel`].
    pub async fn index(&self, repository_id: &str, tree: FileTree) -> Result<IndexReport> {
        self.index_with_cancel(repository_id, tree, &CancellationToken::new())
            .await
    }

    /// Index `tree` as the new snapshot of `repository_id`, reporting
    /// `indexing`, then `ready` or `error`.
    ///
    /// # Errors
    ///
    /// Returns the repository-level [`crate::IndexError`] that aborted the
    /// run; per-file parse failures are listed in the report instead.
    pub async fn index_with_cancel(
        &self,
        repository_id: &str,
        tree: FileTree,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        self.status.report(StatusUpdate::indexing(repository_id));
        let indexer = CodeIndexer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            self.indexer_config.clone(),
        );
        match indexer.index_tree(repository_id, tree, cancel).await {
            Ok(report) => {
                self.status.report(StatusUpdate::ready(
                    repository_id,
                    report.entity_count,
                    report.edge_count,
                ));
                Ok(report)
            }
            Err(e) => {
                self.status
                    .report(StatusUpdate::error(repository_id, e.to_string()));
                Err(e)
            }
        }
    }

    /// # Errors
    ///
    /// See [`CodeGraphService::query_with_cancel`].
    pub async fn query(
        &self,
        repository_id: &str,
        question: &str,
    ) -> std::result::Result<QueryResponse, QueryError> {
        self.query_with_cancel(repository_id, question, &CancellationToken::new())
            .await
    }

    /// Answer `question` against the repository's current snapshot. The
    /// snapshot is pinned for the whole query, so a concurrent re-index does
    /// not affect it.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::RepositoryNotReady`] before any reasoning when
    /// the repository has no snapshot or no embedding index, and
    /// [`QueryError::Provider`] when embedding the question or the completion
    /// fails.
    pub async fn query_with_cancel(
        &self,
        repository_id: &str,
        question: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<QueryResponse, QueryError> {
        let start = std::time::Instant::now();
        let snapshot = self.ready_snapshot(repository_id)?;
        let deadline = Instant::now() + self.reasoning.timeout;

        let trace = explore(
            self.provider.as_ref(),
            &snapshot,
            question,
            &self.reasoning,
            cancel,
            deadline,
        )
        .await?;
        let mut response = compose(
            self.provider.as_ref(),
            question,
            trace,
            &self.reasoning,
            self.completion_timeout,
            cancel,
        )
        .await?;

        response.processing_time_ms =
            Some(start.elapsed().as_millis().try_into().unwrap_or(u64::MAX));
        tracing::info!(
            repository = repository_id,
            version = snapshot.version,
            citations = response.citations.len(),
            hops = response.hops_completed,
            confidence = response.confidence,
            duration_ms = response.processing_time_ms,
            "query answered"
        );
        Ok(response)
    }

    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if the repository has no snapshot.
    pub fn get_graph(&self, repository_id: &str) -> std::result::Result<GraphView, QueryError> {
        let snapshot = self.snapshot(repository_id)?;
        let sub = snapshot.graph.to_subgraph();
        Ok(GraphView {
            nodes: sub.nodes,
            edges: sub.edges,
            stats: snapshot.graph.stats(),
        })
    }

    /// Nodes within `depth` hops of `node_id` over every edge type in both
    /// directions, with the edges among them.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if the repository or node is absent.
    pub fn get_neighbors(
        &self,
        repository_id: &str,
        node_id: &str,
        depth: usize,
    ) -> std::result::Result<Subgraph, QueryError> {
        let snapshot = self.snapshot(repository_id)?;
        let reached = snapshot
            .graph
            .neighbors(node_id, &[], Direction::Both, depth)
            .ok_or_else(|| QueryError::node_not_found(node_id))?;
        let ids: Vec<&str> = reached.iter().map(|r| r.entity.id.as_str()).collect();
        Ok(snapshot.graph.subgraph(&ids))
    }

    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if the repository or node is absent.
    pub fn get_node(
        &self,
        repository_id: &str,
        node_id: &str,
    ) -> std::result::Result<Entity, QueryError> {
        self.store.get_node(repository_id, node_id)
    }

    /// Name search over the repository's nodes.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if the repository has no snapshot.
    pub fn search_nodes(
        &self,
        repository_id: &str,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<SearchHit>, QueryError> {
        let snapshot = self.snapshot(repository_id)?;
        Ok(snapshot
            .graph
            .search(query, limit)
            .into_iter()
            .map(|(node, score)| SearchHit {
                node: node.clone(),
                score,
            })
            .collect())
    }

    /// Functions calling `node_id` (incoming `calls`) or called by it
    /// (outgoing), up to `depth` hops.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if the repository or node is absent.
    pub fn call_chain(
        &self,
        repository_id: &str,
        node_id: &str,
        direction: Direction,
        depth: usize,
    ) -> std::result::Result<Vec<Entity>, QueryError> {
        let snapshot = self.snapshot(repository_id)?;
        if !snapshot.graph.contains(node_id) {
            return Err(QueryError::node_not_found(node_id));
        }
        let found = match direction {
            Direction::In => snapshot.graph.callers(node_id, depth),
            Direction::Out => snapshot.graph.callees(node_id, depth),
            Direction::Both => snapshot
                .graph
                .neighbors(node_id, &[EdgeKind::Calls], Direction::Both, depth)
                .map(|r| r.into_iter().skip(1).map(|r| r.entity).collect())
                .unwrap_or_default(),
        };
        Ok(found.into_iter().cloned().collect())
    }

    fn snapshot(&self, repository_id: &str) -> std::result::Result<Arc<RepositorySnapshot>, QueryError> {
        self.store
            .snapshot(repository_id)
            .ok_or_else(|| QueryError::repository_not_found(repository_id))
    }

    fn ready_snapshot(
        &self,
        repository_id: &str,
    ) -> std::result::Result<Arc<RepositorySnapshot>, QueryError> {
        let snapshot =
            self.store
                .snapshot(repository_id)
                .ok_or_else(|| QueryError::RepositoryNotReady {
                    repository_id: repository_id.to_owned(),
                    reason: "repository has not been indexed".into(),
                })?;
        if snapshot.embeddings.is_none() {
            return Err(QueryError::RepositoryNotReady {
                repository_id: repository_id.to_owned(),
                reason: "no embedding index was built".into(),
            });
        }
        Ok(snapshot)
    }
}
