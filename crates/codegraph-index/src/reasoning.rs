//! Multi-hop retrieval over a snapshot: seed a frontier by embedding
//! similarity, then expand it along graph edges one hop at a time.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use codegraph_llm::LlmProvider;

use crate::entity::{EdgeKind, Entity};
use crate::error::{PartialTrace, QueryError};
use crate::graph::Direction;
use crate::store::RepositorySnapshot;

/// Relevance of each edge type when scoring a hop candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeWeights {
    pub calls: f32,
    pub contains: f32,
    pub inherits: f32,
    pub references: f32,
    pub imports: f32,
}

impl Default for EdgeWeights {
    fn default() -> Self {
        Self {
            calls: 1.0,
            contains: 0.8,
            inherits: 0.8,
            references: 0.6,
            imports: 0.4,
        }
    }
}

impl EdgeWeights {
    #[must_use]
    pub fn weight(&self, kind: EdgeKind) -> f32 {
        match kind {
            EdgeKind::Calls => self.calls,
            EdgeKind::Contains => self.contains,
            EdgeKind::Inherits => self.inherits,
            EdgeKind::References => self.references,
            EdgeKind::Imports => self.imports,
        }
    }
}

/// Policy knobs of the reasoning loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningConfig {
    /// Maximum number of expansion hops after seeding.
    pub hop_budget: usize,
    /// Maximum frontier size, for seeds and every hop.
    pub frontier_width: usize,
    /// Seeds need this similarity; hop candidates need this blended score.
    pub min_relevance: f32,
    /// A frontier item this similar to the question lets the loop stop as
    /// soon as its neighbours stop contributing.
    pub high_confidence: f32,
    /// Blend weight `w` in `w * similarity + (1 - w) * edge_weight`.
    pub similarity_weight: f32,
    /// Confidence multiplier per low-similarity or interrupted hop.
    pub hop_penalty: f32,
    /// Overall query deadline; checked at hop boundaries.
    pub timeout: Duration,
    /// Per-citation source characters included in the completion prompt.
    pub max_evidence_chars: usize,
    pub edge_weights: EdgeWeights,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            hop_budget: 4,
            frontier_width: 6,
            min_relevance: 0.20,
            high_confidence: 0.85,
            similarity_weight: 0.70,
            hop_penalty: 0.85,
            timeout: Duration::from_secs(30),
            max_evidence_chars: 1500,
            edge_weights: EdgeWeights::default(),
        }
    }
}

impl ReasoningConfig {
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.hop_budget == 0 {
            return Err("hop_budget must be at least 1".into());
        }
        if self.frontier_width == 0 {
            return Err("frontier_width must be at least 1".into());
        }
        for (name, value) in [
            ("min_relevance", self.min_relevance),
            ("high_confidence", self.high_confidence),
            ("similarity_weight", self.similarity_weight),
            ("hop_penalty", self.hop_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if self.min_relevance > self.high_confidence {
            return Err("min_relevance must not exceed high_confidence".into());
        }
        if EdgeKind::ALL
            .iter()
            .map(|k| self.edge_weights.weight(*k))
            .any(|w| w.is_nan() || w < 0.0)
        {
            return Err("edge weights must be non-negative".into());
        }
        if self.timeout.is_zero() {
            return Err("reasoning timeout must be positive".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_number: usize,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_visited: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

/// Why the loop stopped expanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    BudgetExhausted,
    DiminishingReturns,
    HighConfidence,
    TimedOut,
    Cancelled,
    /// Nothing in the index was similar enough to seed from.
    Ungrounded,
}

impl StopReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::DiminishingReturns => "diminishing_returns",
            Self::HighConfidence => "high_confidence",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Ungrounded => "ungrounded",
        }
    }

    /// The loop was cut short by the caller or the deadline.
    #[must_use]
    pub fn is_interruption(self) -> bool {
        matches!(self, Self::TimedOut | Self::Cancelled)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A visited entity with the verbatim source it contributes.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub entity: Entity,
    pub similarity: f32,
    /// 0 for seeds.
    pub hop: usize,
    pub via: Option<EdgeKind>,
    pub content: String,
}

/// Everything the loop gathered, in first-visited order.
#[derive(Debug, Clone)]
pub struct Trace {
    pub steps: Vec<ReasoningStep>,
    pub evidence: Vec<Evidence>,
    pub stop_reason: StopReason,
    pub hops_completed: usize,
    /// Accepted hops whose mean similarity stayed below `min_relevance`.
    pub penalized_hops: usize,
}

impl Trace {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            evidence: Vec::new(),
            stop_reason: StopReason::BudgetExhausted,
            hops_completed: 0,
            penalized_hops: 0,
        }
    }

    fn step(&mut self, action: impl Into<String>, node: Option<&str>, observation: Option<String>) {
        self.steps.push(ReasoningStep {
            step_number: self.steps.len() + 1,
            action: action.into(),
            node_visited: node.map(str::to_owned),
            observation,
        });
    }

    /// Steps and citations so far, for error reporting.
    #[must_use]
    pub fn to_partial(&self) -> PartialTrace {
        PartialTrace {
            steps: self.steps.clone(),
            citations: crate::composer::citations(self),
            hops_completed: self.hops_completed,
            stop_reason: Some(self.stop_reason),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'g> {
    entity: &'g Entity,
    source: &'g Entity,
    kind: EdgeKind,
    similarity: f32,
    weight: f32,
    score: f32,
}

impl Candidate<'_> {
    /// Higher score, then higher edge weight, then smaller source id.
    fn beats(&self, other: &Self) -> bool {
        self.score
            .total_cmp(&other.score)
            .then(self.weight.total_cmp(&other.weight))
            .then(other.source.id.cmp(&self.source.id))
            .is_gt()
    }
}

/// Run the seed-and-expand loop for `question`.
///
/// Cancellation and the deadline are honoured at every hop boundary; either
/// ends the loop with the trace gathered so far rather than an error.
///
/// # Errors
///
/// Returns [`QueryError::RepositoryNotReady`] if the snapshot has no
/// embedding index, or [`QueryError::Provider`] if the question cannot be
/// embedded.
pub async fn explore<P: LlmProvider>(
    provider: &P,
    snapshot: &RepositorySnapshot,
    question: &str,
    config: &ReasoningConfig,
    cancel: &CancellationToken,
    deadline: Instant,
) -> Result<Trace, QueryError> {
    let Some(index) = snapshot.embeddings.as_ref() else {
        return Err(QueryError::RepositoryNotReady {
            repository_id: snapshot.repository_id.clone(),
            reason: "no embedding index".into(),
        });
    };
    let graph = &snapshot.graph;
    let mut trace = Trace::new();

    let query = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            trace.stop_reason = StopReason::Cancelled;
            return Ok(trace);
        }
        embedded = tokio::time::timeout_at(deadline, provider.embed(question)) => match embedded {
            Ok(Ok(vector)) => vector,
            Ok(Err(source)) => {
                return Err(QueryError::Provider {
                    source,
                    partial: Box::new(trace.to_partial()),
                });
            }
            Err(_) => {
                trace.stop_reason = StopReason::TimedOut;
                return Ok(trace);
            }
        },
    };

    let width = config.frontier_width.max(1);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut frontier: Vec<(&Entity, f32)> = Vec::new();

    for (id, similarity) in index.nearest(&query, width) {
        if similarity < config.min_relevance {
            break;
        }
        let Some(entity) = graph.get(id) else {
            continue;
        };
        visited.insert(&entity.id);
        frontier.push((entity, similarity));
        trace.step(
            "seeded from similarity search",
            Some(entity.id.as_str()),
            Some(format!("{} (similarity {similarity:.2})", entity.location())),
        );
        trace.evidence.push(evidence(snapshot, entity, similarity, 0, None));
    }

    if frontier.is_empty() {
        trace.stop_reason = StopReason::Ungrounded;
        trace.step(
            "no entity passed the relevance threshold",
            None,
            Some(format!("minimum similarity {:.2}", config.min_relevance)),
        );
        tracing::debug!(repository = %snapshot.repository_id, "query could not be grounded");
        return Ok(trace);
    }

    while trace.hops_completed < config.hop_budget {
        if cancel.is_cancelled() {
            trace.stop_reason = StopReason::Cancelled;
            break;
        }
        if Instant::now() >= deadline {
            trace.stop_reason = StopReason::TimedOut;
            break;
        }

        let mut best: HashMap<&str, Candidate<'_>> = HashMap::new();
        let mut productive: HashSet<&str> = HashSet::new();
        for &(node, _) in &frontier {
            for (edge, other) in graph.incident(&node.id, Direction::Both) {
                if visited.contains(other.id.as_str()) {
                    continue;
                }
                let similarity = index.similarity(&other.id, &query);
                let weight = config.edge_weights.weight(edge.kind);
                let candidate = Candidate {
                    entity: other,
                    source: node,
                    kind: edge.kind,
                    similarity,
                    weight,
                    score: config.similarity_weight * similarity
                        + (1.0 - config.similarity_weight) * weight,
                };
                if candidate.score >= config.min_relevance {
                    productive.insert(node.id.as_str());
                }
                best.entry(other.id.as_str())
                    .and_modify(|current| {
                        if candidate.beats(current) {
                            *current = candidate;
                        }
                    })
                    .or_insert(candidate);
            }
        }

        // A strongly matching item whose neighbourhood adds nothing relevant
        // already answers the question.
        if let Some((settled, sim)) = frontier.iter().find(|(node, sim)| {
            *sim >= config.high_confidence && !productive.contains(node.id.as_str())
        }) {
            tracing::debug!(
                node = %settled.id,
                similarity = *sim,
                "high-confidence item has no new neighbours"
            );
            trace.stop_reason = StopReason::HighConfidence;
            break;
        }

        let mut ranked: Vec<Candidate<'_>> = best
            .into_values()
            .filter(|c| c.score >= config.min_relevance)
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        ranked.truncate(width);

        if ranked.is_empty() {
            trace.stop_reason = StopReason::DiminishingReturns;
            break;
        }

        trace.hops_completed += 1;
        let hop = trace.hops_completed;
        #[allow(clippy::cast_precision_loss)]
        let mean = ranked.iter().map(|c| c.similarity).sum::<f32>() / ranked.len() as f32;
        if mean < config.min_relevance {
            trace.penalized_hops += 1;
        }
        tracing::debug!(hop, accepted = ranked.len(), mean_similarity = mean, "hop expanded");

        frontier.clear();
        for c in ranked {
            visited.insert(&c.entity.id);
            trace.step(
                format!("expanded via {} from {}", c.kind, c.source.name),
                Some(c.entity.id.as_str()),
                Some(format!(
                    "{} (score {:.2}, similarity {:.2})",
                    c.entity.location(),
                    c.score,
                    c.similarity
                )),
            );
            trace
                .evidence
                .push(evidence(snapshot, c.entity, c.similarity, hop, Some(c.kind)));
            frontier.push((c.entity, c.similarity));
        }
    }

    tracing::debug!(
        repository = %snapshot.repository_id,
        hops = trace.hops_completed,
        visited = trace.evidence.len(),
        stop = %trace.stop_reason,
        "reasoning finished"
    );
    Ok(trace)
}

fn evidence(
    snapshot: &RepositorySnapshot,
    entity: &Entity,
    similarity: f32,
    hop: usize,
    via: Option<EdgeKind>,
) -> Evidence {
    Evidence {
        entity: entity.clone(),
        similarity,
        hop,
        via,
        content: snapshot.source_slice(entity).unwrap_or_default(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use codegraph_llm::LlmError;
    use codegraph_llm::local::tokenize;
    use codegraph_llm::provider::Message;
    use proptest::prelude::*;

    use super::*;
    use crate::embedding::{EmbeddingIndex, EmbeddingRecord, content_hash};
    use crate::entity::{EntityKind, Metadata, Relationship, entity_id};
    use crate::graph::CodeGraph;

    /// One-hot embedder over a fixed vocabulary, reading only the first line
    /// of the text (`"{kind} {qualified_name}"` for entities).
    pub(crate) struct KeywordProvider {
        pub vocab: Vec<&'static str>,
        pub answer: String,
    }

    impl KeywordProvider {
        pub(crate) fn new(vocab: &[&'static str], answer: &str) -> Self {
            Self {
                vocab: vocab.to_vec(),
                answer: answer.to_owned(),
            }
        }

        pub(crate) fn vector(&self, text: &str) -> Vec<f32> {
            let tokens = tokenize(text.lines().next().unwrap_or_default());
            self.vocab
                .iter()
                .map(|w| if tokens.iter().any(|t| t == w) { 1.0 } else { 0.0 })
                .collect()
        }
    }

    impl LlmProvider for KeywordProvider {
        async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
            Ok(self.answer.clone())
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(self.vector(text))
        }

        fn supports_embeddings(&self) -> bool {
            true
        }

        #[allow(clippy::unnecessary_literal_bound)]
        fn name(&self) -> &str {
            "keyword"
        }
    }

    fn entity(name: &str, kind: EntityKind, start: usize, end: usize) -> Entity {
        Entity {
            id: entity_id("app.py", name, start, end),
            kind,
            name: name.into(),
            file_path: "app.py".into(),
            start_line: start,
            end_line: end,
            signature: None,
            docstring: None,
            metadata: Metadata::new(),
        }
    }

    /// Module `app` containing `foo` (1-5) which calls `bar` (7-10).
    pub(crate) fn scenario(provider: &KeywordProvider) -> RepositorySnapshot {
        let module = entity("app", EntityKind::Module, 1, 10);
        let foo = entity("foo", EntityKind::Function, 1, 5);
        let bar = entity("bar", EntityKind::Function, 7, 10);
        let edges = vec![
            Relationship::new(&module.id, &foo.id, EdgeKind::Contains),
            Relationship::new(&module.id, &bar.id, EdgeKind::Contains),
            Relationship::new(&foo.id, &bar.id, EdgeKind::Calls).with_line(4),
        ];
        let entities = vec![module, foo, bar];
        let records = entities
            .iter()
            .map(|e| {
                let text = format!("{} {}", e.kind, e.name);
                EmbeddingRecord {
                    entity_id: e.id.clone(),
                    vector: provider.vector(&text),
                    content_hash: content_hash(&text),
                }
            })
            .collect();
        let (graph, _) = CodeGraph::build(entities, edges);
        RepositorySnapshot {
            repository_id: "r".into(),
            version: 1,
            graph,
            embeddings: Some(EmbeddingIndex::new(records).unwrap()),
            sources: BTreeMap::from([(
                "app.py".to_owned(),
                "def foo():\n    x = 1\n    y = 2\n    bar()\n    return x\n\ndef bar():\n    a = 1\n    b = 2\n    return a + b\n".to_owned(),
            )]),
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn seeds_on_foo_then_follows_calls_to_bar() {
        let provider = KeywordProvider::new(&["foo", "bar", "app"], "");
        let snapshot = scenario(&provider);
        let trace = explore(
            &provider,
            &snapshot,
            "What does foo call?",
            &ReasoningConfig::default(),
            &CancellationToken::new(),
            far_deadline(),
        )
        .await
        .unwrap();

        assert_eq!(trace.steps[0].action, "seeded from similarity search");
        assert_eq!(trace.evidence[0].entity.name, "foo");
        assert_eq!(trace.evidence[1].entity.name, "bar");
        assert_eq!(trace.evidence[1].via, Some(EdgeKind::Calls));
        assert_eq!(trace.evidence[1].hop, 1);
        assert!(trace.steps[1].action.starts_with("expanded via calls from foo"));
        assert_eq!(trace.evidence[1].content.lines().next(), Some("def bar():"));
        assert_eq!(trace.hops_completed, 1);
        assert_eq!(trace.stop_reason, StopReason::DiminishingReturns);
        let numbers: Vec<_> = trace.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, (1..=trace.steps.len()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn unrelated_question_is_ungrounded() {
        let provider = KeywordProvider::new(&["foo", "bar", "app"], "");
        let snapshot = scenario(&provider);
        let trace = explore(
            &provider,
            &snapshot,
            "How is billing computed?",
            &ReasoningConfig::default(),
            &CancellationToken::new(),
            far_deadline(),
        )
        .await
        .unwrap();
        assert_eq!(trace.stop_reason, StopReason::Ungrounded);
        assert!(trace.evidence.is_empty());
        assert_eq!(trace.steps.len(), 1);
        assert!(trace.steps[0].node_visited.is_none());
    }

    #[tokio::test]
    async fn missing_embeddings_fail_before_any_step() {
        let provider = KeywordProvider::new(&["foo"], "");
        let mut snapshot = scenario(&provider);
        snapshot.embeddings = None;
        let err = explore(
            &provider,
            &snapshot,
            "foo",
            &ReasoningConfig::default(),
            &CancellationToken::new(),
            far_deadline(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QueryError::RepositoryNotReady { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_embedding_returns_empty_trace() {
        let provider = KeywordProvider::new(&["foo", "bar", "app"], "");
        let snapshot = scenario(&provider);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let trace = explore(
            &provider,
            &snapshot,
            "foo",
            &ReasoningConfig::default(),
            &cancel,
            far_deadline(),
        )
        .await
        .unwrap();
        assert_eq!(trace.stop_reason, StopReason::Cancelled);
        assert!(trace.evidence.is_empty());
    }

    #[tokio::test]
    async fn expired_deadline_stops_after_seeding() {
        let provider = KeywordProvider::new(&["foo", "bar", "app"], "");
        let snapshot = scenario(&provider);
        let trace = explore(
            &provider,
            &snapshot,
            "foo",
            &ReasoningConfig::default(),
            &CancellationToken::new(),
            Instant::now(),
        )
        .await
        .unwrap();
        assert_eq!(trace.stop_reason, StopReason::TimedOut);
        assert_eq!(trace.hops_completed, 0);
    }

    #[tokio::test]
    async fn strong_seed_with_nothing_new_stops_with_high_confidence() {
        let provider = KeywordProvider::new(&["foo", "bar", "app"], "");
        let snapshot = scenario(&provider);
        let config = ReasoningConfig {
            min_relevance: 0.5,
            ..ReasoningConfig::default()
        };
        let trace = explore(
            &provider,
            &snapshot,
            "foo",
            &config,
            &CancellationToken::new(),
            far_deadline(),
        )
        .await
        .unwrap();
        assert_eq!(trace.stop_reason, StopReason::HighConfidence);
        assert_eq!(trace.evidence.len(), 1);
    }

    /// For the question "alpha": seeds `a` (similarity 0.9, isolated) and
    /// `b` (0.5), where `b` calls `c` (0.1).
    fn strong_isolated_seed() -> (KeywordProvider, RepositorySnapshot) {
        let provider = KeywordProvider::new(&["alpha", "beta"], "");
        let a = entity("a", EntityKind::Function, 1, 2);
        let b = entity("b", EntityKind::Function, 4, 5);
        let c = entity("c", EntityKind::Function, 7, 8);
        let vectors = [vec![0.9, 0.436], vec![0.5, 0.866], vec![0.1, 0.995]];
        let records = [&a, &b, &c]
            .iter()
            .zip(vectors)
            .map(|(e, vector)| EmbeddingRecord {
                entity_id: e.id.clone(),
                vector,
                content_hash: content_hash(&e.name),
            })
            .collect();
        let edges = vec![Relationship::new(&b.id, &c.id, EdgeKind::Calls)];
        let (graph, _) = CodeGraph::build(vec![a, b, c], edges);
        let snapshot = RepositorySnapshot {
            repository_id: "r".into(),
            version: 1,
            graph,
            embeddings: Some(EmbeddingIndex::new(records).unwrap()),
            sources: BTreeMap::new(),
        };
        (provider, snapshot)
    }

    #[tokio::test]
    async fn strong_item_without_new_neighbours_stops_before_weaker_expansion() {
        let (provider, snapshot) = strong_isolated_seed();
        let trace = explore(
            &provider,
            &snapshot,
            "alpha",
            &ReasoningConfig::default(),
            &CancellationToken::new(),
            far_deadline(),
        )
        .await
        .unwrap();

        assert_eq!(trace.stop_reason, StopReason::HighConfidence);
        assert_eq!(trace.hops_completed, 0);
        let names: Vec<&str> = trace.evidence.iter().map(|e| e.entity.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn weaker_seeds_expand_when_no_item_is_high_confidence() {
        let (provider, snapshot) = strong_isolated_seed();
        let config = ReasoningConfig {
            high_confidence: 0.95,
            ..ReasoningConfig::default()
        };
        let trace = explore(
            &provider,
            &snapshot,
            "alpha",
            &config,
            &CancellationToken::new(),
            far_deadline(),
        )
        .await
        .unwrap();

        let c = trace.evidence.iter().find(|e| e.entity.name == "c").unwrap();
        assert_eq!(c.hop, 1);
        assert_eq!(c.via, Some(EdgeKind::Calls));
        assert_eq!(trace.hops_completed, 1);
        assert_eq!(trace.stop_reason, StopReason::DiminishingReturns);
    }

    #[test]
    fn validate_rejects_bad_settings() {
        assert!(ReasoningConfig::default().validate().is_ok());
        let bad = [
            ReasoningConfig {
                hop_budget: 0,
                ..ReasoningConfig::default()
            },
            ReasoningConfig {
                min_relevance: 0.9,
                high_confidence: 0.5,
                ..ReasoningConfig::default()
            },
            ReasoningConfig {
                similarity_weight: 1.5,
                ..ReasoningConfig::default()
            },
            ReasoningConfig {
                edge_weights: EdgeWeights {
                    calls: -1.0,
                    ..EdgeWeights::default()
                },
                ..ReasoningConfig::default()
            },
            ReasoningConfig {
                timeout: Duration::ZERO,
                ..ReasoningConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    proptest! {
        #[test]
        fn expansion_respects_budgets(hops in 1usize..6, width in 1usize..4, weight in 0.0f32..=1.0) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
            let provider = KeywordProvider::new(&["foo", "bar", "app"], "");
            let snapshot = scenario(&provider);
            let config = ReasoningConfig {
                hop_budget: hops,
                frontier_width: width,
                similarity_weight: weight,
                ..ReasoningConfig::default()
            };
            let trace = rt.block_on(explore(
                &provider,
                &snapshot,
                "foo bar",
                &config,
                &CancellationToken::new(),
                Instant::now() + Duration::from_secs(60),
            )).unwrap();
            prop_assert!(trace.hops_completed <= hops);
            let mut seen = HashSet::new();
            for ev in &trace.evidence {
                prop_assert!(seen.insert(ev.entity.id.clone()));
                prop_assert!(trace.steps.iter().any(|s| s.node_visited.as_deref() == Some(ev.entity.id.as_str())));
            }
            prop_assert!(trace.evidence.iter().filter(|e| e.hop == 0).count() <= width);
        }
    }
}
