//! Arena-backed code graph. Entities live in one vector addressed by index;
//! edges are plain `(source, target, kind)` triples with adjacency lists.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::entity::{EdgeKind, Entity, EntityKind, Relationship};

/// Edge direction relative to the starting node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Out,
    In,
    Both,
}

/// Counts of what [`CodeGraph::build`] discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub duplicate_entities: usize,
    pub dangling_edges: usize,
    pub self_loops: usize,
    pub duplicate_edges: usize,
}

impl BuildStats {
    #[must_use]
    pub fn dropped_edges(&self) -> usize {
        self.dangling_edges + self.self_loops + self.duplicate_edges
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub module_count: usize,
    pub class_count: usize,
    pub function_count: usize,
    pub file_count: usize,
}

/// Induced subgraph returned by `get_graph` / `get_neighbors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<Entity>,
    pub edges: Vec<Relationship>,
}

/// A node reached by breadth-first traversal.
#[derive(Debug, Clone, Copy)]
pub struct Reached<'g> {
    pub entity: &'g Entity,
    pub depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CodeGraph {
    entities: Vec<Entity>,
    edges: Vec<Relationship>,
    index: HashMap<String, usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl CodeGraph {
    /// Build a graph, dropping invalid edges here rather than at query time:
    /// dangling endpoints, self-loops and exact duplicates.
    #[must_use]
    pub fn build(entities: Vec<Entity>, edges: Vec<Relationship>) -> (Self, BuildStats) {
        let mut stats = BuildStats::default();
        let mut graph = Self::default();

        for entity in entities {
            if graph.index.contains_key(&entity.id) {
                stats.duplicate_entities += 1;
                continue;
            }
            graph.index.insert(entity.id.clone(), graph.entities.len());
            graph.entities.push(entity);
        }
        graph.outgoing = vec![Vec::new(); graph.entities.len()];
        graph.incoming = vec![Vec::new(); graph.entities.len()];

        let mut sorted = edges;
        sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let mut seen: HashSet<(String, String, EdgeKind)> = HashSet::new();

        for edge in sorted {
            if edge.source == edge.target {
                stats.self_loops += 1;
                continue;
            }
            let (Some(&src), Some(&dst)) = (graph.index.get(&edge.source), graph.index.get(&edge.target))
            else {
                tracing::warn!(source = %edge.source, target = %edge.target, kind = %edge.kind, "dropping dangling edge");
                stats.dangling_edges += 1;
                continue;
            };
            if !seen.insert((edge.source.clone(), edge.target.clone(), edge.kind)) {
                stats.duplicate_edges += 1;
                continue;
            }
            let edge_idx = graph.edges.len();
            graph.outgoing[src].push(edge_idx);
            graph.incoming[dst].push(edge_idx);
            graph.edges.push(edge);
        }

        (graph, stats)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&i| &self.entities[i])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[must_use]
    pub fn edges(&self) -> &[Relationship] {
        &self.edges
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Edges touching `id` in `direction`, paired with the entity at the
    /// other end, in edge order.
    #[must_use]
    pub fn incident(&self, id: &str, direction: Direction) -> Vec<(&Relationship, &Entity)> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            for &e in &self.outgoing[idx] {
                let edge = &self.edges[e];
                out.push((edge, &self.entities[self.index[&edge.target]]));
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            for &e in &self.incoming[idx] {
                let edge = &self.edges[e];
                out.push((edge, &self.entities[self.index[&edge.source]]));
            }
        }
        out
    }

    /// Breadth-first traversal over `kinds` (all kinds when empty). The start
    /// node comes first at depth 0; every node appears once, at its smallest
    /// depth. `None` when `id` is unknown.
    #[must_use]
    pub fn neighbors(
        &self,
        id: &str,
        kinds: &[EdgeKind],
        direction: Direction,
        depth: usize,
    ) -> Option<Vec<Reached<'_>>> {
        let &start = self.index.get(id)?;
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut out = Vec::new();

        while let Some((idx, d)) = queue.pop_front() {
            out.push(Reached {
                entity: &self.entities[idx],
                depth: d,
            });
            if d == depth {
                continue;
            }
            for (edge, other) in self.incident(&self.entities[idx].id, direction) {
                if !kinds.is_empty() && !kinds.contains(&edge.kind) {
                    continue;
                }
                let other_idx = self.index[&other.id];
                if visited.insert(other_idx) {
                    queue.push_back((other_idx, d + 1));
                }
            }
        }
        Some(out)
    }

    /// Induced subgraph over `ids`, keeping their order; unknown ids are
    /// ignored.
    #[must_use]
    pub fn subgraph<S: AsRef<str>>(&self, ids: &[S]) -> Subgraph {
        let mut members = HashSet::new();
        let mut nodes = Vec::new();
        for id in ids {
            if let Some(&idx) = self.index.get(id.as_ref())
                && members.insert(idx)
            {
                nodes.push(self.entities[idx].clone());
            }
        }
        let edges = self
            .edges
            .iter()
            .filter(|e| {
                members.contains(&self.index[&e.source]) && members.contains(&self.index[&e.target])
            })
            .cloned()
            .collect();
        Subgraph { nodes, edges }
    }

    /// Functions reaching `id` through `calls`, up to `depth` hops.
    #[must_use]
    pub fn callers(&self, id: &str, depth: usize) -> Vec<&Entity> {
        self.call_chain(id, Direction::In, depth)
    }

    /// Functions `id` reaches through `calls`, up to `depth` hops.
    #[must_use]
    pub fn callees(&self, id: &str, depth: usize) -> Vec<&Entity> {
        self.call_chain(id, Direction::Out, depth)
    }

    fn call_chain(&self, id: &str, direction: Direction, depth: usize) -> Vec<&Entity> {
        self.neighbors(id, &[EdgeKind::Calls], direction, depth)
            .map(|reached| {
                reached
                    .into_iter()
                    .filter(|r| r.depth > 0)
                    .map(|r| r.entity)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Case-insensitive substring search over name, qualified name, signature
    /// and docstring. Exact name matches score 1.0, others 0.5.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<(&Entity, f32)> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<(&Entity, f32)> = self
            .entities
            .iter()
            .filter_map(|e| {
                if e.name.to_lowercase() == needle {
                    return Some((e, 1.0));
                }
                let haystacks = [
                    Some(e.name.as_str()),
                    Some(e.qualified_name()),
                    e.signature.as_deref(),
                    e.docstring.as_deref(),
                ];
                haystacks
                    .into_iter()
                    .flatten()
                    .any(|h| h.to_lowercase().contains(&needle))
                    .then_some((e, 0.5))
            })
            .collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        hits.truncate(limit);
        hits
    }

    #[must_use]
    pub fn stats(&self) -> GraphStats {
        let count = |kinds: &[EntityKind]| {
            self.entities
                .iter()
                .filter(|e| kinds.contains(&e.kind))
                .count()
        };
        let files: HashSet<&str> = self.entities.iter().map(|e| e.file_path.as_str()).collect();
        GraphStats {
            node_count: self.entities.len(),
            edge_count: self.edges.len(),
            module_count: count(&[EntityKind::Module]),
            class_count: count(&[EntityKind::Class]),
            function_count: count(&[EntityKind::Function, EntityKind::Method]),
            file_count: files.len(),
        }
    }

    /// Whole graph as a subgraph value.
    #[must_use]
    pub fn to_subgraph(&self) -> Subgraph {
        Subgraph {
            nodes: self.entities.clone(),
            edges: self.edges.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Metadata, entity_id};
    use proptest::prelude::*;

    fn entity(name: &str, kind: EntityKind, start: usize, end: usize) -> Entity {
        Entity {
            id: entity_id("app.py", name, start, end),
            kind,
            name: name.into(),
            file_path: "app.py".into(),
            start_line: start,
            end_line: end,
            signature: Some(format!("def {name}():")),
            docstring: None,
            metadata: Metadata::new(),
        }
    }

    fn sample() -> (CodeGraph, Vec<String>) {
        let module = entity("app", EntityKind::Module, 1, 20);
        let foo = entity("foo", EntityKind::Function, 1, 5);
        let bar = entity("bar", EntityKind::Function, 7, 10);
        let baz = entity("baz", EntityKind::Function, 12, 20);
        let ids = vec![
            module.id.clone(),
            foo.id.clone(),
            bar.id.clone(),
            baz.id.clone(),
        ];
        let edges = vec![
            Relationship::new(&ids[0], &ids[1], EdgeKind::Contains),
            Relationship::new(&ids[0], &ids[2], EdgeKind::Contains),
            Relationship::new(&ids[0], &ids[3], EdgeKind::Contains),
            Relationship::new(&ids[1], &ids[2], EdgeKind::Calls),
            Relationship::new(&ids[2], &ids[3], EdgeKind::Calls),
            Relationship::new(&ids[3], &ids[1], EdgeKind::Calls),
        ];
        let (graph, stats) = CodeGraph::build(vec![module, foo, bar, baz], edges);
        assert_eq!(stats, BuildStats::default());
        (graph, ids)
    }

    #[test]
    fn build_drops_invalid_edges() {
        let a = entity("a", EntityKind::Function, 1, 2);
        let b = entity("b", EntityKind::Function, 3, 4);
        let edges = vec![
            Relationship::new(&a.id, &b.id, EdgeKind::Calls),
            Relationship::new(&a.id, &b.id, EdgeKind::Calls),
            Relationship::new(&a.id, &a.id, EdgeKind::Calls),
            Relationship::new(&a.id, "missing", EdgeKind::Calls),
            Relationship::new(&a.id, &b.id, EdgeKind::References),
        ];
        let (graph, stats) = CodeGraph::build(vec![a.clone(), b, a], edges);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges().len(), 2);
        assert_eq!(stats.duplicate_entities, 1);
        assert_eq!(stats.duplicate_edges, 1);
        assert_eq!(stats.self_loops, 1);
        assert_eq!(stats.dangling_edges, 1);
        assert_eq!(stats.dropped_edges(), 3);
    }

    #[test]
    fn depth_zero_returns_only_the_node() {
        let (graph, ids) = sample();
        let reached = graph
            .neighbors(&ids[1], &[], Direction::Both, 0)
            .unwrap();
        assert_eq!(reached.len(), 1);
        assert_eq!(reached[0].entity.id, ids[1]);
        let sub = graph.subgraph(&[&ids[1]]);
        assert!(sub.edges.is_empty());
    }

    #[test]
    fn cycles_do_not_duplicate_nodes() {
        let (graph, ids) = sample();
        let reached = graph
            .neighbors(&ids[1], &[EdgeKind::Calls], Direction::Out, 10)
            .unwrap();
        let names: Vec<_> = reached.iter().map(|r| (r.entity.name.as_str(), r.depth)).collect();
        assert_eq!(names, vec![("foo", 0), ("bar", 1), ("baz", 2)]);
    }

    #[test]
    fn direction_and_kind_filters_apply() {
        let (graph, ids) = sample();
        let incoming = graph
            .neighbors(&ids[2], &[EdgeKind::Contains], Direction::In, 1)
            .unwrap();
        assert_eq!(incoming.len(), 2);
        assert_eq!(incoming[1].entity.kind, EntityKind::Module);
        assert!(graph.neighbors("nope", &[], Direction::Both, 1).is_none());
    }

    #[test]
    fn callers_and_callees() {
        let (graph, ids) = sample();
        let callees: Vec<_> = graph.callees(&ids[1], 1).iter().map(|e| e.name.clone()).collect();
        assert_eq!(callees, vec!["bar"]);
        let callers: Vec<_> = graph.callers(&ids[1], 1).iter().map(|e| e.name.clone()).collect();
        assert_eq!(callers, vec!["baz"]);
    }

    #[test]
    fn subgraph_is_induced() {
        let (graph, ids) = sample();
        let sub = graph.subgraph(&[&ids[1], &ids[2]]);
        assert_eq!(sub.nodes.len(), 2);
        assert_eq!(sub.edges.len(), 1);
        assert_eq!(sub.edges[0].kind, EdgeKind::Calls);
    }

    #[test]
    fn stats_count_kinds_and_files() {
        let (graph, _) = sample();
        let stats = graph.stats();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.edge_count, 6);
        assert_eq!(stats.module_count, 1);
        assert_eq!(stats.function_count, 3);
        assert_eq!(stats.class_count, 0);
        assert_eq!(stats.file_count, 1);
    }

    #[test]
    fn search_ranks_exact_names_first() {
        let (graph, _) = sample();
        let hits = graph.search("BAR", 10);
        assert_eq!(hits[0].0.name, "bar");
        assert!((hits[0].1 - 1.0).abs() < f32::EPSILON);
        assert!(graph.search("  ", 10).is_empty());
        let partial = graph.search("def", 10);
        assert_eq!(partial.len(), 4);
        assert!(partial.iter().all(|(_, s)| (*s - 0.5).abs() < f32::EPSILON));
    }

    proptest! {
        #[test]
        fn bfs_never_repeats_and_depth_is_bounded(
            edges in proptest::collection::vec((0usize..8, 0usize..8), 0..30),
            start in 0usize..8,
            depth in 0usize..5,
        ) {
            let nodes: Vec<Entity> = (0..8)
                .map(|i| entity(&format!("n{i}"), EntityKind::Function, i + 1, i + 1))
                .collect();
            let rels = edges
                .iter()
                .map(|(a, b)| Relationship::new(&nodes[*a].id, &nodes[*b].id, EdgeKind::Calls))
                .collect();
            let (graph, _) = CodeGraph::build(nodes.clone(), rels);
            let reached = graph.neighbors(&nodes[start].id, &[], Direction::Both, depth).unwrap();
            let mut ids = HashSet::new();
            for r in &reached {
                prop_assert!(ids.insert(r.entity.id.clone()));
                prop_assert!(r.depth <= depth);
            }
            prop_assert!(reached.windows(2).all(|w| w[0].depth <= w[1].depth));
            for edge in graph.edges() {
                prop_assert!(graph.contains(&edge.source) && graph.contains(&edge.target));
            }
        }
    }
}
