//! Per-entity embedding vectors and brute-force similarity search.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{IndexError, Result};

/// Number of leading docstring lines included in embedding text.
const MAX_DOC_LINES: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub entity_id: String,
    pub vector: Vec<f32>,
    /// Hash of the text that produced `vector`; lets re-indexing skip
    /// entities whose text did not change.
    pub content_hash: String,
}

/// All vectors of one snapshot. Every vector has the same dimension.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    records: Vec<EmbeddingRecord>,
    by_id: HashMap<String, usize>,
    dimension: usize,
}

impl EmbeddingIndex {
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] if vectors differ in length.
    pub fn new(records: Vec<EmbeddingRecord>) -> Result<Self> {
        let dimension = records.first().map_or(0, |r| r.vector.len());
        let mut by_id = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if record.vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    entity_id: record.entity_id.clone(),
                    expected: dimension,
                    found: record.vector.len(),
                });
            }
            by_id.insert(record.entity_id.clone(), i);
        }
        Ok(Self {
            records,
            by_id,
            dimension,
        })
    }

    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<&EmbeddingRecord> {
        self.by_id.get(entity_id).map(|&i| &self.records[i])
    }

    /// Cosine similarity between `query` and the entity's vector, or 0.0 when
    /// the entity has no vector.
    #[must_use]
    pub fn similarity(&self, entity_id: &str, query: &[f32]) -> f32 {
        self.get(entity_id)
            .map_or(0.0, |r| cosine_similarity(&r.vector, query))
    }

    /// Top `k` entities by similarity, highest first; ties by id.
    #[must_use]
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<(&str, f32)> {
        let mut scored: Vec<(&str, f32)> = self
            .records
            .iter()
            .map(|r| (r.entity_id.as_str(), cosine_similarity(&r.vector, query)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        scored.truncate(k);
        scored
    }

    #[must_use]
    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Reusable vectors keyed by `(entity_id, content_hash)`.
    #[must_use]
    pub fn reusable(&self) -> HashMap<(&str, &str), &[f32]> {
        self.records
            .iter()
            .map(|r| {
                (
                    (r.entity_id.as_str(), r.content_hash.as_str()),
                    r.vector.as_slice(),
                )
            })
            .collect()
    }
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Text embedded for an entity. The first line is always
/// `"{kind} {qualified_name}"`; location, signature, docstring and the
/// source body follow, truncated to `max_chars`.
#[must_use]
pub fn embedding_text(entity: &Entity, body: Option<&str>, max_chars: usize) -> String {
    let mut text = String::with_capacity(256);
    text.push_str(entity.kind.as_str());
    text.push(' ');
    text.push_str(entity.qualified_name());
    text.push('\n');

    text.push_str("# ");
    text.push_str(&entity.location());
    text.push('\n');

    if let Some(lang) = entity.language() {
        text.push_str("# Language: ");
        text.push_str(lang);
        text.push('\n');
    }
    if let Some(sig) = &entity.signature {
        text.push_str(sig);
        text.push('\n');
    }
    if let Some(doc) = &entity.docstring {
        for line in doc.lines().take(MAX_DOC_LINES) {
            text.push_str(line);
            text.push('\n');
        }
    }
    if let Some(body) = body {
        text.push_str(body);
    }

    truncate_chars(&text, max_chars).to_owned()
}

/// Longest prefix of `text` with at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[must_use]
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
