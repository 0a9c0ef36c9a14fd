//! Deterministic offline embedder based on feature hashing.
//!
//! Identifiers are split on case and underscore boundaries so that
//! `parse_config`, `parseConfig` and "parse the config" land on the same
//! buckets. Useful for offline indexing and tests; it has no chat capability.

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "what", "does", "how", "are",
    "was", "which", "who", "where", "when", "why", "is", "of", "to", "in", "on", "an", "a", "it",
    "be", "by", "or", "as", "at", "do", "if", "self",
];

#[derive(Debug, Clone)]
pub struct LocalHashEmbedder {
    dim: usize,
}

impl LocalHashEmbedder {
    /// A zero dimension is clamped to one.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed synchronously. The result is L2-normalized, or all zeros when
    /// the text has no usable tokens.
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dim];
        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            let value = u64::from_le_bytes(word);
            #[allow(clippy::cast_possible_truncation)]
            let idx = (value % self.dim as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for LocalHashEmbedder {
    fn default() -> Self {
        Self::new(512)
    }
}

/// Split text into lowercase word tokens, breaking identifiers apart.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() {
            continue;
        }
        for part in split_camel(raw) {
            let lower = part.to_lowercase();
            if lower.chars().count() < 2 || STOPWORDS.contains(&lower.as_str()) {
                continue;
            }
            tokens.push(lower);
        }
    }
    tokens
}

fn split_camel(word: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    for i in 1..chars.len() {
        let (pos, c) = chars[i];
        let prev = chars[i - 1].1;
        let next_lower = chars.get(i + 1).is_some_and(|(_, n)| n.is_lowercase());
        let boundary = (c.is_uppercase() && prev.is_lowercase())
            || (c.is_uppercase() && prev.is_uppercase() && next_lower)
            || (c.is_ascii_digit() != prev.is_ascii_digit());
        if boundary {
            parts.push(&word[start..pos]);
            start = pos;
        }
    }
    parts.push(&word[start..]);
    parts
}

impl LlmProvider for LocalHashEmbedder {
    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        Err(LlmError::ChatUnsupported {
            provider: "local".into(),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.embed_sync(text))
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn tokenize_splits_identifiers() {
        assert_eq!(tokenize("parseConfig"), vec!["parse", "config"]);
        assert_eq!(tokenize("parse_config"), vec!["parse", "config"]);
        assert_eq!(tokenize("HTTPServer"), vec!["http", "server"]);
        assert_eq!(tokenize("What does foo call?"), vec!["foo", "call"]);
    }

    #[test]
    fn identical_token_sets_embed_identically() {
        let e = LocalHashEmbedder::new(64);
        let a = e.embed_sync("parse_config");
        let b = e.embed_sync("parse the config");
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let e = LocalHashEmbedder::new(16);
        let v = e.embed_sync("?? !!");
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn zero_dim_is_clamped() {
        assert_eq!(LocalHashEmbedder::new(0).dim(), 1);
    }

    #[tokio::test]
    async fn chat_is_unsupported() {
        let e = LocalHashEmbedder::default();
        assert!(matches!(
            e.chat(&[Message::user("hi")]).await,
            Err(LlmError::ChatUnsupported { .. })
        ));
        assert!(e.supports_embeddings());
        assert_eq!(e.embed("foo").await.unwrap().len(), 512);
    }

    proptest! {
        #[test]
        fn embeddings_are_unit_or_zero(text in "[a-zA-Z_ ]{0,60}") {
            let v = LocalHashEmbedder::new(32).embed_sync(&text);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            prop_assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-4);
        }
    }
}
