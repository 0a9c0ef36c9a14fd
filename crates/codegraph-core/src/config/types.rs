use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use codegraph_index::IndexerConfig;
use codegraph_index::ReasoningConfig;
use codegraph_index::reasoning::EdgeWeights;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub index: IndexConfig,
    pub reasoning: ReasoningSettings,
    pub storage: StorageConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// Completion/embedding backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    #[default]
    Local,
    Mock,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Local => "local",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

pub(crate) fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    /// Completion deadline for the answer composer.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    pub max_file_bytes: usize,
    pub embed_concurrency: usize,
    pub max_embedding_chars: usize,
    /// Vector length of the offline hashing embedder.
    pub local_embedding_dim: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let indexer = IndexerConfig::default();
        Self {
            max_file_bytes: indexer.max_file_bytes,
            embed_concurrency: indexer.embed_concurrency,
            max_embedding_chars: indexer.max_embedding_chars,
            local_embedding_dim: 512,
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn to_indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            max_file_bytes: self.max_file_bytes,
            embed_concurrency: self.embed_concurrency,
            max_embedding_chars: self.max_embedding_chars,
        }
    }
}

/// `[reasoning]` table. Mirrors [`ReasoningConfig`] with the timeout in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReasoningSettings {
    pub hop_budget: usize,
    pub frontier_width: usize,
    pub min_relevance: f32,
    pub high_confidence: f32,
    pub similarity_weight: f32,
    pub hop_penalty: f32,
    pub timeout_secs: u64,
    pub max_evidence_chars: usize,
    pub edge_weights: EdgeWeights,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        let defaults = ReasoningConfig::default();
        Self {
            hop_budget: defaults.hop_budget,
            frontier_width: defaults.frontier_width,
            min_relevance: defaults.min_relevance,
            high_confidence: defaults.high_confidence,
            similarity_weight: defaults.similarity_weight,
            hop_penalty: defaults.hop_penalty,
            timeout_secs: defaults.timeout.as_secs(),
            max_evidence_chars: defaults.max_evidence_chars,
            edge_weights: defaults.edge_weights,
        }
    }
}

impl ReasoningSettings {
    #[must_use]
    pub fn to_reasoning_config(&self) -> ReasoningConfig {
        ReasoningConfig {
            hop_budget: self.hop_budget,
            frontier_width: self.frontier_width,
            min_relevance: self.min_relevance,
            high_confidence: self.high_confidence,
            similarity_weight: self.similarity_weight,
            hop_penalty: self.hop_penalty,
            timeout: Duration::from_secs(self.timeout_secs),
            max_evidence_chars: self.max_evidence_chars,
            edge_weights: self.edge_weights,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".codegraph"),
        }
    }
}

impl StorageConfig {
    /// Snapshot file for a repository: `<data_dir>/<repository_id>.json`.
    #[must_use]
    pub fn snapshot_path(&self, repository_id: &str) -> PathBuf {
        self.data_dir.join(format!("{repository_id}.json"))
    }
}

pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<Secret>,
}
