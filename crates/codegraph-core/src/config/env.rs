use std::path::PathBuf;
use std::str::FromStr;

use super::{Config, Secret};

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    if let Ok(value) = raw.trim().parse::<T>() {
        Some(value)
    } else {
        tracing::warn!("ignoring invalid {key} value: {raw}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
        self.apply_env_overrides_reasoning();
        if let Ok(v) = std::env::var("CODEGRAPH_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("CODEGRAPH_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid CODEGRAPH_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODEGRAPH_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("CODEGRAPH_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("CODEGRAPH_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Some(tokens) = parsed("CODEGRAPH_LLM_MAX_TOKENS") {
            self.llm.max_tokens = tokens;
        }
        if let Some(secs) = parsed("CODEGRAPH_LLM_TIMEOUT") {
            self.llm.timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("CODEGRAPH_OPENAI_API_KEY")
            && !v.is_empty()
        {
            self.secrets.openai_api_key = Some(Secret::new(v));
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Some(bytes) = parsed("CODEGRAPH_INDEX_MAX_FILE_BYTES") {
            self.index.max_file_bytes = bytes;
        }
        if let Some(n) = parsed("CODEGRAPH_INDEX_EMBED_CONCURRENCY") {
            self.index.embed_concurrency = n;
        }
        if let Some(dim) = parsed("CODEGRAPH_INDEX_LOCAL_EMBEDDING_DIM") {
            self.index.local_embedding_dim = dim;
        }
    }

    fn apply_env_overrides_reasoning(&mut self) {
        if let Some(hops) = parsed("CODEGRAPH_REASONING_HOP_BUDGET") {
            self.reasoning.hop_budget = hops;
        }
        if let Some(width) = parsed("CODEGRAPH_REASONING_FRONTIER_WIDTH") {
            self.reasoning.frontier_width = width;
        }
        if let Some(threshold) = parsed("CODEGRAPH_REASONING_MIN_RELEVANCE") {
            self.reasoning.min_relevance = threshold;
        }
        if let Some(threshold) = parsed("CODEGRAPH_REASONING_HIGH_CONFIDENCE") {
            self.reasoning.high_confidence = threshold;
        }
        if let Some(weight) = parsed("CODEGRAPH_REASONING_SIMILARITY_WEIGHT") {
            self.reasoning.similarity_weight = weight;
        }
        if let Some(secs) = parsed("CODEGRAPH_REASONING_TIMEOUT") {
            self.reasoning.timeout_secs = secs;
        }
    }
}
