//! Service bootstrap: config resolution, provider and service construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use codegraph_index::{CodeGraphService, GraphStore};
use codegraph_llm::any::AnyProvider;
use codegraph_llm::local::LocalHashEmbedder;
use codegraph_llm::openai::OpenAiProvider;

use crate::config::{Config, ProviderKind};

/// Priority: explicit path > `CODEGRAPH_CONFIG` env > `codegraph.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CODEGRAPH_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("codegraph.toml")
}

/// Load and validate configuration.
///
/// # Errors
///
/// Returns an error if the config file cannot be parsed or fails validation.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let path = resolve_config_path(explicit);
    let config = Config::load(&path)?;
    config.validate()?;
    tracing::debug!(path = %path.display(), provider = %config.llm.provider, "configuration loaded");
    Ok(config)
}

/// # Errors
///
/// Returns an error if the selected provider is missing credentials or is not
/// compiled into this build.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        ProviderKind::OpenAi => {
            let api_key = config
                .secrets
                .openai_api_key
                .as_ref()
                .context("CODEGRAPH_OPENAI_API_KEY not set")?;
            let embedding_model =
                (!config.llm.embedding_model.is_empty()).then(|| config.llm.embedding_model.clone());
            Ok(AnyProvider::OpenAi(OpenAiProvider::new(
                api_key.expose().to_owned(),
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
                embedding_model,
            )))
        }
        ProviderKind::Local => Ok(AnyProvider::Local(LocalHashEmbedder::new(
            config.index.local_embedding_dim,
        ))),
        #[cfg(feature = "mock")]
        ProviderKind::Mock => Ok(AnyProvider::Mock(
            codegraph_llm::mock::MockProvider::default(),
        )),
        #[cfg(not(feature = "mock"))]
        ProviderKind::Mock => bail!("mock provider requires the `mock` feature"),
    }
}

/// Wire a provider and a store into a service configured from `config`.
#[must_use]
pub fn build_service(
    config: &Config,
    provider: AnyProvider,
    store: Arc<GraphStore>,
) -> CodeGraphService<AnyProvider> {
    CodeGraphService::new(Arc::new(provider), store)
        .with_indexer_config(config.index.to_indexer_config())
        .with_reasoning_config(config.reasoning.to_reasoning_config())
        .with_completion_timeout(config.llm.timeout())
}

/// Load a previously saved snapshot for `repository_id` into `store`, if one
/// exists under the data dir.
///
/// # Errors
///
/// Returns an error if a snapshot file exists but cannot be read.
pub async fn restore_snapshot(
    config: &Config,
    store: &GraphStore,
    repository_id: &str,
) -> anyhow::Result<bool> {
    let path = config.storage.snapshot_path(repository_id);
    if !path.exists() {
        return Ok(false);
    }
    let snapshot = store
        .load(&path)
        .await
        .with_context(|| format!("failed to load snapshot {}", path.display()))?;
    if snapshot.repository_id != repository_id {
        bail!(
            "snapshot {} belongs to repository {}",
            path.display(),
            snapshot.repository_id
        );
    }
    Ok(true)
}

/// Persist the current snapshot of `repository_id` under the data dir.
///
/// # Errors
///
/// Returns an error if the data dir cannot be created or the write fails.
pub async fn persist_snapshot(
    config: &Config,
    store: &GraphStore,
    repository_id: &str,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!(
            "failed to create data dir {}",
            config.storage.data_dir.display()
        )
    })?;
    let path = config.storage.snapshot_path(repository_id);
    store
        .save(repository_id, &path)
        .await
        .with_context(|| format!("failed to save snapshot {}", path.display()))?;
    tracing::info!(repository = repository_id, path = %path.display(), "snapshot saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use codegraph_index::FileTree;
    use codegraph_llm::LlmProvider;
    use serial_test::serial;

    use super::*;

    fn tree() -> FileTree {
        let mut tree = FileTree::new();
        tree.insert(
            "app.py".into(),
            "def foo():\n    return bar()\n\ndef bar():\n    return 1\n".into(),
        );
        tree
    }

    #[test]
    #[serial]
    fn resolve_config_path_priority() {
        unsafe { std::env::remove_var("CODEGRAPH_CONFIG") };
        assert_eq!(resolve_config_path(None), PathBuf::from("codegraph.toml"));

        unsafe { std::env::set_var("CODEGRAPH_CONFIG", "/etc/codegraph.toml") };
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("/etc/codegraph.toml")
        );
        assert_eq!(
            resolve_config_path(Some(Path::new("local.toml"))),
            PathBuf::from("local.toml")
        );
        unsafe { std::env::remove_var("CODEGRAPH_CONFIG") };
    }

    #[test]
    fn local_provider_uses_configured_dimension() {
        let mut config = Config::default();
        config.index.local_embedding_dim = 32;
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "local");
        assert!(provider.supports_embeddings());
    }

    #[test]
    fn openai_without_key_is_an_error() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::OpenAi;
        let err = create_provider(&config).unwrap_err();
        assert!(err.to_string().contains("CODEGRAPH_OPENAI_API_KEY"));
    }

    #[test]
    fn openai_with_key_builds() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::OpenAi;
        config.secrets.openai_api_key = Some(crate::config::Secret::new("sk-test"));
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert!(provider.supports_embeddings());
    }

    #[tokio::test]
    async fn snapshot_persists_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.index.local_embedding_dim = 64;

        let store = Arc::new(GraphStore::new());
        let service = build_service(&config, create_provider(&config).unwrap(), store.clone());
        let report = service.index("demo", tree()).await.unwrap();
        assert!(report.entity_count >= 3);

        let path = persist_snapshot(&config, &store, "demo").await.unwrap();
        assert!(path.ends_with("demo.json"));

        let fresh = GraphStore::new();
        assert!(restore_snapshot(&config, &fresh, "demo").await.unwrap());
        let restored = fresh.snapshot("demo").unwrap();
        assert_eq!(restored.graph.len(), report.entity_count);
        assert!(restored.embeddings.is_some());

        assert!(!restore_snapshot(&config, &fresh, "other").await.unwrap());
    }
}
