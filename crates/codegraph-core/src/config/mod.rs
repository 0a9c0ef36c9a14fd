mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::Context;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid [{section}] config: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
}

fn invalid(section: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section,
        message: message.into(),
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first setting that the indexer or the reasoning loop
    /// cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.timeout_secs == 0 {
            return Err(invalid("llm", "timeout_secs must be positive"));
        }
        if self.llm.max_tokens == 0 {
            return Err(invalid("llm", "max_tokens must be positive"));
        }
        if self.index.max_file_bytes == 0 {
            return Err(invalid("index", "max_file_bytes must be positive"));
        }
        if self.index.embed_concurrency == 0 {
            return Err(invalid("index", "embed_concurrency must be at least 1"));
        }
        if self.index.local_embedding_dim == 0 {
            return Err(invalid("index", "local_embedding_dim must be at least 1"));
        }
        self.reasoning
            .to_reasoning_config()
            .validate()
            .map_err(|message| invalid("reasoning", message))?;
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(invalid("storage", "data_dir must not be empty"));
        }
        Ok(())
    }
}
