//! Test-only mock LLM provider.

use std::sync::{Arc, Mutex};

use crate::local::LocalHashEmbedder;
use crate::provider::{LlmProvider, Message};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<Vec<Message>>>>,
    pub default_response: String,
    /// Fixed embedding. When unset, text is embedded with [`LocalHashEmbedder`].
    pub embedding: Option<Vec<f32>>,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
    hasher: LocalHashEmbedder,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            embedding: None,
            supports_embeddings: true,
            fail_chat: false,
            fail_embed: false,
            delay_ms: 0,
            hasher: LocalHashEmbedder::new(64),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, vector: Vec<f32>) -> Self {
        self.embedding = Some(vector);
        self
    }

    #[must_use]
    pub fn without_embeddings(mut self) -> Self {
        self.supports_embeddings = false;
        self
    }

    #[must_use]
    pub fn failing_embeddings(mut self) -> Self {
        self.fail_embed = true;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Every message list passed to `chat`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn recorded_prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().unwrap().clone()
    }
}

impl LlmProvider for MockProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, messages: &[Message]) -> Result<String, crate::LlmError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.prompts.lock().unwrap().push(messages.to_vec());
        if self.fail_chat {
            return Err(crate::LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        if !self.supports_embeddings {
            return Err(crate::LlmError::EmbedUnsupported {
                provider: "mock".into(),
            });
        }
        if self.fail_embed {
            return Err(crate::LlmError::Other("mock embedding error".into()));
        }
        Ok(self
            .embedding
            .clone()
            .unwrap_or_else(|| self.hasher.embed_sync(text)))
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_are_consumed_in_order() {
        let p = MockProvider::with_responses(vec!["one".into(), "two".into()]);
        let msgs = [Message::user("q")];
        assert_eq!(p.chat(&msgs).await.unwrap(), "one");
        assert_eq!(p.chat(&msgs).await.unwrap(), "two");
        assert_eq!(p.chat(&msgs).await.unwrap(), "mock response");
        assert_eq!(p.recorded_prompts().len(), 3);
    }

    #[tokio::test]
    async fn failing_chat_errors() {
        assert!(MockProvider::failing().chat(&[]).await.is_err());
    }

    #[tokio::test]
    async fn embed_defaults_to_hashing() {
        let p = MockProvider::default();
        assert_eq!(p.embed("foo").await.unwrap(), p.embed("foo").await.unwrap());
        let fixed = MockProvider {
            embedding: Some(vec![1.0, 0.0]),
            ..MockProvider::default()
        };
        assert_eq!(fixed.embed("anything").await.unwrap(), vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn embedding_switches() {
        let off = MockProvider::default().without_embeddings();
        assert!(!off.supports_embeddings());
        assert!(matches!(
            off.embed("x").await,
            Err(crate::LlmError::EmbedUnsupported { .. })
        ));
        let broken = MockProvider::default().failing_embeddings();
        assert!(broken.embed("x").await.is_err());
    }
}
