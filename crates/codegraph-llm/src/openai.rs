use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

const PROVIDER: &str = "openai";

/// OpenAI-compatible backend: `/chat/completions` for answers and
/// `/embeddings` for entity and query vectors.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    embedding_model: Option<String>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        embedding_model: Option<String>,
    ) -> Self {
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model,
            max_tokens,
            embedding_model,
        }
    }

    fn chat_body<'a>(&'a self, messages: &'a [Message]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: self.max_tokens,
            temperature: 0.0,
        }
    }

    /// POST `body` to `endpoint`, retrying once after a 429.
    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        match self.post_once(endpoint, body).await {
            Err(LlmError::RateLimited) => {
                tracing::warn!(endpoint, "rate limited, retrying in 1s");
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.post_once(endpoint, body).await
            }
            other => other,
        }
    }

    async fn post_once<B, R>(&self, endpoint: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(endpoint, %status, body = %text, "request rejected");
            return Err(status_error(endpoint, status));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = self.chat_body(messages);
        let resp: ChatResponse = self.post("chat/completions", &body).await?;
        answer_text(resp)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or_else(|| LlmError::EmbedUnsupported {
                provider: PROVIDER.into(),
            })?;
        let body = EmbeddingRequest {
            input: text,
            model,
            encoding_format: "float",
        };
        let resp: EmbeddingResponse = self.post("embeddings", &body).await?;
        first_embedding(resp)
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER
    }
}

fn status_error(endpoint: &str, status: reqwest::StatusCode) -> LlmError {
    match status {
        reqwest::StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
        s if s.is_server_error() => LlmError::Unavailable,
        s => LlmError::Other(format!("{PROVIDER} {endpoint} request failed (status {s})")),
    }
}

/// Text of the first non-blank choice.
fn answer_text(resp: ChatResponse) -> Result<String, LlmError> {
    if let Some(usage) = &resp.usage {
        tracing::debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "completion usage"
        );
    }
    resp.choices
        .into_iter()
        .filter_map(|c| c.message.content)
        .find(|c| !c.trim().is_empty())
        .ok_or_else(|| LlmError::EmptyResponse {
            provider: PROVIDER.into(),
        })
}

fn first_embedding(resp: EmbeddingResponse) -> Result<Vec<f32>, LlmError> {
    resp.data
        .into_iter()
        .min_by_key(|d| d.index)
        .map(|d| d.embedding)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| LlmError::EmptyResponse {
            provider: PROVIDER.into(),
        })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
