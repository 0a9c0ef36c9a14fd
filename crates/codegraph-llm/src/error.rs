#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("provider unavailable")]
    Unavailable,

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("text completion not supported by {provider}")]
    ChatUnsupported { provider: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
