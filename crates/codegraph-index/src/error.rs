//! Error types for codegraph-index.

use crate::composer::{Citation, QueryResponse};
use crate::reasoning::{ReasoningStep, StopReason};

/// A single file that could not be turned into entities. Recovered: the file
/// is skipped and the error is reported alongside the indexing result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, thiserror::Error)]
#[error("failed to parse {path}: {message}")]
pub struct ParseError {
    pub path: String,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Repository-level failures that abort an indexing run.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The file tree handed to the indexer was empty.
    #[error("file tree is empty")]
    EmptyTree,

    /// No file in the tree had a supported language.
    #[error("no indexable source files ({skipped} skipped, {failed} failed to parse)")]
    NoIndexableFiles { skipped: usize, failed: usize },

    #[error("indexing cancelled")]
    Cancelled,

    /// Embedding provider failure.
    #[error("embedding failed: {0}")]
    Embedding(#[from] codegraph_llm::LlmError),

    #[error("embedding dimension mismatch for {entity_id}: expected {expected}, got {found}")]
    DimensionMismatch {
        entity_id: String,
        expected: usize,
        found: usize,
    },

    /// Snapshot file IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Whatever reasoning produced before a query failed.
#[derive(Debug, Clone, Default)]
pub struct PartialTrace {
    pub steps: Vec<ReasoningStep>,
    pub citations: Vec<Citation>,
    pub hops_completed: usize,
    pub stop_reason: Option<StopReason>,
}

/// Query-time failures. None of them touch the stored snapshot.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// Retryable: the repository was never indexed, or has no embedding index.
    #[error("repository {repository_id} is not ready: {reason}")]
    RepositoryNotReady {
        repository_id: String,
        reason: String,
    },

    /// Completion or question embedding failed; the trace gathered so far is kept.
    #[error("provider error: {source}")]
    Provider {
        #[source]
        source: codegraph_llm::LlmError,
        partial: Box<PartialTrace>,
    },
}

impl QueryError {
    pub(crate) fn node_not_found(id: &str) -> Self {
        Self::NotFound {
            what: "node",
            id: id.to_owned(),
        }
    }

    pub(crate) fn repository_not_found(id: &str) -> Self {
        Self::NotFound {
            what: "repository",
            id: id.to_owned(),
        }
    }

    /// Whether the caller may retry the same query later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RepositoryNotReady { .. } | Self::Provider { .. })
    }

    /// Turn the failure into a user-visible response that keeps any reasoning
    /// steps and citations gathered before the failure.
    #[must_use]
    pub fn into_response(self) -> QueryResponse {
        let answer = format!("The query could not be completed: {self}");
        match self {
            Self::Provider { partial, .. } => {
                let PartialTrace {
                    steps,
                    citations,
                    hops_completed,
                    stop_reason,
                } = *partial;
                QueryResponse {
                    answer,
                    citations,
                    reasoning_steps: steps,
                    confidence: 0.0,
                    tokens_used: None,
                    processing_time_ms: None,
                    stop_reason,
                    hops_completed,
                }
            }
            Self::NotFound { .. } | Self::RepositoryNotReady { .. } => QueryResponse {
                answer,
                citations: Vec::new(),
                reasoning_steps: Vec::new(),
                confidence: 0.0,
                tokens_used: None,
                processing_time_ms: None,
                stop_reason: None,
                hops_completed: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::ReasoningStep;

    #[test]
    fn parse_error_display_names_file() {
        let err = ParseError::new("src/app.py", "syntax error at line 3");
        assert_eq!(
            err.to_string(),
            "failed to parse src/app.py: syntax error at line 3"
        );
    }

    #[test]
    fn provider_error_keeps_partial_trace() {
        let err = QueryError::Provider {
            source: codegraph_llm::LlmError::Unavailable,
            partial: Box::new(PartialTrace {
                steps: vec![ReasoningStep {
                    step_number: 1,
                    action: "seeded from similarity search".into(),
                    node_visited: Some("abc".into()),
                    observation: None,
                }],
                citations: Vec::new(),
                hops_completed: 0,
                stop_reason: Some(StopReason::BudgetExhausted),
            }),
        };
        assert!(err.is_retryable());
        let response = err.into_response();
        assert_eq!(response.reasoning_steps.len(), 1);
        assert!(response.answer.contains("provider unavailable"));
        assert!(response.confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn not_found_is_not_retryable() {
        let err = QueryError::node_not_found("deadbeef");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "node not found: deadbeef");
        let response = err.into_response();
        assert!(response.reasoning_steps.is_empty());
    }
}
