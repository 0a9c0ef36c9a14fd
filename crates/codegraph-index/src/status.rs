//! Repository status transitions reported to whoever owns repository
//! metadata. The core only reports; it never stores status.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    Pending,
    Cloning,
    Indexing,
    Ready,
    Error,
}

impl RepositoryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cloning => "cloning",
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transition, with counts on `ready` and a message on `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub repository_id: String,
    pub status: RepositoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusUpdate {
    #[must_use]
    pub fn indexing(repository_id: &str) -> Self {
        Self::bare(repository_id, RepositoryStatus::Indexing)
    }

    #[must_use]
    pub fn ready(repository_id: &str, entity_count: usize, edge_count: usize) -> Self {
        Self {
            entity_count: Some(entity_count),
            edge_count: Some(edge_count),
            ..Self::bare(repository_id, RepositoryStatus::Ready)
        }
    }

    #[must_use]
    pub fn error(repository_id: &str, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::bare(repository_id, RepositoryStatus::Error)
        }
    }

    fn bare(repository_id: &str, status: RepositoryStatus) -> Self {
        Self {
            repository_id: repository_id.to_owned(),
            status,
            entity_count: None,
            edge_count: None,
            message: None,
        }
    }
}

pub trait StatusSink: Send + Sync {
    fn report(&self, update: StatusUpdate);
}

/// Default sink: logs every transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, update: StatusUpdate) {
        match update.status {
            RepositoryStatus::Error => tracing::warn!(
                repository = %update.repository_id,
                status = %update.status,
                message = update.message.as_deref().unwrap_or_default(),
                "repository status"
            ),
            _ => tracing::info!(
                repository = %update.repository_id,
                status = %update.status,
                entities = update.entity_count,
                edges = update.edge_count,
                "repository status"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Collects updates for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink(pub Mutex<Vec<StatusUpdate>>);

    impl StatusSink for RecordingSink {
        fn report(&self, update: StatusUpdate) {
            self.0.lock().unwrap().push(update);
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&RepositoryStatus::Indexing).unwrap();
        assert_eq!(json, "\"indexing\"");
        assert_eq!(RepositoryStatus::Cloning.to_string(), "cloning");
    }

    #[test]
    fn ready_carries_counts() {
        let update = StatusUpdate::ready("r", 3, 2);
        assert_eq!(update.status, RepositoryStatus::Ready);
        assert_eq!(update.entity_count, Some(3));
        assert!(update.message.is_none());
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("message").is_none());
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::default();
        sink.report(StatusUpdate::indexing("r"));
        sink.report(StatusUpdate::error("r", "boom"));
        TracingStatusSink.report(StatusUpdate::error("r", "boom"));
        let seen = sink.0.lock().unwrap();
        assert_eq!(seen[1].message.as_deref(), Some("boom"));
    }
}
