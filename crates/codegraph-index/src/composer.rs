//! Turns a reasoning trace into a cited, confidence-scored answer.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use codegraph_llm::provider::{Message, estimate_tokens};
use codegraph_llm::{LlmError, LlmProvider};

use crate::embedding::truncate_chars;
use crate::entity::EntityKind;
use crate::error::QueryError;
use crate::reasoning::{ReasoningConfig, ReasoningStep, StopReason, Trace};

/// Upper bound on the confidence of an answer that could not be grounded.
pub const LOW_CONFIDENCE: f32 = 0.1;

const UNGROUNDED_ANSWER: &str = "The question could not be grounded in the indexed code: \
no entity was similar enough to the question to use as evidence.";

const SYSTEM_PROMPT: &str = "You answer questions about a code repository using only the \
numbered evidence blocks provided. Cite evidence inline with its number in square brackets, \
e.g. [1]. If the evidence is insufficient, say so.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Verbatim source slice.
    pub content: String,
    pub node_type: EntityKind,
    pub node_name: String,
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub reasoning_steps: Vec<ReasoningStep>,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub hops_completed: usize,
}

/// Citations in first-visited order, one per entity.
#[must_use]
pub fn citations(trace: &Trace) -> Vec<Citation> {
    let mut seen = HashSet::new();
    trace
        .evidence
        .iter()
        .filter(|ev| seen.insert(ev.entity.id.as_str()))
        .map(|ev| Citation {
            file_path: ev.entity.file_path.clone(),
            start_line: ev.entity.start_line,
            end_line: ev.entity.end_line,
            content: ev.content.clone(),
            node_type: ev.entity.kind,
            node_name: ev.entity.qualified_name().to_owned(),
            node_id: ev.entity.id.clone(),
        })
        .collect()
}

/// `mean similarity × hop_penalty^(penalized hops) × coverage`, clamped to
/// `[0, 1]`. An interrupted loop counts as one more penalized hop.
#[must_use]
pub fn confidence(trace: &Trace, config: &ReasoningConfig) -> f32 {
    if trace.evidence.is_empty() || trace.stop_reason == StopReason::Ungrounded {
        return 0.0;
    }
    let mut seen = HashSet::new();
    let cited: Vec<f32> = trace
        .evidence
        .iter()
        .filter(|ev| seen.insert(ev.entity.id.as_str()))
        .map(|ev| ev.similarity.max(0.0))
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let mean = cited.iter().sum::<f32>() / cited.len() as f32;

    let penalized = trace.penalized_hops + usize::from(trace.stop_reason.is_interruption());
    let penalty = config
        .hop_penalty
        .powi(i32::try_from(penalized).unwrap_or(i32::MAX));

    let kinds: HashSet<EntityKind> = trace.evidence.iter().map(|ev| ev.entity.kind).collect();
    #[allow(clippy::cast_precision_loss)]
    let coverage = 0.6 + 0.4 * kinds.len() as f32 / EntityKind::ALL.len() as f32;

    (mean * penalty * coverage).clamp(0.0, 1.0)
}

/// Completion prompt: numbered evidence blocks followed by the question.
#[must_use]
pub fn build_prompt(question: &str, citations: &[Citation], max_evidence_chars: usize) -> Vec<Message> {
    let mut evidence = String::new();
    for (i, c) in citations.iter().enumerate() {
        let _ = writeln!(
            evidence,
            "[{}] {} {} ({}:{}-{})",
            i + 1,
            c.node_type,
            c.node_name,
            c.file_path,
            c.start_line,
            c.end_line
        );
        let _ = writeln!(evidence, "```\n{}\n```", truncate_chars(&c.content, max_evidence_chars));
    }
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(format!("Evidence:\n{evidence}\nQuestion: {question}")),
    ]
}

/// `Sources:` footer listing every citation.
#[must_use]
pub fn sources_footer(citations: &[Citation]) -> String {
    let mut footer = String::from("Sources:");
    for (i, c) in citations.iter().enumerate() {
        let _ = write!(
            footer,
            "\n[{}] {} ({}:{}-{})",
            i + 1,
            c.node_name,
            c.file_path,
            c.start_line,
            c.end_line
        );
    }
    footer
}

fn has_citation_marker(answer: &str, count: usize) -> bool {
    (1..=count).any(|n| answer.contains(&format!("[{n}]")))
}

enum Completion {
    Text(String),
    /// The provider only embeds; the answer is the cited evidence.
    EvidenceOnly(String),
    Cancelled,
}

/// Compose the final response from `trace`. Ungrounded and cancelled traces
/// never reach the completion provider.
///
/// # Errors
///
/// Returns [`QueryError::Provider`] with the trace preserved when the
/// completion fails or exceeds `completion_timeout`. A provider without
/// text completion yields an evidence-only answer instead.
pub async fn compose<P: LlmProvider>(
    provider: &P,
    question: &str,
    mut trace: Trace,
    config: &ReasoningConfig,
    completion_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<QueryResponse, QueryError> {
    let citations = citations(&trace);

    if citations.is_empty() {
        let answer = if trace.stop_reason == StopReason::Ungrounded {
            UNGROUNDED_ANSWER.to_owned()
        } else {
            format!(
                "No evidence was gathered before the query stopped ({}).",
                trace.stop_reason
            )
        };
        return Ok(QueryResponse {
            answer,
            citations: Vec::new(),
            reasoning_steps: trace.steps,
            confidence: 0.0,
            tokens_used: Some(0),
            processing_time_ms: None,
            stop_reason: Some(trace.stop_reason),
            hops_completed: trace.hops_completed,
        });
    }

    let messages = build_prompt(question, &citations, config.max_evidence_chars);
    let prompt_tokens: usize = messages.iter().map(|m| estimate_tokens(&m.content)).sum();

    let completion = if trace.stop_reason == StopReason::Cancelled {
        Completion::Cancelled
    } else {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                trace.stop_reason = StopReason::Cancelled;
                Completion::Cancelled
            }
            result = tokio::time::timeout(completion_timeout, provider.chat(&messages)) => {
                match result.unwrap_or(Err(LlmError::Timeout(completion_timeout))) {
                    Ok(text) => Completion::Text(text),
                    Err(LlmError::ChatUnsupported { provider: name }) => {
                        tracing::debug!(provider = %name, "no text completion, answering with evidence only");
                        Completion::EvidenceOnly(name)
                    }
                    Err(source) => {
                        tracing::warn!(provider = provider.name(), "completion failed: {source}");
                        return Err(QueryError::Provider {
                            source,
                            partial: Box::new(trace.to_partial()),
                        });
                    }
                }
            }
        }
    };

    let confidence = confidence(&trace, config);
    let (answer, tokens_used) = match completion {
        Completion::Text(text) => {
            let answer_tokens = estimate_tokens(&text);
            let mut text = text.trim().to_owned();
            if !has_citation_marker(&text, citations.len()) {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&sources_footer(&citations));
            }
            (text, Some(prompt_tokens + answer_tokens))
        }
        Completion::EvidenceOnly(provider) => (
            format!(
                "Provider {provider} does not generate text; the most relevant code found is listed below.\n\n{}",
                sources_footer(&citations)
            ),
            Some(0),
        ),
        Completion::Cancelled => (
            format!(
                "The query was cancelled after {} hop(s); the evidence gathered so far is listed below.\n\n{}",
                trace.hops_completed,
                sources_footer(&citations)
            ),
            Some(0),
        ),
    };

    Ok(QueryResponse {
        answer,
        citations,
        reasoning_steps: trace.steps,
        confidence,
        tokens_used,
        processing_time_ms: None,
        stop_reason: Some(trace.stop_reason),
        hops_completed: trace.hops_completed,
    })
}
