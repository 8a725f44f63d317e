//! Compress-and-branch: summarize a source session's history into a new,
//! seeded session (spec §4.5, §4.9).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeZone;
use serde_json::Value;

use crate::error::GatewayError;
use crate::model::{ChatTask, CompressionMetadata, EpochMillis, Session};
use crate::session::service::SessionService;

/// An external LLM summarizer (spec §1 Non-goals: "does not define the
/// exact LLM prompt"). A production binding adapts a real LLM client; the
/// `CompressionService` degrades to a deterministic structured summary
/// whenever this is absent or fails (spec §4.5, §4.9, §7).
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        messages: &[Value],
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<String, GatewayError>;
}

pub struct CompressionOutcome {
    pub new_session: Session,
    pub summary_task: ChatTask,
    pub compressed_message_count: usize,
}

pub struct CompressionService {
    sessions: Arc<SessionService>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl CompressionService {
    pub fn new(sessions: Arc<SessionService>, summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        Self { sessions, summarizer }
    }

    /// Implements spec §4.5 "Compress-and-branch" end to end: loads and
    /// flattens the source session's tasks, asks the summarizer (falling
    /// back to a deterministic summary on any failure), creates the
    /// branch session, and inserts the synthetic summary task. The source
    /// session is never modified.
    pub async fn compress_and_branch(
        &self,
        source_session_id: &str,
        user_id: &str,
        agent_id: Option<String>,
        branch_name: Option<String>,
        llm_provider: Option<&str>,
        llm_model: Option<&str>,
    ) -> Result<CompressionOutcome, GatewayError> {
        let source = self.sessions.get_owned_session(source_session_id, user_id).await?;
        let messages = self
            .sessions
            .get_session_messages_from_tasks(source_session_id, user_id)
            .await?;
        let compressed_message_count = messages.len();

        let summary_text = match &self.summarizer {
            Some(summarizer) => match summarizer.summarize(&messages, llm_provider, llm_model).await {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("LLM summarization failed, falling back to structured summary: {err}");
                    structured_fallback_summary(&source, &messages)
                }
            },
            None => structured_fallback_summary(&source, &messages),
        };

        let estimated_source_tokens = estimate_tokens(&messages);
        let estimated_summary_tokens = summary_text.len() / 4;
        let referenced_artifacts = extract_artifact_ids(&messages);

        let new_session = self
            .sessions
            .create_session(
                user_id,
                branch_name.or_else(|| Some(format!("{} (continued)", source.name.clone().unwrap_or_default()))),
                agent_id.or_else(|| source.agent_id.clone()),
                source.gateway_type.clone(),
                None,
            )
            .await?;

        // `create_session` doesn't know about compression metadata; stamp
        // it via a direct repository round-trip isn't exposed, so the
        // branch flag and metadata are folded in up front instead.
        let new_session = self
            .sessions
            .mark_as_compression_branch(
                &new_session.id,
                CompressionMetadata {
                    parent_session_id: source_session_id.to_string(),
                    compressed_message_count,
                    estimated_source_tokens,
                    estimated_summary_tokens,
                    referenced_artifacts,
                },
            )
            .await?;

        let summary_task = self
            .sessions
            .save_task(
                &uuid::Uuid::new_v4().to_string(),
                &new_session.id,
                user_id,
                None,
                serde_json::to_string(&serde_json::json!([{
                    "id": uuid::Uuid::new_v4().to_string(),
                    "type": "system",
                    "text": summary_text,
                }]))
                .unwrap(),
                None,
            )
            .await?;

        Ok(CompressionOutcome {
            new_session,
            summary_task,
            compressed_message_count,
        })
    }
}

/// `len/4` heuristic token estimate (spec §4.9).
fn estimate_tokens(messages: &[Value]) -> usize {
    messages
        .iter()
        .map(|m| m.get("text").and_then(|t| t.as_str()).unwrap_or("").len() / 4)
        .sum()
}

fn extract_artifact_ids(messages: &[Value]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| m.get("artifactId").and_then(|a| a.as_str()))
        .map(|s| s.to_string())
        .collect()
}

/// Deterministic summary used when no summarizer is configured, or when
/// the LLM call fails (spec §4.5, §7 "Summarization failures degrade to
/// structured fallback"). Begins with the marker the REST clients and
/// tests key off of.
fn structured_fallback_summary(source: &Session, messages: &[Value]) -> String {
    let date = chrono::Utc
        .timestamp_millis_opt(source.created_time.0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let session_name = source.name.clone().unwrap_or_else(|| "Untitled session".to_string());

    let topics = extract_topic_keywords(messages);
    let first_excerpt = messages
        .first()
        .and_then(|m| m.get("text").and_then(|t| t.as_str()))
        .map(|t| truncate(t, 200))
        .unwrap_or_default();
    let last_excerpt = messages
        .last()
        .and_then(|m| m.get("text").and_then(|t| t.as_str()))
        .map(|t| truncate(t, 200))
        .unwrap_or_default();

    format!(
        "📋 **Conversation Summary**\n\n\
         Branched from **{session_name}** on {date}.\n\n\
         **Messages compressed:** {count}\n\
         **Topics:** {topics}\n\n\
         **Opened with:** {first_excerpt}\n\n\
         **Most recently:** {last_excerpt}",
        count = messages.len(),
        topics = if topics.is_empty() { "general discussion".to_string() } else { topics.join(", ") },
    )
}

/// Crude keyword extraction: the most frequent words of length > 4 across
/// all message text, used only by the deterministic fallback (spec §4.9).
fn extract_topic_keywords(messages: &[Value]) -> Vec<String> {
    use std::collections::HashMap;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for m in messages {
        if let Some(text) = m.get("text").and_then(|t| t.as_str()) {
            for word in text.split_whitespace() {
                let clean: String = word
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect::<String>()
                    .to_lowercase();
                if clean.len() > 4 {
                    *counts.entry(clean).or_insert(0) += 1;
                }
            }
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(5).map(|(w, _)| w).collect()
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::{
        InMemoryChatTaskRepository, InMemoryProjectRepository, InMemorySessionRepository,
    };

    fn make_service() -> Arc<SessionService> {
        Arc::new(SessionService::new(
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(InMemoryChatTaskRepository::new()),
            Arc::new(InMemoryProjectRepository::new()),
        ))
    }

    #[tokio::test]
    async fn compression_without_summarizer_falls_back_and_branches() {
        let sessions = make_service();
        let source = sessions
            .create_session("u1", Some("Design Review".to_string()), None, None, None)
            .await
            .unwrap();
        for i in 0..10 {
            sessions
                .save_task(
                    &format!("t{i}"),
                    &source.id,
                    "u1",
                    None,
                    serde_json::to_string(&serde_json::json!([{"id": format!("b{i}"), "text": "hello world"}]))
                        .unwrap(),
                    None,
                )
                .await
                .unwrap();
        }
        let compression = CompressionService::new(sessions.clone(), None);
        let outcome = compression
            .compress_and_branch(&source.id, "u1", None, Some("cont".to_string()), None, None)
            .await
            .unwrap();
        assert_eq!(outcome.compressed_message_count, 10);
        assert!(outcome.new_session.is_compression_branch);
        assert_eq!(
            outcome.new_session.compression_metadata.unwrap().parent_session_id,
            source.id
        );
        let bubbles: Vec<Value> =
            serde_json::from_str(&outcome.summary_task.message_bubbles).unwrap();
        let text = bubbles[0]["text"].as_str().unwrap();
        assert!(text.starts_with("📋 **Conversation Summary**"));
        assert!(text.contains("Design Review"));
    }
}
