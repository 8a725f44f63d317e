//! JSON-constrained chat-LLM assistants backing the prompt/scheduled-task
//! builder UIs (spec §4.9), supplemented from `original_source`'s
//! `prompt_builder_assistant.py` and `task_builder_assistant.py`. Both
//! assistants share the same rigid-system-prompt, parse-retry-then-fallback
//! shape, parameterized only by which `updates` field the reply carries.

pub mod openai_client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// The chat LLM backing an assistant (spec §1 Non-goals: no concrete
/// provider binding). Mirrors `session::compression::Summarizer`'s shape.
#[async_trait]
pub trait ChatLlm: Send + Sync {
    async fn chat(&self, system_prompt: &str, conversation: &[Value]) -> Result<String, GatewayError>;
}

/// A `ChatLlm` with nothing behind it, used when no provider is
/// configured. `BuilderAssistant::turn` already treats any `Err` here as
/// "degrade to the fixed fallback reply", so this is enough to keep the
/// builder endpoints answering (with a canned reply) rather than the
/// gateway failing to start for lack of an API key.
pub struct NoopChatLlm;

#[async_trait]
impl ChatLlm for NoopChatLlm {
    async fn chat(&self, _system_prompt: &str, _conversation: &[Value]) -> Result<String, GatewayError> {
        Err(GatewayError::UpstreamUnavailable("no chat LLM provider configured".to_string()))
    }
}

/// The builder's JSON-constrained reply (spec §4.9): `message` plus an
/// `updates` payload whose field name depends on the assistant kind,
/// `confidence` in `[0,1]`, and whether the draft is ready to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub message: String,
    pub updates: Value,
    pub confidence: f64,
    pub ready_to_save: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantKind {
    PromptBuilder,
    TaskBuilder,
}

impl AssistantKind {
    fn updates_field(self) -> &'static str {
        match self {
            AssistantKind::PromptBuilder => "promptUpdates",
            AssistantKind::TaskBuilder => "taskUpdates",
        }
    }

    fn system_prompt(self) -> String {
        let updates_field = self.updates_field();
        let subject = match self {
            AssistantKind::PromptBuilder => "a reusable command-shortcut prompt",
            AssistantKind::TaskBuilder => "a scheduled task definition",
        };
        format!(
            "You are helping a user iteratively refine {subject} through conversation. \
             Respond with a single JSON object and nothing else, matching exactly this shape: \
             {{\"message\": string, \"{updates_field}\": object, \"confidence\": number between 0 and 1, \"readyToSave\": boolean}}. \
             \"message\" is what you say back to the user. \"{updates_field}\" is the full current draft, \
             not a diff. Set \"readyToSave\" true only once the draft is complete enough to persist."
        )
    }
}

/// A single JSON-constrained chat turn shared by both assistant kinds
/// (spec §4.9: "a rigid system prompt... parse errors trigger a
/// JSON-object-extraction retry; total failure returns a fixed fallback
/// object").
pub struct BuilderAssistant {
    kind: AssistantKind,
    llm: std::sync::Arc<dyn ChatLlm>,
}

impl BuilderAssistant {
    pub fn new(kind: AssistantKind, llm: std::sync::Arc<dyn ChatLlm>) -> Self {
        Self { kind, llm }
    }

    pub async fn turn(&self, conversation: &[Value]) -> AssistantReply {
        let system_prompt = self.kind.system_prompt();
        let raw = match self.llm.chat(&system_prompt, conversation).await {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("builder assistant chat call failed: {err}");
                return self.fallback_reply();
            }
        };

        if let Some(reply) = self.parse_reply(&raw) {
            return reply;
        }
        log::warn!("builder assistant reply failed strict JSON parse, retrying via object extraction");
        match extract_json_object(&raw).and_then(|extracted| self.parse_reply(&extracted)) {
            Some(reply) => reply,
            None => {
                log::warn!("builder assistant reply unparseable after retry, returning fallback");
                self.fallback_reply()
            }
        }
    }

    fn parse_reply(&self, raw: &str) -> Option<AssistantReply> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let object = value.as_object()?;
        let message = object.get("message")?.as_str()?.to_string();
        let updates = object.get(self.kind.updates_field())?.clone();
        let confidence = object.get("confidence")?.as_f64()?.clamp(0.0, 1.0);
        let ready_to_save = object.get("readyToSave")?.as_bool()?;
        Some(AssistantReply {
            message,
            updates,
            confidence,
            ready_to_save,
        })
    }

    fn fallback_reply(&self) -> AssistantReply {
        AssistantReply {
            message: "I couldn't process that just now. Could you try rephrasing?".to_string(),
            updates: Value::Object(Default::default()),
            confidence: 0.0,
            ready_to_save: false,
        }
    }
}

/// Pulls the first balanced `{...}` substring out of a reply that wrapped
/// its JSON in prose or a markdown code fence.
fn extract_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in raw[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FixedLlm {
        reply: String,
    }

    #[async_trait]
    impl ChatLlm for FixedLlm {
        async fn chat(&self, _system_prompt: &str, _conversation: &[Value]) -> Result<String, GatewayError> {
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn well_formed_reply_parses_directly() {
        let llm = Arc::new(FixedLlm {
            reply: serde_json::json!({
                "message": "Here's your prompt draft.",
                "promptUpdates": {"template": "Summarize {{input}}"},
                "confidence": 0.8,
                "readyToSave": false
            })
            .to_string(),
        });
        let assistant = BuilderAssistant::new(AssistantKind::PromptBuilder, llm);
        let reply = assistant.turn(&[]).await;
        assert_eq!(reply.message, "Here's your prompt draft.");
        assert!(!reply.ready_to_save);
        assert_eq!(reply.confidence, 0.8);
    }

    #[tokio::test]
    async fn prose_wrapped_reply_recovers_via_extraction() {
        let llm = Arc::new(FixedLlm {
            reply: format!(
                "Sure thing, here's the draft:\n{}\nLet me know if you want changes.",
                serde_json::json!({
                    "message": "Scheduled task drafted.",
                    "taskUpdates": {"cron": "0 9 * * *"},
                    "confidence": 0.6,
                    "readyToSave": true
                })
            ),
        });
        let assistant = BuilderAssistant::new(AssistantKind::TaskBuilder, llm);
        let reply = assistant.turn(&[]).await;
        assert!(reply.ready_to_save);
        assert_eq!(reply.updates["cron"], "0 9 * * *");
    }

    #[tokio::test]
    async fn total_garbage_returns_fallback() {
        let llm = Arc::new(FixedLlm {
            reply: "not json at all".to_string(),
        });
        let assistant = BuilderAssistant::new(AssistantKind::PromptBuilder, llm);
        let reply = assistant.turn(&[]).await;
        assert_eq!(reply.confidence, 0.0);
        assert!(!reply.ready_to_save);
    }
}
