//! A concrete `ChatLlm`/`Summarizer` binding against the OpenAI Chat
//! Completions REST API, grounded on the teacher's own
//! `cloudllm::clients::openai::OpenAIClient` (same `OPEN_AI_SECRET` env
//! var, same "construct once with a key and a model name" shape) but
//! speaking HTTP directly through `reqwest` — the same crate and client
//! style `scheduler::notification::WebhookNotificationSink` already uses
//! — rather than pulling in the teacher's `openai_rust2` dependency, which
//! nothing else in this gateway needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assistant::ChatLlm;
use crate::error::GatewayError;
use crate::session::compression::Summarizer;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Chat Completions client, constructed once at startup the way the
/// teacher's `OpenAIClient::new_with_model_enum` is constructed once per
/// process. Backs both the builder assistants (`ChatLlm`) and
/// compress-and-branch summarization (`Summarizer`) — the gateway only
/// ever needs "send a system prompt plus a conversation, get text back".
pub struct OpenAiChatLlm {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiChatLlm {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    /// Reads `OPEN_AI_SECRET` the same way the teacher's doc examples do,
    /// and `OPEN_AI_MODEL` (falling back to a small, cheap default) for the
    /// model name. Returns `None` if no key is configured, letting callers
    /// degrade to a fallback `ChatLlm`/no summarizer rather than failing
    /// startup outright.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPEN_AI_SECRET").ok()?;
        let model = std::env::var("OPEN_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(api_key, model))
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, GatewayError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("openai request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::UpstreamUnavailable(format!(
                "openai chat completion returned {status}: {body}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(format!("invalid openai response body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::UpstreamUnavailable("openai response had no choices".to_string()))
    }
}

#[async_trait]
impl ChatLlm for OpenAiChatLlm {
    async fn chat(&self, system_prompt: &str, conversation: &[Value]) -> Result<String, GatewayError> {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        }];
        messages.extend(conversation.iter().filter_map(value_to_message));
        self.complete(messages).await
    }
}

#[async_trait]
impl Summarizer for OpenAiChatLlm {
    async fn summarize(
        &self,
        messages: &[Value],
        _provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<String, GatewayError> {
        let mut chat_messages = vec![ChatMessage {
            role: "system".to_string(),
            content: "Summarize the following conversation concisely, preserving key decisions and open questions."
                .to_string(),
        }];
        chat_messages.extend(messages.iter().filter_map(value_to_message));

        if let Some(model) = model {
            let request = ChatCompletionRequest {
                model,
                messages: chat_messages,
            };
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| GatewayError::UpstreamUnavailable(format!("openai request failed: {e}")))?;
            return parse_completion(response).await;
        }
        self.complete(chat_messages).await
    }
}

async fn parse_completion(response: reqwest::Response) -> Result<String, GatewayError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::UpstreamUnavailable(format!(
            "openai chat completion returned {status}: {body}"
        )));
    }
    let parsed: ChatCompletionResponse = response
        .json()
        .await
        .map_err(|e| GatewayError::UpstreamUnavailable(format!("invalid openai response body: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| GatewayError::UpstreamUnavailable("openai response had no choices".to_string()))
}

/// Conversation turns cross this module's boundary as raw JSON (spec
/// §4.9's opaque-payload convention); each is expected to carry `role`
/// and `content` string fields, the same shape the builder assistants
/// already pass around.
fn value_to_message(value: &Value) -> Option<ChatMessage> {
    Some(ChatMessage {
        role: value.get("role")?.as_str()?.to_string(),
        content: value.get("content")?.as_str()?.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatMessage,
}
