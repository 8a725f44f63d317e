//! STT/TTS pass-through (spec §6.1, §6.5). The gateway never implements
//! speech synthesis or recognition itself — it forwards to whichever
//! provider is configured (`speech.tts.{gemini|azure}`, `speech.stt`) and
//! surfaces its result or failure unmodified (spec §1 Non-goals: "does not
//! implement its own STT/TTS").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
}

/// One speech backend (Gemini, Azure, ...), selected per request by the
/// `provider` query/body field (spec §6.1, §6.5).
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn list_voices(&self) -> Result<Vec<Voice>, GatewayError>;
    async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>, GatewayError>;
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, GatewayError>;
}

/// Dispatches to one of the configured providers by name, so the REST
/// layer doesn't need to know which concrete backends exist (spec §6.5
/// "provider selection").
pub struct SpeechService {
    providers: Vec<std::sync::Arc<dyn SpeechProvider>>,
}

impl SpeechService {
    pub fn new(providers: Vec<std::sync::Arc<dyn SpeechProvider>>) -> Self {
        Self { providers }
    }

    fn resolve(&self, provider: Option<&str>) -> Result<&std::sync::Arc<dyn SpeechProvider>, GatewayError> {
        match provider {
            Some(name) => self
                .providers
                .iter()
                .find(|p| p.name() == name)
                .ok_or_else(|| GatewayError::BadRequest(format!("unknown speech provider {name}"))),
            None => self
                .providers
                .first()
                .ok_or_else(|| GatewayError::UpstreamUnavailable("no speech provider configured".to_string())),
        }
    }

    pub async fn list_voices(&self, provider: Option<&str>) -> Result<Vec<Voice>, GatewayError> {
        self.resolve(provider)?.list_voices().await
    }

    pub async fn synthesize(
        &self,
        provider: Option<&str>,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<Vec<u8>, GatewayError> {
        self.resolve(provider)?.synthesize(text, voice_id).await
    }

    pub async fn transcribe(
        &self,
        provider: Option<&str>,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<String, GatewayError> {
        self.resolve(provider)?.transcribe(audio, mime_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider {
        name: String,
    }

    #[async_trait]
    impl SpeechProvider for FakeProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_voices(&self) -> Result<Vec<Voice>, GatewayError> {
            Ok(vec![Voice {
                id: "v1".to_string(),
                name: "Default".to_string(),
                language: "en-US".to_string(),
            }])
        }

        async fn synthesize(&self, text: &str, _voice_id: Option<&str>) -> Result<Vec<u8>, GatewayError> {
            Ok(text.as_bytes().to_vec())
        }

        async fn transcribe(&self, audio: &[u8], _mime_type: &str) -> Result<String, GatewayError> {
            Ok(String::from_utf8_lossy(audio).to_string())
        }
    }

    #[tokio::test]
    async fn resolves_named_provider() {
        let service = SpeechService::new(vec![
            std::sync::Arc::new(FakeProvider { name: "gemini".to_string() }),
            std::sync::Arc::new(FakeProvider { name: "azure".to_string() }),
        ]);
        let voices = service.list_voices(Some("azure")).await.unwrap();
        assert_eq!(voices[0].id, "v1");
    }

    #[tokio::test]
    async fn no_provider_configured_is_upstream_unavailable() {
        let service = SpeechService::new(vec![]);
        let err = service.list_voices(None).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable(_)));
    }
}
