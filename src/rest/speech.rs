//! `/speech/*` — thin STT/TTS pass-through (spec §6.1, §6.5). The gateway
//! never synthesizes or transcribes itself; every handler here is a
//! provider dispatch plus base64 framing.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::rest::error::RestError;

pub fn router() -> Router<GatewayContext> {
    Router::new()
        .route("/speech/voices", get(voices))
        .route("/speech/tts", post(tts))
        .route("/speech/stt", post(stt))
}

#[derive(Debug, Deserialize)]
struct ProviderQuery {
    provider: Option<String>,
}

async fn voices(
    State(ctx): State<GatewayContext>,
    Query(query): Query<ProviderQuery>,
) -> Result<Json<Vec<crate::speech::Voice>>, RestError> {
    Ok(Json(ctx.speech.list_voices(query.provider.as_deref()).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TtsRequest {
    provider: Option<String>,
    text: String,
    voice_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TtsResponse {
    audio_base64: String,
}

async fn tts(
    State(ctx): State<GatewayContext>,
    Json(body): Json<TtsRequest>,
) -> Result<Json<TtsResponse>, RestError> {
    let audio = ctx
        .speech
        .synthesize(body.provider.as_deref(), &body.text, body.voice_id.as_deref())
        .await?;
    Ok(Json(TtsResponse {
        audio_base64: general_purpose::STANDARD.encode(&audio),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SttRequest {
    provider: Option<String>,
    audio_base64: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SttResponse {
    text: String,
}

async fn stt(
    State(ctx): State<GatewayContext>,
    Json(body): Json<SttRequest>,
) -> Result<Json<SttResponse>, RestError> {
    let audio = general_purpose::STANDARD
        .decode(&body.audio_base64)
        .map_err(|e| GatewayError::BadRequest(format!("invalid base64 audio: {e}")))?;
    let text = ctx
        .speech
        .transcribe(body.provider.as_deref(), &audio, &body.mime_type)
        .await?;
    Ok(Json(SttResponse { text }))
}
