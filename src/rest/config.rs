//! `GET /config` — feature flags, reflecting actual resolved persistence
//! capability rather than intent (spec §9 "Optional persistence mode").

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::context::GatewayContext;

pub fn router() -> Router<GatewayContext> {
    Router::new().route("/config", get(get_config))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    persistence: bool,
    feedback: bool,
    prompt_library: bool,
    prompt_ai_assisted: bool,
    prompt_version_history: bool,
}

async fn get_config(State(ctx): State<GatewayContext>) -> Json<ConfigResponse> {
    let persistence = ctx.config.persistence_enabled;
    Json(ConfigResponse {
        persistence,
        feedback: ctx.config.features.feedback_enabled,
        // Prompt-library features need durable storage; degrade honestly
        // when persistence isn't configured rather than claiming them.
        prompt_library: persistence && ctx.config.features.prompt_library_enabled,
        prompt_ai_assisted: persistence && ctx.config.features.prompt_ai_assisted_enabled,
        prompt_version_history: persistence && ctx.config.features.prompt_version_history_enabled,
    })
}
