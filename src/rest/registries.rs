//! `/agentCards`, `/agents/{name}/model`, `/gatewayCards`,
//! `/gateways/*/health` — read-only views over the live registries (spec
//! §4.4, §6.1, §6.3).

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config_resolver::ToolMetadata;
use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::rest::auth::CurrentUser;
use crate::rest::error::RestError;

pub fn router() -> Router<GatewayContext> {
    Router::new()
        .route("/agentCards", get(agent_cards))
        .route("/agents/{name}/model", get(agent_model))
        .route("/gatewayCards", get(gateway_cards))
        .route("/gateways/health", get(fleet_health))
        .route("/gateways/{id}/health", get(gateway_health))
}

/// Every card's tools are individually filtered against the caller's
/// resolved config, and a card with no remaining tools after filtering is
/// dropped entirely (spec §6.1 "filtered by user scope and per-tool
/// required scopes").
async fn agent_cards(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
) -> Result<Json<Vec<crate::model::AgentCard>>, RestError> {
    let user_config = ctx
        .config_resolver
        .resolve_user_config(&user.id, &Value::Null)
        .await?;
    let mut visible = Vec::new();
    for name in ctx.agent_registry.agent_names() {
        let Some(card) = ctx.agent_registry.get_agent(&name) else {
            continue;
        };
        let mut allowed_tools = Vec::new();
        for tool in card.tools() {
            let metadata = ToolMetadata {
                required_scopes: tool.required_scopes.clone(),
            };
            if ctx.config_resolver.is_feature_enabled(&user_config, &metadata).await {
                allowed_tools.push(tool.clone());
            }
        }
        if card.tools().is_empty() || !allowed_tools.is_empty() {
            visible.push(card);
        }
    }
    Ok(Json(visible))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentModelResponse {
    agent_name: String,
    model: Option<Value>,
}

async fn agent_model(
    State(ctx): State<GatewayContext>,
    Path(name): Path<String>,
) -> Result<Json<AgentModelResponse>, RestError> {
    let card = ctx
        .agent_registry
        .get_agent(&name)
        .ok_or_else(|| GatewayError::NotFound(format!("agent {name}")))?;
    Ok(Json(AgentModelResponse {
        agent_name: name,
        model: card.metadata.get("model").cloned(),
    }))
}

async fn gateway_cards(State(ctx): State<GatewayContext>) -> Json<Vec<crate::model::GatewayCard>> {
    Json(ctx.gateway_registry.all_gateways())
}

#[derive(Debug, Deserialize)]
struct TtlQuery {
    ttl: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FleetHealthEntry {
    name: String,
    healthy: bool,
    seconds_since_last_seen: i64,
}

async fn fleet_health(
    State(ctx): State<GatewayContext>,
    Query(query): Query<TtlQuery>,
) -> Json<Vec<FleetHealthEntry>> {
    Json(
        ctx.gateway_registry
            .fleet_health(query.ttl)
            .into_iter()
            .map(|(name, expired, seconds_since_last_seen)| FleetHealthEntry {
                name,
                healthy: !expired,
                seconds_since_last_seen,
            })
            .collect(),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayHealthResponse {
    healthy: bool,
    seconds_since_last_seen: i64,
}

async fn gateway_health(
    State(ctx): State<GatewayContext>,
    Path(id): Path<String>,
    Query(query): Query<TtlQuery>,
) -> Json<GatewayHealthResponse> {
    let (expired, seconds_since_last_seen) = ctx.gateway_registry.health(&id, query.ttl);
    Json(GatewayHealthResponse {
        healthy: !expired,
        seconds_since_last_seen,
    })
}
