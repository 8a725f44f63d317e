//! `GET /health` — plain liveness probe (spec §6.1). Deliberately does not
//! touch the database or bus: a dependency outage shouldn't make the
//! gateway itself look dead to its orchestrator.

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::context::GatewayContext;

pub fn router() -> Router<GatewayContext> {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
