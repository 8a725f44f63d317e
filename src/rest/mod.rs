//! The REST/SSE surface (spec §6.1), mounted under `/api/v1`. Each
//! sub-router owns one resource family; `router()` merges them the way the
//! teacher's binaries compose their route tables, one `.merge()` per
//! feature area rather than a single monolithic handler file.

pub mod auth;
pub mod avatar;
pub mod config;
pub mod document_conversion;
pub mod dto;
pub mod error;
pub mod feedback;
pub mod health;
pub mod registries;
pub mod scheduled_tasks;
pub mod sessions;
pub mod speech;
pub mod sse;
pub mod tasks;

use axum::Router;

use crate::context::GatewayContext;

pub fn router() -> Router<GatewayContext> {
    let api = Router::new()
        .merge(tasks::router())
        .merge(sse::router())
        .merge(sessions::router())
        .merge(registries::router())
        .merge(scheduled_tasks::router())
        .merge(feedback::router())
        .merge(document_conversion::router())
        .merge(speech::router())
        .merge(config::router())
        .merge(avatar::router());
    Router::new().nest("/api/v1", api).merge(health::router())
}
