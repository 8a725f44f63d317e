//! Maps a `GatewayError` onto the two response shapes spec §7 requires:
//! `{detail}` REST errors for resource endpoints, and a JSON-RPC envelope
//! for `/tasks/*` and `/sse/*` so A2A clients can consume it directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::bus::jsonrpc::RpcResponse;
use crate::error::GatewayError;

/// Wraps a `GatewayError` for handlers mounted under REST resource paths
/// (sessions, registries, feedback, scheduled tasks, config...). `?` on a
/// `Result<_, GatewayError>` converts automatically.
pub struct RestError(pub GatewayError);

impl From<GatewayError> for RestError {
    fn from(err: GatewayError) -> Self {
        RestError(err)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        if matches!(self.0, GatewayError::Forbidden { .. }) {
            log::warn!("request forbidden: {}", self.0);
        }
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({"detail": self.0.to_string()});
        if let GatewayError::Forbidden { required_scopes, .. } = &self.0 {
            body["requiredScopes"] = json!(required_scopes);
        }
        (status, Json(body)).into_response()
    }
}

/// Wraps a `GatewayError` for handlers mounted under `/tasks/*` and
/// `/sse/*`: the body is a JSON-RPC 2.0 error envelope, but the HTTP status
/// still reflects the error kind so proxies and load balancers behave
/// sensibly (spec §7).
pub struct RpcError {
    pub request_id: String,
    pub error: GatewayError,
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = RpcResponse::err(self.request_id, &self.error);
        (status, Json(envelope)).into_response()
    }
}
