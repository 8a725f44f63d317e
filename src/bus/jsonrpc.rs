//! JSON-RPC 2.0 envelope types used both for outbound A2A requests and for
//! translating a `GatewayError` into the shape A2A clients expect on
//! `/tasks/*` and `/sse/*` (spec §6.2, §7).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// The discriminator on a JSON-RPC `result` distinguishing a terminal
/// `Task`, a `status-update`, or an `artifact-update` (spec §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultKind {
    Task,
    StatusUpdate,
    ArtifactUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&GatewayError> for RpcError {
    fn from(err: &GatewayError) -> Self {
        RpcError {
            code: err.rpc_code(),
            message: err.to_string(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: &GatewayError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// The `kind` discriminator on a successful result, if present.
    pub fn result_kind(&self) -> Option<ResultKind> {
        self.result
            .as_ref()
            .and_then(|r| r.get("kind"))
            .and_then(|k| k.as_str())
            .and_then(|k| match k {
                "task" => Some(ResultKind::Task),
                "status-update" => Some(ResultKind::StatusUpdate),
                "artifact-update" => Some(ResultKind::ArtifactUpdate),
                _ => None,
            })
    }
}
