//! `/tasks/*` — task submission, cancellation, and background-task replay
//! (spec §4.1, §4.10, §6.1). Every handler here answers in JSON-RPC shape
//! on error (spec §7).

use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::GatewayContext;
use crate::dispatcher::SubmitRequest;
use crate::model::EpochMillis;
use crate::rest::auth::CurrentUser;
use crate::rest::error::RpcError;

pub fn router() -> Router<GatewayContext> {
    Router::new()
        .route("/tasks/send", post(send))
        .route("/tasks/subscribe", post(subscribe))
        .route("/tasks/cancel", post(cancel))
        .route("/tasks/{id}/status", get(status))
        .route("/tasks/{id}/events", get(events))
        .route("/tasks/background/active", get(active_background_tasks))
}

/// Parses the `agent_name`/`message`/`session_id`/`files[]` multipart
/// fields shared by `/tasks/send` and `/tasks/subscribe` into a dispatcher
/// `SubmitRequest` (spec §6.1).
async fn parse_submission(
    user_id: String,
    is_streaming: bool,
    mut multipart: Multipart,
) -> Result<SubmitRequest, RpcError> {
    let mut agent_name = None;
    let mut message = None;
    let mut session_id = None;
    let mut background = false;
    let mut parts: Vec<Value> = Vec::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "agent_name" => agent_name = field.text().await.ok(),
            "message" => message = field.text().await.ok(),
            "session_id" => session_id = field.text().await.ok(),
            "background" => background = field.text().await.ok().as_deref() == Some("true"),
            "files" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                if let Ok(bytes) = field.bytes().await {
                    parts.push(json!({
                        "fileName": file_name,
                        "mimeType": mime_type,
                        "data": general_purpose::STANDARD.encode(&bytes),
                    }));
                }
            }
            _ => {}
        }
    }

    let rpc_error = |msg: &str| RpcError {
        request_id: String::new(),
        error: crate::error::GatewayError::BadRequest(msg.to_string()),
    };
    let agent_name = agent_name.ok_or_else(|| rpc_error("agent_name is required"))?;
    let message = message.ok_or_else(|| rpc_error("message is required"))?;
    parts.insert(0, json!({"text": message}));

    Ok(SubmitRequest {
        target_agent_name: agent_name,
        parts,
        user_id,
        session_id: session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        external_request_context: None,
        is_streaming,
        background,
    })
}

async fn send(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Value>, RpcError> {
    let req = parse_submission(user.id, false, multipart).await?;
    let result = ctx
        .dispatcher
        .submit(req)
        .await
        .map_err(|error| RpcError { request_id: String::new(), error })?;
    Ok(Json(json!({"result": {"taskId": result.task_id}})))
}

async fn subscribe(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Value>, RpcError> {
    let req = parse_submission(user.id, true, multipart).await?;
    let session_id = req.session_id.clone();
    let result = ctx
        .dispatcher
        .submit(req)
        .await
        .map_err(|error| RpcError { request_id: String::new(), error })?;
    Ok(Json(
        json!({"result": {"taskId": result.task_id, "sessionId": session_id}}),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CancelForm {
    pub task_id: String,
}

async fn cancel(
    State(ctx): State<GatewayContext>,
    axum::Form(form): axum::Form<CancelForm>,
) -> Result<Json<Value>, RpcError> {
    let task = ctx
        .task_repo
        .find_by_id(&form.task_id)
        .await
        .map_err(|error| RpcError {
            request_id: form.task_id.clone(),
            error,
        })?
        .ok_or_else(|| RpcError {
            request_id: form.task_id.clone(),
            error: crate::error::GatewayError::NotFound(format!("task {}", form.task_id)),
        })?;
    if let Some(agent_name) = &task.agent_name {
        ctx.dispatcher.cancel(&form.task_id, agent_name).await;
    }
    Ok(Json(json!({"result": {"taskId": form.task_id}})))
}

async fn status(
    State(ctx): State<GatewayContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RpcError> {
    let rpc_err = |error| RpcError { request_id: id.clone(), error };
    let task = ctx
        .task_repo
        .find_by_id(&id)
        .await
        .map_err(rpc_err)?
        .ok_or_else(|| rpc_err(crate::error::GatewayError::NotFound(format!("task {id}"))))?;
    let is_running = task.status == Some(crate::model::TaskStatus::Running);
    let can_reconnect = is_running && task.background_execution_enabled;
    Ok(Json(json!({
        "task": task,
        "isRunning": is_running,
        "isBackground": task.background_execution_enabled,
        "canReconnect": can_reconnect,
    })))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since_timestamp: Option<i64>,
    #[serde(default = "default_events_limit")]
    pub limit: u32,
}

fn default_events_limit() -> u32 {
    100
}

async fn events(
    State(ctx): State<GatewayContext>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Value>, RpcError> {
    let rpc_err = |error| RpcError { request_id: id.clone(), error };
    let task = ctx
        .task_repo
        .find_by_id(&id)
        .await
        .map_err(rpc_err)?
        .ok_or_else(|| rpc_err(crate::error::GatewayError::NotFound(format!("task {id}"))))?;
    let (events, has_more) = ctx
        .task_repo
        .find_events_since(&id, query.since_timestamp.map(EpochMillis), query.limit)
        .await
        .map_err(rpc_err)?;
    Ok(Json(json!({
        "task": task,
        "totalEvents": events.len(),
        "events": events,
        "hasMore": has_more,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ActiveBackgroundQuery {
    pub user_id: String,
}

async fn active_background_tasks(
    State(ctx): State<GatewayContext>,
    Query(query): Query<ActiveBackgroundQuery>,
) -> Result<Json<Value>, RpcError> {
    let tasks = ctx
        .task_repo
        .find_active_background_tasks_for_user(&query.user_id)
        .await
        .map_err(|error| RpcError {
            request_id: String::new(),
            error,
        })?;
    Ok(Json(json!({"tasks": tasks})))
}
