//! Translates an HTTP task submission into an A2A request on the bus and
//! correlates the asynchronous reply back to the SSE stream, the
//! persistent buffer, and the task log (spec §4.1).

use std::sync::Arc;

use serde_json::Value;

use crate::bus::jsonrpc::{ResultKind, RpcRequest, RpcResponse};
use crate::bus::topics;
use crate::bus::{Bus, MessageProperties};
use crate::error::GatewayError;
use crate::model::{EpochMillis, EventDirection, Task, TaskEvent, TaskStatus};
use crate::repository::TaskRepository;
use crate::sse::{PersistentEventBuffer, SseManager};

/// Input to a task submission (spec §4.1).
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub target_agent_name: String,
    pub parts: Vec<Value>,
    pub user_id: String,
    pub session_id: String,
    pub external_request_context: Option<String>,
    pub is_streaming: bool,
    pub background: bool,
}

#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub task_id: String,
    pub context_id: String,
}

/// SSE event names the REST layer advertises on `/sse/subscribe` (spec
/// §6.1).
pub mod sse_events {
    pub const STATUS_UPDATE: &str = "status_update";
    pub const ARTIFACT_UPDATE: &str = "artifact_update";
    pub const FINAL_RESPONSE: &str = "final_response";
    pub const ERROR: &str = "error";
}

pub struct TaskDispatcher {
    bus: Arc<dyn Bus>,
    sse_manager: Arc<SseManager>,
    persistent_buffer: Arc<PersistentEventBuffer>,
    task_repo: Arc<dyn TaskRepository>,
    namespace: String,
    gateway_instance_id: String,
}

impl TaskDispatcher {
    pub fn new(
        bus: Arc<dyn Bus>,
        sse_manager: Arc<SseManager>,
        persistent_buffer: Arc<PersistentEventBuffer>,
        task_repo: Arc<dyn TaskRepository>,
        namespace: String,
        gateway_instance_id: String,
    ) -> Self {
        Self {
            bus,
            sse_manager,
            persistent_buffer,
            task_repo,
            namespace,
            gateway_instance_id,
        }
    }

    /// Submits a task onto the bus. Per spec §4.1: a `taskId`/`contextId`
    /// are minted before publish; a streaming/background submission
    /// registers with the persistent buffer before publish so no event is
    /// lost to the race between "agent replies" and "client attaches";
    /// publish is attempted exactly once, with failure surfacing as
    /// `UpstreamUnavailable`.
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitResult, GatewayError> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let context_id = uuid::Uuid::new_v4().to_string();
        let client_id = uuid::Uuid::new_v4().to_string();
        let reply_to = topics::gateway_response(&self.namespace, &self.gateway_instance_id);

        if req.is_streaming || req.background {
            self.persistent_buffer
                .register_task(&task_id, &req.session_id, &req.user_id);
        }

        self.task_repo
            .save_task(Task {
                id: task_id.clone(),
                user_id: req.user_id.clone(),
                start_time: EpochMillis::now(),
                end_time: None,
                status: Some(TaskStatus::Running),
                initial_request_text: first_text_part(&req.parts),
                agent_name: Some(req.target_agent_name.clone()),
                background_execution_enabled: req.background,
                max_execution_time_ms: None,
                last_activity_time: Some(EpochMillis::now()),
                session_id: Some(req.session_id.clone()),
            })
            .await?;

        let params = serde_json::json!({
            "contextId": context_id,
            "parts": req.parts,
            "externalRequestContext": req.external_request_context,
        });
        let rpc_request = RpcRequest::new(task_id.clone(), "message/send", params);
        let properties = MessageProperties {
            reply_to: Some(reply_to),
            a2a_status_topic: Some(topics::gateway_response(
                &self.namespace,
                &self.gateway_instance_id,
            )),
            client_id: Some(client_id),
            user_id: Some(req.user_id.clone()),
            extra: Default::default(),
        };
        let topic = topics::agent_request(&self.namespace, &req.target_agent_name);
        self.bus
            .publish(&topic, serde_json::to_value(&rpc_request).unwrap(), properties)
            .await
            .map_err(|err| {
                GatewayError::UpstreamUnavailable(format!("failed to publish task request: {err}"))
            })?;

        Ok(SubmitResult { task_id, context_id })
    }

    /// Handles one JSON-RPC response received off the gateway's response
    /// topic: logs it, dispatches it to the SSEManager/persistent buffer
    /// under the mapped SSE event name, and finalizes the `Task` row when
    /// the result is terminal (spec §4.1 "Correlation").
    pub async fn handle_bus_response(&self, response: RpcResponse) {
        let task_id = response.id.clone();

        if let Some(error) = &response.error {
            self.sse_manager
                .dispatch_event(
                    &task_id,
                    &self.persistent_buffer,
                    sse_events::ERROR,
                    serde_json::json!({"error": error.message}),
                )
                .await;
            let _ = self
                .task_repo
                .update_status(&task_id, TaskStatus::Failed, Some(EpochMillis::now()))
                .await;
            return;
        }

        let Some(result) = response.result.clone() else {
            return;
        };
        let kind = response.result_kind();
        let event_name = match kind {
            Some(ResultKind::Task) => sse_events::FINAL_RESPONSE,
            Some(ResultKind::StatusUpdate) => sse_events::STATUS_UPDATE,
            Some(ResultKind::ArtifactUpdate) => sse_events::ARTIFACT_UPDATE,
            None => sse_events::STATUS_UPDATE,
        };

        let direction = EventDirection::Response;
        let _ = self
            .task_repo
            .save_event(TaskEvent {
                id: uuid::Uuid::new_v4().to_string(),
                task_id: task_id.clone(),
                user_id: None,
                created_time: EpochMillis::now(),
                topic: topics::gateway_response(&self.namespace, &self.gateway_instance_id),
                direction,
                payload: crate::sse::sanitize_json(result.clone()),
            })
            .await;
        let _ = self.task_repo.touch_activity(&task_id, EpochMillis::now()).await;

        self.sse_manager
            .dispatch_event(
                &task_id,
                &self.persistent_buffer,
                event_name,
                crate::sse::sanitize_json(result),
            )
            .await;

        if kind == Some(ResultKind::Task) {
            let _ = self
                .task_repo
                .update_status(&task_id, TaskStatus::Completed, Some(EpochMillis::now()))
                .await;
        }
    }

    /// Publishes a cancellation request for `task_id` to `agent_name`.
    /// Best-effort: cancellation failures are logged, never propagated
    /// (spec §4.10).
    pub async fn cancel(&self, task_id: &str, agent_name: &str) {
        let topic = topics::agent_request(&self.namespace, agent_name);
        let rpc_request = RpcRequest::new(
            task_id.to_string(),
            "tasks/cancel",
            serde_json::json!({"taskId": task_id}),
        );
        if let Err(err) = self
            .bus
            .publish(
                &topic,
                serde_json::to_value(&rpc_request).unwrap(),
                MessageProperties::default(),
            )
            .await
        {
            log::warn!("cancellation publish for task {task_id} failed (non-fatal): {err}");
        }
    }
}

fn first_text_part(parts: &[Value]) -> Option<String> {
    parts
        .iter()
        .find_map(|p| p.get("text").and_then(|t| t.as_str()))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::config::SseConfig;
    use crate::repository::memory::{InMemorySseEventBufferRepository, InMemoryTaskRepository};

    fn make_dispatcher() -> (TaskDispatcher, Arc<SseManager>, Arc<PersistentEventBuffer>) {
        let bus = Arc::new(InMemoryBus::new());
        let sse_manager = Arc::new(SseManager::new(SseConfig::default()));
        let persistent_buffer = Arc::new(PersistentEventBuffer::new(Arc::new(
            InMemorySseEventBufferRepository::new(),
        )));
        let task_repo = Arc::new(InMemoryTaskRepository::new());
        let dispatcher = TaskDispatcher::new(
            bus,
            sse_manager.clone(),
            persistent_buffer.clone(),
            task_repo,
            "myns/".to_string(),
            "gw-1".to_string(),
        );
        (dispatcher, sse_manager, persistent_buffer)
    }

    #[tokio::test]
    async fn submit_mints_ids_and_publishes() {
        let (dispatcher, _sse, _buf) = make_dispatcher();
        let result = dispatcher
            .submit(SubmitRequest {
                target_agent_name: "echo".to_string(),
                parts: vec![serde_json::json!({"text": "hi"})],
                user_id: "u1".to_string(),
                session_id: "s1".to_string(),
                external_request_context: None,
                is_streaming: true,
                background: false,
            })
            .await
            .unwrap();
        assert!(!result.task_id.is_empty());
        assert!(!result.context_id.is_empty());
    }

    #[tokio::test]
    async fn terminal_response_marks_task_completed_and_dispatches_final_event() {
        let (dispatcher, sse_manager, buffer) = make_dispatcher();
        let submitted = dispatcher
            .submit(SubmitRequest {
                target_agent_name: "echo".to_string(),
                parts: vec![serde_json::json!({"text": "hi"})],
                user_id: "u1".to_string(),
                session_id: "s1".to_string(),
                external_request_context: None,
                is_streaming: true,
                background: false,
            })
            .await
            .unwrap();
        let (mut rx, _backlog) = sse_manager.connect(&submitted.task_id, &buffer).await;
        let response = RpcResponse::ok(
            submitted.task_id.clone(),
            serde_json::json!({"kind": "task", "status": {"message": {"text": "hi"}}}),
        );
        dispatcher.handle_bus_response(response).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event["kind"], "task");
    }
}
