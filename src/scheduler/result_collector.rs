//! Consumes bus responses destined for the scheduler's reply topic and
//! finalizes `ScheduledTaskExecution` rows (spec §4.8), supplemented from
//! `original_source`'s `result_collector.py`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::bus::jsonrpc::{ResultKind, RpcResponse};
use crate::error::GatewayError;
use crate::model::{EpochMillis, ExecutionArtifact, ExecutionStatus, ScheduledTaskExecution};
use crate::repository::ScheduledTaskRepository;

/// Caps how much of the final response text is retained verbatim (spec
/// §4.8 "preserve up to 1000 chars").
const AGENT_RESPONSE_MAX_CHARS: usize = 1000;

#[async_trait]
pub trait ResultCollector: Send + Sync {
    /// Registers an execution as awaiting a bus response under the given
    /// A2A task id. Stateful collectors use this to avoid a DB round trip
    /// per response; stateless collectors can treat it as a no-op.
    async fn register(&self, a2a_task_id: &str, execution_id: &str);

    /// Handles one bus response, finalizing the matching execution.
    /// Returns `Ok(None)` when no execution is currently awaiting this
    /// `a2a_task_id` (e.g. it already timed out and was reaped).
    async fn handle_response(
        &self,
        a2a_task_id: &str,
        response: &RpcResponse,
    ) -> Result<Option<ScheduledTaskExecution>, GatewayError>;

    /// Marks `running` executions older than their own `timeoutSeconds`
    /// as `timeout` (spec §4.8 "Stale reaping").
    async fn reap_stale(&self, default_timeout_seconds: u32) -> Result<u64, GatewayError>;
}

/// Keeps an in-memory `a2aTaskId → executionId` map for O(1) correlation.
/// Tied to a single replica (spec §4.8).
pub struct StatefulResultCollector {
    repo: Arc<dyn ScheduledTaskRepository>,
    pending: Mutex<HashMap<String, String>>,
}

impl StatefulResultCollector {
    pub fn new(repo: Arc<dyn ScheduledTaskRepository>) -> Self {
        Self {
            repo,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ResultCollector for StatefulResultCollector {
    async fn register(&self, a2a_task_id: &str, execution_id: &str) {
        self.pending
            .lock()
            .await
            .insert(a2a_task_id.to_string(), execution_id.to_string());
    }

    async fn handle_response(
        &self,
        a2a_task_id: &str,
        response: &RpcResponse,
    ) -> Result<Option<ScheduledTaskExecution>, GatewayError> {
        let execution_id = self.pending.lock().await.get(a2a_task_id).cloned();
        let Some(execution_id) = execution_id else {
            return Ok(None);
        };
        let Some(execution) = find_execution_by_id(self.repo.as_ref(), &execution_id).await? else {
            return Ok(None);
        };
        let finalized = finalize_execution(execution, response)?;
        if is_terminal(&finalized) {
            self.pending.lock().await.remove(a2a_task_id);
        }
        Ok(Some(self.repo.update_execution(finalized).await?))
    }

    async fn reap_stale(&self, default_timeout_seconds: u32) -> Result<u64, GatewayError> {
        reap_stale_executions(self.repo.as_ref(), default_timeout_seconds).await
    }
}

/// Uses the database as the source of truth: every incoming response is
/// resolved to its pending/running execution by `a2aTaskId`. Safe for
/// horizontal scaling (spec §4.8).
pub struct StatelessResultCollector {
    repo: Arc<dyn ScheduledTaskRepository>,
}

impl StatelessResultCollector {
    pub fn new(repo: Arc<dyn ScheduledTaskRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ResultCollector for StatelessResultCollector {
    async fn register(&self, _a2a_task_id: &str, _execution_id: &str) {
        // The DB row already carries `a2aTaskId`; nothing to cache.
    }

    async fn handle_response(
        &self,
        a2a_task_id: &str,
        response: &RpcResponse,
    ) -> Result<Option<ScheduledTaskExecution>, GatewayError> {
        let Some(execution) = self.repo.find_execution_by_a2a_task_id(a2a_task_id).await? else {
            return Ok(None);
        };
        let finalized = finalize_execution(execution, response)?;
        Ok(Some(self.repo.update_execution(finalized).await?))
    }

    async fn reap_stale(&self, default_timeout_seconds: u32) -> Result<u64, GatewayError> {
        reap_stale_executions(self.repo.as_ref(), default_timeout_seconds).await
    }
}

async fn find_execution_by_id(
    repo: &dyn ScheduledTaskRepository,
    execution_id: &str,
) -> Result<Option<ScheduledTaskExecution>, GatewayError> {
    for execution in repo.find_running_executions().await? {
        if execution.id == execution_id {
            return Ok(Some(execution));
        }
    }
    Ok(None)
}

async fn reap_stale_executions(
    repo: &dyn ScheduledTaskRepository,
    default_timeout_seconds: u32,
) -> Result<u64, GatewayError> {
    let now = EpochMillis::now();
    let mut reaped = 0;
    for mut execution in repo.find_running_executions().await? {
        if execution.is_stale(now, default_timeout_seconds) {
            execution.status = ExecutionStatus::Timeout;
            execution.completed_at = Some(now);
            execution.error_message = Some("execution exceeded its timeout".to_string());
            repo.update_execution(execution).await?;
            reaped += 1;
        }
    }
    Ok(reaped)
}

fn is_terminal(execution: &ScheduledTaskExecution) -> bool {
    matches!(
        execution.status,
        ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Timeout | ExecutionStatus::Cancelled
    )
}

/// Applies a bus response to an execution: success path extracts the
/// final message/history/artifacts/metadata, error path records the
/// failure (spec §4.8).
fn finalize_execution(
    mut execution: ScheduledTaskExecution,
    response: &RpcResponse,
) -> Result<ScheduledTaskExecution, GatewayError> {
    if let Some(error) = &response.error {
        execution.status = ExecutionStatus::Failed;
        execution.completed_at = Some(EpochMillis::now());
        execution.error_message = Some(error.message.clone());
        execution.result_summary = Some(serde_json::json!({
            "errorCode": error.code,
            "errorData": error.data,
        }));
        return Ok(execution);
    }

    // Only a terminal `Task` result finalizes the execution; intermediate
    // status/artifact updates are ignored here (the SSE core handles
    // those for interactive sessions, not scheduled runs).
    if response.result_kind() != Some(ResultKind::Task) {
        return Ok(execution);
    }

    let result = response.result.clone().unwrap_or(Value::Null);
    let agent_response = extract_agent_response(&result);
    let history = extract_history(&result);
    let artifacts = extract_artifacts(&result, None);
    let metadata = result.get("metadata").cloned();

    execution.status = ExecutionStatus::Completed;
    execution.completed_at = Some(EpochMillis::now());
    execution.artifacts = if artifacts.is_empty() { None } else { Some(artifacts) };
    execution.result_summary = Some(serde_json::json!({
        "agentResponse": agent_response,
        "history": history,
        "metadata": metadata,
        "finalState": result.get("status").and_then(|s| s.get("state")).cloned(),
    }));
    Ok(execution)
}

fn extract_agent_response(task: &Value) -> String {
    let text = task
        .get("status")
        .and_then(|s| s.get("message"))
        .and_then(|m| m.get("parts"))
        .and_then(|parts| parts.as_array())
        .and_then(|parts| parts.iter().find_map(|p| p.get("text").and_then(|t| t.as_str())))
        .unwrap_or_default();
    truncate_chars(text, AGENT_RESPONSE_MAX_CHARS)
}

fn extract_history(task: &Value) -> Vec<Value> {
    task.get("history")
        .and_then(|h| h.as_array())
        .map(|history| {
            history
                .iter()
                .map(|message| {
                    let role = message.get("role").cloned().unwrap_or(Value::Null);
                    let text = message
                        .get("parts")
                        .and_then(|parts| parts.as_array())
                        .and_then(|parts| parts.iter().find_map(|p| p.get("text").and_then(|t| t.as_str())))
                        .unwrap_or_default();
                    serde_json::json!({"role": role, "text": truncate_chars(text, AGENT_RESPONSE_MAX_CHARS)})
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Materializes returned artifact ids as `{name, uri}`, using a
/// scheduled-artifact REST path keyed by session id when known, otherwise
/// an opaque `artifact://<id>` URI (spec §4.8).
fn extract_artifacts(task: &Value, session_id: Option<&str>) -> Vec<ExecutionArtifact> {
    task.get("artifacts")
        .and_then(|a| a.as_array())
        .map(|artifacts| {
            artifacts
                .iter()
                .filter_map(|artifact| {
                    let id = artifact.get("artifactId").and_then(|i| i.as_str())?;
                    let name = artifact
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or(id)
                        .to_string();
                    let uri = match session_id {
                        Some(session_id) => format!("/api/v1/sessions/{session_id}/scheduled-artifacts/{id}"),
                        None => format!("artifact://{id}"),
                    };
                    Some(ExecutionArtifact { name, uri })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        text.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::jsonrpc::RpcError;
    use crate::repository::memory::InMemoryScheduledTaskRepository;

    fn pending_execution(id: &str, a2a_task_id: &str) -> ScheduledTaskExecution {
        ScheduledTaskExecution {
            id: id.to_string(),
            scheduled_task_id: "st1".to_string(),
            status: ExecutionStatus::Running,
            a2a_task_id: Some(a2a_task_id.to_string()),
            scheduled_for: EpochMillis::now(),
            started_at: Some(EpochMillis::now()),
            completed_at: None,
            result_summary: None,
            error_message: None,
            retry_count: 0,
            artifacts: None,
            notifications_sent: None,
        }
    }

    #[tokio::test]
    async fn stateless_collector_finalizes_success_response() {
        let repo = Arc::new(InMemoryScheduledTaskRepository::new());
        repo.create_execution(pending_execution("e1", "a2a-1")).await.unwrap();
        let collector = StatelessResultCollector::new(repo.clone());
        let response = RpcResponse::ok(
            "a2a-1",
            serde_json::json!({
                "kind": "task",
                "status": {"state": "completed", "message": {"parts": [{"text": "done"}]}},
                "history": [],
                "artifacts": [{"artifactId": "art-1", "name": "report.pdf"}],
            }),
        );
        let execution = collector.handle_response("a2a-1", &response).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.artifacts.unwrap()[0].uri, "artifact://art-1");
    }

    #[tokio::test]
    async fn error_response_marks_execution_failed() {
        let repo = Arc::new(InMemoryScheduledTaskRepository::new());
        repo.create_execution(pending_execution("e2", "a2a-2")).await.unwrap();
        let collector = StatelessResultCollector::new(repo.clone());
        let response = RpcResponse::err(
            "a2a-2",
            &GatewayError::UpstreamUnavailable("agent unreachable".to_string()),
        );
        let _ = RpcError::from(&GatewayError::Internal("unused".to_string()));
        let execution = collector.handle_response("a2a-2", &response).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.error_message.as_deref(), Some("upstream unavailable: agent unreachable"));
    }

    #[tokio::test]
    async fn stale_running_executions_are_reaped() {
        let repo = Arc::new(InMemoryScheduledTaskRepository::new());
        let mut stale = pending_execution("e3", "a2a-3");
        stale.started_at = Some(EpochMillis(0));
        repo.create_execution(stale).await.unwrap();
        let collector = StatelessResultCollector::new(repo.clone());
        let reaped = collector.reap_stale(30).await.unwrap();
        assert_eq!(reaped, 1);
    }
}
