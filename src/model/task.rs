use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// Audit record of one A2A task (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub start_time: EpochMillis,
    pub end_time: Option<EpochMillis>,
    pub status: Option<TaskStatus>,
    pub initial_request_text: Option<String>,
    pub agent_name: Option<String>,
    pub background_execution_enabled: bool,
    pub max_execution_time_ms: Option<i64>,
    pub last_activity_time: Option<EpochMillis>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    /// Orphaned by a crash: the owning process lost its in-memory state and
    /// the task can't be resumed (spec §4.10).
    Interrupted,
}

/// Append-only log of a single bus message tied to a `Task` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub id: String,
    pub task_id: String,
    pub user_id: Option<String>,
    pub created_time: EpochMillis,
    pub topic: String,
    pub direction: EventDirection,
    /// Sanitized JSON payload (NaN/Infinity replaced with null).
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDirection {
    Request,
    Response,
    StatusUpdate,
}

impl Task {
    /// A running background task whose `lastActivityTime` is older than its
    /// own (or the monitor's default) execution budget (spec §4.10).
    pub fn is_stale(&self, now: EpochMillis, default_timeout_ms: i64) -> bool {
        if self.status != Some(TaskStatus::Running) {
            return false;
        }
        let budget = self.max_execution_time_ms.unwrap_or(default_timeout_ms);
        match self.last_activity_time {
            Some(last) => now.0 - last.0 > budget,
            None => now.0 - self.start_time.0 > budget,
        }
    }
}
