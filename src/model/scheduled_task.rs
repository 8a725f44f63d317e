use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// A trigger definition (spec §3, §4.7). `userId = None` means a
/// namespace-level task, readable/executable by any namespace member
/// subject to scope checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub user_id: Option<String>,
    pub created_by: String,
    pub schedule_type: ScheduleType,
    pub schedule_expression: String,
    pub timezone: String,
    pub target_agent_name: String,
    pub task_message: Vec<TaskMessagePart>,
    pub task_metadata: Option<serde_json::Value>,
    pub enabled: bool,
    pub max_retries: u32,
    pub retry_delay_seconds: u32,
    pub timeout_seconds: u32,
    pub notification_config: Option<NotificationConfig>,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
    pub next_run_at: Option<EpochMillis>,
    pub last_run_at: Option<EpochMillis>,
    pub deleted_at: Option<EpochMillis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Cron,
    Interval,
    OneTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessagePart {
    pub kind: String,
    pub text: Option<String>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    pub on_success: bool,
    pub on_failure: bool,
    pub webhook_url: Option<String>,
}

impl ScheduledTask {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_namespace_level(&self) -> bool {
        self.user_id.is_none()
    }
}

/// One firing of a `ScheduledTask` (spec §3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTaskExecution {
    pub id: String,
    pub scheduled_task_id: String,
    pub status: ExecutionStatus,
    pub a2a_task_id: Option<String>,
    pub scheduled_for: EpochMillis,
    pub started_at: Option<EpochMillis>,
    pub completed_at: Option<EpochMillis>,
    pub result_summary: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub artifacts: Option<Vec<ExecutionArtifact>>,
    pub notifications_sent: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionArtifact {
    pub name: String,
    pub uri: String,
}

impl ScheduledTaskExecution {
    /// A `running` execution whose deadline has passed (spec §3 invariant,
    /// §4.8 "Stale reaping").
    pub fn is_stale(&self, now: EpochMillis, timeout_seconds: u32) -> bool {
        if self.status != ExecutionStatus::Running {
            return false;
        }
        match self.started_at {
            Some(started) => now.0 - started.0 > (timeout_seconds as i64) * 1000,
            None => false,
        }
    }
}

/// The single-row (id=1) leader-election lock (spec §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerLock {
    pub leader_id: String,
    pub leader_namespace: String,
    pub acquired_at: EpochMillis,
    pub expires_at: EpochMillis,
    pub heartbeat_at: EpochMillis,
}

impl SchedulerLock {
    /// A lock row whose `expiresAt < now` is treated as absent (spec §3
    /// invariant).
    pub fn is_expired(&self, now: EpochMillis) -> bool {
        self.expires_at.0 < now.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_lock_is_treated_as_absent() {
        let lock = SchedulerLock {
            leader_id: "gw-a".into(),
            leader_namespace: "ns".into(),
            acquired_at: EpochMillis(0),
            expires_at: EpochMillis(100),
            heartbeat_at: EpochMillis(0),
        };
        assert!(lock.is_expired(EpochMillis(101)));
        assert!(!lock.is_expired(EpochMillis(99)));
    }

    #[test]
    fn stale_execution_detection() {
        let mut exec = ScheduledTaskExecution {
            id: "e1".into(),
            scheduled_task_id: "t1".into(),
            status: ExecutionStatus::Running,
            a2a_task_id: None,
            scheduled_for: EpochMillis(0),
            started_at: Some(EpochMillis(0)),
            completed_at: None,
            result_summary: None,
            error_message: None,
            retry_count: 0,
            artifacts: None,
            notifications_sent: None,
        };
        assert!(exec.is_stale(EpochMillis(61_000), 60));
        exec.status = ExecutionStatus::Completed;
        assert!(!exec.is_stale(EpochMillis(61_000), 60));
    }
}
