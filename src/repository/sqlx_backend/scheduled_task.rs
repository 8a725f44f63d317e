use async_trait::async_trait;
use sqlx::Row;

use crate::error::{classify_db_error, GatewayError};
use crate::model::{
    EpochMillis, ExecutionArtifact, ExecutionStatus, NotificationConfig, ScheduleType,
    ScheduledTask, ScheduledTaskExecution, SchedulerLock, TaskMessagePart,
};
use crate::repository::ScheduledTaskRepository;

use super::PgBackend;

fn schedule_type_str(t: ScheduleType) -> &'static str {
    match t {
        ScheduleType::Cron => "cron",
        ScheduleType::Interval => "interval",
        ScheduleType::OneTime => "one_time",
    }
}

fn parse_schedule_type(s: &str) -> ScheduleType {
    match s {
        "interval" => ScheduleType::Interval,
        "one_time" => ScheduleType::OneTime,
        _ => ScheduleType::Cron,
    }
}

fn execution_status_str(s: ExecutionStatus) -> &'static str {
    match s {
        ExecutionStatus::Pending => "pending",
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Timeout => "timeout",
        ExecutionStatus::Cancelled => "cancelled",
    }
}

fn parse_execution_status(s: &str) -> ExecutionStatus {
    match s {
        "pending" => ExecutionStatus::Pending,
        "completed" => ExecutionStatus::Completed,
        "failed" => ExecutionStatus::Failed,
        "timeout" => ExecutionStatus::Timeout,
        "cancelled" => ExecutionStatus::Cancelled,
        _ => ExecutionStatus::Running,
    }
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<ScheduledTask, GatewayError> {
    let schedule_type: String = row.try_get("schedule_type").map_err(classify_db_error)?;
    let task_message: serde_json::Value = row.try_get("task_message").map_err(classify_db_error)?;
    let notification_config: Option<serde_json::Value> =
        row.try_get("notification_config").map_err(classify_db_error)?;
    Ok(ScheduledTask {
        id: row.try_get("id").map_err(classify_db_error)?,
        name: row.try_get("name").map_err(classify_db_error)?,
        namespace: row.try_get("namespace").map_err(classify_db_error)?,
        user_id: row.try_get("user_id").map_err(classify_db_error)?,
        created_by: row.try_get("created_by").map_err(classify_db_error)?,
        schedule_type: parse_schedule_type(&schedule_type),
        schedule_expression: row.try_get("schedule_expression").map_err(classify_db_error)?,
        timezone: row.try_get("timezone").map_err(classify_db_error)?,
        target_agent_name: row.try_get("target_agent_name").map_err(classify_db_error)?,
        task_message: serde_json::from_value::<Vec<TaskMessagePart>>(task_message)
            .map_err(|e| GatewayError::Internal(e.to_string()))?,
        task_metadata: row.try_get("task_metadata").map_err(classify_db_error)?,
        enabled: row.try_get("enabled").map_err(classify_db_error)?,
        max_retries: row.try_get::<i32, _>("max_retries").map_err(classify_db_error)? as u32,
        retry_delay_seconds: row
            .try_get::<i32, _>("retry_delay_seconds")
            .map_err(classify_db_error)? as u32,
        timeout_seconds: row.try_get::<i32, _>("timeout_seconds").map_err(classify_db_error)? as u32,
        notification_config: notification_config
            .map(|v| serde_json::from_value::<NotificationConfig>(v))
            .transpose()
            .map_err(|e| GatewayError::Internal(e.to_string()))?,
        created_at: EpochMillis(row.try_get("created_at").map_err(classify_db_error)?),
        updated_at: EpochMillis(row.try_get("updated_at").map_err(classify_db_error)?),
        next_run_at: row
            .try_get::<Option<i64>, _>("next_run_at")
            .map_err(classify_db_error)?
            .map(EpochMillis),
        last_run_at: row
            .try_get::<Option<i64>, _>("last_run_at")
            .map_err(classify_db_error)?
            .map(EpochMillis),
        deleted_at: row
            .try_get::<Option<i64>, _>("deleted_at")
            .map_err(classify_db_error)?
            .map(EpochMillis),
    })
}

fn row_to_execution(row: &sqlx::postgres::PgRow) -> Result<ScheduledTaskExecution, GatewayError> {
    let status: String = row.try_get("status").map_err(classify_db_error)?;
    let artifacts: Option<serde_json::Value> = row.try_get("artifacts").map_err(classify_db_error)?;
    Ok(ScheduledTaskExecution {
        id: row.try_get("id").map_err(classify_db_error)?,
        scheduled_task_id: row.try_get("scheduled_task_id").map_err(classify_db_error)?,
        status: parse_execution_status(&status),
        a2a_task_id: row.try_get("a2a_task_id").map_err(classify_db_error)?,
        scheduled_for: EpochMillis(row.try_get("scheduled_for").map_err(classify_db_error)?),
        started_at: row
            .try_get::<Option<i64>, _>("started_at")
            .map_err(classify_db_error)?
            .map(EpochMillis),
        completed_at: row
            .try_get::<Option<i64>, _>("completed_at")
            .map_err(classify_db_error)?
            .map(EpochMillis),
        result_summary: row.try_get("result_summary").map_err(classify_db_error)?,
        error_message: row.try_get("error_message").map_err(classify_db_error)?,
        retry_count: row.try_get::<i32, _>("retry_count").map_err(classify_db_error)? as u32,
        artifacts: artifacts
            .map(|v| serde_json::from_value::<Vec<ExecutionArtifact>>(v))
            .transpose()
            .map_err(|e| GatewayError::Internal(e.to_string()))?,
        notifications_sent: row
            .try_get::<Option<i32>, _>("notifications_sent")
            .map_err(classify_db_error)?
            .map(|n| n as u32),
    })
}

fn row_to_lock(row: &sqlx::postgres::PgRow) -> Result<SchedulerLock, GatewayError> {
    Ok(SchedulerLock {
        leader_id: row.try_get("leader_id").map_err(classify_db_error)?,
        leader_namespace: row.try_get("leader_namespace").map_err(classify_db_error)?,
        acquired_at: EpochMillis(row.try_get("acquired_at").map_err(classify_db_error)?),
        expires_at: EpochMillis(row.try_get("expires_at").map_err(classify_db_error)?),
        heartbeat_at: EpochMillis(row.try_get("heartbeat_at").map_err(classify_db_error)?),
    })
}

#[async_trait]
impl ScheduledTaskRepository for PgBackend {
    async fn create(&self, task: ScheduledTask) -> Result<ScheduledTask, GatewayError> {
        let task_message = serde_json::to_value(&task.task_message)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let notification_config = task
            .notification_config
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO scheduled_tasks (id, name, namespace, user_id, created_by, \
             schedule_type, schedule_expression, timezone, target_agent_name, task_message, \
             task_metadata, enabled, max_retries, retry_delay_seconds, timeout_seconds, \
             notification_config, created_at, updated_at, next_run_at, last_run_at, deleted_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)",
        )
        .bind(&task.id)
        .bind(&task.name)
        .bind(&task.namespace)
        .bind(&task.user_id)
        .bind(&task.created_by)
        .bind(schedule_type_str(task.schedule_type))
        .bind(&task.schedule_expression)
        .bind(&task.timezone)
        .bind(&task.target_agent_name)
        .bind(&task_message)
        .bind(&task.task_metadata)
        .bind(task.enabled)
        .bind(task.max_retries as i32)
        .bind(task.retry_delay_seconds as i32)
        .bind(task.timeout_seconds as i32)
        .bind(&notification_config)
        .bind(task.created_at.0)
        .bind(task.updated_at.0)
        .bind(task.next_run_at.map(|t| t.0))
        .bind(task.last_run_at.map(|t| t.0))
        .bind(task.deleted_at.map(|t| t.0))
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(task),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(GatewayError::Conflict(format!(
                    "scheduled task {} already exists in namespace {}",
                    task.name, task.namespace
                )))
            }
            Err(e) => Err(classify_db_error(e)),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ScheduledTask>, GatewayError> {
        let row = sqlx::query("SELECT * FROM scheduled_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn find_enabled_in_namespace(
        &self,
        namespace: &str,
    ) -> Result<Vec<ScheduledTask>, GatewayError> {
        let rows = sqlx::query(
            "SELECT * FROM scheduled_tasks WHERE namespace = $1 AND enabled AND deleted_at IS NULL",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn find_by_name_in_namespace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ScheduledTask>, GatewayError> {
        let row = sqlx::query(
            "SELECT * FROM scheduled_tasks WHERE namespace = $1 AND name = $2 \
             AND deleted_at IS NULL",
        )
        .bind(namespace)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn update(&self, task: ScheduledTask) -> Result<ScheduledTask, GatewayError> {
        let task_message = serde_json::to_value(&task.task_message)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let notification_config = task
            .notification_config
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET schedule_type = $1, schedule_expression = $2, \
             timezone = $3, target_agent_name = $4, task_message = $5, task_metadata = $6, \
             enabled = $7, max_retries = $8, retry_delay_seconds = $9, timeout_seconds = $10, \
             notification_config = $11, updated_at = $12, next_run_at = $13 WHERE id = $14",
        )
        .bind(schedule_type_str(task.schedule_type))
        .bind(&task.schedule_expression)
        .bind(&task.timezone)
        .bind(&task.target_agent_name)
        .bind(&task_message)
        .bind(&task.task_metadata)
        .bind(task.enabled)
        .bind(task.max_retries as i32)
        .bind(task.retry_delay_seconds as i32)
        .bind(task.timeout_seconds as i32)
        .bind(&notification_config)
        .bind(task.updated_at.0)
        .bind(task.next_run_at.map(|t| t.0))
        .bind(&task.id)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("scheduled task {}", task.id)));
        }
        Ok(task)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), GatewayError> {
        let result = sqlx::query("UPDATE scheduled_tasks SET enabled = $1 WHERE id = $2")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("scheduled task {id}")));
        }
        Ok(())
    }

    async fn record_fired(&self, id: &str, at: EpochMillis) -> Result<(), GatewayError> {
        let result = sqlx::query("UPDATE scheduled_tasks SET last_run_at = $1 WHERE id = $2")
            .bind(at.0)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("scheduled task {id}")));
        }
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError> {
        let now = EpochMillis::now();
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(now.0)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM scheduled_tasks WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(classify_db_error)?;
            if exists.is_none() {
                return Err(GatewayError::NotFound(format!("scheduled task {id}")));
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn create_execution(
        &self,
        execution: ScheduledTaskExecution,
    ) -> Result<ScheduledTaskExecution, GatewayError> {
        let artifacts = execution
            .artifacts
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO scheduled_task_executions (id, scheduled_task_id, status, a2a_task_id, \
             scheduled_for, started_at, completed_at, result_summary, error_message, retry_count, \
             artifacts, notifications_sent) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(&execution.id)
        .bind(&execution.scheduled_task_id)
        .bind(execution_status_str(execution.status))
        .bind(&execution.a2a_task_id)
        .bind(execution.scheduled_for.0)
        .bind(execution.started_at.map(|t| t.0))
        .bind(execution.completed_at.map(|t| t.0))
        .bind(&execution.result_summary)
        .bind(&execution.error_message)
        .bind(execution.retry_count as i32)
        .bind(&artifacts)
        .bind(execution.notifications_sent.map(|n| n as i32))
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(execution)
    }

    async fn update_execution(
        &self,
        execution: ScheduledTaskExecution,
    ) -> Result<ScheduledTaskExecution, GatewayError> {
        let artifacts = execution
            .artifacts
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE scheduled_task_executions SET status = $1, a2a_task_id = $2, \
             started_at = $3, completed_at = $4, result_summary = $5, error_message = $6, \
             retry_count = $7, artifacts = $8, notifications_sent = $9 WHERE id = $10",
        )
        .bind(execution_status_str(execution.status))
        .bind(&execution.a2a_task_id)
        .bind(execution.started_at.map(|t| t.0))
        .bind(execution.completed_at.map(|t| t.0))
        .bind(&execution.result_summary)
        .bind(&execution.error_message)
        .bind(execution.retry_count as i32)
        .bind(&artifacts)
        .bind(execution.notifications_sent.map(|n| n as i32))
        .bind(&execution.id)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("execution {}", execution.id)));
        }
        Ok(execution)
    }

    async fn find_execution_by_a2a_task_id(
        &self,
        a2a_task_id: &str,
    ) -> Result<Option<ScheduledTaskExecution>, GatewayError> {
        let row = sqlx::query("SELECT * FROM scheduled_task_executions WHERE a2a_task_id = $1")
            .bind(a2a_task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?;
        row.as_ref().map(row_to_execution).transpose()
    }

    async fn find_running_executions(&self) -> Result<Vec<ScheduledTaskExecution>, GatewayError> {
        let rows = sqlx::query("SELECT * FROM scheduled_task_executions WHERE status = 'running'")
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;
        rows.iter().map(row_to_execution).collect()
    }

    async fn find_executions_for_task(
        &self,
        scheduled_task_id: &str,
    ) -> Result<Vec<ScheduledTaskExecution>, GatewayError> {
        let rows = sqlx::query(
            "SELECT * FROM scheduled_task_executions WHERE scheduled_task_id = $1 \
             ORDER BY scheduled_for DESC",
        )
        .bind(scheduled_task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;
        rows.iter().map(row_to_execution).collect()
    }

    /// Upsert against the single `id = 1` lock row, guarded so the update
    /// branch only fires when the row is expired or already owned by this
    /// candidate (spec §4.7 select-for-update-skip-locked semantics).
    async fn try_acquire_lock(
        &self,
        candidate_leader_id: &str,
        candidate_namespace: &str,
        lease_duration_ms: i64,
    ) -> Result<bool, GatewayError> {
        let now = EpochMillis::now();
        let expires_at = now.plus_millis(lease_duration_ms);
        let result = sqlx::query(
            "INSERT INTO scheduler_lock (id, leader_id, leader_namespace, acquired_at, \
             expires_at, heartbeat_at) VALUES (1, $1, $2, $3, $4, $3) \
             ON CONFLICT (id) DO UPDATE SET leader_id = EXCLUDED.leader_id, \
             leader_namespace = EXCLUDED.leader_namespace, acquired_at = EXCLUDED.acquired_at, \
             expires_at = EXCLUDED.expires_at, heartbeat_at = EXCLUDED.heartbeat_at \
             WHERE scheduler_lock.expires_at < $3 OR scheduler_lock.leader_id = $1",
        )
        .bind(candidate_leader_id)
        .bind(candidate_namespace)
        .bind(now.0)
        .bind(expires_at.0)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn heartbeat_lock(
        &self,
        leader_id: &str,
        lease_duration_ms: i64,
    ) -> Result<bool, GatewayError> {
        let now = EpochMillis::now();
        let result = sqlx::query(
            "UPDATE scheduler_lock SET heartbeat_at = $1, expires_at = $2 \
             WHERE id = 1 AND leader_id = $3 AND expires_at >= $1",
        )
        .bind(now.0)
        .bind(now.plus_millis(lease_duration_ms).0)
        .bind(leader_id)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn read_lock(&self) -> Result<Option<SchedulerLock>, GatewayError> {
        let row = sqlx::query("SELECT * FROM scheduler_lock WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?;
        row.as_ref().map(row_to_lock).transpose()
    }
}
