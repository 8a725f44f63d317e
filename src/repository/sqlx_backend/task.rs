use async_trait::async_trait;
use sqlx::Row;

use crate::error::{classify_db_error, GatewayError};
use crate::model::{EpochMillis, EventDirection, Task, TaskEvent, TaskStatus};
use crate::repository::TaskRepository;

use super::PgBackend;

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
        TaskStatus::Timeout => "timeout",
        TaskStatus::Interrupted => "interrupted",
    }
}

fn parse_status(s: &str) -> Option<TaskStatus> {
    match s {
        "running" => Some(TaskStatus::Running),
        "completed" => Some(TaskStatus::Completed),
        "failed" => Some(TaskStatus::Failed),
        "cancelled" => Some(TaskStatus::Cancelled),
        "timeout" => Some(TaskStatus::Timeout),
        "interrupted" => Some(TaskStatus::Interrupted),
        _ => None,
    }
}

fn direction_str(dir: EventDirection) -> &'static str {
    match dir {
        EventDirection::Request => "request",
        EventDirection::Response => "response",
        EventDirection::StatusUpdate => "status_update",
    }
}

fn parse_direction(s: &str) -> EventDirection {
    match s {
        "request" => EventDirection::Request,
        "status_update" => EventDirection::StatusUpdate,
        _ => EventDirection::Response,
    }
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<Task, GatewayError> {
    let status: Option<String> = row.try_get("status").map_err(classify_db_error)?;
    Ok(Task {
        id: row.try_get("id").map_err(classify_db_error)?,
        user_id: row.try_get("user_id").map_err(classify_db_error)?,
        start_time: EpochMillis(row.try_get("start_time").map_err(classify_db_error)?),
        end_time: row
            .try_get::<Option<i64>, _>("end_time")
            .map_err(classify_db_error)?
            .map(EpochMillis),
        status: status.and_then(|s| parse_status(&s)),
        initial_request_text: row.try_get("initial_request_text").map_err(classify_db_error)?,
        agent_name: row.try_get("agent_name").map_err(classify_db_error)?,
        background_execution_enabled: row
            .try_get("background_execution_enabled")
            .map_err(classify_db_error)?,
        max_execution_time_ms: row.try_get("max_execution_time_ms").map_err(classify_db_error)?,
        last_activity_time: row
            .try_get::<Option<i64>, _>("last_activity_time")
            .map_err(classify_db_error)?
            .map(EpochMillis),
        session_id: row.try_get("session_id").map_err(classify_db_error)?,
    })
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<TaskEvent, GatewayError> {
    let direction: String = row.try_get("direction").map_err(classify_db_error)?;
    Ok(TaskEvent {
        id: row.try_get("id").map_err(classify_db_error)?,
        task_id: row.try_get("task_id").map_err(classify_db_error)?,
        user_id: row.try_get("user_id").map_err(classify_db_error)?,
        created_time: EpochMillis(row.try_get("created_time").map_err(classify_db_error)?),
        topic: row.try_get("topic").map_err(classify_db_error)?,
        direction: parse_direction(&direction),
        payload: row.try_get("payload").map_err(classify_db_error)?,
    })
}

#[async_trait]
impl TaskRepository for PgBackend {
    async fn save_task(&self, task: Task) -> Result<Task, GatewayError> {
        sqlx::query(
            "INSERT INTO tasks (id, user_id, start_time, end_time, status, \
             initial_request_text, agent_name, background_execution_enabled, \
             max_execution_time_ms, last_activity_time, session_id) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) \
             ON CONFLICT (id) DO UPDATE SET end_time = EXCLUDED.end_time, \
             status = EXCLUDED.status, last_activity_time = EXCLUDED.last_activity_time",
        )
        .bind(&task.id)
        .bind(&task.user_id)
        .bind(task.start_time.0)
        .bind(task.end_time.map(|t| t.0))
        .bind(task.status.map(status_str))
        .bind(&task.initial_request_text)
        .bind(&task.agent_name)
        .bind(task.background_execution_enabled)
        .bind(task.max_execution_time_ms)
        .bind(task.last_activity_time.map(|t| t.0))
        .bind(&task.session_id)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(task)
    }

    async fn save_event(&self, event: TaskEvent) -> Result<TaskEvent, GatewayError> {
        sqlx::query(
            "INSERT INTO task_events (id, task_id, user_id, created_time, topic, direction, payload) \
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(&event.id)
        .bind(&event.task_id)
        .bind(&event.user_id)
        .bind(event.created_time.0)
        .bind(&event.topic)
        .bind(direction_str(event.direction))
        .bind(&event.payload)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(event)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Task>, GatewayError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn find_by_id_with_events(
        &self,
        id: &str,
    ) -> Result<Option<(Task, Vec<TaskEvent>)>, GatewayError> {
        let task = match self.find_by_id(id).await? {
            Some(t) => t,
            None => return Ok(None),
        };
        let rows = sqlx::query("SELECT * FROM task_events WHERE task_id = $1 ORDER BY created_time")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;
        let events = rows.iter().map(row_to_event).collect::<Result<_, _>>()?;
        Ok(Some((task, events)))
    }

    async fn find_events_since(
        &self,
        task_id: &str,
        since_timestamp: Option<EpochMillis>,
        limit: u32,
    ) -> Result<(Vec<TaskEvent>, bool), GatewayError> {
        let rows = sqlx::query(
            "SELECT * FROM task_events WHERE task_id = $1 \
             AND ($2::BIGINT IS NULL OR created_time > $2) \
             ORDER BY created_time LIMIT $3",
        )
        .bind(task_id)
        .bind(since_timestamp.map(|t| t.0))
        .bind(limit as i64 + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;
        let has_more = rows.len() > limit as usize;
        let events = rows
            .iter()
            .take(limit as usize)
            .map(row_to_event)
            .collect::<Result<_, _>>()?;
        Ok((events, has_more))
    }

    async fn search(&self, user_id: &str, query: &str) -> Result<Vec<Task>, GatewayError> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE user_id = $1 AND initial_request_text ILIKE $2 \
             ORDER BY start_time DESC",
        )
        .bind(user_id)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn find_background_tasks_by_status(
        &self,
        status: TaskStatus,
    ) -> Result<Vec<Task>, GatewayError> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE background_execution_enabled AND status = $1",
        )
        .bind(status_str(status))
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn find_active_background_tasks_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Task>, GatewayError> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE user_id = $1 AND background_execution_enabled \
             AND status = 'running'",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        end_time: Option<EpochMillis>,
    ) -> Result<(), GatewayError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = $1, end_time = COALESCE($2, end_time) WHERE id = $3",
        )
        .bind(status_str(status))
        .bind(end_time.map(|t| t.0))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    async fn touch_activity(&self, id: &str, at: EpochMillis) -> Result<(), GatewayError> {
        let result = sqlx::query("UPDATE tasks SET last_activity_time = $1 WHERE id = $2")
            .bind(at.0)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    async fn delete_tasks_older_than(
        &self,
        cutoff_ms: EpochMillis,
        batch_size: u32,
    ) -> Result<u64, GatewayError> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE id IN \
             (SELECT id FROM tasks WHERE start_time < $1 LIMIT $2)",
        )
        .bind(cutoff_ms.0)
        .bind(batch_size as i64)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(result.rows_affected())
    }
}
