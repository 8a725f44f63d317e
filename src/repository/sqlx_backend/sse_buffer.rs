use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::Row;

use crate::error::{classify_db_error, GatewayError};
use crate::model::{EpochMillis, SseEventBufferEntry};
use crate::repository::SseEventBufferRepository;

use super::PgBackend;

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<SseEventBufferEntry, GatewayError> {
    Ok(SseEventBufferEntry {
        id: row.try_get("id").map_err(classify_db_error)?,
        task_id: row.try_get("task_id").map_err(classify_db_error)?,
        session_id: row.try_get("session_id").map_err(classify_db_error)?,
        user_id: row.try_get("user_id").map_err(classify_db_error)?,
        event_sequence: row.try_get("event_sequence").map_err(classify_db_error)?,
        event_type: row.try_get("event_type").map_err(classify_db_error)?,
        event_data: row.try_get("event_data").map_err(classify_db_error)?,
        created_at: EpochMillis(row.try_get("created_at").map_err(classify_db_error)?),
        consumed: row.try_get("consumed").map_err(classify_db_error)?,
        consumed_at: row
            .try_get::<Option<i64>, _>("consumed_at")
            .map_err(classify_db_error)?
            .map(EpochMillis),
    })
}

#[async_trait]
impl SseEventBufferRepository for PgBackend {
    async fn buffer_event(
        &self,
        task_id: &str,
        session_id: &str,
        user_id: &str,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<SseEventBufferEntry, GatewayError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = EpochMillis::now();
        let row = sqlx::query(
            "INSERT INTO sse_event_buffer (id, task_id, session_id, user_id, event_sequence, \
             event_type, event_data, created_at, consumed, consumed_at) \
             VALUES ($1,$2,$3,$4, \
             COALESCE((SELECT MAX(event_sequence) FROM sse_event_buffer WHERE task_id = $2), 0) + 1, \
             $5,$6,$7,FALSE,NULL) RETURNING *",
        )
        .bind(&id)
        .bind(task_id)
        .bind(session_id)
        .bind(user_id)
        .bind(event_type)
        .bind(&event_data)
        .bind(now.0)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_db_error)?;
        row_to_entry(&row)
    }

    async fn get_buffered_events(
        &self,
        task_id: &str,
        mark_consumed: bool,
    ) -> Result<Vec<SseEventBufferEntry>, GatewayError> {
        let rows = sqlx::query(
            "SELECT * FROM sse_event_buffer WHERE task_id = $1 ORDER BY event_sequence",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;
        let entries = rows.iter().map(row_to_entry).collect::<Result<Vec<_>, _>>()?;
        if mark_consumed {
            let now = EpochMillis::now();
            sqlx::query(
                "UPDATE sse_event_buffer SET consumed = TRUE, consumed_at = $1 \
                 WHERE task_id = $2 AND NOT consumed",
            )
            .bind(now.0)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;
        }
        Ok(entries)
    }

    async fn has_unconsumed_events(&self, task_id: &str) -> Result<bool, GatewayError> {
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM sse_event_buffer WHERE task_id = $1 AND NOT consumed LIMIT 1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(exists.is_some())
    }

    async fn get_unconsumed_events_for_session(
        &self,
        session_id: &str,
    ) -> Result<HashMap<String, Vec<SseEventBufferEntry>>, GatewayError> {
        let rows = sqlx::query(
            "SELECT * FROM sse_event_buffer WHERE session_id = $1 AND NOT consumed \
             ORDER BY task_id, event_sequence",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;
        let mut by_task: HashMap<String, Vec<SseEventBufferEntry>> = HashMap::new();
        for row in &rows {
            let entry = row_to_entry(row)?;
            by_task.entry(entry.task_id.clone()).or_default().push(entry);
        }
        Ok(by_task)
    }

    async fn delete_events_for_task(&self, task_id: &str) -> Result<u64, GatewayError> {
        let result = sqlx::query("DELETE FROM sse_event_buffer WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;
        Ok(result.rows_affected())
    }

    async fn cleanup_older_than(
        &self,
        cutoff_ms: EpochMillis,
        batch_size: u32,
    ) -> Result<u64, GatewayError> {
        let result = sqlx::query(
            "DELETE FROM sse_event_buffer WHERE id IN \
             (SELECT id FROM sse_event_buffer WHERE created_at < $1 LIMIT $2)",
        )
        .bind(cutoff_ms.0)
        .bind(batch_size as i64)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(result.rows_affected())
    }
}
