use async_trait::async_trait;
use sqlx::Row;

use crate::error::{classify_db_error, GatewayError};
use crate::model::{ChatTask, CompressionMetadata, EpochMillis, Session};
use crate::repository::{ChatTaskRepository, Page, Pagination, SessionRepository};

use super::PgBackend;

fn row_to_session(row: &sqlx::postgres::PgRow) -> Result<Session, GatewayError> {
    let compression_metadata: Option<serde_json::Value> = row.try_get("compression_metadata").ok().flatten();
    Ok(Session {
        id: row.try_get("id").map_err(classify_db_error)?,
        user_id: row.try_get("user_id").map_err(classify_db_error)?,
        name: row.try_get("name").map_err(classify_db_error)?,
        agent_id: row.try_get("agent_id").map_err(classify_db_error)?,
        project_id: row.try_get("project_id").map_err(classify_db_error)?,
        created_time: EpochMillis(row.try_get("created_time").map_err(classify_db_error)?),
        updated_time: EpochMillis(row.try_get("updated_time").map_err(classify_db_error)?),
        gateway_type: row.try_get("gateway_type").map_err(classify_db_error)?,
        external_context_id: row.try_get("external_context_id").map_err(classify_db_error)?,
        is_compression_branch: row.try_get("is_compression_branch").map_err(classify_db_error)?,
        compression_metadata: compression_metadata
            .map(|v| serde_json::from_value::<CompressionMetadata>(v))
            .transpose()
            .map_err(|e| GatewayError::Internal(e.to_string()))?,
        deleted_at: row
            .try_get::<Option<i64>, _>("deleted_at")
            .map_err(classify_db_error)?
            .map(EpochMillis),
    })
}

#[async_trait]
impl SessionRepository for PgBackend {
    async fn create(&self, session: Session) -> Result<Session, GatewayError> {
        let compression_metadata = session
            .compression_metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO sessions (id, user_id, name, agent_id, project_id, created_time, \
             updated_time, gateway_type, external_context_id, is_compression_branch, \
             compression_metadata, deleted_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.name)
        .bind(&session.agent_id)
        .bind(&session.project_id)
        .bind(session.created_time.0)
        .bind(session.updated_time.0)
        .bind(&session.gateway_type)
        .bind(&session.external_context_id)
        .bind(session.is_compression_branch)
        .bind(&compression_metadata)
        .bind(session.deleted_at.map(|t| t.0))
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(session),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(GatewayError::Conflict(format!("session {} already exists", session.id)))
            }
            Err(e) => Err(classify_db_error(e)),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Session>, GatewayError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn find_by_external_context(
        &self,
        user_id: &str,
        external_context_id: &str,
    ) -> Result<Option<Session>, GatewayError> {
        let row = sqlx::query(
            "SELECT * FROM sessions WHERE user_id = $1 AND external_context_id = $2 \
             AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(external_context_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn find_by_user(
        &self,
        user_id: &str,
        pagination: Pagination,
        project_id: Option<&str>,
    ) -> Result<Page<Session>, GatewayError> {
        let total_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND deleted_at IS NULL \
             AND ($2::TEXT IS NULL OR project_id = $2)",
        )
        .bind(user_id)
        .bind(project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_db_error)?;

        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE user_id = $1 AND deleted_at IS NULL \
             AND ($2::TEXT IS NULL OR project_id = $2) \
             ORDER BY updated_time DESC LIMIT $3 OFFSET $4",
        )
        .bind(user_id)
        .bind(project_id)
        .bind(pagination.page_size as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;

        let data = rows.iter().map(row_to_session).collect::<Result<_, _>>()?;
        Ok(Page { data, total_count: total_count as u64 })
    }

    async fn search(
        &self,
        user_id: &str,
        query: &str,
        project_id: Option<&str>,
        pagination: Pagination,
    ) -> Result<Page<Session>, GatewayError> {
        let pattern = format!("%{query}%");
        let total_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND deleted_at IS NULL \
             AND name ILIKE $2 AND ($3::TEXT IS NULL OR project_id = $3)",
        )
        .bind(user_id)
        .bind(&pattern)
        .bind(project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_db_error)?;

        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE user_id = $1 AND deleted_at IS NULL \
             AND name ILIKE $2 AND ($3::TEXT IS NULL OR project_id = $3) \
             ORDER BY updated_time DESC LIMIT $4 OFFSET $5",
        )
        .bind(user_id)
        .bind(&pattern)
        .bind(project_id)
        .bind(pagination.page_size as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;

        let data = rows.iter().map(row_to_session).collect::<Result<_, _>>()?;
        Ok(Page { data, total_count: total_count as u64 })
    }

    async fn update_name(&self, id: &str, name: &str) -> Result<Session, GatewayError> {
        let now = EpochMillis::now();
        let row = sqlx::query(
            "UPDATE sessions SET name = $1, updated_time = $2 WHERE id = $3 RETURNING *",
        )
        .bind(name)
        .bind(now.0)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?
        .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        row_to_session(&row)
    }

    async fn move_to_project(
        &self,
        id: &str,
        project_id: Option<&str>,
    ) -> Result<Session, GatewayError> {
        let now = EpochMillis::now();
        let row = sqlx::query(
            "UPDATE sessions SET project_id = $1, updated_time = $2 WHERE id = $3 RETURNING *",
        )
        .bind(project_id)
        .bind(now.0)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?
        .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        row_to_session(&row)
    }

    async fn touch_updated_time(&self, id: &str) -> Result<(), GatewayError> {
        let now = EpochMillis::now();
        let result = sqlx::query("UPDATE sessions SET updated_time = $1 WHERE id = $2")
            .bind(now.0)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError> {
        let now = EpochMillis::now();
        let result = sqlx::query(
            "UPDATE sessions SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(now.0)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(classify_db_error)?;
            if exists.is_none() {
                return Err(GatewayError::NotFound(format!("session {id}")));
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn set_compression_metadata(
        &self,
        id: &str,
        metadata: CompressionMetadata,
    ) -> Result<Session, GatewayError> {
        let now = EpochMillis::now();
        let metadata_json =
            serde_json::to_value(&metadata).map_err(|e| GatewayError::Internal(e.to_string()))?;
        let row = sqlx::query(
            "UPDATE sessions SET is_compression_branch = TRUE, compression_metadata = $1, \
             updated_time = $2 WHERE id = $3 RETURNING *",
        )
        .bind(&metadata_json)
        .bind(now.0)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?
        .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        row_to_session(&row)
    }
}

fn row_to_chat_task(row: &sqlx::postgres::PgRow) -> Result<ChatTask, GatewayError> {
    Ok(ChatTask {
        id: row.try_get("id").map_err(classify_db_error)?,
        session_id: row.try_get("session_id").map_err(classify_db_error)?,
        user_id: row.try_get("user_id").map_err(classify_db_error)?,
        user_message: row.try_get("user_message").map_err(classify_db_error)?,
        message_bubbles: row.try_get("message_bubbles").map_err(classify_db_error)?,
        task_metadata: row.try_get("task_metadata").map_err(classify_db_error)?,
        created_time: EpochMillis(row.try_get("created_time").map_err(classify_db_error)?),
        updated_time: row
            .try_get::<Option<i64>, _>("updated_time")
            .map_err(classify_db_error)?
            .map(EpochMillis),
    })
}

#[async_trait]
impl ChatTaskRepository for PgBackend {
    async fn upsert(&self, task: ChatTask) -> Result<ChatTask, GatewayError> {
        let now = EpochMillis::now();
        let row = sqlx::query(
            "INSERT INTO chat_tasks (id, session_id, user_id, user_message, message_bubbles, \
             task_metadata, created_time, updated_time) VALUES ($1,$2,$3,$4,$5,$6,$7,$8) \
             ON CONFLICT (id) DO UPDATE SET user_message = EXCLUDED.user_message, \
             message_bubbles = EXCLUDED.message_bubbles, task_metadata = EXCLUDED.task_metadata, \
             updated_time = EXCLUDED.updated_time RETURNING *",
        )
        .bind(&task.id)
        .bind(&task.session_id)
        .bind(&task.user_id)
        .bind(&task.user_message)
        .bind(&task.message_bubbles)
        .bind(&task.task_metadata)
        .bind(task.created_time.0)
        .bind(now.0)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_db_error)?;
        row_to_chat_task(&row)
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Vec<ChatTask>, GatewayError> {
        let rows = sqlx::query("SELECT * FROM chat_tasks WHERE session_id = $1 ORDER BY created_time")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;
        rows.iter().map(row_to_chat_task).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ChatTask>, GatewayError> {
        let row = sqlx::query("SELECT * FROM chat_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?;
        row.as_ref().map(row_to_chat_task).transpose()
    }
}
