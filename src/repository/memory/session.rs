use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{ChatTask, EpochMillis, Session};
use crate::repository::{ChatTaskRepository, Page, Pagination, SessionRepository};

#[derive(Default)]
pub struct InMemorySessionRepository {
    rows: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: Session) -> Result<Session, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&session.id) {
            return Err(GatewayError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        rows.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Session>, GatewayError> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn find_by_external_context(
        &self,
        user_id: &str,
        external_context_id: &str,
    ) -> Result<Option<Session>, GatewayError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| {
                s.user_id == user_id
                    && s.external_context_id.as_deref() == Some(external_context_id)
                    && !s.is_deleted()
            })
            .cloned())
    }

    async fn find_by_user(
        &self,
        user_id: &str,
        pagination: Pagination,
        project_id: Option<&str>,
    ) -> Result<Page<Session>, GatewayError> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<Session> = rows
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && !s.is_deleted()
                    && project_id.map_or(true, |p| s.project_id.as_deref() == Some(p))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_time.0.cmp(&a.updated_time.0));
        let total_count = matching.len() as u64;
        let offset = pagination.offset() as usize;
        let data = matching
            .into_iter()
            .skip(offset)
            .take(pagination.page_size as usize)
            .collect();
        Ok(Page { data, total_count })
    }

    async fn search(
        &self,
        user_id: &str,
        query: &str,
        project_id: Option<&str>,
        pagination: Pagination,
    ) -> Result<Page<Session>, GatewayError> {
        let needle = query.to_lowercase();
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<Session> = rows
            .values()
            .filter(|s| {
                s.user_id == user_id
                    && !s.is_deleted()
                    && project_id.map_or(true, |p| s.project_id.as_deref() == Some(p))
                    && s.name
                        .as_deref()
                        .map_or(false, |n| n.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_time.0.cmp(&a.updated_time.0));
        let total_count = matching.len() as u64;
        let offset = pagination.offset() as usize;
        let data = matching
            .into_iter()
            .skip(offset)
            .take(pagination.page_size as usize)
            .collect();
        Ok(Page { data, total_count })
    }

    async fn update_name(&self, id: &str, name: &str) -> Result<Session, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let session = rows
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        session.name = Some(name.to_string());
        session.updated_time = EpochMillis::now();
        Ok(session.clone())
    }

    async fn move_to_project(
        &self,
        id: &str,
        project_id: Option<&str>,
    ) -> Result<Session, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let session = rows
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        session.project_id = project_id.map(|s| s.to_string());
        session.updated_time = EpochMillis::now();
        Ok(session.clone())
    }

    async fn touch_updated_time(&self, id: &str) -> Result<(), GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let session = rows
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        session.updated_time = EpochMillis::now();
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let session = rows
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        if session.is_deleted() {
            return Ok(false);
        }
        session.deleted_at = Some(EpochMillis::now());
        Ok(true)
    }

    async fn set_compression_metadata(
        &self,
        id: &str,
        metadata: crate::model::CompressionMetadata,
    ) -> Result<Session, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let session = rows
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        session.is_compression_branch = true;
        session.compression_metadata = Some(metadata);
        session.updated_time = EpochMillis::now();
        Ok(session.clone())
    }
}

#[derive(Default)]
pub struct InMemoryChatTaskRepository {
    rows: Mutex<HashMap<String, ChatTask>>,
}

impl InMemoryChatTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatTaskRepository for InMemoryChatTaskRepository {
    async fn upsert(&self, mut task: ChatTask) -> Result<ChatTask, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.get(&task.id) {
            task.created_time = existing.created_time;
        }
        task.updated_time = Some(EpochMillis::now());
        rows.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Vec<ChatTask>, GatewayError> {
        let mut tasks: Vec<ChatTask> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_time.0.cmp(&b.created_time.0));
        Ok(tasks)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ChatTask>, GatewayError> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;

    fn sample_session(id: &str, user_id: &str) -> Session {
        Session {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: Some("untitled".to_string()),
            agent_id: Some("agent-a".to_string()),
            project_id: None,
            created_time: EpochMillis::now(),
            updated_time: EpochMillis::now(),
            gateway_type: Some("webui".to_string()),
            external_context_id: None,
            is_compression_branch: false,
            compression_metadata: None,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn soft_delete_is_idempotent() {
        let repo = InMemorySessionRepository::new();
        repo.create(sample_session("s1", "u1")).await.unwrap();
        assert!(repo.soft_delete("s1").await.unwrap());
        assert!(!repo.soft_delete("s1").await.unwrap());
    }

    #[tokio::test]
    async fn chat_task_upsert_preserves_created_time() {
        let repo = InMemoryChatTaskRepository::new();
        let first = repo
            .upsert(ChatTask {
                id: "t1".to_string(),
                session_id: "s1".to_string(),
                user_id: "u1".to_string(),
                user_message: Some("hi".to_string()),
                message_bubbles: "[]".to_string(),
                task_metadata: "{}".to_string(),
                created_time: EpochMillis(1000),
                updated_time: None,
            })
            .await
            .unwrap();
        let second = repo
            .upsert(ChatTask {
                created_time: EpochMillis(9999),
                ..first
            })
            .await
            .unwrap();
        assert_eq!(second.created_time.0, 1000);
    }
}
