//! Session CRUD, project association, and the opaque chat-task upsert
//! (spec §4.5).

use std::sync::Arc;

use serde_json::Value;

use crate::error::GatewayError;
use crate::model::{ChatTask, CompressionMetadata, EpochMillis, Project, Session};
use crate::repository::{ChatTaskRepository, Page, Pagination, ProjectRepository, SessionRepository};

/// A session enriched with its project's display name, computed with one
/// extra batch lookup per page rather than a join per row (spec §4.5).
#[derive(Debug, Clone)]
pub struct SessionWithProject {
    pub session: Session,
    pub project_name: Option<String>,
}

pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    chat_tasks: Arc<dyn ChatTaskRepository>,
    projects: Arc<dyn ProjectRepository>,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        chat_tasks: Arc<dyn ChatTaskRepository>,
        projects: Arc<dyn ProjectRepository>,
    ) -> Self {
        Self {
            sessions,
            chat_tasks,
            projects,
        }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        name: Option<String>,
        agent_id: Option<String>,
        gateway_type: Option<String>,
        external_context_id: Option<String>,
    ) -> Result<Session, GatewayError> {
        let now = EpochMillis::now();
        self.sessions
            .create(Session {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                name,
                agent_id,
                project_id: None,
                created_time: now,
                updated_time: now,
                gateway_type,
                external_context_id,
                is_compression_branch: false,
                compression_metadata: None,
                deleted_at: None,
            })
            .await
    }

    /// Validates the id against the sentinel-string rule (spec §4.5, §8)
    /// before looking it up, and filters out other users' sessions and
    /// soft-deleted rows as `NotFound`.
    pub async fn get_owned_session(&self, id: &str, user_id: &str) -> Result<Session, GatewayError> {
        GatewayError::validate_id(id)?;
        let session = self
            .sessions
            .find_by_id(id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        if session.is_deleted() || !session.owned_by(user_id) {
            return Err(GatewayError::NotFound(format!("session {id}")));
        }
        Ok(session)
    }

    pub async fn get_user_sessions(
        &self,
        user_id: &str,
        pagination: Pagination,
        project_id: Option<&str>,
    ) -> Result<Page<SessionWithProject>, GatewayError> {
        let page = self.sessions.find_by_user(user_id, pagination, project_id).await?;
        self.enrich_with_project_names(page).await
    }

    pub async fn search_sessions(
        &self,
        user_id: &str,
        query: &str,
        project_id: Option<&str>,
        pagination: Pagination,
    ) -> Result<Page<SessionWithProject>, GatewayError> {
        let page = self.sessions.search(user_id, query, project_id, pagination).await?;
        self.enrich_with_project_names(page).await
    }

    async fn enrich_with_project_names(
        &self,
        page: Page<Session>,
    ) -> Result<Page<SessionWithProject>, GatewayError> {
        let project_ids: Vec<String> = page
            .data
            .iter()
            .filter_map(|s| s.project_id.clone())
            .collect();
        let projects: Vec<Project> = if project_ids.is_empty() {
            Vec::new()
        } else {
            self.projects.find_by_ids(&project_ids).await?
        };
        let data = page
            .data
            .into_iter()
            .map(|session| {
                let project_name = session
                    .project_id
                    .as_ref()
                    .and_then(|pid| projects.iter().find(|p| &p.id == pid))
                    .map(|p| p.name.clone());
                SessionWithProject {
                    session,
                    project_name,
                }
            })
            .collect();
        Ok(Page {
            data,
            total_count: page.total_count,
        })
    }

    pub async fn update_session_name(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
    ) -> Result<Session, GatewayError> {
        self.get_owned_session(id, user_id).await?;
        self.sessions.update_name(id, name).await
    }

    pub async fn move_session_to_project(
        &self,
        id: &str,
        user_id: &str,
        project_id: Option<&str>,
    ) -> Result<Session, GatewayError> {
        self.get_owned_session(id, user_id).await?;
        self.sessions.move_to_project(id, project_id).await
    }

    pub async fn soft_delete_session(&self, id: &str, user_id: &str) -> Result<bool, GatewayError> {
        self.get_owned_session(id, user_id).await?;
        self.sessions.soft_delete(id).await
    }

    /// Stamps `isCompressionBranch`/`compressionMetadata` on a freshly
    /// created branch session (spec §4.5 "Compress-and-branch" step 3).
    pub async fn mark_as_compression_branch(
        &self,
        id: &str,
        metadata: crate::model::CompressionMetadata,
    ) -> Result<Session, GatewayError> {
        self.sessions.set_compression_metadata(id, metadata).await
    }

    /// Upserts a `ChatTask` and touches the owning session's
    /// `updatedTime`. `message_bubbles`/`task_metadata` stay opaque
    /// strings (spec §4.5, §9).
    pub async fn save_task(
        &self,
        task_id: &str,
        session_id: &str,
        user_id: &str,
        user_message: Option<String>,
        message_bubbles: String,
        task_metadata: Option<String>,
    ) -> Result<ChatTask, GatewayError> {
        self.get_owned_session(session_id, user_id).await?;
        let existing_created = self
            .chat_tasks
            .find_by_id(task_id)
            .await?
            .map(|t| t.created_time);
        let saved = self
            .chat_tasks
            .upsert(ChatTask {
                id: task_id.to_string(),
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                user_message,
                message_bubbles,
                task_metadata: task_metadata.unwrap_or_else(|| "{}".to_string()),
                created_time: existing_created.unwrap_or_else(EpochMillis::now),
                updated_time: None,
            })
            .await?;
        self.sessions.touch_updated_time(session_id).await?;
        Ok(saved)
    }

    pub async fn get_session_tasks(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<ChatTask>, GatewayError> {
        self.get_owned_session(session_id, user_id).await?;
        self.chat_tasks.find_by_session(session_id).await
    }

    /// Flattens every task's `message_bubbles` JSON array into one
    /// chronological list of bubble objects (spec §4.5, §8: "exactly the
    /// concatenation, in createdTime order, of each ChatTask's flattened
    /// bubbles").
    pub async fn get_session_messages_from_tasks(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<Value>, GatewayError> {
        let tasks = self.get_session_tasks(session_id, user_id).await?;
        let mut messages = Vec::new();
        for task in tasks {
            match serde_json::from_str::<Vec<Value>>(&task.message_bubbles) {
                Ok(bubbles) => messages.extend(bubbles),
                Err(err) => {
                    log::warn!(
                        "task {} has non-array messageBubbles, skipping: {err}",
                        task.id
                    );
                }
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::{
        InMemoryChatTaskRepository, InMemoryProjectRepository, InMemorySessionRepository,
    };

    fn service() -> SessionService {
        SessionService::new(
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(InMemoryChatTaskRepository::new()),
            Arc::new(InMemoryProjectRepository::new()),
        )
    }

    #[tokio::test]
    async fn sentinel_session_ids_are_not_found() {
        let svc = service();
        let err = svc.get_owned_session("null", "u1").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn chat_task_upsert_touches_session_and_preserves_created_time() {
        let svc = service();
        let session = svc
            .create_session("u1", Some("untitled".to_string()), None, None, None)
            .await
            .unwrap();
        let first = svc
            .save_task(
                "t1",
                &session.id,
                "u1",
                Some("hi".to_string()),
                "[{\"id\":\"b1\",\"type\":\"user\",\"text\":\"hi\"}]".to_string(),
                None,
            )
            .await
            .unwrap();
        let second = svc
            .save_task(
                "t1",
                &session.id,
                "u1",
                Some("hi again".to_string()),
                "[{\"id\":\"b1\"},{\"id\":\"b2\"}]".to_string(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(second.created_time.0, first.created_time.0);
        assert_eq!(second.user_message.as_deref(), Some("hi again"));
    }

    #[tokio::test]
    async fn flattened_messages_concatenate_bubbles_across_tasks() {
        let svc = service();
        let session = svc.create_session("u1", None, None, None, None).await.unwrap();
        svc.save_task(
            "t1",
            &session.id,
            "u1",
            None,
            "[{\"id\":\"a\"}]".to_string(),
            None,
        )
        .await
        .unwrap();
        svc.save_task(
            "t2",
            &session.id,
            "u1",
            None,
            "[{\"id\":\"b\"},{\"id\":\"c\"}]".to_string(),
            None,
        )
        .await
        .unwrap();
        let messages = svc
            .get_session_messages_from_tasks(&session.id, "u1")
            .await
            .unwrap();
        assert_eq!(messages.len(), 3);
    }
}
