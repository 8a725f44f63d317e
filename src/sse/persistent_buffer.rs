//! Persists SSE events for tasks that have no live connection yet, and
//! tracks a small per-task metadata cache so replay doesn't need a join
//! back to the tasks table on every event (spec §4.3, grounded on the
//! persistent event buffer's metadata-cache design).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::GatewayError;
use crate::model::SseEventBufferEntry;
use crate::repository::SseEventBufferRepository;

#[derive(Debug, Clone)]
struct TaskMeta {
    session_id: String,
    user_id: String,
}

/// Wraps an `SseEventBufferRepository` with the `(sessionId, userId)` cache
/// callers would otherwise have to thread through every call.
pub struct PersistentEventBuffer {
    repo: Arc<dyn SseEventBufferRepository>,
    task_meta: Mutex<HashMap<String, TaskMeta>>,
}

impl PersistentEventBuffer {
    pub fn new(repo: Arc<dyn SseEventBufferRepository>) -> Self {
        Self {
            repo,
            task_meta: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `(session_id, user_id)` for `task_id` so later
    /// `buffer_event` calls don't need them re-supplied.
    pub fn register_task(&self, task_id: &str, session_id: &str, user_id: &str) {
        self.task_meta.lock().unwrap().insert(
            task_id.to_string(),
            TaskMeta {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }

    pub async fn buffer_event(
        &self,
        task_id: &str,
        event_type: &str,
        event_data: Value,
    ) -> Result<SseEventBufferEntry, GatewayError> {
        let meta = self
            .task_meta
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| {
                GatewayError::Internal(format!("no registered session/user for task {task_id}"))
            })?;
        self.repo
            .buffer_event(task_id, &meta.session_id, &meta.user_id, event_type, event_data)
            .await
    }

    pub async fn get_buffered_events(
        &self,
        task_id: &str,
        mark_consumed: bool,
    ) -> Result<Vec<SseEventBufferEntry>, GatewayError> {
        self.repo.get_buffered_events(task_id, mark_consumed).await
    }

    pub async fn has_unconsumed_events(&self, task_id: &str) -> Result<bool, GatewayError> {
        self.repo.has_unconsumed_events(task_id).await
    }

    pub async fn get_unconsumed_events_for_session(
        &self,
        session_id: &str,
    ) -> Result<HashMap<String, Vec<SseEventBufferEntry>>, GatewayError> {
        self.repo.get_unconsumed_events_for_session(session_id).await
    }

    /// Drops both the stored events and the metadata cache entry for a
    /// finished task (spec §4.3).
    pub async fn delete_events_for_task(&self, task_id: &str) -> Result<u64, GatewayError> {
        self.task_meta.lock().unwrap().remove(task_id);
        self.repo.delete_events_for_task(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemorySseEventBufferRepository;

    #[tokio::test]
    async fn buffering_without_registration_fails_fast() {
        let buffer = PersistentEventBuffer::new(Arc::new(InMemorySseEventBufferRepository::new()));
        let result = buffer
            .buffer_event("t1", "status-update", serde_json::json!({}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn registered_task_buffers_and_replays() {
        let buffer = PersistentEventBuffer::new(Arc::new(InMemorySseEventBufferRepository::new()));
        buffer.register_task("t1", "s1", "u1");
        buffer
            .buffer_event("t1", "status-update", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        assert!(buffer.has_unconsumed_events("t1").await.unwrap());
        let events = buffer.get_buffered_events("t1", true).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(!buffer.has_unconsumed_events("t1").await.unwrap());
    }
}
