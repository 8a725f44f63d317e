use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{EpochMillis, Task, TaskEvent, TaskStatus};
use crate::repository::TaskRepository;

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
    events: Mutex<HashMap<String, Vec<TaskEvent>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save_task(&self, task: Task) -> Result<Task, GatewayError> {
        self.tasks.lock().unwrap().insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn save_event(&self, event: TaskEvent) -> Result<TaskEvent, GatewayError> {
        self.events
            .lock()
            .unwrap()
            .entry(event.task_id.clone())
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Task>, GatewayError> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn find_by_id_with_events(
        &self,
        id: &str,
    ) -> Result<Option<(Task, Vec<TaskEvent>)>, GatewayError> {
        let task = self.tasks.lock().unwrap().get(id).cloned();
        match task {
            Some(task) => {
                let events = self.events.lock().unwrap().get(id).cloned().unwrap_or_default();
                Ok(Some((task, events)))
            }
            None => Ok(None),
        }
    }

    async fn find_events_since(
        &self,
        task_id: &str,
        since_timestamp: Option<EpochMillis>,
        limit: u32,
    ) -> Result<(Vec<TaskEvent>, bool), GatewayError> {
        let events = self.events.lock().unwrap().get(task_id).cloned().unwrap_or_default();
        let filtered: Vec<TaskEvent> = events
            .into_iter()
            .filter(|e| since_timestamp.map_or(true, |since| e.created_time.0 > since.0))
            .collect();
        let has_more = filtered.len() > limit as usize;
        let page = filtered.into_iter().take(limit as usize).collect();
        Ok((page, has_more))
    }

    async fn search(&self, user_id: &str, query: &str) -> Result<Vec<Task>, GatewayError> {
        let needle = query.to_lowercase();
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| {
                t.user_id == user_id
                    && t.initial_request_text
                        .as_deref()
                        .map_or(false, |text| text.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect())
    }

    async fn find_background_tasks_by_status(
        &self,
        status: TaskStatus,
    ) -> Result<Vec<Task>, GatewayError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.background_execution_enabled && t.status == Some(status))
            .cloned()
            .collect())
    }

    async fn find_active_background_tasks_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Task>, GatewayError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| {
                t.user_id == user_id
                    && t.background_execution_enabled
                    && t.status == Some(TaskStatus::Running)
            })
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        end_time: Option<EpochMillis>,
    ) -> Result<(), GatewayError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("task {id}")))?;
        task.status = Some(status);
        if end_time.is_some() {
            task.end_time = end_time;
        }
        Ok(())
    }

    async fn touch_activity(&self, id: &str, at: EpochMillis) -> Result<(), GatewayError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("task {id}")))?;
        task.last_activity_time = Some(at);
        Ok(())
    }

    async fn delete_tasks_older_than(
        &self,
        cutoff_ms: EpochMillis,
        batch_size: u32,
    ) -> Result<u64, GatewayError> {
        let mut tasks = self.tasks.lock().unwrap();
        let stale: Vec<String> = tasks
            .values()
            .filter(|t| t.start_time.0 < cutoff_ms.0)
            .take(batch_size as usize)
            .map(|t| t.id.clone())
            .collect();
        let mut events = self.events.lock().unwrap();
        for id in &stale {
            tasks.remove(id);
            events.remove(id);
        }
        Ok(stale.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(id: &str, start_time: i64) -> Task {
        Task {
            id: id.to_string(),
            user_id: "u1".to_string(),
            start_time: EpochMillis(start_time),
            end_time: None,
            status: Some(TaskStatus::Running),
            initial_request_text: Some("hello world".to_string()),
            agent_name: Some("agent-a".to_string()),
            background_execution_enabled: true,
            max_execution_time_ms: None,
            last_activity_time: Some(EpochMillis(start_time)),
            session_id: Some("s1".to_string()),
        }
    }

    #[tokio::test]
    async fn deletes_only_tasks_older_than_cutoff() {
        let repo = InMemoryTaskRepository::new();
        repo.save_task(sample_task("old", 100)).await.unwrap();
        repo.save_task(sample_task("new", 10_000)).await.unwrap();
        let deleted = repo.delete_tasks_older_than(EpochMillis(5_000), 100).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.find_by_id("old").await.unwrap().is_none());
        assert!(repo.find_by_id("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn events_since_reports_has_more() {
        let repo = InMemoryTaskRepository::new();
        for i in 0..5 {
            repo.save_event(TaskEvent {
                id: format!("e{i}"),
                task_id: "t1".to_string(),
                user_id: None,
                created_time: EpochMillis(i),
                topic: "topic".to_string(),
                direction: crate::model::EventDirection::Response,
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        }
        let (page, has_more) = repo.find_events_since("t1", None, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(has_more);
    }
}
