use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{EpochMillis, ExecutionStatus, ScheduledTask, ScheduledTaskExecution, SchedulerLock};
use crate::repository::ScheduledTaskRepository;

#[derive(Default)]
pub struct InMemoryScheduledTaskRepository {
    tasks: Mutex<HashMap<String, ScheduledTask>>,
    executions: Mutex<HashMap<String, ScheduledTaskExecution>>,
    lock: Mutex<Option<SchedulerLock>>,
}

impl InMemoryScheduledTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduledTaskRepository for InMemoryScheduledTaskRepository {
    async fn create(&self, task: ScheduledTask) -> Result<ScheduledTask, GatewayError> {
        let mut tasks = self.tasks.lock().unwrap();
        let duplicate = tasks.values().any(|t| {
            t.namespace == task.namespace && t.name == task.name && !t.is_deleted()
        });
        if duplicate {
            return Err(GatewayError::Conflict(format!(
                "scheduled task {} already exists in namespace {}",
                task.name, task.namespace
            )));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ScheduledTask>, GatewayError> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn find_enabled_in_namespace(
        &self,
        namespace: &str,
    ) -> Result<Vec<ScheduledTask>, GatewayError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.namespace == namespace && t.enabled && !t.is_deleted())
            .cloned()
            .collect())
    }

    async fn find_by_name_in_namespace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ScheduledTask>, GatewayError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .find(|t| t.namespace == namespace && t.name == name && !t.is_deleted())
            .cloned())
    }

    async fn update(&self, task: ScheduledTask) -> Result<ScheduledTask, GatewayError> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(GatewayError::NotFound(format!("scheduled task {}", task.id)));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), GatewayError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("scheduled task {id}")))?;
        task.enabled = enabled;
        Ok(())
    }

    async fn record_fired(&self, id: &str, at: EpochMillis) -> Result<(), GatewayError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("scheduled task {id}")))?;
        task.last_run_at = Some(at);
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("scheduled task {id}")))?;
        if task.is_deleted() {
            return Ok(false);
        }
        task.deleted_at = Some(EpochMillis::now());
        Ok(true)
    }

    async fn create_execution(
        &self,
        execution: ScheduledTaskExecution,
    ) -> Result<ScheduledTaskExecution, GatewayError> {
        self.executions
            .lock()
            .unwrap()
            .insert(execution.id.clone(), execution.clone());
        Ok(execution)
    }

    async fn update_execution(
        &self,
        execution: ScheduledTaskExecution,
    ) -> Result<ScheduledTaskExecution, GatewayError> {
        let mut executions = self.executions.lock().unwrap();
        if !executions.contains_key(&execution.id) {
            return Err(GatewayError::NotFound(format!("execution {}", execution.id)));
        }
        executions.insert(execution.id.clone(), execution.clone());
        Ok(execution)
    }

    async fn find_execution_by_a2a_task_id(
        &self,
        a2a_task_id: &str,
    ) -> Result<Option<ScheduledTaskExecution>, GatewayError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .values()
            .find(|e| e.a2a_task_id.as_deref() == Some(a2a_task_id))
            .cloned())
    }

    async fn find_running_executions(&self) -> Result<Vec<ScheduledTaskExecution>, GatewayError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.status == ExecutionStatus::Running)
            .cloned()
            .collect())
    }

    async fn find_executions_for_task(
        &self,
        scheduled_task_id: &str,
    ) -> Result<Vec<ScheduledTaskExecution>, GatewayError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.scheduled_task_id == scheduled_task_id)
            .cloned()
            .collect())
    }

    async fn try_acquire_lock(
        &self,
        candidate_leader_id: &str,
        candidate_namespace: &str,
        lease_duration_ms: i64,
    ) -> Result<bool, GatewayError> {
        let mut lock = self.lock.lock().unwrap();
        let now = EpochMillis::now();
        let vacant = match lock.as_ref() {
            None => true,
            Some(existing) => existing.is_expired(now) || existing.leader_id == candidate_leader_id,
        };
        if !vacant {
            return Ok(false);
        }
        *lock = Some(SchedulerLock {
            leader_id: candidate_leader_id.to_string(),
            leader_namespace: candidate_namespace.to_string(),
            acquired_at: now,
            expires_at: now.plus_millis(lease_duration_ms),
            heartbeat_at: now,
        });
        Ok(true)
    }

    async fn heartbeat_lock(
        &self,
        leader_id: &str,
        lease_duration_ms: i64,
    ) -> Result<bool, GatewayError> {
        let mut lock = self.lock.lock().unwrap();
        let now = EpochMillis::now();
        match lock.as_mut() {
            Some(existing) if existing.leader_id == leader_id && !existing.is_expired(now) => {
                existing.heartbeat_at = now;
                existing.expires_at = now.plus_millis(lease_duration_ms);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn read_lock(&self) -> Result<Option<SchedulerLock>, GatewayError> {
        Ok(self.lock.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_candidate_cannot_steal_an_unexpired_lock() {
        let repo = InMemoryScheduledTaskRepository::new();
        assert!(repo.try_acquire_lock("gw-a", "default", 60_000).await.unwrap());
        assert!(!repo.try_acquire_lock("gw-b", "default", 60_000).await.unwrap());
    }

    #[tokio::test]
    async fn heartbeat_extends_only_for_current_leader() {
        let repo = InMemoryScheduledTaskRepository::new();
        repo.try_acquire_lock("gw-a", "default", 60_000).await.unwrap();
        assert!(repo.heartbeat_lock("gw-a", 60_000).await.unwrap());
        assert!(!repo.heartbeat_lock("gw-b", 60_000).await.unwrap());
    }
}
