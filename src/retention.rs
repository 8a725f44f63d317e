//! Periodic batched pruning of tasks, feedback, and SSE event backlogs
//! (spec §4.11), supplemented from `original_source`'s
//! `data_retention_service.py`.

use std::sync::Arc;

use crate::config::RetentionConfig;
use crate::error::GatewayError;
use crate::model::EpochMillis;
use crate::repository::{FeedbackRepository, SseEventBufferRepository, TaskRepository};

pub struct DataRetentionService {
    tasks: Arc<dyn TaskRepository>,
    feedback: Arc<dyn FeedbackRepository>,
    sse_events: Arc<dyn SseEventBufferRepository>,
    config: RetentionConfig,
}

/// Rows deleted per repository in one sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionSweepResult {
    pub tasks_deleted: u64,
    pub feedback_deleted: u64,
    pub sse_events_deleted: u64,
}

impl DataRetentionService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        feedback: Arc<dyn FeedbackRepository>,
        sse_events: Arc<dyn SseEventBufferRepository>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            tasks,
            feedback,
            sse_events,
            config: config.clamped(),
        }
    }

    /// Computes one cutoff per repository from its own retention window
    /// and deletes in batches until nothing older than the cutoff remains
    /// (spec §4.11).
    pub async fn run_sweep(&self) -> Result<RetentionSweepResult, GatewayError> {
        let now = EpochMillis::now();
        let tasks_deleted = self
            .tasks
            .delete_tasks_older_than(
                days_before(now, self.config.task_retention_days),
                self.config.batch_size,
            )
            .await?;
        let feedback_deleted = self
            .feedback
            .delete_older_than(
                days_before(now, self.config.feedback_retention_days),
                self.config.batch_size,
            )
            .await?;
        let sse_events_deleted = self
            .sse_events
            .cleanup_older_than(
                days_before(now, self.config.sse_event_retention_days),
                self.config.batch_size,
            )
            .await?;
        log::info!(
            "retention sweep deleted {tasks_deleted} task(s), {feedback_deleted} feedback row(s), {sse_events_deleted} sse event(s)"
        );
        Ok(RetentionSweepResult {
            tasks_deleted,
            feedback_deleted,
            sse_events_deleted,
        })
    }

    /// Runs `run_sweep` on `config.cleanup_interval_hours` until the
    /// process exits.
    pub async fn run_forever(self: Arc<Self>) {
        let interval_duration = std::time::Duration::from_secs(self.config.cleanup_interval_hours as u64 * 3600);
        let mut interval = tokio::time::interval(interval_duration);
        loop {
            interval.tick().await;
            if let Err(err) = self.run_sweep().await {
                log::error!("retention sweep failed: {err}");
            }
        }
    }
}

fn days_before(now: EpochMillis, days: u32) -> EpochMillis {
    EpochMillis(now.0 - (days as i64) * 24 * 60 * 60 * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventDirection, Task, TaskEvent, TaskStatus};
    use crate::repository::memory::{
        InMemoryFeedbackRepository, InMemorySseEventBufferRepository, InMemoryTaskRepository,
    };

    #[tokio::test]
    async fn sweep_prunes_tasks_older_than_the_configured_window() {
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let old_task = Task {
            id: "old".to_string(),
            user_id: "u1".to_string(),
            start_time: EpochMillis(0),
            end_time: Some(EpochMillis(1)),
            status: Some(TaskStatus::Completed),
            initial_request_text: None,
            agent_name: None,
            background_execution_enabled: false,
            max_execution_time_ms: None,
            last_activity_time: None,
            session_id: None,
        };
        tasks.save_task(old_task).await.unwrap();
        tasks
            .save_event(TaskEvent {
                id: "e1".to_string(),
                task_id: "old".to_string(),
                user_id: Some("u1".to_string()),
                created_time: EpochMillis::now(),
                topic: "t".to_string(),
                direction: EventDirection::Request,
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();

        let service = DataRetentionService::new(
            tasks.clone(),
            Arc::new(InMemoryFeedbackRepository::new()),
            Arc::new(InMemorySseEventBufferRepository::new()),
            RetentionConfig {
                task_retention_days: 1,
                ..RetentionConfig::default()
            },
        );
        let result = service.run_sweep().await.unwrap();
        assert_eq!(result.tasks_deleted, 1);
        assert!(tasks.find_by_id("old").await.unwrap().is_none());
    }
}
