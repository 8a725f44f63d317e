//! Orphan recovery and timeout enforcement for background tasks (spec
//! §4.10), supplemented from `original_source`'s
//! `background_task_monitor.py`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::BackgroundTaskMonitorConfig;
use crate::dispatcher::TaskDispatcher;
use crate::error::GatewayError;
use crate::model::{EpochMillis, TaskStatus};
use crate::repository::TaskRepository;

pub struct BackgroundTaskMonitor {
    tasks: Arc<dyn TaskRepository>,
    dispatcher: Arc<TaskDispatcher>,
    config: BackgroundTaskMonitorConfig,
    recovered: AtomicBool,
}

impl BackgroundTaskMonitor {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        dispatcher: Arc<TaskDispatcher>,
        config: BackgroundTaskMonitorConfig,
    ) -> Self {
        Self {
            tasks,
            dispatcher,
            config,
            recovered: AtomicBool::new(false),
        }
    }

    /// Marks every running background task with no `endTime` as
    /// `interrupted`. Runs at most once per process lifetime (spec §4.10
    /// "On first call only").
    pub async fn recover_orphans_once(&self) -> Result<u64, GatewayError> {
        if self.recovered.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }
        let orphaned = self.tasks.find_background_tasks_by_status(TaskStatus::Running).await?;
        let now = EpochMillis::now();
        let mut count = 0;
        for task in orphaned {
            if task.end_time.is_some() {
                continue;
            }
            self.tasks
                .update_status(&task.id, TaskStatus::Interrupted, Some(now))
                .await?;
            count += 1;
        }
        log::info!("background task monitor recovered {count} orphaned task(s)");
        Ok(count)
    }

    /// Scans running background tasks and marks the stale ones `timeout`,
    /// best-effort cancelling each at its owning agent (spec §4.10).
    pub async fn sweep_timeouts(&self) -> Result<u64, GatewayError> {
        let running = self.tasks.find_background_tasks_by_status(TaskStatus::Running).await?;
        let now = EpochMillis::now();
        let mut timed_out = 0;
        for task in running {
            if !task.is_stale(now, self.config.default_max_execution_time_ms) {
                continue;
            }
            self.tasks
                .update_status(&task.id, TaskStatus::Timeout, Some(now))
                .await?;
            timed_out += 1;
            match &task.agent_name {
                Some(agent_name) => self.dispatcher.cancel(&task.id, agent_name).await,
                None => log::warn!("task {} timed out with no agentName, skipping cancellation", task.id),
            }
        }
        Ok(timed_out)
    }

    /// Runs `sweep_timeouts` on `config.sweep_interval` until the process
    /// exits. Intended to be spawned once at startup, after
    /// `recover_orphans_once`.
    pub async fn run_forever(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        loop {
            interval.tick().await;
            if let Err(err) = self.sweep_timeouts().await {
                log::error!("background task timeout sweep failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::config::SseConfig;
    use crate::model::Task;
    use crate::repository::memory::{InMemorySseEventBufferRepository, InMemoryTaskRepository};
    use crate::sse::{PersistentEventBuffer, SseManager};

    fn make_monitor(config: BackgroundTaskMonitorConfig) -> (Arc<BackgroundTaskMonitor>, Arc<dyn TaskRepository>) {
        let tasks: Arc<dyn TaskRepository> = Arc::new(InMemoryTaskRepository::new());
        let bus = Arc::new(InMemoryBus::new());
        let sse_manager = Arc::new(SseManager::new(SseConfig::default()));
        let buffer = Arc::new(PersistentEventBuffer::new(Arc::new(InMemorySseEventBufferRepository::new())));
        let dispatcher = Arc::new(TaskDispatcher::new(
            bus,
            sse_manager,
            buffer,
            tasks.clone(),
            "myns/".to_string(),
            "gw-1".to_string(),
        ));
        let monitor = Arc::new(BackgroundTaskMonitor::new(tasks.clone(), dispatcher, config));
        (monitor, tasks)
    }

    fn running_task(id: &str, last_activity_secs_ago: i64) -> Task {
        let now = EpochMillis::now();
        Task {
            id: id.to_string(),
            user_id: "u1".to_string(),
            start_time: now,
            end_time: None,
            status: Some(TaskStatus::Running),
            initial_request_text: None,
            agent_name: Some("assistant".to_string()),
            background_execution_enabled: true,
            max_execution_time_ms: None,
            last_activity_time: Some(EpochMillis(now.0 - last_activity_secs_ago * 1000)),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn orphan_recovery_only_runs_once() {
        let config = BackgroundTaskMonitorConfig {
            default_max_execution_time_ms: 60_000,
            sweep_interval: std::time::Duration::from_secs(30),
        };
        let (monitor, tasks) = make_monitor(config);
        tasks.save_task(running_task("t1", 0)).await.unwrap();
        let first = monitor.recover_orphans_once().await.unwrap();
        assert_eq!(first, 1);
        let task = tasks.find_by_id("t1").await.unwrap().unwrap();
        assert_eq!(task.status, Some(TaskStatus::Interrupted));

        tasks.save_task(running_task("t2", 0)).await.unwrap();
        let second = monitor.recover_orphans_once().await.unwrap();
        assert_eq!(second, 0);
        let still_running = tasks.find_by_id("t2").await.unwrap().unwrap();
        assert_eq!(still_running.status, Some(TaskStatus::Running));
    }

    #[tokio::test]
    async fn stale_tasks_are_marked_timeout() {
        let config = BackgroundTaskMonitorConfig {
            default_max_execution_time_ms: 10_000,
            sweep_interval: std::time::Duration::from_secs(30),
        };
        let (monitor, tasks) = make_monitor(config);
        tasks.save_task(running_task("stale", 3600)).await.unwrap();
        tasks.save_task(running_task("fresh", 0)).await.unwrap();
        let timed_out = monitor.sweep_timeouts().await.unwrap();
        assert_eq!(timed_out, 1);
        assert_eq!(
            tasks.find_by_id("stale").await.unwrap().unwrap().status,
            Some(TaskStatus::Timeout)
        );
        assert_eq!(
            tasks.find_by_id("fresh").await.unwrap().unwrap().status,
            Some(TaskStatus::Running)
        );
    }
}
