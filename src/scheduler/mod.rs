//! Fires `ScheduledTask`s and collects their results (spec §4.7, §4.8).
//!
//! In `Embedded` mode the gateway runs its own trigger engine in-process;
//! in `OrchestratorDelegated` mode each task is reflected into an external
//! orchestrator's CronJob/Job instead (`orchestrator`), and the gateway
//! keeps only the authoritative database record. Either way, only the
//! elected leader schedules or executes (`leader_election`); followers
//! keep serving REST reads/writes.

pub mod leader_election;
pub mod notification;
pub mod orchestrator;
pub mod result_collector;
pub mod trigger;
pub mod yaml_loader;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::bus::jsonrpc::RpcResponse;
use crate::bus::{topics, Bus, MessageProperties};
use crate::config::SchedulerConfig;
use crate::error::GatewayError;
use crate::model::{EpochMillis, ExecutionStatus, ScheduledTask, ScheduledTaskExecution};
use crate::repository::ScheduledTaskRepository;

use leader_election::LeadershipObserver;
use result_collector::ResultCollector;
use trigger::Trigger;

/// Current leader/active/running snapshot (spec §6.1 `GET
/// /scheduler/status`).
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub is_leader: bool,
    pub instance_id: String,
    pub scheduled_task_count: usize,
    pub running_execution_count: u64,
}

pub struct Scheduler {
    repo: Arc<dyn ScheduledTaskRepository>,
    bus: Arc<dyn Bus>,
    result_collector: Arc<dyn ResultCollector>,
    config: SchedulerConfig,
    local_jobs: Mutex<HashMap<String, JoinHandle<()>>>,
    in_flight: Mutex<HashSet<String>>,
}

impl Scheduler {
    pub fn new(
        repo: Arc<dyn ScheduledTaskRepository>,
        bus: Arc<dyn Bus>,
        result_collector: Arc<dyn ResultCollector>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repo,
            bus,
            result_collector,
            config,
            local_jobs: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn status(&self, instance_is_leader: bool) -> Result<SchedulerStatus, GatewayError> {
        let scheduled_task_count = self.local_jobs.lock().await.len();
        let running_execution_count = self.repo.find_running_executions().await?.len() as u64;
        Ok(SchedulerStatus {
            is_leader: instance_is_leader,
            instance_id: self.config.instance_id.clone(),
            scheduled_task_count,
            running_execution_count,
        })
    }

    /// Subscribes to this instance's scheduler response topic and routes
    /// every incoming bus response to the `ResultCollector` (spec §4.7
    /// step 3, §4.8).
    pub async fn run_response_listener(self: Arc<Self>) -> Result<(), GatewayError> {
        let topic = topics::scheduler_response(&self.scheduler_namespace(), &self.config.instance_id);
        let (_sub_id, mut rx) = self.bus.subscribe(&topic).await?;
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let response: RpcResponse = match serde_json::from_value(msg.payload) {
                    Ok(response) => response,
                    Err(err) => {
                        log::warn!("malformed scheduler response on {}: {err}", msg.topic);
                        continue;
                    }
                };
                let a2a_task_id = response.id.clone();
                if let Err(err) = self.result_collector.handle_response(&a2a_task_id, &response).await {
                    log::error!("failed to finalize execution for a2a task {a2a_task_id}: {err}");
                }
            }
        });
        Ok(())
    }

    /// Runs `ResultCollector::reap_stale` on `result_reaper_interval`
    /// until the process exits.
    pub async fn run_result_reaper(self: Arc<Self>, default_timeout_seconds: u32) {
        let mut interval = tokio::time::interval(self.config.result_reaper_interval);
        loop {
            interval.tick().await;
            if let Err(err) = self.result_collector.reap_stale(default_timeout_seconds).await {
                log::error!("scheduler result reaper failed: {err}");
            }
        }
    }

    fn scheduler_namespace(&self) -> String {
        let ns = &self.config.namespace;
        if ns.ends_with('/') {
            ns.clone()
        } else {
            format!("{ns}/")
        }
    }

    /// Spawns the per-task trigger loop: sleep until next fire, fire
    /// (unless an instance of this task is already in flight — `Forbid`
    /// concurrency policy, spec §4.7), recompute next fire, repeat.
    async fn schedule_local(self: &Arc<Self>, task: ScheduledTask) {
        let scheduler = self.clone();
        let task_id = task.id.clone();
        let handle = tokio::spawn(async move {
            let mut current = task;
            loop {
                let trigger = match Trigger::parse(
                    current.schedule_type,
                    &current.schedule_expression,
                    &current.timezone,
                    false,
                ) {
                    Ok(trigger) => trigger,
                    Err(err) => {
                        log::error!("scheduled task {} has an invalid trigger, unscheduling: {err}", current.id);
                        return;
                    }
                };
                let Some(next_fire) = trigger.next_fire_after(EpochMillis::now()) else {
                    log::info!("scheduled task {} has no further fire times, unscheduling", current.id);
                    return;
                };
                let delay_ms = (next_fire.0 - EpochMillis::now().0).max(0) as u64;
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;

                if let Err(err) = scheduler.fire(&current).await {
                    log::error!("failed to fire scheduled task {}: {err}", current.id);
                }

                match scheduler.repo.find_by_id(&current.id).await {
                    Ok(Some(refreshed)) if refreshed.enabled && !refreshed.is_deleted() => current = refreshed,
                    _ => {
                        log::info!("scheduled task {} disabled or deleted, unscheduling", current.id);
                        return;
                    }
                }
            }
        });
        self.local_jobs.lock().await.insert(task_id, handle);
    }

    async fn unschedule_local(&self, task_id: &str) {
        if let Some(handle) = self.local_jobs.lock().await.remove(task_id) {
            handle.abort();
        }
    }

    /// Fires one execution of `task` (spec §4.7 "Execution").
    async fn fire(self: &Arc<Self>, task: &ScheduledTask) -> Result<(), GatewayError> {
        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.contains(&task.id) {
                log::warn!("scheduled task {} is already running, skipping this firing", task.id);
                return Ok(());
            }
            in_flight.insert(task.id.clone());
        }

        let now = EpochMillis::now();
        let a2a_task_id = uuid::Uuid::new_v4().to_string();
        let mut execution = self
            .repo
            .create_execution(ScheduledTaskExecution {
                id: uuid::Uuid::new_v4().to_string(),
                scheduled_task_id: task.id.clone(),
                status: ExecutionStatus::Pending,
                a2a_task_id: Some(a2a_task_id.clone()),
                scheduled_for: now,
                started_at: None,
                completed_at: None,
                result_summary: None,
                error_message: None,
                retry_count: 0,
                artifacts: None,
                notifications_sent: None,
            })
            .await?;
        self.repo.record_fired(&task.id, now).await?;

        let message_parts: Vec<serde_json::Value> = task
            .task_message
            .iter()
            .map(|part| serde_json::to_value(part).unwrap_or(serde_json::Value::Null))
            .collect();
        let namespace = self.scheduler_namespace();
        let reply_to = topics::scheduler_response(&namespace, &self.config.instance_id);
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": a2a_task_id,
            "method": "tasks/send",
            "params": {
                "parts": message_parts,
                "metadata": {"sessionBehavior": "RUN_BASED"},
            },
        });

        self.result_collector.register(&a2a_task_id, &execution.id).await;

        let publish_result = self
            .bus
            .publish(
                &topics::agent_request(&namespace, &task.target_agent_name),
                request,
                MessageProperties {
                    reply_to: Some(reply_to),
                    user_id: task.user_id.clone(),
                    ..Default::default()
                },
            )
            .await;

        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(EpochMillis::now());
        if let Err(err) = publish_result {
            execution.status = ExecutionStatus::Failed;
            execution.completed_at = Some(EpochMillis::now());
            execution.error_message = Some(err.to_string());
        }
        self.repo.update_execution(execution).await?;

        let scheduler = self.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move {
            scheduler.await_completion_then_release(&task_id, &a2a_task_id).await;
        });
        Ok(())
    }

    /// Polls until this execution reaches a terminal status (or the
    /// reaper times it out), then releases the `Forbid`-policy slot for
    /// `task_id` so the next firing can proceed.
    async fn await_completion_then_release(self: &Arc<Self>, task_id: &str, a2a_task_id: &str) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            match self.repo.find_executions_for_task(task_id).await {
                Ok(executions) => {
                    let current = executions.iter().find(|e| e.a2a_task_id.as_deref() == Some(a2a_task_id));
                    match current {
                        Some(exec) if exec.status != ExecutionStatus::Running && exec.status != ExecutionStatus::Pending => {
                            break;
                        }
                        None => break,
                        _ => continue,
                    }
                }
                Err(err) => {
                    log::error!("failed polling execution status for task {task_id}: {err}");
                    break;
                }
            }
        }
        self.in_flight.lock().await.remove(task_id);
    }
}

/// Wires (un)scheduling of local jobs to leadership transitions (spec
/// §4.7: "On leader promotion, the new leader loads all enabled,
/// non-deleted, in-namespace tasks and schedules them; on demotion, it
/// unschedules all").
pub struct SchedulerLeadershipBridge {
    scheduler: Arc<Scheduler>,
    repo: Arc<dyn ScheduledTaskRepository>,
    namespace: String,
}

impl SchedulerLeadershipBridge {
    pub fn new(scheduler: Arc<Scheduler>, repo: Arc<dyn ScheduledTaskRepository>, namespace: String) -> Self {
        Self { scheduler, repo, namespace }
    }
}

#[async_trait]
impl LeadershipObserver for SchedulerLeadershipBridge {
    async fn on_promoted(&self) {
        let tasks = match self.repo.find_enabled_in_namespace(&self.namespace).await {
            Ok(tasks) => tasks,
            Err(err) => {
                log::error!("failed to load scheduled tasks on promotion: {err}");
                return;
            }
        };
        for task in tasks {
            self.scheduler.schedule_local(task).await;
        }
    }

    async fn on_demoted(&self) {
        let task_ids: Vec<String> = self.scheduler.local_jobs.lock().await.keys().cloned().collect();
        for task_id in task_ids {
            self.scheduler.unschedule_local(&task_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::model::{EpochMillis, ScheduleType, TaskMessagePart};
    use crate::repository::memory::InMemoryScheduledTaskRepository;
    use result_collector::StatelessResultCollector;

    fn sample_task() -> ScheduledTask {
        ScheduledTask {
            id: "st1".to_string(),
            name: "digest".to_string(),
            namespace: "default".to_string(),
            user_id: Some("u1".to_string()),
            created_by: "u1".to_string(),
            schedule_type: ScheduleType::Interval,
            schedule_expression: "60s".to_string(),
            timezone: "UTC".to_string(),
            target_agent_name: "assistant".to_string(),
            task_message: vec![TaskMessagePart {
                kind: "text".to_string(),
                text: Some("digest please".to_string()),
                data: None,
            }],
            task_metadata: None,
            enabled: true,
            max_retries: 0,
            retry_delay_seconds: 0,
            timeout_seconds: 30,
            notification_config: None,
            created_at: EpochMillis::now(),
            updated_at: EpochMillis::now(),
            next_run_at: None,
            last_run_at: None,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn firing_creates_a_running_execution_and_publishes() {
        let repo = Arc::new(InMemoryScheduledTaskRepository::new());
        let bus = Arc::new(InMemoryBus::new());
        let (_sub_id, mut rx) = bus.subscribe("default/a2a/v1/agent/assistant/request").await.unwrap();
        let collector = Arc::new(StatelessResultCollector::new(repo.clone()));
        let scheduler = Arc::new(Scheduler::new(
            repo.clone(),
            bus.clone(),
            collector,
            SchedulerConfig {
                namespace: "default".to_string(),
                instance_id: "gw-1".to_string(),
                ..SchedulerConfig::default()
            },
        ));
        let task = sample_task();
        repo.create(task.clone()).await.unwrap();
        scheduler.fire(&task).await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert!(msg.properties.reply_to.is_some());

        let executions = repo.find_executions_for_task(&task.id).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, ExecutionStatus::Running);
    }
}
