//! Fires notifications when a scheduled-task execution completes (spec
//! §3 `NotificationConfig`, §4.8), supplemented from
//! `original_source`'s `notification_service.py`.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{ExecutionStatus, NotificationConfig, ScheduledTask, ScheduledTaskExecution};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        task: &ScheduledTask,
        execution: &ScheduledTaskExecution,
    ) -> Result<(), GatewayError>;
}

/// Posts a JSON payload to `NotificationConfig::webhook_url`, gated by
/// whether the execution's outcome matches `onSuccess`/`onFailure`.
pub struct WebhookNotificationSink {
    client: reqwest::Client,
}

impl Default for WebhookNotificationSink {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl WebhookNotificationSink {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn notify(
        &self,
        task: &ScheduledTask,
        execution: &ScheduledTaskExecution,
    ) -> Result<(), GatewayError> {
        let Some(config) = &task.notification_config else {
            return Ok(());
        };
        if !should_notify(config, execution.status) {
            return Ok(());
        }
        let Some(webhook_url) = &config.webhook_url else {
            return Ok(());
        };

        let payload = serde_json::json!({
            "scheduledTaskId": task.id,
            "scheduledTaskName": task.name,
            "executionId": execution.id,
            "status": execution.status,
            "completedAt": execution.completed_at,
            "errorMessage": execution.error_message,
        });

        // Best-effort: a webhook failure never fails the execution that
        // triggered it.
        if let Err(err) = self.client.post(webhook_url).json(&payload).send().await {
            log::warn!("notification webhook to {webhook_url} failed (non-fatal): {err}");
        }
        Ok(())
    }
}

fn should_notify(config: &NotificationConfig, status: ExecutionStatus) -> bool {
    match status {
        ExecutionStatus::Completed => config.on_success,
        ExecutionStatus::Failed | ExecutionStatus::Timeout => config.on_failure,
        ExecutionStatus::Pending | ExecutionStatus::Running | ExecutionStatus::Cancelled => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EpochMillis, ScheduleType};

    fn task_with_config(config: NotificationConfig) -> ScheduledTask {
        ScheduledTask {
            id: "st1".to_string(),
            name: "nightly digest".to_string(),
            namespace: "default".to_string(),
            user_id: Some("u1".to_string()),
            created_by: "u1".to_string(),
            schedule_type: ScheduleType::Cron,
            schedule_expression: "0 0 9 * * * *".to_string(),
            timezone: "UTC".to_string(),
            target_agent_name: "assistant".to_string(),
            task_message: vec![],
            task_metadata: None,
            enabled: true,
            max_retries: 0,
            retry_delay_seconds: 0,
            timeout_seconds: 60,
            notification_config: Some(config),
            created_at: EpochMillis::now(),
            updated_at: EpochMillis::now(),
            next_run_at: None,
            last_run_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn success_only_config_skips_failures() {
        let config = NotificationConfig {
            on_success: true,
            on_failure: false,
            webhook_url: Some("https://example.test/hook".to_string()),
        };
        assert!(should_notify(&config, ExecutionStatus::Completed));
        assert!(!should_notify(&config, ExecutionStatus::Failed));
    }

    #[test]
    fn task_with_config_builder_is_well_formed() {
        let task = task_with_config(NotificationConfig {
            on_success: true,
            on_failure: true,
            webhook_url: None,
        });
        assert_eq!(task.name, "nightly digest");
    }
}
