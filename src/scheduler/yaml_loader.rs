//! Loads namespace-level `ScheduledTask`s from YAML files so operators
//! can version-control recurring jobs instead of creating them through
//! the REST builder (spec §4.9 supplement), grounded on
//! `original_source`'s `yaml_loader.py`.

use serde::Deserialize;

use crate::error::GatewayError;
use crate::model::{EpochMillis, NotificationConfig, ScheduleType, ScheduledTask, TaskMessagePart};
use crate::repository::ScheduledTaskRepository;

#[derive(Debug, Deserialize)]
struct YamlFile {
    scheduled_tasks: Vec<YamlTaskDef>,
}

#[derive(Debug, Deserialize)]
struct YamlTaskDef {
    name: String,
    schedule_type: ScheduleType,
    schedule_expression: String,
    #[serde(default = "default_timezone")]
    timezone: String,
    target_agent_name: String,
    task_message: Vec<TaskMessagePart>,
    #[serde(default)]
    task_metadata: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    max_retries: u32,
    #[serde(default)]
    retry_delay_seconds: u32,
    #[serde(default = "default_timeout")]
    timeout_seconds: u32,
    #[serde(default)]
    notification_config: Option<NotificationConfig>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_true() -> bool {
    true
}
fn default_timeout() -> u32 {
    300
}

/// Parses and upserts the namespace-level scheduled tasks defined in one
/// YAML document's `scheduled_tasks` list. An existing, non-deleted task
/// with the same name in the namespace is updated in place; otherwise a
/// new namespace-level (`userId = None`) task is created (spec §4.9
/// supplement, matching `original_source`'s update-by-name semantics).
pub async fn load_from_str(
    yaml: &str,
    namespace: &str,
    created_by: &str,
    repo: &dyn ScheduledTaskRepository,
) -> Result<Vec<ScheduledTask>, GatewayError> {
    let parsed: YamlFile = serde_yaml::from_str(yaml)
        .map_err(|e| GatewayError::BadRequest(format!("invalid scheduled-task YAML: {e}")))?;

    let mut loaded = Vec::new();
    for def in parsed.scheduled_tasks {
        match upsert_task(def, namespace, created_by, repo).await {
            Ok(task) => loaded.push(task),
            Err(err) => log::error!("failed to load YAML-defined scheduled task in {namespace}: {err}"),
        }
    }
    Ok(loaded)
}

async fn upsert_task(
    def: YamlTaskDef,
    namespace: &str,
    created_by: &str,
    repo: &dyn ScheduledTaskRepository,
) -> Result<ScheduledTask, GatewayError> {
    let now = EpochMillis::now();
    if let Some(existing) = repo.find_by_name_in_namespace(namespace, &def.name).await? {
        if !existing.is_deleted() {
            let updated = ScheduledTask {
                schedule_type: def.schedule_type,
                schedule_expression: def.schedule_expression,
                timezone: def.timezone,
                target_agent_name: def.target_agent_name,
                task_message: def.task_message,
                task_metadata: def.task_metadata,
                enabled: def.enabled,
                max_retries: def.max_retries,
                retry_delay_seconds: def.retry_delay_seconds,
                timeout_seconds: def.timeout_seconds,
                notification_config: def.notification_config,
                updated_at: now,
                ..existing
            };
            return repo.update(updated).await;
        }
    }

    repo.create(ScheduledTask {
        id: uuid::Uuid::new_v4().to_string(),
        name: def.name,
        namespace: namespace.to_string(),
        user_id: None,
        created_by: created_by.to_string(),
        schedule_type: def.schedule_type,
        schedule_expression: def.schedule_expression,
        timezone: def.timezone,
        target_agent_name: def.target_agent_name,
        task_message: def.task_message,
        task_metadata: def.task_metadata,
        enabled: def.enabled,
        max_retries: def.max_retries,
        retry_delay_seconds: def.retry_delay_seconds,
        timeout_seconds: def.timeout_seconds,
        notification_config: def.notification_config,
        created_at: now,
        updated_at: now,
        next_run_at: None,
        last_run_at: None,
        deleted_at: None,
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryScheduledTaskRepository;

    const SAMPLE: &str = r#"
scheduled_tasks:
  - name: nightly-digest
    schedule_type: cron
    schedule_expression: "0 0 9 * * * *"
    target_agent_name: assistant
    task_message:
      - kind: text
        text: "Send the nightly digest"
"#;

    #[tokio::test]
    async fn loads_and_creates_namespace_level_task() {
        let repo = InMemoryScheduledTaskRepository::new();
        let loaded = load_from_str(SAMPLE, "default", "system", &repo).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].is_namespace_level());
        assert_eq!(loaded[0].name, "nightly-digest");
    }

    #[tokio::test]
    async fn reloading_updates_the_existing_task_by_name() {
        let repo = InMemoryScheduledTaskRepository::new();
        load_from_str(SAMPLE, "default", "system", &repo).await.unwrap();
        let reloaded = load_from_str(SAMPLE, "default", "system", &repo).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        let all = repo.find_enabled_in_namespace("default").await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
