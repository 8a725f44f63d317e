//! `/scheduled-tasks/*` and `/scheduler/status` — CRUD over `ScheduledTask`,
//! its executions, the AI-assisted builder, and scheduler introspection
//! (spec §4.7, §4.9, §6.1).

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::model::{
    EpochMillis, NotificationConfig, ScheduleType, ScheduledTask, ScheduledTaskExecution, TaskMessagePart,
};
use crate::rest::auth::CurrentUser;
use crate::rest::error::RestError;
use crate::scheduler::trigger::Trigger;

pub fn router() -> Router<GatewayContext> {
    Router::new()
        .route("/scheduled-tasks", get(list_scheduled_tasks).post(create_scheduled_task))
        .route(
            "/scheduled-tasks/{id}",
            get(get_scheduled_task).patch(update_scheduled_task).delete(delete_scheduled_task),
        )
        .route("/scheduled-tasks/{id}/enable", post(enable_scheduled_task))
        .route("/scheduled-tasks/{id}/disable", post(disable_scheduled_task))
        .route("/scheduled-tasks/{id}/executions", get(list_executions))
        .route("/scheduled-tasks/builder/chat", post(builder_chat))
        .route("/scheduler/status", get(scheduler_status))
}

#[derive(Debug, Deserialize)]
struct NamespaceQuery {
    #[serde(default = "default_namespace")]
    namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

async fn list_scheduled_tasks(
    State(ctx): State<GatewayContext>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<Vec<ScheduledTask>>, RestError> {
    Ok(Json(
        ctx.scheduled_task_repo.find_enabled_in_namespace(&query.namespace).await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateScheduledTaskBody {
    name: String,
    #[serde(default = "default_namespace")]
    namespace: String,
    schedule_type: ScheduleType,
    schedule_expression: String,
    #[serde(default = "default_timezone")]
    timezone: String,
    target_agent_name: String,
    task_message: Vec<TaskMessagePart>,
    task_metadata: Option<Value>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    max_retries: u32,
    #[serde(default)]
    retry_delay_seconds: u32,
    #[serde(default = "default_timeout")]
    timeout_seconds: u32,
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

fn validate_trigger(ctx: &GatewayContext, schedule_type: ScheduleType, expression: &str, timezone: &str) -> Result<(), GatewayError> {
    let orchestrator_delegated = matches!(ctx.config.scheduler.mode, crate::config::SchedulerMode::OrchestratorDelegated);
    Trigger::parse(schedule_type, expression, timezone, orchestrator_delegated).map(|_| ())
}

async fn create_scheduled_task(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Json(body): Json<CreateScheduledTaskBody>,
) -> Result<Json<ScheduledTask>, RestError> {
    validate_trigger(&ctx, body.schedule_type, &body.schedule_expression, &body.timezone)?;
    let now = EpochMillis::now();
    let task = ctx
        .scheduled_task_repo
        .create(ScheduledTask {
            id: uuid::Uuid::new_v4().to_string(),
            name: body.name,
            namespace: body.namespace,
            user_id: Some(user.id.clone()),
            created_by: user.id,
            schedule_type: body.schedule_type,
            schedule_expression: body.schedule_expression,
            timezone: body.timezone,
            target_agent_name: body.target_agent_name,
            task_message: body.task_message,
            task_metadata: body.task_metadata,
            enabled: body.enabled,
            max_retries: body.max_retries,
            retry_delay_seconds: body.retry_delay_seconds,
            timeout_seconds: body.timeout_seconds,
            notification_config: body.notification_config,
            created_at: now,
            updated_at: now,
            next_run_at: None,
            last_run_at: None,
            deleted_at: None,
        })
        .await?;
    Ok(Json(task))
}

async fn get_owned_task(ctx: &GatewayContext, id: &str, user_id: &str) -> Result<ScheduledTask, GatewayError> {
    GatewayError::validate_id(id)?;
    let task = ctx
        .scheduled_task_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("scheduled task {id}")))?;
    if task.is_deleted() {
        return Err(GatewayError::NotFound(format!("scheduled task {id}")));
    }
    if !task.is_namespace_level() && task.user_id.as_deref() != Some(user_id) {
        return Err(GatewayError::NotFound(format!("scheduled task {id}")));
    }
    Ok(task)
}

async fn get_scheduled_task(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ScheduledTask>, RestError> {
    Ok(Json(get_owned_task(&ctx, &id, &user.id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateScheduledTaskBody {
    name: Option<String>,
    schedule_type: Option<ScheduleType>,
    schedule_expression: Option<String>,
    timezone: Option<String>,
    target_agent_name: Option<String>,
    task_message: Option<Vec<TaskMessagePart>>,
    task_metadata: Option<Value>,
    max_retries: Option<u32>,
    retry_delay_seconds: Option<u32>,
    timeout_seconds: Option<u32>,
    notification_config: Option<NotificationConfig>,
}

async fn update_scheduled_task(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateScheduledTaskBody>,
) -> Result<Json<ScheduledTask>, RestError> {
    let mut task = get_owned_task(&ctx, &id, &user.id).await?;
    if let Some(name) = body.name {
        task.name = name;
    }
    if let Some(schedule_type) = body.schedule_type {
        task.schedule_type = schedule_type;
    }
    if let Some(expr) = body.schedule_expression {
        task.schedule_expression = expr;
    }
    if let Some(tz) = body.timezone {
        task.timezone = tz;
    }
    validate_trigger(&ctx, task.schedule_type, &task.schedule_expression, &task.timezone)?;
    if let Some(target) = body.target_agent_name {
        task.target_agent_name = target;
    }
    if let Some(message) = body.task_message {
        task.task_message = message;
    }
    if body.task_metadata.is_some() {
        task.task_metadata = body.task_metadata;
    }
    if let Some(max_retries) = body.max_retries {
        task.max_retries = max_retries;
    }
    if let Some(retry_delay) = body.retry_delay_seconds {
        task.retry_delay_seconds = retry_delay;
    }
    if let Some(timeout) = body.timeout_seconds {
        task.timeout_seconds = timeout;
    }
    if body.notification_config.is_some() {
        task.notification_config = body.notification_config;
    }
    task.updated_at = EpochMillis::now();
    Ok(Json(ctx.scheduled_task_repo.update(task).await?))
}

async fn delete_scheduled_task(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, RestError> {
    get_owned_task(&ctx, &id, &user.id).await?;
    ctx.scheduled_task_repo.soft_delete(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn enable_scheduled_task(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, RestError> {
    get_owned_task(&ctx, &id, &user.id).await?;
    ctx.scheduled_task_repo.set_enabled(&id, true).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn disable_scheduled_task(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, RestError> {
    get_owned_task(&ctx, &id, &user.id).await?;
    ctx.scheduled_task_repo.set_enabled(&id, false).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn list_executions(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<ScheduledTaskExecution>>, RestError> {
    get_owned_task(&ctx, &id, &user.id).await?;
    Ok(Json(ctx.scheduled_task_repo.find_executions_for_task(&id).await?))
}

#[derive(Debug, Deserialize)]
struct BuilderChatBody {
    conversation: Vec<Value>,
}

async fn builder_chat(
    State(ctx): State<GatewayContext>,
    Json(body): Json<BuilderChatBody>,
) -> Json<crate::assistant::AssistantReply> {
    Json(ctx.task_builder.turn(&body.conversation).await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SchedulerStatusResponse {
    is_leader: bool,
    instance_id: String,
    scheduled_task_count: usize,
    running_execution_count: u64,
}

async fn scheduler_status(State(ctx): State<GatewayContext>) -> Result<Json<SchedulerStatusResponse>, RestError> {
    let lock = ctx.scheduled_task_repo.read_lock().await?;
    let is_leader = lock
        .map(|l| l.leader_id == ctx.config.scheduler.instance_id && !l.is_expired(EpochMillis::now()))
        .unwrap_or(false);
    let status = ctx.scheduler.status(is_leader).await?;
    Ok(Json(SchedulerStatusResponse {
        is_leader: status.is_leader,
        instance_id: status.instance_id,
        scheduled_task_count: status.scheduled_task_count,
        running_execution_count: status.running_execution_count,
    }))
}
