//! `/sessions/*` — conversation CRUD, opaque chat-task upsert, and
//! compress-and-branch (spec §4.5, §6.1).

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::GatewayContext;
use crate::rest::auth::CurrentUser;
use crate::rest::dto::{PageEnvelope, PageQuery, SearchQuery};
use crate::rest::error::RestError;
use crate::session::service::SessionWithProject;

pub fn router() -> Router<GatewayContext> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/search", get(search_sessions))
        .route("/sessions/{id}", get(get_session).patch(rename_session).delete(delete_session))
        .route("/sessions/{id}/chat-tasks", post(upsert_chat_task).get(list_chat_tasks))
        .route("/sessions/{id}/messages", get(get_messages))
        .route("/sessions/{id}/project", patch(move_session))
        .route("/sessions/{id}/compress-and-branch", post(compress_and_branch))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionDto {
    #[serde(flatten)]
    session: crate::model::Session,
    project_name: Option<String>,
}

fn to_dto(s: SessionWithProject) -> SessionDto {
    SessionDto {
        session: s.session,
        project_name: s.project_name,
    }
}

async fn list_sessions(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageEnvelope<SessionDto>>, RestError> {
    let pagination = query.normalize()?;
    let page = ctx
        .sessions
        .get_user_sessions(&user.id, pagination, query.project_id.as_deref())
        .await?;
    Ok(Json(PageEnvelope::from_page(page, pagination, to_dto)))
}

async fn search_sessions(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PageEnvelope<SessionDto>>, RestError> {
    let pagination = crate::repository::Pagination::normalize(query.page_number, query.page_size)?;
    let page = ctx
        .sessions
        .search_sessions(&user.id, &query.query, query.project_id.as_deref(), pagination)
        .await?;
    Ok(Json(PageEnvelope::from_page(page, pagination, to_dto)))
}

async fn get_session(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<crate::model::Session>, RestError> {
    Ok(Json(ctx.sessions.get_owned_session(&id, &user.id).await?))
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    name: String,
}

async fn rename_session(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<Json<crate::model::Session>, RestError> {
    Ok(Json(
        ctx.sessions.update_session_name(&id, &user.id, &body.name).await?,
    ))
}

async fn delete_session(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, RestError> {
    ctx.sessions.soft_delete_session(&id, &user.id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertChatTaskBody {
    task_id: String,
    user_message: Option<String>,
    message_bubbles: String,
    task_metadata: Option<String>,
}

async fn upsert_chat_task(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<UpsertChatTaskBody>,
) -> Result<Json<crate::model::ChatTask>, RestError> {
    Ok(Json(
        ctx.sessions
            .save_task(
                &body.task_id,
                &id,
                &user.id,
                body.user_message,
                body.message_bubbles,
                body.task_metadata,
            )
            .await?,
    ))
}

async fn list_chat_tasks(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<crate::model::ChatTask>>, RestError> {
    Ok(Json(ctx.sessions.get_session_tasks(&id, &user.id).await?))
}

async fn get_messages(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<Value>>, RestError> {
    Ok(Json(
        ctx.sessions.get_session_messages_from_tasks(&id, &user.id).await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveSessionBody {
    project_id: Option<String>,
}

async fn move_session(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<MoveSessionBody>,
) -> Result<Json<crate::model::Session>, RestError> {
    Ok(Json(
        ctx.sessions
            .move_session_to_project(&id, &user.id, body.project_id.as_deref())
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompressAndBranchBody {
    agent_id: Option<String>,
    name: Option<String>,
    llm_provider: Option<String>,
    llm_model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompressAndBranchResponse {
    new_session_id: String,
    parent_session_id: String,
    summary_task_id: String,
    compressed_message_count: usize,
}

async fn compress_and_branch(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<CompressAndBranchBody>,
) -> Result<Json<CompressAndBranchResponse>, RestError> {
    let outcome = ctx
        .compression
        .compress_and_branch(
            &id,
            &user.id,
            body.agent_id,
            body.name,
            body.llm_provider.as_deref(),
            body.llm_model.as_deref(),
        )
        .await?;
    Ok(Json(CompressAndBranchResponse {
        new_session_id: outcome.new_session.id,
        parent_session_id: id,
        summary_task_id: outcome.summary_task.id,
        compressed_message_count: outcome.compressed_message_count,
    }))
}
