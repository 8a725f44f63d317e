//! `POST /feedback` — up/down rating on a task (spec §3 Feedback, §6.1).

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::context::GatewayContext;
use crate::model::FeedbackRating;
use crate::rest::auth::CurrentUser;
use crate::rest::error::RestError;

pub fn router() -> Router<GatewayContext> {
    Router::new().route("/feedback", post(submit_feedback))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitFeedbackBody {
    message_id: String,
    session_id: String,
    feedback_type: FeedbackRating,
    feedback_text: Option<String>,
}

/// Always answers 202: a duplicate submission is silently absorbed rather
/// than surfaced as an error (spec §6.1 "202 accepted").
async fn submit_feedback(
    State(ctx): State<GatewayContext>,
    user: CurrentUser,
    Json(body): Json<SubmitFeedbackBody>,
) -> Result<axum::http::StatusCode, RestError> {
    ctx.feedback
        .submit(&body.session_id, &body.message_id, &user.id, body.feedback_type, body.feedback_text)
        .await?;
    Ok(axum::http::StatusCode::ACCEPTED)
}
