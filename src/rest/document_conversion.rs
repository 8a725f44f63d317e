//! `POST /document-conversion/to-pdf` — base64 Office document in, base64
//! PDF out (spec §6.1).

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::rest::error::RestError;

pub fn router() -> Router<GatewayContext> {
    Router::new().route("/document-conversion/to-pdf", post(to_pdf))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToPdfRequest {
    file_extension: String,
    content_base64: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToPdfResponse {
    pdf_base64: String,
}

async fn to_pdf(
    State(ctx): State<GatewayContext>,
    Json(body): Json<ToPdfRequest>,
) -> Result<Json<ToPdfResponse>, RestError> {
    let input = general_purpose::STANDARD
        .decode(&body.content_base64)
        .map_err(|e| GatewayError::BadRequest(format!("invalid base64 content: {e}")))?;
    let pdf = ctx.document_conversion.convert(&input, &body.file_extension).await?;
    Ok(Json(ToPdfResponse {
        pdf_base64: general_purpose::STANDARD.encode(&pdf),
    }))
}
