//! `/user/avatar/{filename}` — local on-disk avatar storage under
//! `data/avatars/` (spec §6.5). The blob/artifact store a production
//! deployment might front this with is an external collaborator out of
//! scope (spec §1 Non-goals); this module only implements the local
//! filesystem backend the spec calls out by name, with path-traversal
//! checks on every filename that reaches the disk.

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::rest::auth::CurrentUser;
use crate::rest::error::RestError;

pub fn router() -> Router<GatewayContext> {
    Router::new()
        .route("/user/avatar", post(upload_avatar))
        .route("/user/avatar/{filename}", get(get_avatar))
}

fn avatar_dir() -> std::path::PathBuf {
    std::env::var("AVATAR_DIR").unwrap_or_else(|_| "data/avatars".to_string()).into()
}

/// Rejects any filename that isn't a single path segment — no `..`, no `/`
/// or `\`, nothing that could escape `avatar_dir()` (spec §6.5
/// "path-traversal checks").
fn sanitize_filename(filename: &str) -> Result<&str, GatewayError> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\');
    if bad {
        return Err(GatewayError::BadRequest(format!("invalid avatar filename: {filename:?}")));
    }
    Ok(filename)
}

async fn get_avatar(Path(filename): Path<String>) -> Result<Response, RestError> {
    let filename = sanitize_filename(&filename)?;
    let path = avatar_dir().join(filename);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| GatewayError::NotFound(format!("avatar {filename}")))?;
    let content_type = guess_content_type(filename);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

fn guess_content_type(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else {
        "application/octet-stream"
    }
}

async fn upload_avatar(
    State(_ctx): State<GatewayContext>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<axum::Json<serde_json::Value>, RestError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("invalid multipart body: {e}")))?
        .ok_or_else(|| GatewayError::BadRequest("missing file field".to_string()))?;
    let original_name = field.file_name().unwrap_or("avatar").to_string();
    let extension = original_name.rsplit('.').next().filter(|e| e.len() <= 5).unwrap_or("png");
    let filename = format!("{}.{extension}", user.id);
    sanitize_filename(&filename)?;

    let bytes = field
        .bytes()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("failed to read avatar upload: {e}")))?;

    let dir = avatar_dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| GatewayError::Internal(format!("failed to create avatar directory: {e}")))?;
    tokio::fs::write(dir.join(&filename), &bytes)
        .await
        .map_err(|e| GatewayError::Internal(format!("failed to write avatar: {e}")))?;

    Ok(axum::Json(json!({"filename": filename})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_attempts() {
        assert!(sanitize_filename("../../etc/passwd").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("a/b.png").is_err());
        assert!(sanitize_filename("avatar.png").is_ok());
    }
}
