//! Gateway-wide error kind, following the same hand-rolled pattern as a
//! tool-protocol error: a flat enum, a manual `Display`, and a blanket
//! `std::error::Error` impl. No `thiserror`/`anyhow` — the error surface here
//! is small and fixed by the REST/JSON-RPC adapters that consume it.

use std::fmt;

/// The error kinds a gateway operation can fail with (spec §7).
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Malformed or invalid input from the caller.
    BadRequest(String),
    /// No authenticated identity associated with the request.
    Unauthenticated(String),
    /// Authenticated, but missing a required scope.
    Forbidden {
        message: String,
        required_scopes: Vec<String>,
    },
    /// Resource missing, soft-deleted, or addressed by a sentinel id
    /// (`""`, `"null"`, `"undefined"`).
    NotFound(String),
    /// A duplicate create, or a losing side of a racy unique insert.
    Conflict(String),
    /// Publishing onto the bus failed, or the scheduler isn't ready.
    UpstreamUnavailable(String),
    /// The database connection was invalidated/closed mid-operation and the
    /// caller should retry.
    TransientBackend(String),
    /// An upstream LLM call or subprocess exceeded its deadline.
    UpstreamTimeout(String),
    /// Anything else.
    Internal(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            GatewayError::Unauthenticated(msg) => write!(f, "unauthenticated: {msg}"),
            GatewayError::Forbidden { message, required_scopes } => write!(
                f,
                "forbidden: {message} (requires {})",
                required_scopes.join(", ")
            ),
            GatewayError::NotFound(msg) => write!(f, "not found: {msg}"),
            GatewayError::Conflict(msg) => write!(f, "conflict: {msg}"),
            GatewayError::UpstreamUnavailable(msg) => write!(f, "upstream unavailable: {msg}"),
            GatewayError::TransientBackend(msg) => write!(f, "transient backend error: {msg}"),
            GatewayError::UpstreamTimeout(msg) => write!(f, "upstream timeout: {msg}"),
            GatewayError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    /// Maps a session/task id to `NotFound` if it's one of the sentinel
    /// strings the frontend is known to send for "no selection" (spec §4.5,
    /// §8 boundary behaviors).
    pub fn validate_id(id: &str) -> Result<(), GatewayError> {
        if id.is_empty() || id == "null" || id == "undefined" {
            return Err(GatewayError::NotFound(format!("invalid id: {id:?}")));
        }
        Ok(())
    }

    /// JSON-RPC 2.0 error code for this kind, used by the `/tasks/*` and
    /// `/sse/*` adapters (spec §7).
    pub fn rpc_code(&self) -> i64 {
        match self {
            GatewayError::BadRequest(_) => -32600,
            GatewayError::NotFound(_) => -32601,
            GatewayError::Unauthenticated(_) | GatewayError::Forbidden { .. } => -32000,
            GatewayError::UpstreamUnavailable(_) => -32001,
            GatewayError::TransientBackend(_) => -32002,
            GatewayError::UpstreamTimeout(_) => -32003,
            GatewayError::Conflict(_) => -32004,
            GatewayError::Internal(_) => -32603,
        }
    }

    /// HTTP status for REST (non-RPC) endpoints.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::Unauthenticated(_) => 401,
            GatewayError::Forbidden { .. } => 403,
            GatewayError::NotFound(_) => 404,
            GatewayError::Conflict(_) => 409,
            GatewayError::UpstreamUnavailable(_) => 503,
            GatewayError::TransientBackend(_) => 503,
            GatewayError::UpstreamTimeout(_) => 504,
            GatewayError::Internal(_) => 500,
        }
    }
}

/// Classifies a `sqlx::Error` into `TransientBackend` when it represents an
/// invalidated/closed connection, leaving all other errors to bubble as
/// `Internal` (spec §4.6 "Connection policy").
pub fn classify_db_error(err: sqlx::Error) -> GatewayError {
    let transient = match &err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            // Postgres admin-shutdown / connection-failure classes.
            matches!(code.as_str(), "57P01" | "57P02" | "57P03" | "08000" | "08003" | "08006")
                || db_err
                    .message()
                    .to_lowercase()
                    .contains("server closed the connection")
        }
        _ => false,
    };
    if transient {
        GatewayError::TransientBackend(err.to_string())
    } else {
        GatewayError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_ids_are_not_found() {
        assert!(GatewayError::validate_id("").is_err());
        assert!(GatewayError::validate_id("null").is_err());
        assert!(GatewayError::validate_id("undefined").is_err());
        assert!(GatewayError::validate_id("sess-123").is_ok());
    }

    #[test]
    fn rpc_codes_match_spec() {
        assert_eq!(GatewayError::BadRequest("x".into()).rpc_code(), -32600);
        assert_eq!(GatewayError::NotFound("x".into()).rpc_code(), -32601);
    }
}
