//! The identity-mapping seam (spec §6.1 "Authentication"). A real
//! deployment's OAuth/OIDC middleware is out of scope (spec §1 Non-goals);
//! this crate only needs the shape it leaves behind: a resolved user id on
//! every request, falling back to a fixed development user when
//! `auth_enabled` is off.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;

use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::rest::error::RestError;

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

const USER_HEADER: &str = "x-user-id";

impl<S> FromRequestParts<S> for CurrentUser
where
    GatewayContext: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = GatewayContext::from_ref(state);
        if !ctx.config.auth_enabled {
            return Ok(CurrentUser {
                id: ctx.config.dev_user_id.clone(),
            });
        }
        let header = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty());
        match header {
            Some(id) => Ok(CurrentUser { id: id.to_string() }),
            None => Err(RestError(GatewayError::Unauthenticated(
                "no identity attached to request".to_string(),
            ))),
        }
    }
}
