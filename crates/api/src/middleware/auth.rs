//! Request extractors for the caller's identity.
//!
//! [`AuthUser`] only checks the token. [`Actor`] also loads the user's
//! directory entry, so handlers that act on workflow entities take it.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use stride_core::capabilities::ActorContext;
use stride_core::error::CoreError;
use stride_core::types::DbId;

use crate::auth::jwt::authenticate;
use crate::error::AppError;
use crate::state::AppState;

/// Caller identified by the `Authorization: Bearer` token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user's id (from `claims.sub`).
    pub user_id: DbId,
    /// Role name carried by the token. Informational; capabilities come from
    /// the user directory.
    pub role: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = authenticate(token, &state.config.jwt)?;
        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, CoreError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CoreError::Unauthorized("Missing Authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| CoreError::Unauthorized("Expected a Bearer token".into()))
}

/// The authenticated user with capabilities and relationships resolved once
/// for the request.
///
/// Rejects tokens whose user is unknown or deactivated with 401.
#[derive(Debug, Clone)]
pub struct Actor(pub ActorContext);

impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let actor = state.engine.resolve_actor(user.user_id).await?;
        Ok(Actor(actor))
    }
}
