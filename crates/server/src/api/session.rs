//! Session adapter: translates the `session_token` cookie into an
//! authenticated (user, client) pair.
//!
//! The cookie value is fingerprinted and looked up against the
//! `user_sessions` table (`revoked_at IS NULL`, `expires_at > now`); the
//! user must still be active. Anything short of that is anonymous.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use crate::AppResources;
use crate::crypto;
use crate::entity::user;

/// Name of the first-party session cookie.
pub const SESSION_COOKIE: &str = "session_token";

/// An authenticated first-party session. The tenant binding lives in
/// `user.client_id`.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user: user::Model,
}

/// Optional variant: resolves to `None` instead of rejecting, for
/// endpoints that handle anonymous users themselves (the authorization
/// endpoint redirects them to login).
pub struct OptionalSessionUser(pub Option<SessionUser>);

/// 401 rejection for session-gated endpoints.
#[derive(Debug)]
pub struct SessionRejection;

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "error_description": "authentication required",
            })),
        )
            .into_response()
    }
}

async fn resolve_session<S>(parts: &mut Parts, state: &S) -> Option<SessionUser>
where
    AppResources: FromRef<S>,
    S: Send + Sync,
{
    let jar = CookieJar::from_request_parts(parts, state).await.ok()?;
    let token = jar.get(SESSION_COOKIE)?.value().to_string();
    if token.is_empty() {
        return None;
    }

    let resources = AppResources::from_ref(state);
    let hash = crypto::token_fingerprint(&token);

    let session = resources
        .repo
        .find_valid_session_by_hash(&hash)
        .await
        .ok()
        .flatten()?;
    let user = resources
        .repo
        .find_user_by_id(session.user_id)
        .await
        .ok()
        .flatten()?;
    if !user.is_active {
        return None;
    }

    Some(SessionUser { user })
}

impl<S> FromRequestParts<S> for SessionUser
where
    AppResources: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_session(parts, state).await.ok_or(SessionRejection)
    }
}

impl<S> FromRequestParts<S> for OptionalSessionUser
where
    AppResources: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalSessionUser(resolve_session(parts, state).await))
    }
}
