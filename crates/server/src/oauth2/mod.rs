//! OAuth2 / OpenID Connect protocol engine.
//!
//! ## Supported flows
//!
//! - Authorization Code with optional PKCE
//! - Refresh Token (with rotation)
//!
//! ## Endpoints
//!
//! - `GET /oauth2/authorize` - authorization endpoint (session-gated)
//! - `POST /oauth2/authorize` - consent-form submission
//! - `POST /oauth2/token` - token endpoint
//! - `POST /oauth2/revoke` - token revocation
//! - `GET /oauth2/userinfo` - OpenID Connect UserInfo
//! - `GET /oauth2/client-info/{client_id}` - public client display info

pub mod authorize;
pub mod endpoints;
mod state;

use utoipa_axum::{router::OpenApiRouter, routes};

pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints.
pub const OAUTH2_TAG: &str = "OAuth2";

/// Creates the OAuth2 router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize::authorize, authorize::authorize_submit))
        .routes(routes!(endpoints::token))
        .routes(routes!(endpoints::revoke))
        .routes(routes!(endpoints::userinfo))
        .routes(routes!(endpoints::client_info))
        .with_state(state)
}
