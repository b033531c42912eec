//! OpenAPI/Utoipa configuration.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::{admin::ADMIN_TAG, auth::AUTH_TAG, health::MISC_TAG};
use crate::oauth2::OAUTH2_TAG;

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some("Access token obtained from /oauth2/token."))
                .build();
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));
            components.add_security_scheme(
                "session_auth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("session_token"))),
            );
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "noraneko-id API",
        version = "1.0.0",
        description = "Multi-tenant OAuth2 / OpenID Connect authorization server."
    ),
    tags(
        (name = OAUTH2_TAG, description = "OAuth2 / OIDC protocol endpoints"),
        (name = AUTH_TAG, description = "First-party identity endpoints"),
        (name = ADMIN_TAG, description = "Client administration"),
        (name = MISC_TAG, description = "Miscellaneous endpoints")
    )
)]
pub struct ApiDoc;
