//! HTTP surface.
//!
//! Submodules:
//! - `auth` - first-party register/login/logout/profile
//! - `admin` - client administration
//! - `session` - the session-cookie extractor
//! - `extract` - form-or-JSON body extractor
//! - `health` - liveness probe
//! - `openapi` - OpenAPI/Utoipa configuration
//!
//! The OAuth2 protocol endpoints live in `crate::oauth2`.

pub mod admin;
pub mod auth;
pub mod extract;
pub mod health;
pub mod openapi;
pub mod session;

use std::time::Duration;

use axum::{Json, routing::get};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::AppResources;
use crate::oauth2::{self, OAuth2State};

/// Per-request deadline; in-flight database work is dropped with the
/// request future when it fires.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Assemble the full application router.
pub fn build_router(resources: AppResources) -> axum::Router {
    let oauth2_state = OAuth2State::from_config(resources.clone(), &resources.config);

    let misc_router = OpenApiRouter::new()
        .routes(routes!(health::health))
        .with_state(resources.clone());

    let router = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/oauth2", oauth2::router(oauth2_state))
        .nest("/auth", auth::router().with_state(resources.clone()))
        .nest("/admin", admin::router().with_state(resources))
        .merge(misc_router);

    let (router, api) = router.split_for_parts();

    router
        .route(
            "/api-docs/openapi.json",
            get(move || {
                let api = api.clone();
                async move { Json(api) }
            }),
        )
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped.
#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let port = resources.config.server_port;
    let router = build_router(resources);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
