//! Health check endpoint.

use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppResources;
use crate::config::Environment;

/// OpenAPI tag for miscellaneous endpoints.
pub const MISC_TAG: &str = "Misc";

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub environment: &'static str,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = MISC_TAG,
    operation_id = "Health",
    summary = "Service liveness",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health(State(resources): State<AppResources>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "noraneko-id",
        environment: match resources.config.environment {
            Environment::Development => "development",
            Environment::Production => "production",
        },
    })
}
