//! Admin client management. A thin wrapper over the repository, gated by
//! an active admin role on the session user.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

use crate::AppResources;
use crate::api::session::SessionUser;
use crate::crypto;
use crate::entity::client;
use crate::error::OAuth2Error;
use crate::repository::NewClient;

/// OpenAPI tag for admin endpoints.
pub const ADMIN_TAG: &str = "Admin";

/// Creates the /admin router.
pub fn router() -> OpenApiRouter<AppResources> {
    OpenApiRouter::new()
        .routes(routes!(list_clients, create_client))
        .routes(routes!(get_client, update_client, delete_client))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateClientRequest {
    pub name: String,
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    /// Defaults to just "openid".
    pub allowed_scopes: Option<Vec<String>>,
    /// Confidential clients get a generated secret; defaults to true.
    pub is_confidential: Option<bool>,
    pub require_consent: Option<bool>,
    pub trusted_client: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub allowed_scopes: Option<Vec<String>>,
    pub require_consent: Option<bool>,
    pub trusted_client: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClientResponse {
    pub id: String,
    pub client_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub is_confidential: bool,
    pub is_active: bool,
    pub require_consent: bool,
    pub trusted_client: bool,
    /// Present only once, in the create response of a confidential
    /// client. Only the hash is stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl ClientResponse {
    fn from_model(model: client::Model, client_secret: Option<String>) -> Self {
        Self {
            id: model.id.to_string(),
            client_id: model.client_id.clone(),
            name: model.name.clone(),
            description: model.description.clone(),
            redirect_uris: model.redirect_uris_list(),
            allowed_scopes: model.allowed_scopes_list(),
            is_confidential: model.is_confidential,
            is_active: model.is_active,
            require_consent: model.require_consent,
            trusted_client: model.trusted_client,
            client_secret,
        }
    }
}

/// Reject session users without an active admin role.
async fn require_admin(resources: &AppResources, session: &SessionUser) -> Result<(), Response> {
    match resources.repo.find_active_admin_role(session.user.id).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "forbidden",
                "error_description": "admin role required",
            })),
        )
            .into_response()),
        Err(e) => Err(OAuth2Error::from(e).into_response()),
    }
}

#[tracing::instrument(skip(resources, session))]
#[utoipa::path(
    get,
    path = "/clients",
    tag = ADMIN_TAG,
    operation_id = "Admin List Clients",
    summary = "List all registered clients",
    responses(
        (status = 200, description = "All clients", body = [ClientResponse]),
        (status = 401, description = "No session"),
        (status = 403, description = "Not an admin"),
    )
)]
pub async fn list_clients(
    State(resources): State<AppResources>,
    session: SessionUser,
) -> Response {
    if let Err(resp) = require_admin(&resources, &session).await {
        return resp;
    }
    match resources.repo.list_clients().await {
        Ok(clients) => Json(
            clients
                .into_iter()
                .map(|c| ClientResponse::from_model(c, None))
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => OAuth2Error::from(e).into_response(),
    }
}

#[tracing::instrument(skip(resources, session, body))]
#[utoipa::path(
    post,
    path = "/clients",
    tag = ADMIN_TAG,
    operation_id = "Admin Create Client",
    summary = "Register a new client",
    description = "Generates the external client_id, and for confidential clients a secret that \
                   is returned exactly once.",
    request_body(content = CreateClientRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Client created", body = ClientResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorBody),
    )
)]
pub async fn create_client(
    State(resources): State<AppResources>,
    session: SessionUser,
    Json(body): Json<CreateClientRequest>,
) -> Response {
    if let Err(resp) = require_admin(&resources, &session).await {
        return resp;
    }

    if body.name.trim().is_empty() {
        return OAuth2Error::invalid_request("name is required").into_response();
    }
    if body.redirect_uris.is_empty() {
        return OAuth2Error::invalid_request("at least one redirect URI is required")
            .into_response();
    }
    for uri in &body.redirect_uris {
        if url::Url::parse(uri).is_err() {
            return OAuth2Error::invalid_request(format!("invalid redirect URI: {uri}"))
                .into_response();
        }
    }

    let is_confidential = body.is_confidential.unwrap_or(true);
    let (secret, secret_hash) = if is_confidential {
        let secret = crypto::generate_token();
        match crypto::hash_password(&secret) {
            Ok(hash) => (Some(secret), Some(hash)),
            Err(e) => {
                tracing::error!(error = %e, "client secret hashing failed");
                return OAuth2Error::server_error().into_response();
            }
        }
    } else {
        (None, None)
    };

    let external_id = format!("client-{}", Uuid::new_v4().simple());
    let scopes = body
        .allowed_scopes
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| vec!["openid".to_string()]);

    let created = resources
        .repo
        .create_client(NewClient {
            client_id: external_id,
            client_secret_hash: secret_hash,
            name: body.name.trim().to_string(),
            description: body.description,
            redirect_uris: serde_json::to_string(&body.redirect_uris)
                .unwrap_or_else(|_| "[]".into()),
            allowed_scopes: scopes.join(" "),
            is_confidential,
            require_consent: body.require_consent.unwrap_or(true),
            trusted_client: body.trusted_client.unwrap_or(false),
            created_by: Some(session.user.id),
        })
        .await;

    match created {
        Ok(model) => {
            tracing::info!(client_id = %model.client_id, "client registered");
            (
                StatusCode::CREATED,
                Json(ClientResponse::from_model(model, secret)),
            )
                .into_response()
        }
        Err(e) => OAuth2Error::from(e).into_response(),
    }
}

#[tracing::instrument(skip(resources, session))]
#[utoipa::path(
    get,
    path = "/clients/{client_id}",
    tag = ADMIN_TAG,
    operation_id = "Admin Get Client",
    summary = "Fetch one client by external identifier",
    params(("client_id" = String, Path, description = "External client identifier")),
    responses(
        (status = 200, description = "The client", body = ClientResponse),
        (status = 404, description = "Unknown client"),
    )
)]
pub async fn get_client(
    State(resources): State<AppResources>,
    session: SessionUser,
    Path(client_id): Path<String>,
) -> Response {
    if let Err(resp) = require_admin(&resources, &session).await {
        return resp;
    }
    match resources.repo.find_client_by_client_id(&client_id).await {
        Ok(Some(c)) => Json(ClientResponse::from_model(c, None)).into_response(),
        Ok(None) => client_not_found(),
        Err(e) => OAuth2Error::from(e).into_response(),
    }
}

#[tracing::instrument(skip(resources, session, body))]
#[utoipa::path(
    put,
    path = "/clients/{client_id}",
    tag = ADMIN_TAG,
    operation_id = "Admin Update Client",
    summary = "Update a client's settings",
    params(("client_id" = String, Path, description = "External client identifier")),
    request_body(content = UpdateClientRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Updated client", body = ClientResponse),
        (status = 404, description = "Unknown client"),
    )
)]
pub async fn update_client(
    State(resources): State<AppResources>,
    session: SessionUser,
    Path(client_id): Path<String>,
    Json(body): Json<UpdateClientRequest>,
) -> Response {
    if let Err(resp) = require_admin(&resources, &session).await {
        return resp;
    }

    let mut model = match resources.repo.find_client_by_client_id(&client_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return client_not_found(),
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    if let Some(name) = body.name {
        if name.trim().is_empty() {
            return OAuth2Error::invalid_request("name must not be empty").into_response();
        }
        model.name = name.trim().to_string();
    }
    if let Some(description) = body.description {
        model.description = Some(description);
    }
    if let Some(uris) = body.redirect_uris {
        if uris.is_empty() {
            return OAuth2Error::invalid_request("at least one redirect URI is required")
                .into_response();
        }
        for uri in &uris {
            if url::Url::parse(uri).is_err() {
                return OAuth2Error::invalid_request(format!("invalid redirect URI: {uri}"))
                    .into_response();
            }
        }
        model.redirect_uris = serde_json::to_string(&uris).unwrap_or_else(|_| "[]".into());
    }
    if let Some(scopes) = body.allowed_scopes {
        model.allowed_scopes = scopes.join(" ");
    }
    if let Some(require_consent) = body.require_consent {
        model.require_consent = require_consent;
    }
    if let Some(trusted_client) = body.trusted_client {
        model.trusted_client = trusted_client;
    }

    match resources.repo.update_client(model).await {
        Ok(updated) => Json(ClientResponse::from_model(updated, None)).into_response(),
        Err(e) => OAuth2Error::from(e).into_response(),
    }
}

#[tracing::instrument(skip(resources, session))]
#[utoipa::path(
    delete,
    path = "/clients/{client_id}",
    tag = ADMIN_TAG,
    operation_id = "Admin Deactivate Client",
    summary = "Deactivate a client",
    description = "Deactivation rejects new authorization and token requests but preserves all \
                   existing rows for audit.",
    params(("client_id" = String, Path, description = "External client identifier")),
    responses(
        (status = 200, description = "Client deactivated"),
        (status = 404, description = "Unknown client"),
    )
)]
pub async fn delete_client(
    State(resources): State<AppResources>,
    session: SessionUser,
    Path(client_id): Path<String>,
) -> Response {
    if let Err(resp) = require_admin(&resources, &session).await {
        return resp;
    }

    let model = match resources.repo.find_client_by_client_id(&client_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return client_not_found(),
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    match resources.repo.deactivate_client(model.id).await {
        Ok(_) => Json(serde_json::json!({"message": "client deactivated"})).into_response(),
        Err(e) => OAuth2Error::from(e).into_response(),
    }
}

fn client_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Client not found"})),
    )
        .into_response()
}
