//! Token, revocation, userinfo, and client-info endpoints.

use axum::{
    Form, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::api::extract::FormOrJson;
use crate::crypto;
use crate::entity::client;
use crate::error::{ErrorCode, OAuth2Error};
use crate::oauth2::{OAUTH2_TAG, OAuth2State};
use crate::repository::{NewAccessToken, NewRefreshToken};

/// Token request fields, identical for form-encoded and JSON bodies.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer".
    pub token_type: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
    pub refresh_token: String,
    /// Space-joined granted scopes.
    pub scope: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserInfoResponse {
    /// Subject - the user ID.
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClientInfoResponse {
    pub client_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// OAuth2 token endpoint.
#[tracing::instrument(skip(state, headers, body))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code or refresh token for tokens",
    description = "Supports the `authorization_code` grant (with PKCE verification when the code \
                   carries a challenge) and the `refresh_token` grant (with rotation: the \
                   presented refresh token is revoked atomically with the new issuance).\n\n\
                   Accepts `application/x-www-form-urlencoded` and `application/json` bodies with \
                   identical field names. Confidential clients authenticate via HTTP Basic or the \
                   `client_secret` field.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Malformed request or invalid grant", body = crate::error::ErrorBody),
        (status = 401, description = "Client authentication failed", body = crate::error::ErrorBody),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    body: FormOrJson<TokenRequest>,
) -> Response {
    let params = body.0;
    let (client_id, client_secret) = extract_client_credentials(&headers, &params);

    let Some(client_id) = client_id else {
        return OAuth2Error::invalid_request("client_id is required").into_response();
    };

    let client = match state.repo().find_active_client_by_client_id(&client_id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return OAuth2Error::invalid_client("client authentication failed").into_response();
        }
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    match params.grant_type.as_deref() {
        Some("authorization_code") => {
            handle_authorization_code_grant(state, client, params, client_secret)
                .await
                .into_response()
        }
        Some("refresh_token") => handle_refresh_token_grant(state, client, params, client_secret)
            .await
            .into_response(),
        Some(other) => OAuth2Error::new(
            ErrorCode::UnsupportedGrantType,
            format!("unsupported grant type: {other}"),
        )
        .into_response(),
        None => OAuth2Error::invalid_request("grant_type is required").into_response(),
    }
}

async fn handle_authorization_code_grant(
    state: OAuth2State,
    client: client::Model,
    params: TokenRequest,
    client_secret: Option<String>,
) -> Result<Json<TokenResponse>, OAuth2Error> {
    let code = params
        .code
        .as_deref()
        .ok_or_else(|| OAuth2Error::invalid_request("code is required"))?;

    // Only codes that have never been redeemed are visible here; the
    // final say on single use is the conditional UPDATE at redemption.
    let auth_code = state
        .repo()
        .find_unused_code(code)
        .await?
        .ok_or_else(|| OAuth2Error::invalid_grant("authorization code not found"))?;

    if auth_code.is_expired() {
        return Err(OAuth2Error::invalid_grant("authorization code expired"));
    }

    if auth_code.client_id != client.id {
        return Err(OAuth2Error::invalid_grant("authorization code was issued to another client"));
    }

    if params.redirect_uri.as_deref() != Some(auth_code.redirect_uri.as_str()) {
        return Err(OAuth2Error::invalid_grant("redirect_uri mismatch"));
    }

    if auth_code.code_challenge.is_some() {
        let Some(verifier) = params.code_verifier.as_deref() else {
            return Err(OAuth2Error::invalid_grant("code_verifier is required"));
        };
        if !auth_code.verify_pkce(verifier) {
            return Err(OAuth2Error::invalid_grant("PKCE verification failed"));
        }
    }

    authenticate_client(&client, client_secret.as_deref())?;

    let scopes = auth_code.scopes_list();
    let now = OffsetDateTime::now_utc();
    let access_token = state.signer.issue(
        auth_code.user_id,
        client.id,
        &scopes,
        state.access_token_lifetime_secs(),
    )?;
    let refresh_token = crypto::generate_token();

    let issued = state
        .repo()
        .redeem_authorization_code(
            auth_code.id,
            NewAccessToken {
                token_hash: crypto::token_fingerprint(&access_token),
                client_id: client.id,
                user_id: auth_code.user_id,
                scopes: auth_code.scopes.clone(),
                expires_at: now + state.access_token_lifetime,
            },
            NewRefreshToken {
                token_hash: crypto::token_fingerprint(&refresh_token),
                client_id: client.id,
                user_id: auth_code.user_id,
                scopes: auth_code.scopes.clone(),
                expires_at: now + state.refresh_token_lifetime,
            },
        )
        .await?;

    // A concurrent request redeemed the code between our read and the
    // conditional UPDATE; to this caller the code is simply spent.
    if issued.is_none() {
        return Err(OAuth2Error::invalid_grant("authorization code already used"));
    }

    tracing::info!(
        user_id = %auth_code.user_id,
        client_id = %client.client_id,
        "authorization code redeemed"
    );

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.access_token_lifetime_secs(),
        refresh_token,
        scope: auth_code.scopes,
    }))
}

async fn handle_refresh_token_grant(
    state: OAuth2State,
    client: client::Model,
    params: TokenRequest,
    client_secret: Option<String>,
) -> Result<Json<TokenResponse>, OAuth2Error> {
    let presented = params
        .refresh_token
        .as_deref()
        .ok_or_else(|| OAuth2Error::invalid_request("refresh_token is required"))?;

    let presented_hash = crypto::token_fingerprint(presented);
    let existing = state
        .repo()
        .find_live_refresh_token_by_hash(&presented_hash)
        .await?
        .ok_or_else(|| OAuth2Error::invalid_grant("invalid refresh token"))?;

    if existing.is_expired() {
        return Err(OAuth2Error::invalid_grant("refresh token expired"));
    }

    if existing.client_id != client.id {
        return Err(OAuth2Error::invalid_grant("refresh token was issued to another client"));
    }

    authenticate_client(&client, client_secret.as_deref())?;

    // Rotation keeps the grant identical: same user, same client, same
    // scopes. Only the credential strings change.
    let scopes = existing.scopes_list();
    let now = OffsetDateTime::now_utc();
    let access_token = state.signer.issue(
        existing.user_id,
        client.id,
        &scopes,
        state.access_token_lifetime_secs(),
    )?;
    let refresh_token = crypto::generate_token();

    let rotated = state
        .repo()
        .rotate_refresh_token(
            &presented_hash,
            NewAccessToken {
                token_hash: crypto::token_fingerprint(&access_token),
                client_id: client.id,
                user_id: existing.user_id,
                scopes: existing.scopes.clone(),
                expires_at: now + state.access_token_lifetime,
            },
            NewRefreshToken {
                token_hash: crypto::token_fingerprint(&refresh_token),
                client_id: client.id,
                user_id: existing.user_id,
                scopes: existing.scopes.clone(),
                expires_at: now + state.refresh_token_lifetime,
            },
        )
        .await?;

    if rotated.is_none() {
        return Err(OAuth2Error::invalid_grant("invalid refresh token"));
    }

    tracing::info!(
        user_id = %existing.user_id,
        client_id = %client.client_id,
        "refresh token rotated"
    );

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.access_token_lifetime_secs(),
        refresh_token,
        scope: existing.scopes,
    }))
}

/// Confidential clients must present their secret; public clients carry
/// none. Verification runs the same KDF as password checks.
fn authenticate_client(
    client: &client::Model,
    presented_secret: Option<&str>,
) -> Result<(), OAuth2Error> {
    if !client.is_confidential {
        return Ok(());
    }
    let (Some(stored), Some(presented)) = (client.client_secret_hash.as_deref(), presented_secret)
    else {
        return Err(OAuth2Error::invalid_client("client authentication failed"));
    };
    if !crypto::verify_password(presented, stored) {
        return Err(OAuth2Error::invalid_client("client authentication failed"));
    }
    Ok(())
}

/// Pull client credentials from HTTP Basic auth, falling back to the
/// request body.
fn extract_client_credentials(
    headers: &HeaderMap,
    params: &TokenRequest,
) -> (Option<String>, Option<String>) {
    if let Some(auth) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(auth)
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return (Some(id.to_string()), Some(secret.to_string()));
    }

    (params.client_id.clone(), params.client_secret.clone())
}

/// Token revocation endpoint (RFC 7009).
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke an access or refresh token",
    description = "Marks the access-token row and, independently, the refresh-token row matching \
                   the presented value as revoked. Always returns 200 so revocation leaks nothing \
                   about token existence. Revoking a refresh token does not revoke its sibling \
                   access token.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "The token to revoke"
    ),
    responses(
        (status = 200, description = "Token revoked (or never existed)"),
        (status = 400, description = "Missing token parameter", body = crate::error::ErrorBody),
    )
)]
pub async fn revoke(State(state): State<OAuth2State>, Form(params): Form<RevokeRequest>) -> Response {
    let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) else {
        return OAuth2Error::invalid_request("token parameter is required").into_response();
    };

    let hash = crypto::token_fingerprint(token);
    if let Err(e) = state.repo().revoke_access_token_by_hash(&hash).await {
        tracing::error!(error = %e, "access-token revocation failed");
    }
    if let Err(e) = state.repo().revoke_refresh_token_by_hash(&hash).await {
        tracing::error!(error = %e, "refresh-token revocation failed");
    }

    // RFC 7009: success regardless of whether anything matched.
    StatusCode::OK.into_response()
}

/// OpenID Connect UserInfo endpoint.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect UserInfo",
    summary = "Scope-filtered claims about the token's user",
    description = "Requires a Bearer access token. Returns `sub` always; `username`/`name` with \
                   the `profile` scope; `email`/`email_verified` with the `email` scope. Revoked \
                   tokens are rejected even while their signature is still valid.",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User claims", body = UserInfoResponse),
        (status = 401, description = "Missing, invalid, expired, or revoked token", body = crate::error::ErrorBody),
    )
)]
pub async fn userinfo(State(state): State<OAuth2State>, headers: HeaderMap) -> Response {
    let token = match headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        Some(t) => t,
        None => {
            return OAuth2Error::invalid_token("missing or malformed Authorization header")
                .into_response();
        }
    };

    let claims = match state.signer.verify(token) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    // The signature alone would accept revoked tokens until they expire;
    // the fingerprint row is the revocation authority.
    match state
        .repo()
        .find_access_token_by_hash(&crypto::token_fingerprint(token))
        .await
    {
        Ok(Some(row)) if row.is_revoked() => {
            return OAuth2Error::invalid_token("invalid or expired access token").into_response();
        }
        Ok(_) => {}
        Err(e) => return OAuth2Error::from(e).into_response(),
    }

    let user = match state
        .repo()
        .find_active_user_in_client(claims.user_id, claims.client_id)
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => {
            return OAuth2Error::invalid_token("invalid or expired access token").into_response();
        }
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    let mut response = UserInfoResponse {
        sub: user.id.to_string(),
        username: None,
        name: None,
        email: None,
        email_verified: None,
    };

    if claims.has_scope("profile") {
        response.username = Some(user.username);
        response.name = user.display_name;
    }
    if claims.has_scope("email") {
        response.email = Some(user.email);
        response.email_verified = Some(user.email_verified);
    }

    (StatusCode::OK, Json(response)).into_response()
}

/// Public client display info, for external login/consent pages.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/client-info/{client_id}",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Client Info",
    summary = "Public display information for a client",
    params(
        ("client_id" = String, Path, description = "External client identifier"),
    ),
    responses(
        (status = 200, description = "Client display info", body = ClientInfoResponse),
        (status = 404, description = "Unknown client"),
    )
)]
pub async fn client_info(
    State(state): State<OAuth2State>,
    Path(client_id): Path<String>,
) -> Response {
    match state.repo().find_active_client_by_client_id(&client_id).await {
        Ok(Some(client)) => {
            let redirect_uri = client.redirect_uris_list().first().cloned();
            (
                StatusCode::OK,
                Json(ClientInfoResponse {
                    client_id: client.client_id,
                    name: client.name,
                    description: client.description,
                    redirect_uri,
                    logo_url: client.logo_url,
                    website: client.website,
                }),
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Client not found"})),
        )
            .into_response(),
        Err(e) => OAuth2Error::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn empty_request() -> TokenRequest {
        TokenRequest {
            grant_type: None,
            code: None,
            redirect_uri: None,
            client_id: None,
            client_secret: None,
            code_verifier: None,
            refresh_token: None,
        }
    }

    #[test]
    fn basic_auth_takes_precedence_over_body() {
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode("client-a:s3cret");
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        let mut params = empty_request();
        params.client_id = Some("client-b".into());

        let (id, secret) = extract_client_credentials(&headers, &params);
        assert_eq!(id.as_deref(), Some("client-a"));
        assert_eq!(secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn malformed_basic_auth_falls_back_to_body() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic ???"));
        let mut params = empty_request();
        params.client_id = Some("client-b".into());
        params.client_secret = Some("body-secret".into());

        let (id, secret) = extract_client_credentials(&headers, &params);
        assert_eq!(id.as_deref(), Some("client-b"));
        assert_eq!(secret.as_deref(), Some("body-secret"));
    }

    #[test]
    fn public_clients_need_no_secret() {
        let now = OffsetDateTime::now_utc();
        let client = client::Model {
            id: uuid::Uuid::new_v4(),
            client_id: "public".into(),
            client_secret_hash: None,
            name: "Public".into(),
            description: None,
            redirect_uris: "[]".into(),
            allowed_scopes: "openid".into(),
            is_confidential: false,
            is_active: true,
            require_consent: true,
            trusted_client: false,
            logo_url: None,
            website: None,
            brand_color: None,
            consent_message: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        assert!(authenticate_client(&client, None).is_ok());
    }

    #[test]
    fn confidential_clients_verify_against_kdf_hash() {
        let now = OffsetDateTime::now_utc();
        let client = client::Model {
            id: uuid::Uuid::new_v4(),
            client_id: "confidential".into(),
            client_secret_hash: Some(crypto::hash_password("s3cret").unwrap()),
            name: "Confidential".into(),
            description: None,
            redirect_uris: "[]".into(),
            allowed_scopes: "openid".into(),
            is_confidential: true,
            is_active: true,
            require_consent: true,
            trusted_client: false,
            logo_url: None,
            website: None,
            brand_color: None,
            consent_message: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        assert!(authenticate_client(&client, Some("s3cret")).is_ok());
        assert!(authenticate_client(&client, Some("wrong")).is_err());
        assert!(authenticate_client(&client, None).is_err());
    }
}
