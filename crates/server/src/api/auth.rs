//! First-party identity endpoints: register, login, logout, profile.
//!
//! Login validates the password against the tenant-scoped user, persists a
//! session row keyed by the fingerprint of a fresh random token, and sets
//! that token as the `session_token` cookie. Browser form submissions get
//! redirects with an `error` query parameter; JSON callers get JSON.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

use crate::AppResources;
use crate::api::extract::FormOrJson;
use crate::api::session::{SESSION_COOKIE, SessionUser};
use crate::crypto;
use crate::entity::user_auth_provider::ProviderType;
use crate::error::OAuth2Error;

/// OpenAPI tag for identity endpoints.
pub const AUTH_TAG: &str = "Auth";

/// Sessions last a day; the cookie and the row expire together.
const SESSION_LIFETIME: Duration = Duration::hours(24);

/// Creates the /auth router.
pub fn router() -> OpenApiRouter<AppResources> {
    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(login))
        .routes(routes!(logout))
        .routes(routes!(profile))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    /// Browser flows only: where to go after success.
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    /// External client identifier of the owning tenant.
    pub client_id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub email_verified: bool,
}

fn is_form_request(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

/// Send a browser back to the login page with an error message, keeping
/// the flow parameters it arrived with.
fn login_error_redirect(
    login_url: &str,
    error: &str,
    client_id: Option<&str>,
    redirect_uri: Option<&str>,
) -> Response {
    let mut url = format!("{}?error={}", login_url, urlencoding::encode(error));
    if let Some(client_id) = client_id.filter(|c| !c.is_empty()) {
        url.push_str(&format!("&client_id={}", urlencoding::encode(client_id)));
    }
    if let Some(redirect_uri) = redirect_uri.filter(|r| !r.is_empty()) {
        url.push_str(&format!("&redirect_uri={}", urlencoding::encode(redirect_uri)));
    }
    Redirect::to(&url).into_response()
}

/// Register a new user account within a client.
#[tracing::instrument(skip(resources, headers, body))]
#[utoipa::path(
    post,
    path = "/register",
    tag = AUTH_TAG,
    operation_id = "Auth Register",
    summary = "Create a user account in a client's identity pool",
    request_body(content = RegisterRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Account created"),
        (status = 400, description = "Invalid request or unknown client", body = crate::error::ErrorBody),
        (status = 409, description = "Email already registered for this client", body = crate::error::ErrorBody),
    )
)]
pub async fn register(
    State(resources): State<AppResources>,
    headers: HeaderMap,
    body: FormOrJson<RegisterRequest>,
) -> Response {
    let params = body.0;
    let is_form = is_form_request(&headers);
    let login_url = resources.config.login_url.clone();
    let fail = |error: &str, status: StatusCode| -> Response {
        if is_form {
            login_error_redirect(
                &login_url,
                error,
                params.client_id.as_deref(),
                params.redirect_uri.as_deref(),
            )
        } else {
            (
                status,
                Json(serde_json::json!({
                    "error": "invalid_request",
                    "error_description": error,
                })),
            )
                .into_response()
        }
    };

    let email = params.email.as_deref().unwrap_or("").trim().to_lowercase();
    let password = params.password.as_deref().unwrap_or("");
    let client_id = params.client_id.as_deref().unwrap_or("");

    if email.is_empty() || !email.contains('@') {
        return fail("a valid email address is required", StatusCode::BAD_REQUEST);
    }
    if password.len() < 6 {
        return fail(
            "password must be at least 6 characters",
            StatusCode::BAD_REQUEST,
        );
    }
    if client_id.is_empty() {
        return fail("client_id is required", StatusCode::BAD_REQUEST);
    }

    let client = match resources.repo.find_active_client_by_client_id(client_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return fail("unknown client", StatusCode::BAD_REQUEST),
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    match resources.repo.email_taken(client.id, &email).await {
        Ok(true) => {
            return fail(
                "this email address is already registered",
                StatusCode::CONFLICT,
            );
        }
        Ok(false) => {}
        Err(e) => return OAuth2Error::from(e).into_response(),
    }

    let password_hash = match crypto::hash_password(password) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "password hashing failed");
            return OAuth2Error::server_error().into_response();
        }
    };

    // Username is an internal identifier; users pick a display name later.
    let username = format!("user-{}", &Uuid::new_v4().simple().to_string()[..12]);

    let user = match resources
        .repo
        .create_user(client.id, &email, &username, Some(password_hash))
        .await
    {
        Ok(u) => u,
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    if let Err(e) = resources
        .repo
        .create_auth_provider(user.id, ProviderType::Password.as_str(), Some(email.clone()))
        .await
    {
        return OAuth2Error::from(e).into_response();
    }

    tracing::info!(user_id = %user.id, client_id = %client.client_id, "user registered");

    if is_form {
        let target = params
            .redirect_uri
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or("/");
        return Redirect::to(target).into_response();
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "account created",
            "user": UserResponse {
                id: user.id.to_string(),
                client_id: client.client_id,
                email: user.email,
                username: user.username,
                display_name: user.display_name,
                email_verified: user.email_verified,
            },
        })),
    )
        .into_response()
}

/// Log a user in and establish a session cookie.
#[tracing::instrument(skip(resources, jar, headers, body))]
#[utoipa::path(
    post,
    path = "/login",
    tag = AUTH_TAG,
    operation_id = "Auth Login",
    summary = "Authenticate with email and password",
    description = "Credentials are checked against the user pool of the given client only. On \
                   success a `session_token` cookie (HttpOnly, SameSite=Lax, 24 h) is set.",
    request_body(content = LoginRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Logged in"),
        (status = 401, description = "Bad credentials", body = crate::error::ErrorBody),
    )
)]
pub async fn login(
    State(resources): State<AppResources>,
    jar: CookieJar,
    headers: HeaderMap,
    body: FormOrJson<LoginRequest>,
) -> Response {
    let params = body.0;
    let is_form = is_form_request(&headers);
    let login_url = resources.config.login_url.clone();
    let fail = |error: &str, status: StatusCode| -> Response {
        if is_form {
            login_error_redirect(
                &login_url,
                error,
                params.client_id.as_deref(),
                params.redirect_uri.as_deref(),
            )
        } else {
            (
                status,
                Json(serde_json::json!({
                    "error": "invalid_credentials",
                    "error_description": error,
                })),
            )
                .into_response()
        }
    };

    let email = params.email.as_deref().unwrap_or("").trim().to_lowercase();
    let password = params.password.as_deref().unwrap_or("");
    let client_id = params.client_id.as_deref().unwrap_or("");

    if email.is_empty() || password.is_empty() || client_id.is_empty() {
        return fail(
            "email, password, and client_id are required",
            StatusCode::BAD_REQUEST,
        );
    }

    let client = match resources.repo.find_active_client_by_client_id(client_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return fail("unknown client", StatusCode::BAD_REQUEST),
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    // Lookup and verification failures produce the same message; which of
    // the two happened is nobody's business.
    let user = match resources.repo.find_active_user_by_email(client.id, &email).await {
        Ok(Some(u)) => u,
        Ok(None) => return fail("invalid email or password", StatusCode::UNAUTHORIZED),
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    let Some(stored_hash) = user.password_hash.as_deref() else {
        return fail(
            "this account does not support password login",
            StatusCode::UNAUTHORIZED,
        );
    };
    if !crypto::verify_password(password, stored_hash) {
        return fail("invalid email or password", StatusCode::UNAUTHORIZED);
    }

    let session_token = crypto::generate_token();
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(500).collect::<String>());

    if let Err(e) = resources
        .repo
        .create_session(
            user.id,
            &crypto::token_fingerprint(&session_token),
            OffsetDateTime::now_utc() + SESSION_LIFETIME,
            user_agent,
            None,
        )
        .await
    {
        return OAuth2Error::from(e).into_response();
    }

    if let Err(e) = resources.repo.touch_last_login(user.id).await {
        tracing::warn!(error = %e, "failed to update last_login_at");
    }

    tracing::info!(user_id = %user.id, client_id = %client.client_id, "user logged in");

    let cookie = Cookie::build((SESSION_COOKIE, session_token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(SESSION_LIFETIME)
        .build();
    let jar = jar.add(cookie);

    if is_form {
        let target = params
            .redirect_uri
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or("/");
        return (jar, Redirect::to(target)).into_response();
    }

    (
        jar,
        Json(serde_json::json!({
            "message": "logged in",
            "user": UserResponse {
                id: user.id.to_string(),
                client_id: client.client_id,
                email: user.email,
                username: user.username,
                display_name: user.display_name,
                email_verified: user.email_verified,
            },
        })),
    )
        .into_response()
}

/// Revoke the current session and clear the cookie.
#[tracing::instrument(skip(resources, jar))]
#[utoipa::path(
    post,
    path = "/logout",
    tag = AUTH_TAG,
    operation_id = "Auth Logout",
    summary = "End the current session",
    responses((status = 200, description = "Logged out (also when no session existed)"))
)]
pub async fn logout(State(resources): State<AppResources>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let hash = crypto::token_fingerprint(cookie.value());
        if let Err(e) = resources.repo.revoke_session_by_hash(&hash).await {
            tracing::error!(error = %e, "session revocation failed");
        }
    }

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    (jar, Json(serde_json::json!({"message": "logged out"}))).into_response()
}

/// The current session's user document.
#[tracing::instrument(skip(resources, session))]
#[utoipa::path(
    get,
    path = "/profile",
    tag = AUTH_TAG,
    operation_id = "Auth Profile",
    summary = "Profile of the session user",
    responses(
        (status = 200, description = "Profile", body = UserResponse),
        (status = 401, description = "No valid session"),
    )
)]
pub async fn profile(
    State(resources): State<AppResources>,
    session: SessionUser,
) -> Response {
    let user = session.user;
    let client_id = match resources.repo.find_client_by_id(user.client_id).await {
        Ok(Some(c)) => c.client_id,
        Ok(None) => {
            tracing::error!(user_id = %user.id, "session user references a missing client");
            return OAuth2Error::server_error().into_response();
        }
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    Json(UserResponse {
        id: user.id.to_string(),
        client_id,
        email: user.email,
        username: user.username,
        display_name: user.display_name,
        email_verified: user.email_verified,
    })
    .into_response()
}
