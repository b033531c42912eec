//! Authorization endpoint.
//!
//! Validates `/oauth2/authorize` requests in the order required by RFC
//! 6749, gates them on an authenticated session of the *requested* client
//! (tenant binding), runs the consent-skip rules, and issues
//! authorization codes.
//!
//! Error routing: before the redirect URI has been validated against the
//! client allowlist, errors are JSON 400 - redirecting to an unvalidated
//! URI is itself the attack. Afterwards, errors are 302 redirects carrying
//! `error`, `error_description`, and the echoed `state`.

use askama::Template;
use axum::{
    Form, Json,
    extract::{OriginalUri, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::api::session::OptionalSessionUser;
use crate::crypto;
use crate::entity::{client, user, user_auth_provider::ProviderType};
use crate::error::{ErrorBody, ErrorCode, OAuth2Error};
use crate::oauth2::{OAUTH2_TAG, OAuth2State};
use crate::repository::NewAuthorizationCode;

/// OAuth2 authorization request parameters (query on GET, form fields on
/// the consent POST).
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    /// Space-separated; defaults to "openid".
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    /// "S256" (default) or "plain".
    pub code_challenge_method: Option<String>,
    /// Social identity provider tag; recognized but unimplemented.
    pub identity_provider: Option<String>,
    /// Consent decision, present on the POST only.
    pub approve: Option<String>,
}

/// A redirect target that has passed the allowlist check; only then may
/// errors be sent to it.
struct TrustedRedirect {
    uri: String,
    state: Option<String>,
}

impl TrustedRedirect {
    fn error(&self, code: ErrorCode, description: &str) -> Response {
        let mut url = match url::Url::parse(&self.uri) {
            Ok(u) => u,
            Err(_) => {
                return OAuth2Error::new(code, description).into_response();
            }
        };
        url.query_pairs_mut()
            .append_pair("error", code.as_str())
            .append_pair("error_description", description);
        if let Some(ref s) = self.state {
            url.query_pairs_mut().append_pair("state", s);
        }
        found(url.as_str())
    }

    fn success(&self, code: &str) -> Response {
        let mut url = match url::Url::parse(&self.uri) {
            Ok(u) => u,
            Err(_) => return OAuth2Error::server_error().into_response(),
        };
        url.query_pairs_mut().append_pair("code", code);
        if let Some(ref s) = self.state {
            url.query_pairs_mut().append_pair("state", s);
        }
        found(url.as_str())
    }
}

/// 302 Found, the status RFC 6749 examples use for authorization redirects.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// OAuth2 authorization endpoint.
#[tracing::instrument(skip(state, session, uri))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Start the Authorization Code flow",
    description = "Validates the authorization request, requires a session of the requested \
                   client, and either issues an authorization code immediately (trusted or \
                   consent-exempt clients) or renders the consent page.",
    params(
        ("response_type" = Option<String>, Query, description = "Must be `code`."),
        ("client_id" = Option<String>, Query, description = "External client identifier."),
        ("redirect_uri" = Option<String>, Query, description = "Must exactly match a registered redirect URI."),
        ("scope" = Option<String>, Query, description = "Space-separated scopes; defaults to `openid`."),
        ("state" = Option<String>, Query, description = "Opaque value echoed back to the client."),
        ("code_challenge" = Option<String>, Query, description = "PKCE code challenge."),
        ("code_challenge_method" = Option<String>, Query, description = "`S256` (default) or `plain`."),
        ("identity_provider" = Option<String>, Query, description = "Social provider tag; currently always unsupported."),
    ),
    responses(
        (status = 302, description = "Redirect to the client callback, the login page, or an error redirect"),
        (status = 400, description = "Request rejected before the redirect URI was validated", body = crate::error::ErrorBody),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    session: OptionalSessionUser,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<AuthorizeRequest>,
) -> Response {
    handle_authorize(state, params, session.0, Some(uri.to_string()), false).await
}

/// Consent-form submission.
#[tracing::instrument(skip(state, session, params))]
#[utoipa::path(
    post,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize Submit",
    summary = "Submit the consent decision",
    description = "Re-validates the authorization parameters and issues an authorization code \
                   when the user approved, or redirects with `access_denied` otherwise.",
    request_body(
        content = AuthorizeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "The authorization parameters plus the consent decision"
    ),
    responses(
        (status = 302, description = "Redirect to the client callback"),
        (status = 400, description = "Request rejected before the redirect URI was validated", body = crate::error::ErrorBody),
    )
)]
pub async fn authorize_submit(
    State(state): State<OAuth2State>,
    session: OptionalSessionUser,
    Form(params): Form<AuthorizeRequest>,
) -> Response {
    handle_authorize(state, params, session.0, None, true).await
}

async fn handle_authorize(
    state: OAuth2State,
    params: AuthorizeRequest,
    session: Option<crate::api::session::SessionUser>,
    original_uri: Option<String>,
    is_submit: bool,
) -> Response {
    // Resolve the client and check the redirect URI before anything else:
    // until both pass, no error may be redirected.
    let client = match params.client_id.as_deref() {
        Some(id) if !id.is_empty() => {
            match state.repo().find_active_client_by_client_id(id).await {
                Ok(c) => c,
                Err(e) => return OAuth2Error::from(e).into_response(),
            }
        }
        _ => None,
    };

    let redirect = client.as_ref().and_then(|c| {
        params.redirect_uri.as_deref().and_then(|uri| {
            c.is_redirect_uri_allowed(uri).then(|| TrustedRedirect {
                uri: uri.to_string(),
                state: params.state.clone(),
            })
        })
    });

    // 1. response_type must be "code". Redirected only when the redirect
    //    target is already trustworthy.
    if params.response_type.as_deref() != Some("code") {
        let description = "only the 'code' response type is supported";
        return match &redirect {
            Some(rd) => rd.error(ErrorCode::UnsupportedResponseType, description),
            None => {
                OAuth2Error::new(ErrorCode::UnsupportedResponseType, description).into_response()
            }
        };
    }

    // 2. Unknown or inactive client: JSON 400, never a redirect. (At the
    //    token endpoint invalid_client is a 401; here the caller is a
    //    browser, not an authenticating client.)
    let Some(client) = client else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: ErrorCode::InvalidClient.as_str().to_string(),
                error_description: Some("client not found or inactive".to_string()),
            }),
        )
            .into_response();
    };

    // 3. Redirect URI must exactly match the allowlist: JSON 400 otherwise.
    let Some(redirect) = redirect else {
        return OAuth2Error::invalid_request("invalid redirect_uri").into_response();
    };

    // 4. Scopes. An empty request falls back to the default scope.
    let scopes = requested_scopes(params.scope.as_deref());
    if !client.allows_scopes(&scopes) {
        return redirect.error(ErrorCode::InvalidScope, "requested scope is not allowed");
    }

    // 5. PKCE method, when a challenge was supplied.
    let code_challenge_method = params
        .code_challenge_method
        .clone()
        .unwrap_or_else(|| "S256".to_string());
    if params.code_challenge.is_some() {
        let plain_ok = state.pkce_plain_enabled && code_challenge_method == "plain";
        if code_challenge_method != "S256" && !plain_ok {
            return redirect.error(
                ErrorCode::InvalidRequest,
                "unsupported code_challenge_method",
            );
        }
    }

    // Social identity providers are enumerated but not implemented; bail
    // out before starting a flow that cannot finish.
    if let Some(provider) = params
        .identity_provider
        .as_deref()
        .filter(|p| !p.is_empty())
    {
        return match ProviderType::parse(provider) {
            Some(p) if p != ProviderType::Password && !p.is_implemented() => redirect.error(
                ErrorCode::UnsupportedProvider,
                &format!("the '{provider}' provider is not yet available"),
            ),
            _ => redirect.error(
                ErrorCode::InvalidRequest,
                &format!("unknown identity provider '{provider}'"),
            ),
        };
    }

    // Require an authenticated session. GET requests without one go to the
    // login page with the original URL to come back to; a consent POST
    // without one is a denial.
    let Some(session) = session else {
        if is_submit {
            return redirect.error(ErrorCode::AccessDenied, "user authentication required");
        }
        let target = original_uri.unwrap_or_default();
        return found(&format!(
            "{}?redirect_uri={}",
            state.login_url,
            urlencoding::encode(&target)
        ));
    };

    // Tenant binding: the session user must belong to the requested
    // client. A session from another tenant is treated exactly like a
    // refusal.
    let user = match state
        .repo()
        .find_active_user_in_client(session.user.id, client.id)
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => {
            tracing::warn!(
                user_id = %session.user.id,
                client_id = %client.client_id,
                "cross-tenant authorization attempt"
            );
            return redirect.error(
                ErrorCode::AccessDenied,
                "user does not belong to this client",
            );
        }
        Err(e) => return OAuth2Error::from(e).into_response(),
    };

    if is_submit {
        // Consent decision.
        if params.approve.as_deref() == Some("true") {
            return issue_code(&state, &client, &user, &scopes, &params, redirect).await;
        }
        return redirect.error(ErrorCode::AccessDenied, "user denied the request");
    }

    if client.skips_consent() {
        return issue_code(&state, &client, &user, &scopes, &params, redirect).await;
    }

    render_consent_page(&state, &client, &user, &scopes, &params).await
}

/// Generate, persist, and deliver an authorization code.
async fn issue_code(
    state: &OAuth2State,
    client: &client::Model,
    user: &user::Model,
    scopes: &[String],
    params: &AuthorizeRequest,
    redirect: TrustedRedirect,
) -> Response {
    let code = crypto::generate_token();
    let (code_challenge, code_challenge_method) = match params.code_challenge.clone() {
        Some(challenge) => (
            Some(challenge),
            Some(
                params
                    .code_challenge_method
                    .clone()
                    .unwrap_or_else(|| "S256".to_string()),
            ),
        ),
        None => (None, None),
    };

    let new_code = NewAuthorizationCode {
        code: code.clone(),
        client_id: client.id,
        user_id: user.id,
        redirect_uri: redirect.uri.clone(),
        scopes: scopes.join(" "),
        code_challenge,
        code_challenge_method,
        expires_at: OffsetDateTime::now_utc() + state.auth_code_lifetime,
    };

    if let Err(e) = state.repo().create_authorization_code(new_code).await {
        tracing::error!(error = %e, "failed to persist authorization code");
        return redirect.error(ErrorCode::ServerError, "failed to issue authorization code");
    }

    tracing::info!(
        user_id = %user.id,
        client_id = %client.client_id,
        "authorization code issued"
    );
    redirect.success(&code)
}

/// Parse the requested scopes, substituting the default when empty.
fn requested_scopes(scope: Option<&str>) -> Vec<String> {
    let scopes: Vec<String> = scope
        .unwrap_or_default()
        .split_whitespace()
        .map(String::from)
        .collect();
    if scopes.is_empty() {
        vec!["openid".to_string()]
    } else {
        scopes
    }
}

// ---------------------------------------------------------------------
// Consent page
// ---------------------------------------------------------------------

/// One scope line on the consent page.
struct ScopeEntry {
    name: String,
    description: String,
}

/// Built-in descriptions for the scope catalog misses.
fn fallback_scope_description(scope: &str) -> String {
    match scope {
        "openid" => "Verify your identity".to_string(),
        "profile" => "Access your profile information".to_string(),
        "email" => "Access your email address".to_string(),
        _ => format!("Access to {scope}"),
    }
}

#[derive(Template)]
#[template(path = "consent.html")]
struct ConsentTemplate {
    client_name: String,
    consent_message: String,
    brand_color: String,
    user_email: String,
    scopes: Vec<ScopeEntry>,
    response_type: String,
    client_id: String,
    redirect_uri: String,
    scope: String,
    state: String,
    code_challenge: String,
    code_challenge_method: String,
}

async fn render_consent_page(
    state: &OAuth2State,
    client: &client::Model,
    user: &user::Model,
    scopes: &[String],
    params: &AuthorizeRequest,
) -> Response {
    let mut entries = Vec::with_capacity(scopes.len());
    for name in scopes {
        let description = match state.repo().find_scope_by_name(name).await {
            Ok(Some(row)) => row
                .description
                .unwrap_or_else(|| fallback_scope_description(name)),
            _ => fallback_scope_description(name),
        };
        entries.push(ScopeEntry {
            name: name.clone(),
            description,
        });
    }

    let template = ConsentTemplate {
        client_name: client.name.clone(),
        consent_message: client.consent_message.clone().unwrap_or_else(|| {
            format!("{} is requesting access to your account", client.name)
        }),
        brand_color: client
            .brand_color
            .clone()
            .unwrap_or_else(|| "#4f46e5".to_string()),
        user_email: user.email.clone(),
        scopes: entries,
        response_type: "code".to_string(),
        client_id: client.client_id.clone(),
        redirect_uri: params.redirect_uri.clone().unwrap_or_default(),
        scope: scopes.join(" "),
        state: params.state.clone().unwrap_or_default(),
        code_challenge: params.code_challenge.clone().unwrap_or_default(),
        code_challenge_method: params
            .code_challenge
            .as_ref()
            .map(|_| {
                params
                    .code_challenge_method
                    .clone()
                    .unwrap_or_else(|| "S256".to_string())
            })
            .unwrap_or_default(),
    };

    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render consent template");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scope_falls_back_to_openid() {
        assert_eq!(requested_scopes(None), vec!["openid".to_string()]);
        assert_eq!(requested_scopes(Some("")), vec!["openid".to_string()]);
        assert_eq!(
            requested_scopes(Some("openid profile")),
            vec!["openid".to_string(), "profile".to_string()]
        );
    }

    #[test]
    fn fallback_descriptions_cover_standard_scopes() {
        assert_eq!(fallback_scope_description("openid"), "Verify your identity");
        assert_eq!(
            fallback_scope_description("custom:thing"),
            "Access to custom:thing"
        );
    }
}
