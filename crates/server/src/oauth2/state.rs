//! Shared state for the OAuth2 endpoints.

use axum::extract::FromRef;
use time::Duration;

use crate::AppResources;
use crate::config::AppConfig;
use crate::jwt::AccessTokenSigner;
use crate::repository::Repository;

/// Everything the protocol engine needs per request: the repository, the
/// access-token signer, and the configured lifetimes.
#[derive(Clone)]
pub struct OAuth2State {
    pub resources: AppResources,
    pub signer: AccessTokenSigner,
    pub auth_code_lifetime: Duration,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub pkce_plain_enabled: bool,
    /// Where anonymous /authorize requests are sent to log in.
    pub login_url: String,
}

impl OAuth2State {
    pub fn from_config(resources: AppResources, config: &AppConfig) -> Self {
        Self {
            signer: AccessTokenSigner::new(&config.jwt_secret),
            auth_code_lifetime: Duration::minutes(config.oauth2_auth_code_expiration_minutes),
            access_token_lifetime: Duration::hours(config.oauth2_access_token_expiration_hours),
            refresh_token_lifetime: Duration::days(config.oauth2_refresh_token_expiration_days),
            pkce_plain_enabled: config.oauth2_pkce_plain_enabled,
            login_url: config.login_url.clone(),
            resources,
        }
    }

    pub fn repo(&self) -> &Repository {
        &self.resources.repo
    }

    pub fn access_token_lifetime_secs(&self) -> i64 {
        self.access_token_lifetime.whole_seconds()
    }
}

/// Lets extractors that only need the shared resources (e.g. the session
/// adapter) run against the OAuth2 state.
impl FromRef<OAuth2State> for AppResources {
    fn from_ref(state: &OAuth2State) -> AppResources {
        state.resources.clone()
    }
}
