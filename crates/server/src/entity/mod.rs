//! Database entities.

pub mod access_token;
pub mod admin_role;
pub mod authorization_code;
pub mod client;
pub mod oauth_scope;
pub mod refresh_token;
pub mod user;
pub mod user_auth_provider;
pub mod user_session;
