//! First-party identity endpoint tests: register, login, logout, profile,
//! and the session adapter they feed.

use std::sync::Arc;

use axum_test::TestServer;
use migration::{Migrator, MigratorTrait};
use noraneko_id::{
    AppResources,
    config::{AppConfig, Environment},
    crypto,
    entity::client,
    repository::{NewClient, Repository},
};
use sea_orm::Database;
use time::{Duration, OffsetDateTime};

fn test_config() -> AppConfig {
    AppConfig {
        db_host: "localhost".into(),
        db_port: 5432,
        db_user: "postgres".into(),
        db_password: String::new(),
        db_name: "noraneko_id_test".into(),
        db_ssl_mode: "disable".into(),
        jwt_secret: "test-jwt-secret-test-jwt-secret!".into(),
        server_port: 8080,
        environment: Environment::Development,
        oauth2_auth_code_expiration_minutes: 10,
        oauth2_access_token_expiration_hours: 1,
        oauth2_refresh_token_expiration_days: 30,
        oauth2_pkce_plain_enabled: true,
        login_url: "/login".into(),
    }
}

async fn setup() -> (AppResources, TestServer) {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    Migrator::up(&db, None).await.expect("migrate");

    let resources = AppResources::new(Arc::new(db), Arc::new(test_config()));
    let server = TestServer::new(noraneko_id::api::build_router(resources.clone()))
        .expect("create test server");
    (resources, server)
}

async fn seed_client(repo: &Repository, client_id: &str) -> client::Model {
    repo.create_client(NewClient {
        client_id: client_id.to_string(),
        client_secret_hash: None,
        name: format!("{client_id} app"),
        description: None,
        redirect_uris: r#"["http://localhost:3000/cb"]"#.to_string(),
        allowed_scopes: "openid profile email".to_string(),
        is_confidential: false,
        require_consent: true,
        trusted_client: false,
        created_by: None,
    })
    .await
    .expect("seed client")
}

#[tokio::test]
async fn register_creates_user_and_provider() {
    let (resources, server) = setup().await;
    seed_client(&resources.repo, "app-one").await;

    let response = server
        .post("/auth/register")
        .json(&serde_json::json!({
            "email": "new@example.com",
            "password": "hunter22",
            "client_id": "app-one",
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["user"]["email"], "new@example.com");
    assert_eq!(body["user"]["client_id"], "app-one");
    assert!(
        body["user"]["username"]
            .as_str()
            .unwrap()
            .starts_with("user-")
    );
    // The stored hash is never part of the response.
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn register_rejects_duplicate_email_within_client() {
    let (resources, server) = setup().await;
    seed_client(&resources.repo, "app-one").await;

    let payload = serde_json::json!({
        "email": "dup@example.com",
        "password": "hunter22",
        "client_id": "app-one",
    });
    server
        .post("/auth/register")
        .json(&payload)
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = server.post("/auth/register").json(&payload).await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn same_email_allowed_under_different_clients() {
    let (resources, server) = setup().await;
    seed_client(&resources.repo, "app-one").await;
    seed_client(&resources.repo, "app-two").await;

    for client_id in ["app-one", "app-two"] {
        let response = server
            .post("/auth/register")
            .json(&serde_json::json!({
                "email": "shared@example.com",
                "password": "hunter22",
                "client_id": client_id,
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
    }
}

#[tokio::test]
async fn register_validates_input() {
    let (resources, server) = setup().await;
    seed_client(&resources.repo, "app-one").await;

    // Bad email.
    server
        .post("/auth/register")
        .json(&serde_json::json!({
            "email": "not-an-email",
            "password": "hunter22",
            "client_id": "app-one",
        }))
        .await
        .assert_status_bad_request();

    // Short password.
    server
        .post("/auth/register")
        .json(&serde_json::json!({
            "email": "ok@example.com",
            "password": "short",
            "client_id": "app-one",
        }))
        .await
        .assert_status_bad_request();

    // Unknown client.
    server
        .post("/auth/register")
        .json(&serde_json::json!({
            "email": "ok@example.com",
            "password": "hunter22",
            "client_id": "ghost",
        }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn login_sets_session_cookie_and_profile_works() {
    let (resources, server) = setup().await;
    let client = seed_client(&resources.repo, "app-one").await;
    let hash = crypto::hash_password("hunter22").unwrap();
    resources
        .repo
        .create_user(client.id, "u@example.com", "user-u", Some(hash))
        .await
        .unwrap();

    let response = server
        .post("/auth/login")
        .json(&serde_json::json!({
            "email": "u@example.com",
            "password": "hunter22",
            "client_id": "app-one",
        }))
        .await;
    response.assert_status_ok();
    let cookie = response.cookie("session_token");
    assert!(cookie.http_only().unwrap_or(false));

    // last_login_at is stamped on login.
    let user = resources
        .repo
        .find_active_user_by_email(client.id, "u@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(user.last_login_at.is_some());

    let profile = server.get("/auth/profile").add_cookie(cookie).await;
    profile.assert_status_ok();
    let body: serde_json::Value = profile.json();
    assert_eq!(body["email"], "u@example.com");
    assert_eq!(body["client_id"], "app-one");
}

#[tokio::test]
async fn login_is_tenant_scoped() {
    let (resources, server) = setup().await;
    let c1 = seed_client(&resources.repo, "app-one").await;
    seed_client(&resources.repo, "app-two").await;
    let hash = crypto::hash_password("hunter22").unwrap();
    resources
        .repo
        .create_user(c1.id, "u@example.com", "user-u", Some(hash))
        .await
        .unwrap();

    // Same credentials against the other tenant fail.
    let response = server
        .post("/auth/login")
        .json(&serde_json::json!({
            "email": "u@example.com",
            "password": "hunter22",
            "client_id": "app-two",
        }))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let (resources, server) = setup().await;
    let client = seed_client(&resources.repo, "app-one").await;
    let hash = crypto::hash_password("hunter22").unwrap();
    resources
        .repo
        .create_user(client.id, "u@example.com", "user-u", Some(hash))
        .await
        .unwrap();

    let response = server
        .post("/auth/login")
        .json(&serde_json::json!({
            "email": "u@example.com",
            "password": "wrong",
            "client_id": "app-one",
        }))
        .await;
    response.assert_status_unauthorized();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_credentials");
}

#[tokio::test]
async fn login_rejects_passwordless_account() {
    let (resources, server) = setup().await;
    let client = seed_client(&resources.repo, "app-one").await;
    resources
        .repo
        .create_user(client.id, "sns@example.com", "user-sns", None)
        .await
        .unwrap();

    let response = server
        .post("/auth/login")
        .json(&serde_json::json!({
            "email": "sns@example.com",
            "password": "anything",
            "client_id": "app-one",
        }))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let (resources, server) = setup().await;
    let client = seed_client(&resources.repo, "app-one").await;
    let hash = crypto::hash_password("hunter22").unwrap();
    resources
        .repo
        .create_user(client.id, "u@example.com", "user-u", Some(hash))
        .await
        .unwrap();

    let login = server
        .post("/auth/login")
        .json(&serde_json::json!({
            "email": "u@example.com",
            "password": "hunter22",
            "client_id": "app-one",
        }))
        .await;
    login.assert_status_ok();
    let cookie = login.cookie("session_token");

    server
        .post("/auth/logout")
        .add_cookie(cookie.clone())
        .await
        .assert_status_ok();

    // The revoked session no longer authenticates.
    server
        .get("/auth/profile")
        .add_cookie(cookie)
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn profile_requires_a_session() {
    let (_, server) = setup().await;

    server.get("/auth/profile").await.assert_status_unauthorized();
}

#[tokio::test]
async fn expired_session_is_anonymous() {
    let (resources, server) = setup().await;
    let client = seed_client(&resources.repo, "app-one").await;
    let user = resources
        .repo
        .create_user(client.id, "u@example.com", "user-u", None)
        .await
        .unwrap();

    let token = crypto::generate_token();
    resources
        .repo
        .create_session(
            user.id,
            &crypto::token_fingerprint(&token),
            OffsetDateTime::now_utc() - Duration::minutes(1),
            None,
            None,
        )
        .await
        .unwrap();

    let response = server
        .get("/auth/profile")
        .add_cookie(cookie::Cookie::new("session_token", token))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn garbage_session_cookie_is_anonymous() {
    let (_, server) = setup().await;

    let response = server
        .get("/auth/profile")
        .add_cookie(cookie::Cookie::new("session_token", "forged-value"))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn health_reports_service_and_environment() {
    let (_, server) = setup().await;

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "noraneko-id");
    assert_eq!(body["environment"], "development");
}
