//! Admin client-management tests.

use std::sync::Arc;

use axum_test::TestServer;
use cookie::Cookie;
use migration::{Migrator, MigratorTrait};
use noraneko_id::{
    AppResources,
    config::{AppConfig, Environment},
    crypto,
    repository::NewClient,
};
use sea_orm::Database;

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

/// Seed a login client, a user, and a session; optionally grant the admin
/// role. Returns the session cookie.
async fn seed_session(resources: &AppResources, server: &TestServer, admin: bool) -> Cookie<'static> {
    let client = resources
        .repo
        .create_client(NewClient {
            client_id: "console".into(),
            client_secret_hash: None,
            name: "Console".into(),
            description: None,
            redirect_uris: r#"["http://localhost:3000/cb"]"#.into(),
            allowed_scopes: "openid".into(),
            is_confidential: false,
            require_consent: true,
            trusted_client: false,
            created_by: None,
        })
        .await
        .expect("seed client");

    let hash = crypto::hash_password("hunter22").unwrap();
    let user = resources
        .repo
        .create_user(client.id, "op@example.com", "user-op", Some(hash))
        .await
        .expect("seed user");

    if admin {
        resources
            .repo
            .grant_admin_role(user.id, "admin", &["clients:write"], None)
            .await
            .expect("grant role");
    }

    let response = server
        .post("/auth/login")
        .json(&serde_json::json!({
            "email": "op@example.com",
            "password": "hunter22",
            "client_id": "console",
        }))
        .await;
    response.assert_status_ok();
    response.cookie("session_token")
}

#[tokio::test]
async fn admin_routes_require_session() {
    let (_, server) = setup().await;

    server.get("/admin/clients").await.assert_status_unauthorized();
}

#[tokio::test]
async fn admin_routes_require_role() {
    let (resources, server) = setup().await;
    let cookie = seed_session(&resources, &server, false).await;

    let response = server.get("/admin/clients").add_cookie(cookie).await;
    response.assert_status_forbidden();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn create_client_returns_secret_exactly_once() {
    let (resources, server) = setup().await;
    let cookie = seed_session(&resources, &server, true).await;

    let response = server
        .post("/admin/clients")
        .add_cookie(cookie.clone())
        .json(&serde_json::json!({
            "name": "Acme Portal",
            "redirect_uris": ["https://acme.example/cb"],
            "allowed_scopes": ["openid", "profile"],
            "is_confidential": true,
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    let client_id = body["client_id"].as_str().unwrap().to_string();
    let secret = body["client_secret"].as_str().expect("one-time secret");
    assert!(body["is_confidential"].as_bool().unwrap());

    // Only the hash is stored, and it verifies against the secret.
    let stored = resources
        .repo
        .find_client_by_client_id(&client_id)
        .await
        .unwrap()
        .unwrap();
    let hash = stored.client_secret_hash.expect("stored hash");
    assert_ne!(hash, secret);
    assert!(crypto::verify_password(secret, &hash));

    // Subsequent reads never include the secret.
    let fetched = server
        .get(&format!("/admin/clients/{client_id}"))
        .add_cookie(cookie)
        .await;
    fetched.assert_status_ok();
    assert!(fetched.json::<serde_json::Value>().get("client_secret").is_none());
}

#[tokio::test]
async fn create_public_client_has_no_secret() {
    let (resources, server) = setup().await;
    let cookie = seed_session(&resources, &server, true).await;

    let response = server
        .post("/admin/clients")
        .add_cookie(cookie)
        .json(&serde_json::json!({
            "name": "SPA",
            "redirect_uris": ["https://spa.example/cb"],
            "is_confidential": false,
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert!(body.get("client_secret").is_none());
    assert!(!body["is_confidential"].as_bool().unwrap());
}

#[tokio::test]
async fn create_client_validates_redirect_uris() {
    let (resources, server) = setup().await;
    let cookie = seed_session(&resources, &server, true).await;

    let missing = server
        .post("/admin/clients")
        .add_cookie(cookie.clone())
        .json(&serde_json::json!({
            "name": "No URIs",
            "redirect_uris": [],
        }))
        .await;
    missing.assert_status_bad_request();

    let malformed = server
        .post("/admin/clients")
        .add_cookie(cookie)
        .json(&serde_json::json!({
            "name": "Bad URI",
            "redirect_uris": ["not a uri"],
        }))
        .await;
    malformed.assert_status_bad_request();
}

#[tokio::test]
async fn update_and_deactivate_client() {
    let (resources, server) = setup().await;
    let cookie = seed_session(&resources, &server, true).await;

    let created: serde_json::Value = server
        .post("/admin/clients")
        .add_cookie(cookie.clone())
        .json(&serde_json::json!({
            "name": "Before",
            "redirect_uris": ["https://acme.example/cb"],
        }))
        .await
        .json();
    let client_id = created["client_id"].as_str().unwrap().to_string();

    let updated = server
        .put(&format!("/admin/clients/{client_id}"))
        .add_cookie(cookie.clone())
        .json(&serde_json::json!({
            "name": "After",
            "trusted_client": true,
        }))
        .await;
    updated.assert_status_ok();
    let body: serde_json::Value = updated.json();
    assert_eq!(body["name"], "After");
    assert!(body["trusted_client"].as_bool().unwrap());

    let deleted = server
        .delete(&format!("/admin/clients/{client_id}"))
        .add_cookie(cookie.clone())
        .await;
    deleted.assert_status_ok();

    // Deactivated clients stay listed for audit, marked inactive.
    let listed = server.get("/admin/clients").add_cookie(cookie).await;
    listed.assert_status_ok();
    let clients: serde_json::Value = listed.json();
    let row = clients
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["client_id"] == client_id.as_str())
        .expect("still listed");
    assert!(!row["is_active"].as_bool().unwrap());
}

#[tokio::test]
async fn unknown_client_is_404() {
    let (resources, server) = setup().await;
    let cookie = seed_session(&resources, &server, true).await;

    let response = server
        .get("/admin/clients/ghost")
        .add_cookie(cookie)
        .await;
    response.assert_status_not_found();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Client not found");
}
