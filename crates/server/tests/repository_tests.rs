//! Repository behavior tests, focused on the conditional-update
//! transitions that enforce single-use codes and refresh rotation.

use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use noraneko_id::{
    crypto,
    entity::client,
    repository::{
        NewAccessToken, NewAuthorizationCode, NewClient, NewRefreshToken, Repository,
    },
};
use sea_orm::Database;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

async fn setup() -> Repository {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    Migrator::up(&db, None).await.expect("migrate");
    Repository::new(Arc::new(db))
}

async fn seed_client(repo: &Repository) -> client::Model {
    repo.create_client(NewClient {
        client_id: "repo-client".into(),
        client_secret_hash: None,
        name: "Repo Client".into(),
        description: None,
        redirect_uris: r#"["http://localhost:3000/cb"]"#.into(),
        allowed_scopes: "openid".into(),
        is_confidential: false,
        require_consent: true,
        trusted_client: false,
        created_by: None,
    })
    .await
    .expect("seed client")
}

fn new_access(client_id: Uuid, user_id: Uuid) -> NewAccessToken {
    NewAccessToken {
        token_hash: crypto::token_fingerprint(&crypto::generate_token()),
        client_id,
        user_id,
        scopes: "openid".into(),
        expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
    }
}

fn new_refresh(client_id: Uuid, user_id: Uuid) -> NewRefreshToken {
    NewRefreshToken {
        token_hash: crypto::token_fingerprint(&crypto::generate_token()),
        client_id,
        user_id,
        scopes: "openid".into(),
        expires_at: OffsetDateTime::now_utc() + Duration::days(30),
    }
}

#[tokio::test]
async fn authorization_code_redeems_exactly_once() {
    let repo = setup().await;
    let client = seed_client(&repo).await;
    let user = repo
        .create_user(client.id, "u@x", "user-u", None)
        .await
        .unwrap();

    let code = repo
        .create_authorization_code(NewAuthorizationCode {
            code: crypto::generate_token(),
            client_id: client.id,
            user_id: user.id,
            redirect_uri: "http://localhost:3000/cb".into(),
            scopes: "openid".into(),
            code_challenge: None,
            code_challenge_method: None,
            expires_at: OffsetDateTime::now_utc() + Duration::minutes(10),
        })
        .await
        .unwrap();

    let first = repo
        .redeem_authorization_code(code.id, new_access(client.id, user.id), new_refresh(client.id, user.id))
        .await
        .unwrap();
    assert!(first.is_some());
    let (access, refresh) = first.unwrap();
    assert_eq!(refresh.access_token_id, access.id);
    assert_eq!(access.client_id, client.id);
    assert_eq!(access.user_id, user.id);

    // Second redemption loses the conditional update.
    let second = repo
        .redeem_authorization_code(code.id, new_access(client.id, user.id), new_refresh(client.id, user.id))
        .await
        .unwrap();
    assert!(second.is_none());

    // The code is no longer visible as unused.
    assert!(repo.find_unused_code(&code.code).await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_token_rotates_exactly_once() {
    let repo = setup().await;
    let client = seed_client(&repo).await;
    let user = repo
        .create_user(client.id, "u@x", "user-u", None)
        .await
        .unwrap();

    let code = repo
        .create_authorization_code(NewAuthorizationCode {
            code: crypto::generate_token(),
            client_id: client.id,
            user_id: user.id,
            redirect_uri: "http://localhost:3000/cb".into(),
            scopes: "openid".into(),
            code_challenge: None,
            code_challenge_method: None,
            expires_at: OffsetDateTime::now_utc() + Duration::minutes(10),
        })
        .await
        .unwrap();
    let (_, refresh) = repo
        .redeem_authorization_code(code.id, new_access(client.id, user.id), new_refresh(client.id, user.id))
        .await
        .unwrap()
        .unwrap();

    let rotated = repo
        .rotate_refresh_token(
            &refresh.token_hash,
            new_access(client.id, user.id),
            new_refresh(client.id, user.id),
        )
        .await
        .unwrap();
    assert!(rotated.is_some());
    let (_, replacement) = rotated.unwrap();
    assert_ne!(replacement.token_hash, refresh.token_hash);
    assert_eq!(replacement.scopes, refresh.scopes);
    assert_eq!(replacement.user_id, refresh.user_id);
    assert_eq!(replacement.client_id, refresh.client_id);

    // The presented token is spent; rotating it again fails.
    let again = repo
        .rotate_refresh_token(
            &refresh.token_hash,
            new_access(client.id, user.id),
            new_refresh(client.id, user.id),
        )
        .await
        .unwrap();
    assert!(again.is_none());

    // And it is no longer live.
    assert!(
        repo.find_live_refresh_token_by_hash(&refresh.token_hash)
            .await
            .unwrap()
            .is_none()
    );
    // The replacement is.
    assert!(
        repo.find_live_refresh_token_by_hash(&replacement.token_hash)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn token_revocation_is_idempotent() {
    let repo = setup().await;
    let client = seed_client(&repo).await;
    let user = repo
        .create_user(client.id, "u@x", "user-u", None)
        .await
        .unwrap();

    let code = repo
        .create_authorization_code(NewAuthorizationCode {
            code: crypto::generate_token(),
            client_id: client.id,
            user_id: user.id,
            redirect_uri: "http://localhost:3000/cb".into(),
            scopes: "openid".into(),
            code_challenge: None,
            code_challenge_method: None,
            expires_at: OffsetDateTime::now_utc() + Duration::minutes(10),
        })
        .await
        .unwrap();
    let (access, _) = repo
        .redeem_authorization_code(code.id, new_access(client.id, user.id), new_refresh(client.id, user.id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        repo.revoke_access_token_by_hash(&access.token_hash).await.unwrap(),
        1
    );
    // Second revocation touches nothing.
    assert_eq!(
        repo.revoke_access_token_by_hash(&access.token_hash).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn user_lookups_are_tenant_scoped() {
    let repo = setup().await;
    let c1 = seed_client(&repo).await;
    let c2 = repo
        .create_client(NewClient {
            client_id: "repo-client-2".into(),
            client_secret_hash: None,
            name: "Repo Client 2".into(),
            description: None,
            redirect_uris: "[]".into(),
            allowed_scopes: "openid".into(),
            is_confidential: false,
            require_consent: true,
            trusted_client: false,
            created_by: None,
        })
        .await
        .unwrap();

    let user = repo.create_user(c1.id, "u@x", "user-u", None).await.unwrap();

    assert!(
        repo.find_active_user_in_client(user.id, c1.id)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        repo.find_active_user_in_client(user.id, c2.id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        repo.find_active_user_by_email(c2.id, "u@x")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn deactivated_clients_stop_resolving() {
    let repo = setup().await;
    let client = seed_client(&repo).await;

    assert!(
        repo.find_active_client_by_client_id("repo-client")
            .await
            .unwrap()
            .is_some()
    );

    repo.deactivate_client(client.id).await.unwrap();

    assert!(
        repo.find_active_client_by_client_id("repo-client")
            .await
            .unwrap()
            .is_none()
    );
    // The row itself survives for audit.
    assert!(
        repo.find_client_by_client_id("repo-client")
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(repo.count_clients_by_client_id("repo-client").await.unwrap(), 1);
}
