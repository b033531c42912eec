//! Typed persistence operations.
//!
//! Every query that returns user-, code-, or token-scoped rows takes its
//! tenant constraint explicitly. The two credential state transitions with
//! race potential - authorization-code redemption and refresh-token
//! rotation - run as transactions whose first statement is a conditional
//! UPDATE; zero affected rows means another request won the race and the
//! whole transaction rolls back.

use std::sync::Arc;

use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entity::{
    access_token, admin_role, authorization_code, client, oauth_scope, refresh_token, user,
    user_auth_provider, user_session,
};

/// Parameters for a new authorization-code row.
#[derive(Debug)]
pub struct NewAuthorizationCode {
    pub code: String,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub scopes: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: OffsetDateTime,
}

/// Parameters for a new access-token row (hash only, never the raw token).
#[derive(Debug)]
pub struct NewAccessToken {
    pub token_hash: String,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub scopes: String,
    pub expires_at: OffsetDateTime,
}

/// Parameters for a new refresh-token row.
#[derive(Debug)]
pub struct NewRefreshToken {
    pub token_hash: String,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub scopes: String,
    pub expires_at: OffsetDateTime,
}

/// Parameters for a new client record (admin create).
#[derive(Debug)]
pub struct NewClient {
    pub client_id: String,
    pub client_secret_hash: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// JSON array.
    pub redirect_uris: String,
    /// Space-joined.
    pub allowed_scopes: String,
    pub is_confidential: bool,
    pub require_consent: bool,
    pub trusted_client: bool,
    pub created_by: Option<Uuid>,
}

#[derive(Clone)]
pub struct Repository {
    db: Arc<DatabaseConnection>,
}

impl Repository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The underlying connection, for callers (tests, seeds) that need it.
    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    // -------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------

    pub async fn find_active_client_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<client::Model>, DbErr> {
        client::Entity::find()
            .filter(client::Column::ClientId.eq(client_id))
            .filter(client::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await
    }

    pub async fn find_client_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<client::Model>, DbErr> {
        client::Entity::find()
            .filter(client::Column::ClientId.eq(client_id))
            .one(self.db.as_ref())
            .await
    }

    pub async fn find_active_client_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<client::Model>, DbErr> {
        client::Entity::find_by_id(id)
            .filter(client::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await
    }

    pub async fn find_client_by_id(&self, id: Uuid) -> Result<Option<client::Model>, DbErr> {
        client::Entity::find_by_id(id).one(self.db.as_ref()).await
    }

    pub async fn count_clients_by_client_id(&self, client_id: &str) -> Result<u64, DbErr> {
        client::Entity::find()
            .filter(client::Column::ClientId.eq(client_id))
            .count(self.db.as_ref())
            .await
    }

    pub async fn list_clients(&self) -> Result<Vec<client::Model>, DbErr> {
        client::Entity::find()
            .order_by_asc(client::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
    }

    pub async fn create_client(&self, new: NewClient) -> Result<client::Model, DbErr> {
        let now = OffsetDateTime::now_utc();
        client::ActiveModel {
            id: Set(Uuid::new_v4()),
            client_id: Set(new.client_id),
            client_secret_hash: Set(new.client_secret_hash),
            name: Set(new.name),
            description: Set(new.description),
            redirect_uris: Set(new.redirect_uris),
            allowed_scopes: Set(new.allowed_scopes),
            is_confidential: Set(new.is_confidential),
            is_active: Set(true),
            require_consent: Set(new.require_consent),
            trusted_client: Set(new.trusted_client),
            logo_url: Set(None),
            website: Set(None),
            brand_color: Set(None),
            consent_message: Set(None),
            created_by: Set(new.created_by),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
    }

    pub async fn update_client(&self, updated: client::Model) -> Result<client::Model, DbErr> {
        let mut active = updated.into_active_model().reset_all();
        active.updated_at = Set(OffsetDateTime::now_utc());
        active.update(self.db.as_ref()).await
    }

    /// Deactivation rejects new requests but preserves existing rows for
    /// audit.
    pub async fn deactivate_client(&self, id: Uuid) -> Result<u64, DbErr> {
        let now = OffsetDateTime::now_utc();
        let res = client::Entity::update_many()
            .col_expr(client::Column::IsActive, Expr::value(false))
            .col_expr(client::Column::UpdatedAt, Expr::value(now))
            .filter(client::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected)
    }

    // -------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find_by_id(id).one(self.db.as_ref()).await
    }

    /// Tenant-scoped lookup: the user must belong to `client_id` and be
    /// active.
    pub async fn find_active_user_in_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find_by_id(user_id)
            .filter(user::Column::ClientId.eq(client_id))
            .filter(user::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await
    }

    pub async fn find_active_user_by_email(
        &self,
        client_id: Uuid,
        email: &str,
    ) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find()
            .filter(user::Column::ClientId.eq(client_id))
            .filter(user::Column::Email.eq(email))
            .filter(user::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await
    }

    pub async fn email_taken(&self, client_id: Uuid, email: &str) -> Result<bool, DbErr> {
        let count = user::Entity::find()
            .filter(user::Column::ClientId.eq(client_id))
            .filter(user::Column::Email.eq(email))
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    pub async fn create_user(
        &self,
        client_id: Uuid,
        email: &str,
        username: &str,
        password_hash: Option<String>,
    ) -> Result<user::Model, DbErr> {
        let now = OffsetDateTime::now_utc();
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            client_id: Set(client_id),
            email: Set(email.to_string()),
            username: Set(username.to_string()),
            password_hash: Set(password_hash),
            display_name: Set(None),
            email_verified: Set(false),
            is_active: Set(true),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
    }

    pub async fn create_auth_provider(
        &self,
        user_id: Uuid,
        provider_type: &str,
        provider_email: Option<String>,
    ) -> Result<user_auth_provider::Model, DbErr> {
        let now = OffsetDateTime::now_utc();
        user_auth_provider::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider_type: Set(provider_type.to_string()),
            provider_user_id: Set(None),
            provider_email: Set(provider_email),
            is_verified: Set(false),
            last_used_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
    }

    pub async fn touch_last_login(&self, user_id: Uuid) -> Result<(), DbErr> {
        let now = OffsetDateTime::now_utc();
        user::Entity::update_many()
            .col_expr(user::Column::LastLoginAt, Expr::value(now))
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------

    pub async fn create_session(
        &self,
        user_id: Uuid,
        session_token_hash: &str,
        expires_at: OffsetDateTime,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<user_session::Model, DbErr> {
        user_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            session_token_hash: Set(session_token_hash.to_string()),
            expires_at: Set(expires_at),
            revoked_at: Set(None),
            user_agent: Set(user_agent),
            ip_address: Set(ip_address),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.db.as_ref())
        .await
    }

    pub async fn find_valid_session_by_hash(
        &self,
        session_token_hash: &str,
    ) -> Result<Option<user_session::Model>, DbErr> {
        user_session::Entity::find()
            .filter(user_session::Column::SessionTokenHash.eq(session_token_hash))
            .filter(user_session::Column::RevokedAt.is_null())
            .filter(user_session::Column::ExpiresAt.gt(OffsetDateTime::now_utc()))
            .one(self.db.as_ref())
            .await
    }

    pub async fn revoke_session_by_hash(&self, session_token_hash: &str) -> Result<(), DbErr> {
        user_session::Entity::update_many()
            .col_expr(
                user_session::Column::RevokedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(user_session::Column::SessionTokenHash.eq(session_token_hash))
            .filter(user_session::Column::RevokedAt.is_null())
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Authorization codes
    // -------------------------------------------------------------------

    pub async fn create_authorization_code(
        &self,
        new: NewAuthorizationCode,
    ) -> Result<authorization_code::Model, DbErr> {
        authorization_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(new.code),
            client_id: Set(new.client_id),
            user_id: Set(new.user_id),
            redirect_uri: Set(new.redirect_uri),
            scopes: Set(new.scopes),
            code_challenge: Set(new.code_challenge),
            code_challenge_method: Set(new.code_challenge_method),
            expires_at: Set(new.expires_at),
            used_at: Set(None),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.db.as_ref())
        .await
    }

    /// A code still eligible for redemption: `used_at IS NULL`. Expiry is
    /// checked by the caller so it can report the precise failure.
    pub async fn find_unused_code(
        &self,
        code: &str,
    ) -> Result<Option<authorization_code::Model>, DbErr> {
        authorization_code::Entity::find()
            .filter(authorization_code::Column::Code.eq(code))
            .filter(authorization_code::Column::UsedAt.is_null())
            .one(self.db.as_ref())
            .await
    }

    /// Redeem an authorization code and persist the issued token pair,
    /// atomically.
    ///
    /// The conditional UPDATE on `used_at` serializes concurrent
    /// redemptions of the same code: exactly one transaction sees an
    /// unused row. Returns `None` when this request lost that race (the
    /// caller reports `invalid_grant`).
    #[tracing::instrument(skip_all, fields(code_id = %code_id))]
    pub async fn redeem_authorization_code(
        &self,
        code_id: Uuid,
        access: NewAccessToken,
        refresh: NewRefreshToken,
    ) -> Result<Option<(access_token::Model, refresh_token::Model)>, DbErr> {
        let txn = self.db.begin().await?;
        let now = OffsetDateTime::now_utc();

        let marked = authorization_code::Entity::update_many()
            .col_expr(authorization_code::Column::UsedAt, Expr::value(now))
            .filter(authorization_code::Column::Id.eq(code_id))
            .filter(authorization_code::Column::UsedAt.is_null())
            .exec(&txn)
            .await?;
        if marked.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        let access_row = access_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            token_hash: Set(access.token_hash),
            client_id: Set(access.client_id),
            user_id: Set(access.user_id),
            scopes: Set(access.scopes),
            expires_at: Set(access.expires_at),
            revoked_at: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let refresh_row = refresh_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            token_hash: Set(refresh.token_hash),
            access_token_id: Set(access_row.id),
            client_id: Set(refresh.client_id),
            user_id: Set(refresh.user_id),
            scopes: Set(refresh.scopes),
            expires_at: Set(refresh.expires_at),
            revoked_at: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(Some((access_row, refresh_row)))
    }

    // -------------------------------------------------------------------
    // Tokens
    // -------------------------------------------------------------------

    pub async fn find_access_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<access_token::Model>, DbErr> {
        access_token::Entity::find()
            .filter(access_token::Column::TokenHash.eq(token_hash))
            .one(self.db.as_ref())
            .await
    }

    /// A refresh token still eligible for rotation: `revoked_at IS NULL`.
    pub async fn find_live_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<refresh_token::Model>, DbErr> {
        refresh_token::Entity::find()
            .filter(refresh_token::Column::TokenHash.eq(token_hash))
            .filter(refresh_token::Column::RevokedAt.is_null())
            .one(self.db.as_ref())
            .await
    }

    /// Rotate a refresh token: revoke the presented one and persist its
    /// replacement pair, atomically.
    ///
    /// Same conditional-UPDATE discipline as code redemption; `None` means
    /// the presented token was already revoked by a concurrent rotation.
    #[tracing::instrument(skip_all)]
    pub async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        access: NewAccessToken,
        refresh: NewRefreshToken,
    ) -> Result<Option<(access_token::Model, refresh_token::Model)>, DbErr> {
        let txn = self.db.begin().await?;
        let now = OffsetDateTime::now_utc();

        let revoked = refresh_token::Entity::update_many()
            .col_expr(refresh_token::Column::RevokedAt, Expr::value(now))
            .filter(refresh_token::Column::TokenHash.eq(presented_hash))
            .filter(refresh_token::Column::RevokedAt.is_null())
            .exec(&txn)
            .await?;
        if revoked.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        let access_row = access_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            token_hash: Set(access.token_hash),
            client_id: Set(access.client_id),
            user_id: Set(access.user_id),
            scopes: Set(access.scopes),
            expires_at: Set(access.expires_at),
            revoked_at: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let refresh_row = refresh_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            token_hash: Set(refresh.token_hash),
            access_token_id: Set(access_row.id),
            client_id: Set(refresh.client_id),
            user_id: Set(refresh.user_id),
            scopes: Set(refresh.scopes),
            expires_at: Set(refresh.expires_at),
            revoked_at: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(Some((access_row, refresh_row)))
    }

    /// Mark the access token with this fingerprint revoked. Idempotent;
    /// unknown fingerprints are a no-op.
    pub async fn revoke_access_token_by_hash(&self, token_hash: &str) -> Result<u64, DbErr> {
        let res = access_token::Entity::update_many()
            .col_expr(
                access_token::Column::RevokedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(access_token::Column::TokenHash.eq(token_hash))
            .filter(access_token::Column::RevokedAt.is_null())
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected)
    }

    /// Mark the refresh token with this fingerprint revoked. Revoking a
    /// refresh token does not touch its sibling access token.
    pub async fn revoke_refresh_token_by_hash(&self, token_hash: &str) -> Result<u64, DbErr> {
        let res = refresh_token::Entity::update_many()
            .col_expr(
                refresh_token::Column::RevokedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(refresh_token::Column::TokenHash.eq(token_hash))
            .filter(refresh_token::Column::RevokedAt.is_null())
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected)
    }

    // -------------------------------------------------------------------
    // Scope catalog
    // -------------------------------------------------------------------

    pub async fn find_scope_by_name(
        &self,
        name: &str,
    ) -> Result<Option<oauth_scope::Model>, DbErr> {
        oauth_scope::Entity::find()
            .filter(oauth_scope::Column::Name.eq(name))
            .one(self.db.as_ref())
            .await
    }

    pub async fn create_scope(
        &self,
        name: &str,
        description: Option<String>,
        is_default: bool,
    ) -> Result<oauth_scope::Model, DbErr> {
        oauth_scope::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(description),
            is_default: Set(is_default),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.db.as_ref())
        .await
    }

    // -------------------------------------------------------------------
    // Admin roles
    // -------------------------------------------------------------------

    pub async fn find_active_admin_role(
        &self,
        user_id: Uuid,
    ) -> Result<Option<admin_role::Model>, DbErr> {
        admin_role::Entity::find()
            .filter(admin_role::Column::UserId.eq(user_id))
            .filter(admin_role::Column::RevokedAt.is_null())
            .one(self.db.as_ref())
            .await
    }

    pub async fn grant_admin_role(
        &self,
        user_id: Uuid,
        role: &str,
        permissions: &[&str],
        granted_by: Option<Uuid>,
    ) -> Result<admin_role::Model, DbErr> {
        admin_role::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            role: Set(role.to_string()),
            permissions: Set(serde_json::to_string(permissions).unwrap_or_else(|_| "[]".into())),
            granted_by: Set(granted_by),
            granted_at: Set(OffsetDateTime::now_utc()),
            revoked_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
    }
}
