//! Initial schema for the noraneko-id authorization server.
//!
//! Creates:
//! - oauth_clients: registered OAuth2 clients (one client = one tenant)
//! - users: end users, scoped to their client
//! - user_auth_providers: registered authentication methods per user
//! - user_sessions: first-party login sessions (cookie-backed)
//! - oauth_authorization_codes: single-use authorization codes
//! - oauth_access_tokens / oauth_refresh_tokens: issued credentials
//! - oauth_scopes: scope catalog for consent and seeding
//! - admin_roles: admin route gating

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthClients::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(OAuthClients::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(OAuthClients::ClientId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuthClients::ClientSecretHash).text().null())
                    .col(ColumnDef::new(OAuthClients::Name).string().not_null())
                    .col(ColumnDef::new(OAuthClients::Description).text().null())
                    .col(ColumnDef::new(OAuthClients::RedirectUris).text().not_null())
                    .col(
                        ColumnDef::new(OAuthClients::AllowedScopes)
                            .text()
                            .not_null()
                            .default("openid"),
                    )
                    .col(
                        ColumnDef::new(OAuthClients::IsConfidential)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OAuthClients::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OAuthClients::RequireConsent)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OAuthClients::TrustedClient)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(OAuthClients::LogoUrl).string().null())
                    .col(ColumnDef::new(OAuthClients::Website).string().null())
                    .col(ColumnDef::new(OAuthClients::BrandColor).string().null())
                    .col(ColumnDef::new(OAuthClients::ConsentMessage).text().null())
                    .col(ColumnDef::new(OAuthClients::CreatedBy).uuid().null())
                    .col(
                        ColumnDef::new(OAuthClients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthClients::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::ClientId).uuid().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null())
                    .col(ColumnDef::new(Users::Username).string().not_null())
                    .col(ColumnDef::new(Users::PasswordHash).text().null())
                    .col(ColumnDef::new(Users::DisplayName).string().null())
                    .col(
                        ColumnDef::new(Users::EmailVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Users::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Users::LastLoginAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Email and username are unique per client, not globally: the same
        // address may exist under two different tenants.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_client_email")
                    .table(Users::Table)
                    .col(Users::ClientId)
                    .col(Users::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_client_username")
                    .table(Users::Table)
                    .col(Users::ClientId)
                    .col(Users::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserAuthProviders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserAuthProviders::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserAuthProviders::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(UserAuthProviders::ProviderType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserAuthProviders::ProviderUserId)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserAuthProviders::ProviderEmail)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserAuthProviders::IsVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(UserAuthProviders::LastUsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserAuthProviders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserAuthProviders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_auth_providers_user_provider")
                    .table(UserAuthProviders::Table)
                    .col(UserAuthProviders::UserId)
                    .col(UserAuthProviders::ProviderType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserSessions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(UserSessions::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(UserSessions::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(UserSessions::SessionTokenHash)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(UserSessions::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSessions::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(UserSessions::UserAgent).string().null())
                    .col(ColumnDef::new(UserSessions::IpAddress).string().null())
                    .col(
                        ColumnDef::new(UserSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthAuthorizationCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::ClientId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuthAuthorizationCodes::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::RedirectUri)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::Scopes)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::CodeChallenge)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::CodeChallengeMethod)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::UsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAuthorizationCodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthAccessTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthAccessTokens::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthAccessTokens::TokenHash)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuthAccessTokens::ClientId).uuid().not_null())
                    .col(ColumnDef::new(OAuthAccessTokens::UserId).uuid().not_null())
                    .col(ColumnDef::new(OAuthAccessTokens::Scopes).text().not_null())
                    .col(
                        ColumnDef::new(OAuthAccessTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAccessTokens::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAccessTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthRefreshTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::TokenHash)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::AccessTokenId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuthRefreshTokens::ClientId).uuid().not_null())
                    .col(ColumnDef::new(OAuthRefreshTokens::UserId).uuid().not_null())
                    .col(ColumnDef::new(OAuthRefreshTokens::Scopes).text().not_null())
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthScopes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(OAuthScopes::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(OAuthScopes::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuthScopes::Description).text().null())
                    .col(
                        ColumnDef::new(OAuthScopes::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuthScopes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AdminRoles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AdminRoles::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AdminRoles::UserId).uuid().not_null())
                    .col(ColumnDef::new(AdminRoles::Role).string().not_null())
                    .col(
                        ColumnDef::new(AdminRoles::Permissions)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(AdminRoles::GrantedBy).uuid().null())
                    .col(
                        ColumnDef::new(AdminRoles::GrantedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdminRoles::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Non-unique expires_at indices for expiry sweeps.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_sessions_expires_at")
                    .table(UserSessions::Table)
                    .col(UserSessions::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_authorization_codes_expires_at")
                    .table(OAuthAuthorizationCodes::Table)
                    .col(OAuthAuthorizationCodes::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_access_tokens_expires_at")
                    .table(OAuthAccessTokens::Table)
                    .col(OAuthAccessTokens::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_refresh_tokens_expires_at")
                    .table(OAuthRefreshTokens::Table)
                    .col(OAuthRefreshTokens::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_refresh_tokens_expires_at")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_access_tokens_expires_at")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_authorization_codes_expires_at")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_user_sessions_expires_at").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_user_auth_providers_user_provider")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_users_client_username").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_users_client_email").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(AdminRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthScopes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthRefreshTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthAccessTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthAuthorizationCodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserSessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserAuthProviders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthClients::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuthClients {
    #[sea_orm(iden = "oauth_clients")]
    Table,
    Id,
    ClientId,
    ClientSecretHash,
    Name,
    Description,
    RedirectUris,
    AllowedScopes,
    IsConfidential,
    IsActive,
    RequireConsent,
    TrustedClient,
    LogoUrl,
    Website,
    BrandColor,
    ConsentMessage,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    ClientId,
    Email,
    Username,
    PasswordHash,
    DisplayName,
    EmailVerified,
    IsActive,
    LastLoginAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserAuthProviders {
    Table,
    Id,
    UserId,
    ProviderType,
    ProviderUserId,
    ProviderEmail,
    IsVerified,
    LastUsedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserSessions {
    Table,
    Id,
    UserId,
    SessionTokenHash,
    ExpiresAt,
    RevokedAt,
    UserAgent,
    IpAddress,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuthAuthorizationCodes {
    #[sea_orm(iden = "oauth_authorization_codes")]
    Table,
    Id,
    Code,
    ClientId,
    UserId,
    RedirectUri,
    Scopes,
    CodeChallenge,
    CodeChallengeMethod,
    ExpiresAt,
    UsedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuthAccessTokens {
    #[sea_orm(iden = "oauth_access_tokens")]
    Table,
    Id,
    TokenHash,
    ClientId,
    UserId,
    Scopes,
    ExpiresAt,
    RevokedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuthRefreshTokens {
    #[sea_orm(iden = "oauth_refresh_tokens")]
    Table,
    Id,
    TokenHash,
    AccessTokenId,
    ClientId,
    UserId,
    Scopes,
    ExpiresAt,
    RevokedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuthScopes {
    #[sea_orm(iden = "oauth_scopes")]
    Table,
    Id,
    Name,
    Description,
    IsDefault,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AdminRoles {
    Table,
    Id,
    UserId,
    Role,
    Permissions,
    GrantedBy,
    GrantedAt,
    RevokedAt,
}
