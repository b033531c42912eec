//! Registered authentication methods per user. At most one row per
//! (user, provider type).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The closed set of authentication provider tags. Only `password` is
/// implemented; the social providers are recognized at /oauth2/authorize
/// and rejected as `unsupported_provider` until they exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Password,
    Google,
    Github,
    Line,
    Apple,
    Twitter,
}

impl ProviderType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::Password => "password",
            ProviderType::Google => "google",
            ProviderType::Github => "github",
            ProviderType::Line => "line",
            ProviderType::Apple => "apple",
            ProviderType::Twitter => "twitter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "password" => Some(ProviderType::Password),
            "google" => Some(ProviderType::Google),
            "github" => Some(ProviderType::Github),
            "line" => Some(ProviderType::Line),
            "apple" => Some(ProviderType::Apple),
            "twitter" => Some(ProviderType::Twitter),
            _ => None,
        }
    }

    /// Whether an authentication flow exists for this provider.
    pub fn is_implemented(self) -> bool {
        matches!(self, ProviderType::Password)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_auth_providers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    /// One of the `ProviderType` tags.
    pub provider_type: String,
    /// The provider-side user identifier, for external providers.
    pub provider_user_id: Option<String>,
    pub provider_email: Option<String>,
    pub is_verified: bool,
    pub last_used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tags_round_trip() {
        for tag in ["password", "google", "github", "line", "apple", "twitter"] {
            assert_eq!(ProviderType::parse(tag).unwrap().as_str(), tag);
        }
        assert!(ProviderType::parse("facebook").is_none());
    }

    #[test]
    fn only_password_is_implemented() {
        assert!(ProviderType::Password.is_implemented());
        assert!(!ProviderType::Google.is_implemented());
        assert!(!ProviderType::Twitter.is_implemented());
    }
}
