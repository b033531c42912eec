//! User entity. Users belong to exactly one client; email and username
//! are unique within that client only.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning client (tenant).
    pub client_id: Uuid,
    pub email: String,
    pub username: String,
    /// Argon2 PHC hash (None for identity-provider-only accounts).
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::Id"
    )]
    Client,
    #[sea_orm(has_many = "super::user_auth_provider::Entity")]
    AuthProviders,
    #[sea_orm(has_many = "super::user_session::Entity")]
    Sessions,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::user_auth_provider::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuthProviders.def()
    }
}

impl Related<super::user_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether password login is possible for this account.
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}
