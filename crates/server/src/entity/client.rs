//! OAuth client entity. One client record is one tenant: its users,
//! codes, and tokens all reference it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_clients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// External client identifier presented in OAuth2 requests.
    #[sea_orm(unique)]
    pub client_id: String,
    /// Argon2 PHC hash of the client secret (None for public clients).
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// JSON array of allowed redirect URIs.
    pub redirect_uris: String,
    /// Space-separated list of allowed scopes.
    pub allowed_scopes: String,
    pub is_confidential: bool,
    pub is_active: bool,
    /// When false, the consent page is skipped.
    pub require_consent: bool,
    /// First-party flag; also skips consent.
    pub trusted_client: bool,
    pub logo_url: Option<String>,
    pub website: Option<String>,
    pub brand_color: Option<String>,
    pub consent_message: Option<String>,
    /// User who created this client. Nullable so the client can exist
    /// before its creator does.
    pub created_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user::Entity")]
    Users,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse redirect URIs from the stored JSON array.
    pub fn redirect_uris_list(&self) -> Vec<String> {
        serde_json::from_str(&self.redirect_uris).unwrap_or_default()
    }

    /// Parse allowed scopes from the space-separated string.
    pub fn allowed_scopes_list(&self) -> Vec<String> {
        self.allowed_scopes
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    /// Exact-match check against the redirect allowlist. No prefixes, no
    /// wildcards.
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris_list().iter().any(|allowed| allowed == uri)
    }

    /// Every requested scope must appear in the allowlist. An empty
    /// request is valid (the engine substitutes the default scope).
    pub fn allows_scopes(&self, requested: &[String]) -> bool {
        let allowed = self.allowed_scopes_list();
        requested.iter().all(|s| allowed.contains(s))
    }

    /// Consent is skipped for trusted or consent-exempt clients.
    pub fn skips_consent(&self) -> bool {
        self.trusted_client || !self.require_consent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(redirect_uris: &str, allowed_scopes: &str) -> Model {
        let now = OffsetDateTime::now_utc();
        Model {
            id: Uuid::new_v4(),
            client_id: "test-client".into(),
            client_secret_hash: None,
            name: "Test".into(),
            description: None,
            redirect_uris: redirect_uris.into(),
            allowed_scopes: allowed_scopes.into(),
            is_confidential: false,
            is_active: true,
            require_consent: true,
            trusted_client: false,
            logo_url: None,
            website: None,
            brand_color: None,
            consent_message: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn redirect_allowlist_is_exact_match() {
        let c = client(r#"["http://localhost:3000/cb"]"#, "openid");
        assert!(c.is_redirect_uri_allowed("http://localhost:3000/cb"));
        assert!(!c.is_redirect_uri_allowed("http://localhost:3000/cb/"));
        assert!(!c.is_redirect_uri_allowed("http://localhost:3000"));
        assert!(!c.is_redirect_uri_allowed("http://localhost:3000/cb?x=1"));
    }

    #[test]
    fn malformed_redirect_json_allows_nothing() {
        let c = client("not-json", "openid");
        assert!(!c.is_redirect_uri_allowed("not-json"));
    }

    #[test]
    fn scope_allowlist() {
        let c = client("[]", "openid profile email");
        assert!(c.allows_scopes(&["openid".into(), "email".into()]));
        assert!(c.allows_scopes(&[]));
        assert!(!c.allows_scopes(&["openid".into(), "admin".into()]));
    }

    #[test]
    fn consent_skip_rules() {
        let mut c = client("[]", "openid");
        assert!(!c.skips_consent());
        c.trusted_client = true;
        assert!(c.skips_consent());
        c.trusted_client = false;
        c.require_consent = false;
        assert!(c.skips_consent());
    }
}
