//! Authorization codes: single-use, short-lived, optionally PKCE-bound.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::crypto;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_authorization_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub client_id: Uuid,
    pub user_id: Uuid,
    /// The exact URI presented at /oauth2/authorize; the token request
    /// must repeat it verbatim.
    pub redirect_uri: String,
    /// Space-separated granted scopes.
    pub scopes: String,
    pub code_challenge: Option<String>,
    /// "S256" or "plain" when a challenge is present.
    pub code_challenge_method: Option<String>,
    pub expires_at: OffsetDateTime,
    /// Set exactly once at redemption; a used code is permanently dead.
    pub used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Expiry is strict: a code presented exactly at `expires_at` is dead.
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn scopes_list(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(String::from).collect()
    }

    /// Verify a PKCE code verifier against the stored challenge.
    ///
    /// S256: BASE64URL-NOPAD(SHA-256(verifier)) must equal the challenge.
    /// plain: the verifier must equal the challenge verbatim.
    /// Comparison is constant-time in both cases.
    pub fn verify_pkce(&self, code_verifier: &str) -> bool {
        match (&self.code_challenge, &self.code_challenge_method) {
            (Some(challenge), Some(method)) => match method.as_str() {
                "S256" => {
                    use base64::Engine;
                    use sha2::{Digest, Sha256};
                    let mut hasher = Sha256::new();
                    hasher.update(code_verifier.as_bytes());
                    let computed = base64::engine::general_purpose::URL_SAFE_NO_PAD
                        .encode(hasher.finalize());
                    crypto::constant_time_eq(&computed, challenge)
                }
                "plain" => crypto::constant_time_eq(code_verifier, challenge),
                _ => false,
            },
            // No challenge stored: nothing to verify.
            (None, None) => true,
            _ => false,
        }
    }
}
