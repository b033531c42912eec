//! Self-contained access tokens: HMAC-SHA256 signed JWTs.
//!
//! The signed string is the credential clients hold; the server stores only
//! its SHA-256 fingerprint (for revocation lookup). The signer knows
//! nothing about the database.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::OAuth2Error;

pub const ISSUER: &str = "noraneko-id";

/// Claims embedded in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer, always `noraneko-id`.
    pub iss: String,
    /// Subject - the user ID (UUID string), duplicated in `user_id`.
    pub sub: String,
    pub user_id: Uuid,
    pub client_id: Uuid,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Not-before (Unix timestamp).
    pub nbf: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Unique token ID.
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Issues and verifies access tokens over a process-wide shared secret.
#[derive(Clone)]
pub struct AccessTokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AccessTokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a fresh access token for (user, client) with the given scopes.
    pub fn issue(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scopes: &[String],
        lifetime_secs: i64,
    ) -> Result<String, OAuth2Error> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessTokenClaims {
            iss: ISSUER.to_string(),
            sub: user_id.to_string(),
            user_id,
            client_id,
            scopes: scopes.to_vec(),
            iat: now,
            nbf: now,
            exp: now + lifetime_secs,
            jti: Uuid::new_v4().to_string(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(
            |e| {
                tracing::error!(error = %e, "failed to sign access token");
                OAuth2Error::server_error()
            },
        )
    }

    /// Verify signature, algorithm, issuer, and expiry; returns the claims.
    ///
    /// Rejection reasons are deliberately not distinguished to the caller.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, OAuth2Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["iss", "sub", "exp", "nbf"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| OAuth2Error::invalid_token("invalid or expired access token"))
    }
}
