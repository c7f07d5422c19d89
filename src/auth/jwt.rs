//! JWT issuance and verification for operator sessions.
//!
//! Decoupled from the cluster-API-key auth used for proxy-facing endpoints
//! (see [`crate::registrar`]): operator sessions are a single bootstrap
//! account logging into the control plane's own admin surface, not a proxy
//! or cluster.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::settings::AuthConfig;
use crate::errors::{AuthErrorReason, MarchProxyError, Result};

/// Claims carried by an operator session token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
}

/// Issues and verifies operator session JWTs.
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    token_expiry_seconds: u64,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.jwt_issuer.clone()]);
        validation.set_audience(&[config.jwt_audience.clone()]);

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            token_expiry_seconds: config.token_expiry_seconds,
        }
    }

    /// Issues a session token for the named operator account.
    pub fn generate_token(&self, username: &str) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| MarchProxyError::internal(format!("system clock before epoch: {e}")))?
            .as_secs() as usize;

        let claims = Claims {
            sub: username.to_string(),
            exp: now + self.token_expiry_seconds as usize,
            iat: now,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| MarchProxyError::internal(format!("failed to sign session token: {e}")))
    }

    /// Verifies a session token, rejecting expired, wrong-issuer, or
    /// wrong-audience tokens per the configured [`Validation`].
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| MarchProxyError::auth(format!("invalid session token: {e}"), AuthErrorReason::BadSignature))
    }

    pub fn token_expiry_seconds(&self) -> u64 {
        self.token_expiry_seconds
    }
}
