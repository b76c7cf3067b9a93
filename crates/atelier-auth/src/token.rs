use atelier_common::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Claims carried by a signed session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Owning user id.
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Issues and verifies HMAC-SHA256 signed session tokens of the form
/// `<payload b64url>.<signature b64url>`.
pub struct TokenSigner {
    key: hmac::Key,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    pub fn sign(&self, user_id: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };

        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let tag = hmac::sign(&self.key, payload.as_bytes());
        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
    }

    /// Verify signature and shape before ever decoding claims; reject
    /// expired tokens.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| Error::Unauthorized("malformed token".into()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| Error::Unauthorized("malformed token signature".into()))?;
        hmac::verify(&self.key, payload.as_bytes(), &signature)
            .map_err(|_| Error::Unauthorized("invalid token signature".into()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| Error::Unauthorized("malformed token payload".into()))?;
        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|_| Error::Unauthorized("malformed token claims".into()))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(Error::Unauthorized("token expired".into()));
        }

        Ok(claims)
    }
}
