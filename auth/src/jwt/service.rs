use chrono::Duration;
use chrono::Utc;
use jsonwebtoken::decode;
use jsonwebtoken::encode;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use serde::Deserialize;
use uuid::Uuid;

use super::claims::AccessClaims;
use super::claims::TokenPayload;
use super::errors::JwtError;

/// Signed access-token issuance and validation.
///
/// Tokens are stateless: validity is determined by signature and the
/// registered claims alone, never by a store lookup. Uses HS256 (HMAC with
/// SHA-256) with a symmetric key shared only within the trust boundary.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    audience: String,
    lifetime: Duration,
}

impl TokenService {
    /// Create a new token service.
    ///
    /// # Arguments
    /// * `secret` - Symmetric signing key (at least 256 bits for HS256;
    ///   store in environment variables or a vault, never in code)
    /// * `issuer` - Value of the `iss` claim, checked on validation
    /// * `audience` - Value of the `aud` claim, checked on validation
    /// * `lifetime_minutes` - Fixed token lifetime
    pub fn new(secret: &[u8], issuer: &str, audience: &str, lifetime_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            lifetime: Duration::minutes(lifetime_minutes),
        }
    }

    /// Fixed lifetime applied to every issued token.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issue a signed access token for the given payload.
    ///
    /// Adds a unique `jti`, `iat`/`exp` from the configured lifetime, and the
    /// configured issuer and audience.
    ///
    /// # Errors
    /// * `EncodingFailed` - Token encoding failed
    pub fn issue(&self, payload: &TokenPayload) -> Result<String, JwtError> {
        let now = Utc::now();

        let claims = AccessClaims {
            sub: payload.account_id.clone(),
            email: payload.email.clone(),
            username: payload.username.clone(),
            roles: payload.roles.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            extra: payload
                .claims
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        };

        let header = Header::new(self.algorithm);

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingFailed(e.to_string()))
    }

    /// Validate a token and return its claims.
    ///
    /// Issuer, audience, signature, and expiry are checked atomically with
    /// zero clock leeway; any single failure yields an error, never a
    /// partial-trust result.
    ///
    /// # Errors
    /// * `TokenExpired` - `exp` is in the past
    /// * `InvalidToken` - Signature, issuer, audience, or format check failed
    pub fn validate(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;

        let token_data =
            decode::<AccessClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                    _ => JwtError::InvalidToken(e.to_string()),
                }
            })?;

        Ok(token_data.claims)
    }

    /// Check whether a token's `exp` claim is in the past.
    ///
    /// Inspects the token without verifying its signature; a token that
    /// cannot be parsed (or carries no `exp`) reports as expired. Never use
    /// this as an authorization decision; that is what [`validate`] is for.
    ///
    /// [`validate`]: Self::validate
    pub fn is_expired(&self, token: &str) -> bool {
        #[derive(Deserialize)]
        struct ExpiryProbe {
            exp: Option<i64>,
        }

        let mut validation = Validation::new(self.algorithm);
        validation.insecure_disable_signature_validation();
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;

        match decode::<ExpiryProbe>(token, &self.decoding_key, &validation) {
            Ok(data) => data
                .claims
                .exp
                .map_or(true, |exp| exp < Utc::now().timestamp()),
            Err(_) => true,
        }
    }
}
