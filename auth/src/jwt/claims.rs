use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// Identity material carried into an access token.
///
/// Built by the caller at issuance time; the service adds the time-bound
/// and registered claims (`jti`, `iat`, `exp`, `iss`, `aud`).
#[derive(Debug, Clone)]
pub struct TokenPayload {
    /// Account identifier (becomes the `sub` claim)
    pub account_id: String,
    pub email: String,
    pub username: String,
    /// Role names granted to the account
    pub roles: Vec<String>,
    /// Open set of custom string claims, flattened into the token
    pub claims: HashMap<String, String>,
}

impl TokenPayload {
    pub fn new(
        account_id: impl ToString,
        email: impl ToString,
        username: impl ToString,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            email: email.to_string(),
            username: username.to_string(),
            roles: Vec::new(),
            claims: HashMap::new(),
        }
    }

    /// Set role names.
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Add a custom string claim.
    pub fn with_claim(mut self, key: impl ToString, value: impl ToString) -> Self {
        self.claims.insert(key.to_string(), value.to_string());
        self
    }
}

/// Decoded claims of a validated access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessClaims {
    /// Subject (account identifier)
    pub sub: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Unique token identifier, for replay logs and audit
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    /// Custom claims carried through verbatim
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl AccessClaims {
    /// Get a custom string claim by name.
    pub fn claim(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}
