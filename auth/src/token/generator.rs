use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::Rng;
use rand::RngCore;
use uuid::Uuid;

use super::errors::TokenGeneratorError;

const URL_SAFE_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

const MAX_CODE_DIGITS: u32 = 9;

/// Cryptographically secure random value generation.
///
/// Every shape draws from the OS CSPRNG. Uniqueness of produced values is
/// probabilistic; callers that need a hard guarantee rely on the store's
/// uniqueness constraint.
pub struct TokenGenerator;

impl TokenGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a fixed-length string over a URL-safe alphanumeric charset
    /// (plus `-` and `_`).
    pub fn url_safe_token(&self, length: usize) -> String {
        let mut rng = OsRng;
        (0..length)
            .map(|_| {
                let idx = rng.gen_range(0..URL_SAFE_CHARSET.len());
                URL_SAFE_CHARSET[idx] as char
            })
            .collect()
    }

    /// Generate `byte_len` secure random bytes, base64-encoded.
    pub fn secure_token(&self, byte_len: usize) -> String {
        let mut bytes = vec![0u8; byte_len];
        OsRng.fill_bytes(&mut bytes);
        BASE64.encode(bytes)
    }

    /// Generate a short numeric code with the given digit count.
    /// The first digit is never zero, so the code length is stable.
    ///
    /// # Errors
    /// * `InvalidCodeLength` - `digits` is 0 or greater than 9
    pub fn numeric_code(&self, digits: u32) -> Result<String, TokenGeneratorError> {
        if digits == 0 || digits > MAX_CODE_DIGITS {
            return Err(TokenGeneratorError::InvalidCodeLength {
                max: MAX_CODE_DIGITS,
                actual: digits,
            });
        }

        let min = 10u64.pow(digits - 1);
        let max = 10u64.pow(digits);
        let code = OsRng.gen_range(min..max);

        Ok(code.to_string())
    }

    /// Generate an opaque unique identifier.
    pub fn opaque_id(&self) -> Uuid {
        Uuid::new_v4()
    }

    /// Refresh-token value: 64 secure random bytes, base64.
    pub fn refresh_token(&self) -> String {
        self.secure_token(64)
    }

    /// Email-verification token: 48-character URL-safe string.
    pub fn verification_token(&self) -> String {
        self.url_safe_token(48)
    }

    /// Password-reset token: 48-character URL-safe string.
    pub fn reset_token(&self) -> String {
        self.url_safe_token(48)
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}
