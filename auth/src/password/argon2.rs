use argon2::Algorithm;
use argon2::Argon2;
use argon2::Params;
use argon2::Version;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use constant_time_eq::constant_time_eq;
use rand::rngs::OsRng;
use rand::RngCore;

use super::errors::PasswordError;

/// Argon2id parameter set.
///
/// Fixed per deployment: every stored credential is hashed with the same
/// parameters, so verification recomputes with this set and the salt
/// extracted from the stored encoding. Consolidated here so the constants
/// are injected once and never duplicated.
#[derive(Debug, Clone, Copy)]
pub struct HasherParams {
    /// Random salt length in bytes
    pub salt_len: usize,
    /// Digest length in bytes
    pub hash_len: usize,
    /// Number of passes over the memory
    pub iterations: u32,
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for HasherParams {
    fn default() -> Self {
        Self {
            salt_len: 16,
            hash_len: 32,
            iterations: 4,
            memory_kib: 64 * 1024,
            parallelism: 1,
        }
    }
}

/// Password hashing implementation.
///
/// Argon2id with a fixed parameter set. Credentials are stored as
/// `base64(salt || digest)`, an opaque string from the caller's perspective.
pub struct PasswordHasher {
    params: HasherParams,
}

impl PasswordHasher {
    /// Create a password hasher with the deployment defaults
    /// (16-byte salt, 32-byte digest, 4 iterations, 64 MiB, parallelism 1).
    pub fn new() -> Self {
        Self::with_params(HasherParams::default())
    }

    /// Create a password hasher with an explicit parameter set.
    pub fn with_params(params: HasherParams) -> Self {
        Self { params }
    }

    /// Hash a plaintext password.
    ///
    /// Generates a fresh random salt from the OS CSPRNG, derives the digest,
    /// and returns `base64(salt || digest)`.
    ///
    /// # Errors
    /// * `InvalidParameters` - Parameter set is rejected by Argon2
    /// * `HashingFailed` - Derivation failed
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt = vec![0u8; self.params.salt_len];
        OsRng.fill_bytes(&mut salt);

        let digest = self.derive(password.as_bytes(), &salt)?;

        let mut encoded = Vec::with_capacity(self.params.salt_len + self.params.hash_len);
        encoded.extend_from_slice(&salt);
        encoded.extend_from_slice(&digest);

        Ok(BASE64.encode(encoded))
    }

    /// Verify a password against a stored encoding.
    ///
    /// Recomputes the digest with the salt extracted from the encoding and
    /// compares in constant time. Malformed encodings (not base64, wrong
    /// decoded length) verify as `false` rather than erroring.
    ///
    /// # Errors
    /// * `InvalidParameters` - Parameter set is rejected by Argon2
    /// * `HashingFailed` - Derivation failed
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool, PasswordError> {
        let decoded = match BASE64.decode(encoded) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };

        if decoded.len() != self.params.salt_len + self.params.hash_len {
            return Ok(false);
        }

        let (salt, stored_digest) = decoded.split_at(self.params.salt_len);
        let computed_digest = self.derive(password.as_bytes(), salt)?;

        Ok(constant_time_eq(stored_digest, &computed_digest))
    }

    fn derive(&self, password: &[u8], salt: &[u8]) -> Result<Vec<u8>, PasswordError> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            Some(self.params.hash_len),
        )
        .map_err(|e| PasswordError::InvalidParameters(e.to_string()))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut digest = vec![0u8; self.params.hash_len];
        argon2
            .hash_password_into(password, salt, &mut digest)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

        Ok(digest)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}
