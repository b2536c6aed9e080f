//! Authentication utilities library
//!
//! Provides reusable credential infrastructure for services:
//! - Password hashing (Argon2id with a fixed, injected parameter set)
//! - Cryptographically secure token generation
//! - Signed access-token issuance and validation (JWT)
//!
//! Each service defines its own authentication traits and adapts these implementations.
//! This avoids coupling services through shared domain logic while reducing code duplication.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::new();
//! let encoded = hasher.hash("my_password").unwrap();
//! let is_valid = hasher.verify("my_password", &encoded).unwrap();
//! assert!(is_valid);
//! ```
//!
//! ## Token Generation
//! ```
//! use auth::TokenGenerator;
//!
//! let generator = TokenGenerator::new();
//! let verification = generator.verification_token();
//! assert_eq!(verification.len(), 48);
//! ```
//!
//! ## Access Tokens
//! ```
//! use auth::{TokenPayload, TokenService};
//!
//! let service = TokenService::new(
//!     b"secret_key_at_least_32_bytes_long!",
//!     "account-service",
//!     "platform",
//!     60,
//! );
//! let payload = TokenPayload::new("user123", "alice@example.com", "alice");
//! let token = service.issue(&payload).unwrap();
//! let claims = service.validate(&token).unwrap();
//! assert_eq!(claims.sub, "user123");
//! ```

pub mod jwt;
pub mod password;
pub mod token;

// Re-export commonly used items
pub use jwt::AccessClaims;
pub use jwt::JwtError;
pub use jwt::TokenPayload;
pub use jwt::TokenService;
pub use password::HasherParams;
pub use password::PasswordError;
pub use password::PasswordHasher;
pub use token::TokenGenerator;
pub use token::TokenGeneratorError;
