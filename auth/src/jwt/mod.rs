pub mod claims;
pub mod errors;
pub mod service;

pub use claims::AccessClaims;
pub use claims::TokenPayload;
pub use errors::JwtError;
pub use service::TokenService;
