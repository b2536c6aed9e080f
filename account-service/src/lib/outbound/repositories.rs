pub mod account;
pub mod refresh_token;

pub use account::PostgresAccountStore;
pub use refresh_token::PostgresRefreshTokenStore;
