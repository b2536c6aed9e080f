use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;

/// Error for AccountId parsing failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccountIdError {
    #[error("Invalid UUID format: {0}")]
    InvalidFormat(String),
}

/// Error for Username validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsernameError {
    #[error("Username too short: minimum {min} characters, got {actual}")]
    TooShort { min: usize, actual: usize },

    #[error("Username too long: maximum {max} characters, got {actual}")]
    TooLong { max: usize, actual: usize },

    #[error(
        "Username contains invalid characters (only alphanumeric, underscore, and hyphen allowed)"
    )]
    InvalidCharacters,
}

/// Error for EmailAddress validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("Invalid email format: {0}")]
    InvalidFormat(String),
}

/// Error for notification delivery
#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    #[error("Failed to build message: {0}")]
    MessageBuild(String),

    #[error("Failed to send message: {0}")]
    SendFailed(String),

    #[error("Mail transport configuration error: {0}")]
    Transport(String),
}

/// Classification of an [`AuthError`] for boundary translation.
///
/// The transport layer maps kinds to its own status codes; the core never
/// produces an untyped fault for these conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    Unauthorized,
    Forbidden,
    NotFound,
    BadRequest,
    Internal,
}

/// Top-level error for all credential and session operations.
///
/// Closed tagged type: each variant carries its condition, and [`kind`]
/// exposes the transport classification.
///
/// [`kind`]: AuthError::kind
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    // Value object validation errors (automatically converted via #[from])
    #[error("Invalid account id: {0}")]
    InvalidAccountId(#[from] AccountIdError),

    #[error("Invalid username: {0}")]
    InvalidUsername(#[from] UsernameError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    // Conflicts
    #[error("Email already registered: {0}")]
    EmailAlreadyExists(String),

    #[error("Username already taken: {0}")]
    UsernameAlreadyExists(String),

    // Authentication failures. The message never distinguishes an unknown
    // email from a wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    // Forbidden states
    #[error("Account is locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Account is deactivated")]
    AccountDeactivated,

    // Missing entities
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid verification token")]
    VerificationTokenNotFound,

    #[error("Invalid reset token")]
    ResetTokenNotFound,

    // Bad requests
    #[error("Verification token has expired")]
    VerificationTokenExpired,

    #[error("Reset token has expired")]
    ResetTokenExpired,

    #[error("Email is already verified")]
    AlreadyVerified,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("New password must differ from the current password")]
    PasswordUnchanged,

    // Collaborator failures, propagated unmodified for transport translation
    #[error("Password error: {0}")]
    Password(#[from] auth::PasswordError),

    #[error("Token error: {0}")]
    Token(#[from] auth::JwtError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::EmailAlreadyExists(_) | AuthError::UsernameAlreadyExists(_) => {
                ErrorKind::Conflict
            }

            AuthError::InvalidCredentials | AuthError::InvalidRefreshToken => {
                ErrorKind::Unauthorized
            }

            AuthError::AccountLocked { .. } | AuthError::AccountDeactivated => ErrorKind::Forbidden,

            AuthError::AccountNotFound(_)
            | AuthError::VerificationTokenNotFound
            | AuthError::ResetTokenNotFound => ErrorKind::NotFound,

            AuthError::InvalidAccountId(_)
            | AuthError::InvalidUsername(_)
            | AuthError::InvalidEmail(_)
            | AuthError::VerificationTokenExpired
            | AuthError::ResetTokenExpired
            | AuthError::AlreadyVerified
            | AuthError::PasswordMismatch
            | AuthError::PasswordUnchanged => ErrorKind::BadRequest,

            AuthError::Password(_)
            | AuthError::Token(_)
            | AuthError::Database(_)
            | AuthError::Unknown(_) => ErrorKind::Internal,
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Unknown(err.to_string())
    }
}
