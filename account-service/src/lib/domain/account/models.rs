use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::Utc;
use uuid::Uuid;

use crate::account::errors::AccountIdError;
use crate::account::errors::EmailError;
use crate::account::errors::UsernameError;

/// Account unique identifier type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Generate a new random account ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an account ID from string.
    ///
    /// # Errors
    /// * `InvalidFormat` - String is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self, AccountIdError> {
        Uuid::parse_str(s)
            .map(AccountId)
            .map_err(|e| AccountIdError::InvalidFormat(e.to_string()))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Username value type
///
/// Ensures username is 3-32 characters and contains only alphanumeric, underscore, and hyphen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username(String);

impl Username {
    const MIN_LENGTH: usize = 3;
    const MAX_LENGTH: usize = 32;

    /// Create a new valid username.
    ///
    /// # Errors
    /// * `TooShort` - Username shorter than 3 characters
    /// * `TooLong` - Username longer than 32 characters
    /// * `InvalidCharacters` - Contains non-alphanumeric characters (except _ and -)
    pub fn new(username: String) -> Result<Self, UsernameError> {
        let username = Self::with_valid_length(username)?;
        let username = Self::with_valid_chars(username)?;
        Ok(Self(username))
    }

    fn with_valid_length(username: String) -> Result<String, UsernameError> {
        let length = username.len();
        if length < Self::MIN_LENGTH {
            Err(UsernameError::TooShort {
                min: Self::MIN_LENGTH,
                actual: length,
            })
        } else if length > Self::MAX_LENGTH {
            Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
                actual: length,
            })
        } else {
            Ok(username)
        }
    }

    fn with_valid_chars(username: String) -> Result<String, UsernameError> {
        if username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            Ok(username)
        } else {
            Err(UsernameError::InvalidCharacters)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Email address type
///
/// Validates format using an RFC 5322 compliant parser and normalizes to
/// lowercase, so lookups and uniqueness are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new validated, case-normalized email address.
    ///
    /// # Errors
    /// * `InvalidFormat` - Email does not conform to RFC 5322
    pub fn new(email: String) -> Result<Self, EmailError> {
        let email = email.trim().to_lowercase();
        email_address::EmailAddress::from_str(&email)
            .map(|_| EmailAddress(email))
            .map_err(|e| EmailError::InvalidFormat(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Self-reported gender on the account profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gender {
    #[default]
    Unspecified,
    Female,
    Male,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Unspecified => "unspecified",
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::Other => "other",
        }
    }

    /// Parse from stored text; unknown values fall back to `Unspecified`.
    pub fn parse(s: &str) -> Self {
        match s {
            "female" => Gender::Female,
            "male" => Gender::Male,
            "other" => Gender::Other,
            _ => Gender::Unspecified,
        }
    }
}

/// Account aggregate entity.
///
/// Holds the credential, verification, recovery, lockout, and activity state
/// for one registered identity. All transitions happen through the service;
/// the helpers below only encode single-field-group state changes.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub email: EmailAddress,
    pub username: Option<Username>,
    /// Opaque encoded credential (algorithm salt + digest)
    pub password_hash: String,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    /// Role names granted to the account; loaded by the store
    pub roles: Vec<String>,

    // Email verification
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_expires: Option<DateTime<Utc>>,

    // Password recovery
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,

    // Lockout
    pub failed_login_attempts: i32,
    pub is_locked: bool,
    pub lockout_end: Option<DateTime<Utc>>,

    // Activity
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,

    // Lifecycle
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker; deletion is logical, never physical
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Whether an unexpired lockout is in effect.
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.is_locked && self.lockout_end.map_or(false, |end| end > now)
    }

    /// Whether the held verification token is present and unexpired.
    pub fn verification_token_valid(&self, now: DateTime<Utc>) -> bool {
        self.email_verification_token.is_some()
            && self.email_verification_expires.map_or(false, |exp| exp > now)
    }

    /// Whether the held reset token is present and unexpired.
    pub fn reset_token_valid(&self, now: DateTime<Utc>) -> bool {
        self.password_reset_token.is_some()
            && self.password_reset_expires.map_or(false, |exp| exp > now)
    }

    /// Whether the account is eligible to authenticate at all,
    /// independent of credential correctness.
    pub fn can_login(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_locked_out(now) && self.deleted_at.is_none()
    }

    /// Record one failed login attempt; the attempt that reaches
    /// `max_attempts` engages the lockout.
    pub fn record_failed_login(
        &mut self,
        now: DateTime<Utc>,
        max_attempts: i32,
        lockout: Duration,
    ) {
        self.failed_login_attempts += 1;
        if self.failed_login_attempts >= max_attempts {
            self.is_locked = true;
            self.lockout_end = Some(now + lockout);
        }
    }

    /// Reset the failure counter, clear any lockout, and stamp the login time.
    pub fn record_successful_login(&mut self, now: DateTime<Utc>) {
        self.failed_login_attempts = 0;
        self.is_locked = false;
        self.lockout_end = None;
        self.last_login_at = Some(now);
    }

    /// Explicitly clear the lockout state (password reset, admin action).
    pub fn unlock(&mut self) {
        self.is_locked = false;
        self.lockout_end = None;
        self.failed_login_attempts = 0;
    }

    /// Display name for outbound notifications.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.username.as_ref().map(Username::as_str))
            .unwrap_or("User")
    }
}

/// Store-backed session credential, many-to-one owned by an Account.
///
/// A token is active iff it has not been revoked and has not expired; both
/// terminal states are permanent.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    /// Opaque, unique, unguessable token value
    pub token: String,
    pub account_id: AccountId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    /// Forward reference to the successor token value. Audit only,
    /// never an authorization link.
    pub replaced_by_token: Option<String>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && !self.is_expired(now)
    }
}

/// Per-account notification and privacy preferences, created with the account.
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub account_id: AccountId,
    pub is_private_account: bool,
    pub allow_comments: bool,
    pub allow_mentions: bool,
    pub push_notifications_enabled: bool,
    pub email_notifications_enabled: bool,
    pub notify_on_likes: bool,
    pub notify_on_comments: bool,
    pub notify_on_follows: bool,
}

impl AccountSettings {
    /// Defaults applied at registration: public account, everything allowed,
    /// all notifications on.
    pub fn default_for(account_id: AccountId) -> Self {
        Self {
            account_id,
            is_private_account: false,
            allow_comments: true,
            allow_mentions: true,
            push_notifications_enabled: true,
            email_notifications_enabled: true,
            notify_on_likes: true,
            notify_on_comments: true,
            notify_on_follows: true,
        }
    }
}

/// Per-account engagement counters, zeroed at registration.
#[derive(Debug, Clone)]
pub struct AccountStats {
    pub account_id: AccountId,
    pub followers_count: i32,
    pub following_count: i32,
    pub posts_count: i32,
    pub likes_received: i32,
    pub last_calculated_at: DateTime<Utc>,
}

impl AccountStats {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            followers_count: 0,
            following_count: 0,
            posts_count: 0,
            likes_received: 0,
            last_calculated_at: Utc::now(),
        }
    }
}

/// Command to register a new account with validated identity fields.
///
/// Password text is plain here; the service hashes before anything is stored.
#[derive(Debug)]
pub struct RegisterCommand {
    pub email: EmailAddress,
    pub password: String,
    pub confirm_password: String,
    pub username: Option<Username>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
}

/// Command to authenticate with email and password.
///
/// Email is a raw string: an address that fails normalization must produce
/// the same generic failure as an unknown one.
#[derive(Debug)]
pub struct LoginCommand {
    pub email: String,
    pub password: String,
}

/// Account projection without credential or token material.
#[derive(Debug, Clone)]
pub struct AccountView {
    pub id: AccountId,
    pub email: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub roles: Vec<String>,
    pub email_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.as_str().to_string(),
            username: account.username.as_ref().map(|u| u.as_str().to_string()),
            full_name: account.full_name.clone(),
            date_of_birth: account.date_of_birth,
            gender: account.gender,
            roles: account.roles.clone(),
            email_verified: account.email_verified,
            is_active: account.is_active,
            created_at: account.created_at,
            last_login_at: account.last_login_at,
        }
    }
}

/// Result of a successful login or token refresh.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token expiry, mirrored from the token service lifetime
    pub expires_at: DateTime<Utc>,
    pub account: AccountView,
}
