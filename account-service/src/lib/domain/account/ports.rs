use async_trait::async_trait;

use crate::account::errors::AuthError;
use crate::account::errors::NotifierError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::AccountSettings;
use crate::account::models::AccountStats;
use crate::account::models::AccountView;
use crate::account::models::AuthResponse;
use crate::account::models::LoginCommand;
use crate::account::models::RefreshToken;
use crate::account::models::RegisterCommand;

/// Port for credential and session operations.
///
/// Every operation is request-scoped and cancellable by dropping its future;
/// in-flight store calls are abandoned with it.
#[async_trait]
pub trait AuthServicePort: Send + Sync + 'static {
    /// Register a new account.
    ///
    /// Creates the account together with its default settings, zeroed stats,
    /// and the default "User" role in one transaction, then triggers a
    /// verification email (fire-and-forget).
    ///
    /// # Errors
    /// * `EmailAlreadyExists` / `UsernameAlreadyExists` - Identity conflict
    /// * `PasswordMismatch` - Confirmation does not match
    async fn register(&self, command: RegisterCommand) -> Result<AccountView, AuthError>;

    /// Authenticate with email and password, issuing an access token and a
    /// fresh refresh token.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown email or wrong password (indistinguishable)
    /// * `AccountLocked` - Unexpired lockout in effect (checked after password
    ///   verification)
    /// * `AccountDeactivated` - Account is inactive
    async fn login(&self, command: LoginCommand) -> Result<AuthResponse, AuthError>;

    /// Rotate a refresh token: revoke the presented token and issue a
    /// successor plus a new access token.
    ///
    /// Presenting a token that is already revoked or expired is treated as a
    /// theft signal: every active token of the owning account is revoked.
    ///
    /// # Errors
    /// * `InvalidRefreshToken` - Unknown, dead, or concurrently rotated token
    /// * `AccountNotFound` - Owning account vanished mid-flow
    /// * `AccountDeactivated` - Owning account is inactive
    async fn refresh_token(&self, token: &str) -> Result<AuthResponse, AuthError>;

    /// Revoke the given refresh token. Idempotent: revoking an absent or
    /// already-revoked token is a no-op success.
    async fn logout(&self, token: &str) -> Result<(), AuthError>;

    /// Revoke every currently-active refresh token for the account.
    ///
    /// # Returns
    /// Number of tokens revoked
    async fn logout_all_devices(&self, account_id: &AccountId) -> Result<u64, AuthError>;

    /// Consume an email-verification token.
    ///
    /// # Errors
    /// * `VerificationTokenNotFound` - Token matches no account
    /// * `VerificationTokenExpired` - Past expiry; token state is left
    ///   untouched so a resend stays possible
    async fn verify_email(&self, token: &str) -> Result<(), AuthError>;

    /// Regenerate and resend the verification token.
    ///
    /// # Errors
    /// * `AccountNotFound` - Unknown email
    /// * `AlreadyVerified` - Email is already verified
    async fn resend_email_verification(&self, email: &str) -> Result<(), AuthError>;

    /// Begin password recovery. Returns success for unknown emails without
    /// revealing non-existence.
    async fn forgot_password(&self, email: &str) -> Result<(), AuthError>;

    /// Consume a reset token and overwrite the credential. A locked account
    /// is explicitly unlocked.
    ///
    /// # Errors
    /// * `ResetTokenNotFound` - Token matches no account
    /// * `ResetTokenExpired` - Past expiry
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError>;

    /// Replace the credential after verifying the current one.
    ///
    /// # Errors
    /// * `AccountNotFound` - Unknown account id
    /// * `InvalidCredentials` - Current password is wrong
    /// * `PasswordUnchanged` - New password verifies identical to the current hash
    async fn change_password(
        &self,
        account_id: &AccountId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
}

/// Persistence operations for the account aggregate.
///
/// Finders never return soft-deleted accounts. Mutations of the lockout
/// counters must be committed atomically with their triggering read.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AuthError>;

    /// Lookup by case-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError>;

    /// Lookup by username, case-insensitive.
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AuthError>;

    async fn find_by_verification_token(&self, token: &str)
        -> Result<Option<Account>, AuthError>;

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Account>, AuthError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, AuthError>;

    async fn exists_by_username(&self, username: &str) -> Result<bool, AuthError>;

    /// Persist a new account together with its settings, stats, and the
    /// default "User" role. One logical transaction: partial creation is a
    /// correctness bug, not an acceptable outcome.
    ///
    /// # Errors
    /// * `EmailAlreadyExists` / `UsernameAlreadyExists` - Uniqueness violation
    async fn create(
        &self,
        account: &Account,
        settings: &AccountSettings,
        stats: &AccountStats,
    ) -> Result<(), AuthError>;

    async fn update(&self, account: &Account) -> Result<(), AuthError>;
}

/// Persistence operations for refresh tokens.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync + 'static {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AuthError>;

    async fn find_active_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<RefreshToken>, AuthError>;

    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError>;

    /// Atomically transition one token from active to revoked.
    ///
    /// The store must guarantee that exactly one caller observes the token as
    /// active and performs the transition; concurrent callers observe it as
    /// already revoked.
    ///
    /// # Returns
    /// `true` if this call performed the transition, `false` if the token was
    /// absent or already revoked.
    async fn revoke(
        &self,
        token: &str,
        reason: &str,
        replaced_by: Option<String>,
    ) -> Result<bool, AuthError>;

    /// Revoke every active token owned by the account.
    ///
    /// # Returns
    /// Number of tokens transitioned
    async fn revoke_all_for_account(
        &self,
        account_id: &AccountId,
        reason: &str,
    ) -> Result<u64, AuthError>;
}

/// Outbound email notifications, fire-and-forget from the orchestrator's
/// perspective: delivery failures are logged, never propagated into the
/// triggering mutation.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send_verification(
        &self,
        email: &str,
        name: &str,
        token: &str,
    ) -> Result<(), NotifierError>;

    async fn send_password_reset(
        &self,
        email: &str,
        name: &str,
        token: &str,
    ) -> Result<(), NotifierError>;

    async fn send_welcome(&self, email: &str, name: &str) -> Result<(), NotifierError>;
}
