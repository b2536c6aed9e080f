use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use auth::PasswordHasher;
use auth::TokenGenerator;
use auth::TokenPayload;
use auth::TokenService;

use crate::account::errors::AuthError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::AccountSettings;
use crate::account::models::AccountStats;
use crate::account::models::AccountView;
use crate::account::models::AuthResponse;
use crate::account::models::LoginCommand;
use crate::account::models::RefreshToken;
use crate::account::models::RegisterCommand;
use crate::account::ports::AccountStore;
use crate::account::ports::AuthServicePort;
use crate::account::ports::Notifier;
use crate::account::ports::RefreshTokenStore;

// Security policy. Owned here and nowhere else.
const MAX_FAILED_LOGIN_ATTEMPTS: i32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;
const RESET_TOKEN_TTL_HOURS: i64 = 1;

const REASON_REPLACED: &str = "Replaced by new token";
const REASON_REUSE: &str = "Attempted reuse of revoked token";
const REASON_LOGOUT: &str = "Logged out";
const REASON_LOGOUT_ALL: &str = "Logged out from all devices";

/// Credential and session orchestrator.
///
/// Composes the password hasher, token generator, and token service over the
/// injected store and notifier ports. All state-machine transitions and
/// security policy live here.
pub struct AuthService<AS, RS, N>
where
    AS: AccountStore,
    RS: RefreshTokenStore,
    N: Notifier,
{
    accounts: Arc<AS>,
    refresh_tokens: Arc<RS>,
    notifier: Arc<N>,
    hasher: Arc<PasswordHasher>,
    tokens: TokenService,
    generator: TokenGenerator,
}

impl<AS, RS, N> AuthService<AS, RS, N>
where
    AS: AccountStore,
    RS: RefreshTokenStore,
    N: Notifier,
{
    /// Create a new auth service with injected dependencies.
    ///
    /// # Arguments
    /// * `accounts` - Account persistence implementation
    /// * `refresh_tokens` - Refresh-token persistence implementation
    /// * `notifier` - Outbound email implementation
    /// * `hasher` - Password hasher with the deployment parameter set
    /// * `tokens` - Access-token service
    pub fn new(
        accounts: Arc<AS>,
        refresh_tokens: Arc<RS>,
        notifier: Arc<N>,
        hasher: PasswordHasher,
        tokens: TokenService,
    ) -> Self {
        Self {
            accounts,
            refresh_tokens,
            notifier,
            hasher: Arc::new(hasher),
            tokens,
            generator: TokenGenerator::new(),
        }
    }

    /// Run the memory-hard hash on the blocking pool so the 64 MiB pass
    /// never stalls request handling on the async runtime.
    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Unknown(format!("Hashing task failed: {}", e)))?
            .map_err(AuthError::from)
    }

    async fn verify_password(&self, password: String, encoded: String) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded))
            .await
            .map_err(|e| AuthError::Unknown(format!("Hashing task failed: {}", e)))?
            .map_err(AuthError::from)
    }

    /// Issue an access token and a fresh (not yet persisted) refresh token
    /// for the account.
    fn new_session(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<(String, RefreshToken), AuthError> {
        let username = account
            .username
            .as_ref()
            .map(|u| u.as_str())
            .unwrap_or(account.email.as_str());

        let payload = TokenPayload::new(account.id, account.email.as_str(), username)
            .with_roles(account.roles.clone());

        let access_token = self.tokens.issue(&payload)?;

        let refresh_token = RefreshToken {
            token: self.generator.refresh_token(),
            account_id: account.id,
            issued_at: now,
            expires_at: now + Duration::days(REFRESH_TOKEN_TTL_DAYS),
            revoked_at: None,
            revoked_reason: None,
            replaced_by_token: None,
        };

        Ok((access_token, refresh_token))
    }

    fn response(
        &self,
        access_token: String,
        refresh_token: String,
        now: DateTime<Utc>,
        account: &Account,
    ) -> AuthResponse {
        AuthResponse {
            access_token,
            refresh_token,
            expires_at: now + self.tokens.lifetime(),
            account: AccountView::from(account),
        }
    }
}

#[async_trait]
impl<AS, RS, N> AuthServicePort for AuthService<AS, RS, N>
where
    AS: AccountStore,
    RS: RefreshTokenStore,
    N: Notifier,
{
    async fn register(&self, command: RegisterCommand) -> Result<AccountView, AuthError> {
        if command.password != command.confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        if self.accounts.exists_by_email(command.email.as_str()).await? {
            return Err(AuthError::EmailAlreadyExists(
                command.email.as_str().to_string(),
            ));
        }

        if let Some(username) = &command.username {
            if self.accounts.exists_by_username(username.as_str()).await? {
                return Err(AuthError::UsernameAlreadyExists(
                    username.as_str().to_string(),
                ));
            }
        }

        let password_hash = self.hash_password(command.password).await?;
        let now = Utc::now();

        let account = Account {
            id: AccountId(self.generator.opaque_id()),
            email: command.email,
            username: command.username,
            password_hash,
            full_name: command.full_name,
            date_of_birth: command.date_of_birth,
            gender: command.gender,
            roles: vec!["User".to_string()],
            email_verified: false,
            email_verification_token: Some(self.generator.verification_token()),
            email_verification_expires: Some(now + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS)),
            password_reset_token: None,
            password_reset_expires: None,
            failed_login_attempts: 0,
            is_locked: false,
            lockout_end: None,
            is_active: true,
            last_login_at: None,
            created_at: now,
            deleted_at: None,
        };

        let settings = AccountSettings::default_for(account.id);
        let stats = AccountStats::new(account.id);

        self.accounts.create(&account, &settings, &stats).await?;

        tracing::info!(account_id = %account.id, "Account registered");

        // Fire-and-forget: a failed send never rolls back the registration.
        if let Some(token) = &account.email_verification_token {
            if let Err(e) = self
                .notifier
                .send_verification(account.email.as_str(), account.display_name(), token)
                .await
            {
                tracing::error!(
                    account_id = %account.id,
                    "Failed to send verification email: {}",
                    e
                );
            }
        }

        Ok(AccountView::from(&account))
    }

    async fn login(&self, command: LoginCommand) -> Result<AuthResponse, AuthError> {
        let email = command.email.trim().to_lowercase();

        let mut account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let now = Utc::now();

        let password_ok = self
            .verify_password(command.password, account.password_hash.clone())
            .await?;

        if !password_ok {
            // Counts even during an active lockout window.
            account.record_failed_login(
                now,
                MAX_FAILED_LOGIN_ATTEMPTS,
                Duration::minutes(LOCKOUT_MINUTES),
            );
            self.accounts.update(&account).await?;
            return Err(AuthError::InvalidCredentials);
        }

        // Lockout is checked after password verification; a correct password
        // during the window is still rejected.
        if account.is_locked_out(now) {
            let until = account.lockout_end.unwrap_or(now);
            return Err(AuthError::AccountLocked { until });
        }

        if !account.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        account.record_successful_login(now);
        self.accounts.update(&account).await?;

        let (access_token, refresh_token) = self.new_session(&account, now)?;
        self.refresh_tokens.create(&refresh_token).await?;

        tracing::info!(account_id = %account.id, "Login succeeded");

        Ok(self.response(access_token, refresh_token.token, now, &account))
    }

    async fn refresh_token(&self, token: &str) -> Result<AuthResponse, AuthError> {
        let presented = self
            .refresh_tokens
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        let now = Utc::now();

        if !presented.is_active(now) {
            // Reuse of a dead token poisons all live sessions for the account.
            let revoked = self
                .refresh_tokens
                .revoke_all_for_account(&presented.account_id, REASON_REUSE)
                .await?;
            tracing::warn!(
                account_id = %presented.account_id,
                revoked,
                "Revoked refresh token presented; all sessions invalidated"
            );
            return Err(AuthError::InvalidRefreshToken);
        }

        let account = self
            .accounts
            .find_by_id(&presented.account_id)
            .await?
            .ok_or_else(|| AuthError::AccountNotFound(presented.account_id.to_string()))?;

        if !account.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        let (access_token, next) = self.new_session(&account, now)?;

        // Atomic conditional transition: exactly one concurrent caller rotates.
        let rotated = self
            .refresh_tokens
            .revoke(&presented.token, REASON_REPLACED, Some(next.token.clone()))
            .await?;

        if !rotated {
            // Lost the race: someone else already consumed this token.
            let revoked = self
                .refresh_tokens
                .revoke_all_for_account(&presented.account_id, REASON_REUSE)
                .await?;
            tracing::warn!(
                account_id = %presented.account_id,
                revoked,
                "Concurrent rotation detected; all sessions invalidated"
            );
            return Err(AuthError::InvalidRefreshToken);
        }

        self.refresh_tokens.create(&next).await?;

        Ok(self.response(access_token, next.token, now, &account))
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        // Idempotent: revoking an absent or already-revoked token is a no-op.
        self.refresh_tokens
            .revoke(token, REASON_LOGOUT, None)
            .await?;
        Ok(())
    }

    async fn logout_all_devices(&self, account_id: &AccountId) -> Result<u64, AuthError> {
        let revoked = self
            .refresh_tokens
            .revoke_all_for_account(account_id, REASON_LOGOUT_ALL)
            .await?;

        tracing::info!(account_id = %account_id, revoked, "Logged out from all devices");

        Ok(revoked)
    }

    async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let mut account = self
            .accounts
            .find_by_verification_token(token)
            .await?
            .ok_or(AuthError::VerificationTokenNotFound)?;

        let now = Utc::now();

        if !account.verification_token_valid(now) {
            // Left untouched so an explicit resend stays possible.
            return Err(AuthError::VerificationTokenExpired);
        }

        account.email_verified = true;
        account.email_verification_token = None;
        account.email_verification_expires = None;

        self.accounts.update(&account).await?;

        if let Err(e) = self
            .notifier
            .send_welcome(account.email.as_str(), account.display_name())
            .await
        {
            tracing::error!(account_id = %account.id, "Failed to send welcome email: {}", e);
        }

        Ok(())
    }

    async fn resend_email_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim().to_lowercase();

        let mut account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AuthError::AccountNotFound(email.clone()))?;

        if account.email_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let now = Utc::now();
        account.email_verification_token = Some(self.generator.verification_token());
        account.email_verification_expires =
            Some(now + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS));

        self.accounts.update(&account).await?;

        if let Some(token) = &account.email_verification_token {
            if let Err(e) = self
                .notifier
                .send_verification(account.email.as_str(), account.display_name(), token)
                .await
            {
                tracing::error!(
                    account_id = %account.id,
                    "Failed to send verification email: {}",
                    e
                );
            }
        }

        Ok(())
    }

    async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim().to_lowercase();

        // Success either way: the caller must not learn whether the account
        // exists.
        let Some(mut account) = self.accounts.find_by_email(&email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let now = Utc::now();
        account.password_reset_token = Some(self.generator.reset_token());
        account.password_reset_expires = Some(now + Duration::hours(RESET_TOKEN_TTL_HOURS));

        self.accounts.update(&account).await?;

        if let Some(token) = &account.password_reset_token {
            if let Err(e) = self
                .notifier
                .send_password_reset(account.email.as_str(), account.display_name(), token)
                .await
            {
                tracing::error!(account_id = %account.id, "Failed to send reset email: {}", e);
            }
        }

        Ok(())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let mut account = self
            .accounts
            .find_by_reset_token(token)
            .await?
            .ok_or(AuthError::ResetTokenNotFound)?;

        let now = Utc::now();

        if !account.reset_token_valid(now) {
            return Err(AuthError::ResetTokenExpired);
        }

        account.password_hash = self.hash_password(new_password.to_string()).await?;
        account.password_reset_token = None;
        account.password_reset_expires = None;

        // A reset also recovers a locked account.
        if account.is_locked {
            account.unlock();
        }

        self.accounts.update(&account).await?;

        tracing::info!(account_id = %account.id, "Password reset");

        Ok(())
    }

    async fn change_password(
        &self,
        account_id: &AccountId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let mut account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AuthError::AccountNotFound(account_id.to_string()))?;

        let current_ok = self
            .verify_password(current_password.to_string(), account.password_hash.clone())
            .await?;
        if !current_ok {
            return Err(AuthError::InvalidCredentials);
        }

        // A no-op change is rejected, not silently accepted.
        let unchanged = self
            .verify_password(new_password.to_string(), account.password_hash.clone())
            .await?;
        if unchanged {
            return Err(AuthError::PasswordUnchanged);
        }

        account.password_hash = self.hash_password(new_password.to_string()).await?;
        self.accounts.update(&account).await?;

        tracing::info!(account_id = %account.id, "Password changed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockall::mock;

    use super::*;
    use crate::account::errors::NotifierError;
    use crate::account::models::EmailAddress;
    use crate::account::models::Gender;
    use crate::account::models::Username;
    use auth::HasherParams;

    mock! {
        pub TestAccountStore {}

        #[async_trait]
        impl AccountStore for TestAccountStore {
            async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AuthError>;
            async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError>;
            async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AuthError>;
            async fn find_by_verification_token(&self, token: &str) -> Result<Option<Account>, AuthError>;
            async fn find_by_reset_token(&self, token: &str) -> Result<Option<Account>, AuthError>;
            async fn exists_by_email(&self, email: &str) -> Result<bool, AuthError>;
            async fn exists_by_username(&self, username: &str) -> Result<bool, AuthError>;
            async fn create(&self, account: &Account, settings: &AccountSettings, stats: &AccountStats) -> Result<(), AuthError>;
            async fn update(&self, account: &Account) -> Result<(), AuthError>;
        }
    }

    mock! {
        pub TestRefreshTokenStore {}

        #[async_trait]
        impl RefreshTokenStore for TestRefreshTokenStore {
            async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AuthError>;
            async fn find_active_for_account(&self, account_id: &AccountId) -> Result<Vec<RefreshToken>, AuthError>;
            async fn create(&self, token: &RefreshToken) -> Result<(), AuthError>;
            async fn revoke(&self, token: &str, reason: &str, replaced_by: Option<String>) -> Result<bool, AuthError>;
            async fn revoke_all_for_account(&self, account_id: &AccountId, reason: &str) -> Result<u64, AuthError>;
        }
    }

    mock! {
        pub TestNotifier {}

        #[async_trait]
        impl Notifier for TestNotifier {
            async fn send_verification(&self, email: &str, name: &str, token: &str) -> Result<(), NotifierError>;
            async fn send_password_reset(&self, email: &str, name: &str, token: &str) -> Result<(), NotifierError>;
            async fn send_welcome(&self, email: &str, name: &str) -> Result<(), NotifierError>;
        }
    }

    // Reduced memory cost keeps the suite fast; policy behavior is identical.
    fn light_hasher() -> PasswordHasher {
        PasswordHasher::with_params(HasherParams {
            memory_kib: 1024,
            iterations: 1,
            ..HasherParams::default()
        })
    }

    fn hash_of(password: &str) -> String {
        light_hasher().hash(password).expect("Failed to hash")
    }

    fn token_service() -> TokenService {
        TokenService::new(
            b"test_secret_key_at_least_32_bytes!",
            "account-service",
            "platform",
            60,
        )
    }

    fn service(
        accounts: MockTestAccountStore,
        refresh_tokens: MockTestRefreshTokenStore,
        notifier: MockTestNotifier,
    ) -> AuthService<MockTestAccountStore, MockTestRefreshTokenStore, MockTestNotifier> {
        AuthService::new(
            Arc::new(accounts),
            Arc::new(refresh_tokens),
            Arc::new(notifier),
            light_hasher(),
            token_service(),
        )
    }

    fn sample_account(password_hash: String) -> Account {
        Account {
            id: AccountId::new(),
            email: EmailAddress::new("alice@example.com".to_string()).unwrap(),
            username: Some(Username::new("alice".to_string()).unwrap()),
            password_hash,
            full_name: None,
            date_of_birth: None,
            gender: Gender::Unspecified,
            roles: vec!["User".to_string()],
            email_verified: true,
            email_verification_token: None,
            email_verification_expires: None,
            password_reset_token: None,
            password_reset_expires: None,
            failed_login_attempts: 0,
            is_locked: false,
            lockout_end: None,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn active_refresh_token(account_id: AccountId, value: &str) -> RefreshToken {
        let now = Utc::now();
        RefreshToken {
            token: value.to_string(),
            account_id,
            issued_at: now,
            expires_at: now + Duration::days(7),
            revoked_at: None,
            revoked_reason: None,
            replaced_by_token: None,
        }
    }

    fn register_command() -> RegisterCommand {
        RegisterCommand {
            email: EmailAddress::new("alice@example.com".to_string()).unwrap(),
            password: "alice123".to_string(),
            confirm_password: "alice123".to_string(),
            username: Some(Username::new("alice".to_string()).unwrap()),
            full_name: Some("Alice Lidell".to_string()),
            date_of_birth: None,
            gender: Gender::Female,
        }
    }

    fn close_to(actual: DateTime<Utc>, expected: DateTime<Utc>) -> bool {
        (actual - expected).num_seconds().abs() < 30
    }

    #[tokio::test]
    async fn test_register_success() {
        let mut accounts = MockTestAccountStore::new();
        let refresh_tokens = MockTestRefreshTokenStore::new();
        let mut notifier = MockTestNotifier::new();

        accounts
            .expect_exists_by_email()
            .withf(|email| email == "alice@example.com")
            .times(1)
            .returning(|_| Ok(false));
        accounts
            .expect_exists_by_username()
            .withf(|username| username == "alice")
            .times(1)
            .returning(|_| Ok(false));

        let expected_expiry = Utc::now() + Duration::hours(24);
        accounts
            .expect_create()
            .withf(move |account, settings, stats| {
                !account.email_verified
                    && account.is_active
                    && account.roles == vec!["User".to_string()]
                    && account
                        .email_verification_token
                        .as_ref()
                        .map_or(false, |t| t.len() == 48)
                    && account
                        .email_verification_expires
                        .map_or(false, |exp| close_to(exp, expected_expiry))
                    && !account.password_hash.is_empty()
                    && account.password_hash != "alice123"
                    && settings.account_id == account.id
                    && !settings.is_private_account
                    && stats.account_id == account.id
                    && stats.followers_count == 0
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        notifier
            .expect_send_verification()
            .withf(|email, name, token| {
                email == "alice@example.com" && name == "Alice Lidell" && token.len() == 48
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = service(accounts, refresh_tokens, notifier);
        let view = service
            .register(register_command())
            .await
            .expect("Registration failed");

        assert_eq!(view.email, "alice@example.com");
        assert_eq!(view.username.as_deref(), Some("alice"));
        assert!(!view.email_verified);
        assert!(view.is_active);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let mut accounts = MockTestAccountStore::new();

        accounts
            .expect_exists_by_email()
            .times(1)
            .returning(|_| Ok(true));
        accounts.expect_create().times(0);

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service.register(register_command()).await;
        assert!(matches!(result, Err(AuthError::EmailAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let mut accounts = MockTestAccountStore::new();

        accounts
            .expect_exists_by_email()
            .times(1)
            .returning(|_| Ok(false));
        accounts
            .expect_exists_by_username()
            .times(1)
            .returning(|_| Ok(true));
        accounts.expect_create().times(0);

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service.register(register_command()).await;
        assert!(matches!(result, Err(AuthError::UsernameAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_register_password_mismatch() {
        let service = service(
            MockTestAccountStore::new(),
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let mut command = register_command();
        command.confirm_password = "something-else".to_string();

        let result = service.register(command).await;
        assert!(matches!(result, Err(AuthError::PasswordMismatch)));
    }

    #[tokio::test]
    async fn test_register_survives_email_failure() {
        let mut accounts = MockTestAccountStore::new();
        let mut notifier = MockTestNotifier::new();

        accounts
            .expect_exists_by_email()
            .times(1)
            .returning(|_| Ok(false));
        accounts
            .expect_exists_by_username()
            .times(1)
            .returning(|_| Ok(false));
        accounts
            .expect_create()
            .times(1)
            .returning(|_, _, _| Ok(()));

        notifier
            .expect_send_verification()
            .times(1)
            .returning(|_, _, _| Err(NotifierError::SendFailed("smtp down".to_string())));

        let service = service(accounts, MockTestRefreshTokenStore::new(), notifier);

        // Send failure is logged, not surfaced.
        let result = service.register(register_command()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_login_success() {
        let mut accounts = MockTestAccountStore::new();
        let mut refresh_tokens = MockTestRefreshTokenStore::new();

        let account = sample_account(hash_of("alice123"));
        let account_id = account.id;

        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .withf(|email| email == "alice@example.com")
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        accounts
            .expect_update()
            .withf(|account| {
                account.failed_login_attempts == 0
                    && !account.is_locked
                    && account.last_login_at.is_some()
            })
            .times(1)
            .returning(|_| Ok(()));

        refresh_tokens
            .expect_create()
            .withf(move |token| {
                token.account_id == account_id
                    && token.revoked_at.is_none()
                    && (token.expires_at - token.issued_at) == Duration::days(7)
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(accounts, refresh_tokens, MockTestNotifier::new());

        let response = service
            .login(LoginCommand {
                email: "Alice@Example.com".to_string(),
                password: "alice123".to_string(),
            })
            .await
            .expect("Login failed");

        assert!(!response.access_token.is_empty());
        assert!(!response.refresh_token.is_empty());
        assert!(close_to(response.expires_at, Utc::now() + Duration::minutes(60)));
        assert_eq!(response.account.id, account_id);
    }

    #[tokio::test]
    async fn test_login_unknown_email_is_generic() {
        let mut accounts = MockTestAccountStore::new();

        accounts
            .expect_find_by_email()
            .times(1)
            .returning(|_| Ok(None));

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service
            .login(LoginCommand {
                email: "nobody@example.com".to_string(),
                password: "whatever".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_wrong_password_increments_counter() {
        let mut accounts = MockTestAccountStore::new();

        let account = sample_account(hash_of("alice123"));
        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        accounts
            .expect_update()
            .withf(|account| account.failed_login_attempts == 1 && !account.is_locked)
            .times(1)
            .returning(|_| Ok(()));

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service
            .login(LoginCommand {
                email: "alice@example.com".to_string(),
                password: "wrong".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_fifth_failure_locks_for_fifteen_minutes() {
        let mut accounts = MockTestAccountStore::new();

        let mut account = sample_account(hash_of("alice123"));
        account.failed_login_attempts = 4;

        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        let expected_end = Utc::now() + Duration::minutes(15);
        accounts
            .expect_update()
            .withf(move |account| {
                account.failed_login_attempts == 5
                    && account.is_locked
                    && account
                        .lockout_end
                        .map_or(false, |end| close_to(end, expected_end))
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        // The lockout transition is still reported as a generic failure.
        let result = service
            .login(LoginCommand {
                email: "alice@example.com".to_string(),
                password: "wrong".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_correct_password_during_lockout_is_forbidden() {
        let mut accounts = MockTestAccountStore::new();

        let mut account = sample_account(hash_of("alice123"));
        account.failed_login_attempts = 5;
        account.is_locked = true;
        let lockout_end = Utc::now() + Duration::minutes(10);
        account.lockout_end = Some(lockout_end);

        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));
        // No counter mutation on the correct-password path.
        accounts.expect_update().times(0);

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service
            .login(LoginCommand {
                email: "alice@example.com".to_string(),
                password: "alice123".to_string(),
            })
            .await;

        match result {
            Err(AuthError::AccountLocked { until }) => assert_eq!(until, lockout_end),
            other => panic!("Expected AccountLocked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_wrong_password_during_lockout_still_increments() {
        let mut accounts = MockTestAccountStore::new();

        let mut account = sample_account(hash_of("alice123"));
        account.failed_login_attempts = 5;
        account.is_locked = true;
        account.lockout_end = Some(Utc::now() + Duration::minutes(10));

        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        accounts
            .expect_update()
            .withf(|account| account.failed_login_attempts == 6 && account.is_locked)
            .times(1)
            .returning(|_| Ok(()));

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service
            .login(LoginCommand {
                email: "alice@example.com".to_string(),
                password: "wrong".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_after_lockout_window_succeeds() {
        let mut accounts = MockTestAccountStore::new();
        let mut refresh_tokens = MockTestRefreshTokenStore::new();

        let mut account = sample_account(hash_of("alice123"));
        account.failed_login_attempts = 5;
        account.is_locked = true;
        account.lockout_end = Some(Utc::now() - Duration::seconds(1));

        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        accounts
            .expect_update()
            .withf(|account| {
                account.failed_login_attempts == 0
                    && !account.is_locked
                    && account.lockout_end.is_none()
            })
            .times(1)
            .returning(|_| Ok(()));

        refresh_tokens.expect_create().times(1).returning(|_| Ok(()));

        let service = service(accounts, refresh_tokens, MockTestNotifier::new());

        let result = service
            .login(LoginCommand {
                email: "alice@example.com".to_string(),
                password: "alice123".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_login_deactivated_account_is_forbidden() {
        let mut accounts = MockTestAccountStore::new();

        let mut account = sample_account(hash_of("alice123"));
        account.is_active = false;

        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service
            .login(LoginCommand {
                email: "alice@example.com".to_string(),
                password: "alice123".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::AccountDeactivated)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let mut accounts = MockTestAccountStore::new();
        let mut refresh_tokens = MockTestRefreshTokenStore::new();

        let account = sample_account(hash_of("alice123"));
        let account_id = account.id;
        let presented = active_refresh_token(account_id, "old-token");

        let returned_token = presented.clone();
        refresh_tokens
            .expect_find_by_token()
            .withf(|token| token == "old-token")
            .times(1)
            .returning(move |_| Ok(Some(returned_token.clone())));

        let returned_account = account.clone();
        accounts
            .expect_find_by_id()
            .withf(move |id| *id == account_id)
            .times(1)
            .returning(move |_| Ok(Some(returned_account.clone())));

        refresh_tokens
            .expect_revoke()
            .withf(|token, reason, replaced_by| {
                token == "old-token"
                    && reason == "Replaced by new token"
                    && replaced_by.is_some()
            })
            .times(1)
            .returning(|_, _, _| Ok(true));

        refresh_tokens
            .expect_create()
            .withf(move |token| {
                token.account_id == account_id
                    && token.token != "old-token"
                    && (token.expires_at - token.issued_at) == Duration::days(7)
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(accounts, refresh_tokens, MockTestNotifier::new());

        let response = service
            .refresh_token("old-token")
            .await
            .expect("Refresh failed");

        assert_ne!(response.refresh_token, "old-token");
        assert!(!response.access_token.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_with_revoked_token_cascades() {
        let mut refresh_tokens = MockTestRefreshTokenStore::new();

        let account_id = AccountId::new();
        let mut dead = active_refresh_token(account_id, "stolen-token");
        dead.revoked_at = Some(Utc::now() - Duration::minutes(5));
        dead.revoked_reason = Some("Replaced by new token".to_string());

        let returned = dead.clone();
        refresh_tokens
            .expect_find_by_token()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        refresh_tokens
            .expect_revoke_all_for_account()
            .withf(move |id, reason| {
                *id == account_id && reason == "Attempted reuse of revoked token"
            })
            .times(1)
            .returning(|_, _| Ok(3));
        refresh_tokens.expect_create().times(0);

        let service = service(
            MockTestAccountStore::new(),
            refresh_tokens,
            MockTestNotifier::new(),
        );

        let result = service.refresh_token("stolen-token").await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_with_expired_token_cascades() {
        let mut refresh_tokens = MockTestRefreshTokenStore::new();

        let account_id = AccountId::new();
        let mut stale = active_refresh_token(account_id, "stale-token");
        stale.expires_at = Utc::now() - Duration::seconds(1);

        let returned = stale.clone();
        refresh_tokens
            .expect_find_by_token()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        refresh_tokens
            .expect_revoke_all_for_account()
            .times(1)
            .returning(|_, _| Ok(1));

        let service = service(
            MockTestAccountStore::new(),
            refresh_tokens,
            MockTestNotifier::new(),
        );

        let result = service.refresh_token("stale-token").await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_unknown_token_does_not_cascade() {
        let mut refresh_tokens = MockTestRefreshTokenStore::new();

        refresh_tokens
            .expect_find_by_token()
            .times(1)
            .returning(|_| Ok(None));
        refresh_tokens.expect_revoke_all_for_account().times(0);

        let service = service(
            MockTestAccountStore::new(),
            refresh_tokens,
            MockTestNotifier::new(),
        );

        let result = service.refresh_token("never-issued").await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_lost_rotation_race_cascades() {
        let mut accounts = MockTestAccountStore::new();
        let mut refresh_tokens = MockTestRefreshTokenStore::new();

        let account = sample_account(hash_of("alice123"));
        let account_id = account.id;
        let presented = active_refresh_token(account_id, "contended-token");

        let returned_token = presented.clone();
        refresh_tokens
            .expect_find_by_token()
            .times(1)
            .returning(move |_| Ok(Some(returned_token.clone())));

        let returned_account = account.clone();
        accounts
            .expect_find_by_id()
            .times(1)
            .returning(move |_| Ok(Some(returned_account.clone())));

        // Another caller won the conditional transition.
        refresh_tokens
            .expect_revoke()
            .times(1)
            .returning(|_, _, _| Ok(false));

        refresh_tokens
            .expect_revoke_all_for_account()
            .withf(move |id, _| *id == account_id)
            .times(1)
            .returning(|_, _| Ok(2));
        refresh_tokens.expect_create().times(0);

        let service = service(accounts, refresh_tokens, MockTestNotifier::new());

        let result = service.refresh_token("contended-token").await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let mut refresh_tokens = MockTestRefreshTokenStore::new();

        // Token already revoked (or never existed): still a no-op success.
        refresh_tokens
            .expect_revoke()
            .withf(|token, reason, replaced_by| {
                token == "gone-token" && reason == "Logged out" && replaced_by.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(false));

        let service = service(
            MockTestAccountStore::new(),
            refresh_tokens,
            MockTestNotifier::new(),
        );

        assert!(service.logout("gone-token").await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_all_devices_reports_count() {
        let mut refresh_tokens = MockTestRefreshTokenStore::new();

        let account_id = AccountId::new();
        refresh_tokens
            .expect_revoke_all_for_account()
            .withf(move |id, reason| *id == account_id && reason == "Logged out from all devices")
            .times(1)
            .returning(|_, _| Ok(4));

        let service = service(
            MockTestAccountStore::new(),
            refresh_tokens,
            MockTestNotifier::new(),
        );

        let revoked = service
            .logout_all_devices(&account_id)
            .await
            .expect("Logout all failed");
        assert_eq!(revoked, 4);
    }

    #[tokio::test]
    async fn test_verify_email_success() {
        let mut accounts = MockTestAccountStore::new();
        let mut notifier = MockTestNotifier::new();

        let mut account = sample_account(hash_of("alice123"));
        account.email_verified = false;
        account.email_verification_token = Some("verify-token".to_string());
        account.email_verification_expires = Some(Utc::now() + Duration::seconds(1));

        let returned = account.clone();
        accounts
            .expect_find_by_verification_token()
            .withf(|token| token == "verify-token")
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        accounts
            .expect_update()
            .withf(|account| {
                account.email_verified
                    && account.email_verification_token.is_none()
                    && account.email_verification_expires.is_none()
            })
            .times(1)
            .returning(|_| Ok(()));

        notifier
            .expect_send_welcome()
            .withf(|email, _| email == "alice@example.com")
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service(accounts, MockTestRefreshTokenStore::new(), notifier);

        assert!(service.verify_email("verify-token").await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_email_expired_leaves_token_intact() {
        let mut accounts = MockTestAccountStore::new();

        let mut account = sample_account(hash_of("alice123"));
        account.email_verified = false;
        account.email_verification_token = Some("verify-token".to_string());
        account.email_verification_expires = Some(Utc::now() - Duration::seconds(1));

        let returned = account.clone();
        accounts
            .expect_find_by_verification_token()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));
        // Token state untouched: resend remains possible.
        accounts.expect_update().times(0);

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service.verify_email("verify-token").await;
        assert!(matches!(result, Err(AuthError::VerificationTokenExpired)));
    }

    #[tokio::test]
    async fn test_verify_email_unknown_token() {
        let mut accounts = MockTestAccountStore::new();

        accounts
            .expect_find_by_verification_token()
            .times(1)
            .returning(|_| Ok(None));

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service.verify_email("bogus").await;
        assert!(matches!(result, Err(AuthError::VerificationTokenNotFound)));
    }

    #[tokio::test]
    async fn test_resend_verification_regenerates_token() {
        let mut accounts = MockTestAccountStore::new();
        let mut notifier = MockTestNotifier::new();

        let mut account = sample_account(hash_of("alice123"));
        account.email_verified = false;
        account.email_verification_token = Some("old-verify-token".to_string());
        account.email_verification_expires = Some(Utc::now() - Duration::hours(1));

        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        let expected_expiry = Utc::now() + Duration::hours(24);
        accounts
            .expect_update()
            .withf(move |account| {
                account
                    .email_verification_token
                    .as_ref()
                    .map_or(false, |t| t.len() == 48 && t != "old-verify-token")
                    && account
                        .email_verification_expires
                        .map_or(false, |exp| close_to(exp, expected_expiry))
            })
            .times(1)
            .returning(|_| Ok(()));

        notifier
            .expect_send_verification()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = service(accounts, MockTestRefreshTokenStore::new(), notifier);

        assert!(service
            .resend_email_verification("alice@example.com")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_resend_verification_already_verified() {
        let mut accounts = MockTestAccountStore::new();

        let account = sample_account(hash_of("alice123"));
        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));
        accounts.expect_update().times(0);

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service.resend_email_verification("alice@example.com").await;
        assert!(matches!(result, Err(AuthError::AlreadyVerified)));
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email_is_silent_success() {
        let mut accounts = MockTestAccountStore::new();

        accounts
            .expect_find_by_email()
            .times(1)
            .returning(|_| Ok(None));
        accounts.expect_update().times(0);

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        // Identical outcome to the known-email case: Ok(()).
        assert!(service.forgot_password("unknown@x.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_forgot_password_known_email_sets_reset_token() {
        let mut accounts = MockTestAccountStore::new();
        let mut notifier = MockTestNotifier::new();

        let account = sample_account(hash_of("alice123"));
        let returned = account.clone();
        accounts
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        let expected_expiry = Utc::now() + Duration::hours(1);
        accounts
            .expect_update()
            .withf(move |account| {
                account
                    .password_reset_token
                    .as_ref()
                    .map_or(false, |t| t.len() == 48)
                    && account
                        .password_reset_expires
                        .map_or(false, |exp| close_to(exp, expected_expiry))
            })
            .times(1)
            .returning(|_| Ok(()));

        notifier
            .expect_send_password_reset()
            .withf(|email, _, token| email == "alice@example.com" && token.len() == 48)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = service(accounts, MockTestRefreshTokenStore::new(), notifier);

        assert!(service.forgot_password("alice@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_password_unlocks_account() {
        let mut accounts = MockTestAccountStore::new();

        let old_hash = hash_of("alice123");
        let mut account = sample_account(old_hash.clone());
        account.password_reset_token = Some("reset-token".to_string());
        account.password_reset_expires = Some(Utc::now() + Duration::minutes(30));
        account.is_locked = true;
        account.lockout_end = Some(Utc::now() + Duration::minutes(10));
        account.failed_login_attempts = 5;

        let returned = account.clone();
        accounts
            .expect_find_by_reset_token()
            .withf(|token| token == "reset-token")
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        accounts
            .expect_update()
            .withf(move |account| {
                account.password_hash != old_hash
                    && account.password_reset_token.is_none()
                    && account.password_reset_expires.is_none()
                    && !account.is_locked
                    && account.lockout_end.is_none()
                    && account.failed_login_attempts == 0
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        assert!(service
            .reset_password("reset-token", "brand-new-password")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_reset_password_expired_token() {
        let mut accounts = MockTestAccountStore::new();

        let mut account = sample_account(hash_of("alice123"));
        account.password_reset_token = Some("reset-token".to_string());
        account.password_reset_expires = Some(Utc::now() - Duration::seconds(1));

        let returned = account.clone();
        accounts
            .expect_find_by_reset_token()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));
        accounts.expect_update().times(0);

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service.reset_password("reset-token", "new-password").await;
        assert!(matches!(result, Err(AuthError::ResetTokenExpired)));
    }

    #[tokio::test]
    async fn test_reset_password_unknown_token() {
        let mut accounts = MockTestAccountStore::new();

        accounts
            .expect_find_by_reset_token()
            .times(1)
            .returning(|_| Ok(None));

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service.reset_password("bogus", "new-password").await;
        assert!(matches!(result, Err(AuthError::ResetTokenNotFound)));
    }

    #[tokio::test]
    async fn test_change_password_success() {
        let mut accounts = MockTestAccountStore::new();

        let old_hash = hash_of("alice123");
        let account = sample_account(old_hash.clone());
        let account_id = account.id;

        let returned = account.clone();
        accounts
            .expect_find_by_id()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        accounts
            .expect_update()
            .withf(move |account| account.password_hash != old_hash)
            .times(1)
            .returning(|_| Ok(()));

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        assert!(service
            .change_password(&account_id, "alice123", "totally-different")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_change_password_wrong_current() {
        let mut accounts = MockTestAccountStore::new();

        let account = sample_account(hash_of("alice123"));
        let account_id = account.id;

        let returned = account.clone();
        accounts
            .expect_find_by_id()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));
        accounts.expect_update().times(0);

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service
            .change_password(&account_id, "wrong", "totally-different")
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_change_password_rejects_noop_change() {
        let mut accounts = MockTestAccountStore::new();

        let account = sample_account(hash_of("alice123"));
        let account_id = account.id;

        let returned = account.clone();
        accounts
            .expect_find_by_id()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));
        accounts.expect_update().times(0);

        let service = service(
            accounts,
            MockTestRefreshTokenStore::new(),
            MockTestNotifier::new(),
        );

        let result = service
            .change_password(&account_id, "alice123", "alice123")
            .await;
        assert!(matches!(result, Err(AuthError::PasswordUnchanged)));
    }
}
