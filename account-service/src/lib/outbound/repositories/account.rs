use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Row;

use crate::account::errors::AuthError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::AccountSettings;
use crate::account::models::AccountStats;
use crate::account::models::EmailAddress;
use crate::account::models::Gender;
use crate::account::models::Username;
use crate::account::ports::AccountStore;

/// Account columns plus the aggregated role names, shared by every finder.
const SELECT_ACCOUNT: &str = r#"
    SELECT a.id, a.email, a.username, a.password_hash, a.full_name,
           a.date_of_birth, a.gender,
           a.email_verified, a.email_verification_token, a.email_verification_expires,
           a.password_reset_token, a.password_reset_expires,
           a.failed_login_attempts, a.is_locked, a.lockout_end,
           a.is_active, a.last_login_at, a.created_at, a.deleted_at,
           COALESCE(r.roles, '{}') AS roles
    FROM accounts a
    LEFT JOIN (
        SELECT account_id, array_agg(role ORDER BY role) AS roles
        FROM account_roles
        GROUP BY account_id
    ) r ON r.account_id = a.id
"#;

pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, where_clause: &str, value: &str) -> Result<Option<Account>, AuthError> {
        let query = format!("{} WHERE a.deleted_at IS NULL AND {}", SELECT_ACCOUNT, where_clause);

        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.map(|r| account_from_row(&r)).transpose()
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, AuthError> {
        let query = format!("{} WHERE a.deleted_at IS NULL AND a.id = $1", SELECT_ACCOUNT);

        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.map(|r| account_from_row(&r)).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        // Emails are stored lowercased; callers normalize before lookup.
        self.find_one("a.email = $1", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AuthError> {
        self.find_one("LOWER(a.username) = LOWER($1)", username).await
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Account>, AuthError> {
        self.find_one("a.email_verification_token = $1", token).await
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Account>, AuthError> {
        self.find_one("a.password_reset_token = $1", token).await
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AuthError> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1 AND deleted_at IS NULL)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(db)
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, AuthError> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM accounts
                WHERE LOWER(username) = LOWER($1) AND deleted_at IS NULL
            )
            "#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(db)
    }

    async fn create(
        &self,
        account: &Account,
        settings: &AccountSettings,
        stats: &AccountStats,
    ) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, email, username, password_hash, full_name, date_of_birth, gender,
                email_verified, email_verification_token, email_verification_expires,
                password_reset_token, password_reset_expires,
                failed_login_attempts, is_locked, lockout_end,
                is_active, last_login_at, created_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(account.id.0)
        .bind(account.email.as_str())
        .bind(account.username.as_ref().map(Username::as_str))
        .bind(&account.password_hash)
        .bind(&account.full_name)
        .bind(account.date_of_birth)
        .bind(account.gender.as_str())
        .bind(account.email_verified)
        .bind(&account.email_verification_token)
        .bind(account.email_verification_expires)
        .bind(&account.password_reset_token)
        .bind(account.password_reset_expires)
        .bind(account.failed_login_attempts)
        .bind(account.is_locked)
        .bind(account.lockout_end)
        .bind(account.is_active)
        .bind(account.last_login_at)
        .bind(account.created_at)
        .bind(account.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    if db_err.constraint() == Some("accounts_username_key") {
                        return AuthError::UsernameAlreadyExists(
                            account
                                .username
                                .as_ref()
                                .map(|u| u.as_str().to_string())
                                .unwrap_or_default(),
                        );
                    }
                    if db_err.constraint() == Some("accounts_email_key") {
                        return AuthError::EmailAlreadyExists(account.email.as_str().to_string());
                    }
                }
            }
            AuthError::Database(e.to_string())
        })?;

        for role in &account.roles {
            sqlx::query("INSERT INTO account_roles (account_id, role) VALUES ($1, $2)")
                .bind(account.id.0)
                .bind(role)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
        }

        sqlx::query(
            r#"
            INSERT INTO account_settings (
                account_id, is_private_account, allow_comments, allow_mentions,
                push_notifications_enabled, email_notifications_enabled,
                notify_on_likes, notify_on_comments, notify_on_follows
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(settings.account_id.0)
        .bind(settings.is_private_account)
        .bind(settings.allow_comments)
        .bind(settings.allow_mentions)
        .bind(settings.push_notifications_enabled)
        .bind(settings.email_notifications_enabled)
        .bind(settings.notify_on_likes)
        .bind(settings.notify_on_comments)
        .bind(settings.notify_on_follows)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        sqlx::query(
            r#"
            INSERT INTO account_stats (
                account_id, followers_count, following_count,
                posts_count, likes_received, last_calculated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(stats.account_id.0)
        .bind(stats.followers_count)
        .bind(stats.following_count)
        .bind(stats.posts_count)
        .bind(stats.likes_received)
        .bind(stats.last_calculated_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;

        Ok(())
    }

    async fn update(&self, account: &Account) -> Result<(), AuthError> {
        // Roles are load-only here; granting and revoking them is a separate
        // administrative concern.
        sqlx::query(
            r#"
            UPDATE accounts
            SET email = $2,
                username = $3,
                password_hash = $4,
                full_name = $5,
                date_of_birth = $6,
                gender = $7,
                email_verified = $8,
                email_verification_token = $9,
                email_verification_expires = $10,
                password_reset_token = $11,
                password_reset_expires = $12,
                failed_login_attempts = $13,
                is_locked = $14,
                lockout_end = $15,
                is_active = $16,
                last_login_at = $17,
                deleted_at = $18
            WHERE id = $1
            "#,
        )
        .bind(account.id.0)
        .bind(account.email.as_str())
        .bind(account.username.as_ref().map(Username::as_str))
        .bind(&account.password_hash)
        .bind(&account.full_name)
        .bind(account.date_of_birth)
        .bind(account.gender.as_str())
        .bind(account.email_verified)
        .bind(&account.email_verification_token)
        .bind(account.email_verification_expires)
        .bind(&account.password_reset_token)
        .bind(account.password_reset_expires)
        .bind(account.failed_login_attempts)
        .bind(account.is_locked)
        .bind(account.lockout_end)
        .bind(account.is_active)
        .bind(account.last_login_at)
        .bind(account.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(())
    }
}

fn db(e: sqlx::Error) -> AuthError {
    AuthError::Database(e.to_string())
}

fn account_from_row(row: &PgRow) -> Result<Account, AuthError> {
    let username: Option<String> = row.try_get("username").map_err(db)?;
    let gender: String = row.try_get("gender").map_err(db)?;

    Ok(Account {
        id: AccountId(row.try_get("id").map_err(db)?),
        email: EmailAddress::new(row.try_get("email").map_err(db)?)?,
        username: username.map(Username::new).transpose()?,
        password_hash: row.try_get("password_hash").map_err(db)?,
        full_name: row.try_get("full_name").map_err(db)?,
        date_of_birth: row.try_get("date_of_birth").map_err(db)?,
        gender: Gender::parse(&gender),
        roles: row.try_get("roles").map_err(db)?,
        email_verified: row.try_get("email_verified").map_err(db)?,
        email_verification_token: row.try_get("email_verification_token").map_err(db)?,
        email_verification_expires: row.try_get("email_verification_expires").map_err(db)?,
        password_reset_token: row.try_get("password_reset_token").map_err(db)?,
        password_reset_expires: row.try_get("password_reset_expires").map_err(db)?,
        failed_login_attempts: row.try_get("failed_login_attempts").map_err(db)?,
        is_locked: row.try_get("is_locked").map_err(db)?,
        lockout_end: row.try_get("lockout_end").map_err(db)?,
        is_active: row.try_get("is_active").map_err(db)?,
        last_login_at: row.try_get("last_login_at").map_err(db)?,
        created_at: row.try_get("created_at").map_err(db)?,
        deleted_at: row.try_get("deleted_at").map_err(db)?,
    })
}
