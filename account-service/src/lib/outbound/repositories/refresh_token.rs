use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Row;

use crate::account::errors::AuthError;
use crate::account::models::AccountId;
use crate::account::models::RefreshToken;
use crate::account::ports::RefreshTokenStore;

pub struct PostgresRefreshTokenStore {
    pool: PgPool,
}

impl PostgresRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresRefreshTokenStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AuthError> {
        let row = sqlx::query(
            r#"
            SELECT token, account_id, issued_at, expires_at,
                   revoked_at, revoked_reason, replaced_by_token
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.map(|r| token_from_row(&r)).transpose()
    }

    async fn find_active_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<RefreshToken>, AuthError> {
        let rows = sqlx::query(
            r#"
            SELECT token, account_id, issued_at, expires_at,
                   revoked_at, revoked_reason, replaced_by_token
            FROM refresh_tokens
            WHERE account_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
            ORDER BY issued_at DESC
            "#,
        )
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(token_from_row).collect()
    }

    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (
                token, account_id, issued_at, expires_at,
                revoked_at, revoked_reason, replaced_by_token
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&token.token)
        .bind(token.account_id.0)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .bind(&token.revoked_reason)
        .bind(&token.replaced_by_token)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn revoke(
        &self,
        token: &str,
        reason: &str,
        replaced_by: Option<String>,
    ) -> Result<bool, AuthError> {
        // Conditional single-row transition. The revoked_at IS NULL guard
        // makes concurrent revocations of the same token resolve to exactly
        // one winner.
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW(),
                revoked_reason = $2,
                replaced_by_token = $3
            WHERE token = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token)
        .bind(reason)
        .bind(replaced_by)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_account(
        &self,
        account_id: &AccountId,
        reason: &str,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW(),
                revoked_reason = $2
            WHERE account_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(account_id.0)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(result.rows_affected())
    }
}

fn db(e: sqlx::Error) -> AuthError {
    AuthError::Database(e.to_string())
}

fn token_from_row(row: &PgRow) -> Result<RefreshToken, AuthError> {
    Ok(RefreshToken {
        token: row.try_get("token").map_err(db)?,
        account_id: AccountId(row.try_get("account_id").map_err(db)?),
        issued_at: row.try_get("issued_at").map_err(db)?,
        expires_at: row.try_get("expires_at").map_err(db)?,
        revoked_at: row.try_get("revoked_at").map_err(db)?,
        revoked_reason: row.try_get("revoked_reason").map_err(db)?,
        replaced_by_token: row.try_get("replaced_by_token").map_err(db)?,
    })
}
