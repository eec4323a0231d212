use crate::domain::auth::REFRESH_TOKEN_TTL;
use crate::domain::refresh_token::RefreshTokenRecord;
use crate::storage::records::RefreshTokenRow;
use crate::storage::{CredentialStore, DbPool, StoreError};
use async_trait::async_trait;
use std::net::IpAddr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RefreshTokenRepository {
    pool: DbPool,
}

impl RefreshTokenRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for RefreshTokenRepository {
    /// Note: We store the HASH, not the raw token.
    #[tracing::instrument(level = "debug", skip(self, subject, token_hash), fields(user_id = %subject), err)]
    async fn save(&self, subject: Uuid, token_hash: &str, ip: IpAddr) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();
        let expires_at = created_at + REFRESH_TOKEN_TTL;

        sqlx::query(
            r"
            INSERT INTO refresh_tokens (id, user_id, token_hash, ip, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(id)
        .bind(subject)
        .bind(token_hash)
        .bind(ip.to_string())
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    #[tracing::instrument(level = "debug", skip(self, subject), fields(user_id = %subject), err)]
    async fn list_by_subject(&self, subject: Uuid) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let rows: Vec<RefreshTokenRow> = sqlx::query_as(
            r"
            SELECT id, user_id, token_hash, ip, created_at, expires_at
            FROM refresh_tokens
            WHERE user_id = $1
            ",
        )
        .bind(subject)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RefreshTokenRecord::try_from).collect()
    }

    /// Deletes a single record. Only the caller whose statement actually removed the row
    /// sees `Ok`; everyone racing on the same id gets `NotFound`.
    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = $1").bind(id).execute(&self.pool).await?;

        if result.rows_affected() == 1 { Ok(()) } else { Err(StoreError::NotFound) }
    }

    #[tracing::instrument(level = "debug", skip(self, subject), fields(user_id = %subject), err)]
    async fn delete_all_by_subject(&self, subject: Uuid) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1").bind(subject).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()").execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
