use crate::domain::refresh_token::RefreshTokenRecord;
use crate::config::DatabaseConfig;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
mod records;
pub mod refresh_token_repo;

pub use memory::InMemoryCredentialStore;
pub use refresh_token_repo::RefreshTokenRepository;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(20).connect(database_url).await
}

/// Like [`init_pool`], but keeps retrying with exponential backoff while the database is
/// still coming up.
///
/// # Errors
/// Returns the last `sqlx::Error` once `connect_attempts` are used up.
pub async fn init_pool_with_retry(database_url: &str, config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let retry_strategy = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.connect_min_backoff_ms))
        .with_max_delay(Duration::from_millis(config.connect_max_backoff_ms))
        .with_max_times(config.connect_attempts.saturating_sub(1));

    connect_with_retry(|| init_pool(database_url), &retry_strategy).await
}

async fn connect_with_retry<T, F, Fut>(connect: F, retry_strategy: &ExponentialBuilder) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    connect
        .retry(retry_strategy)
        .notify(|e: &sqlx::Error, delay: Duration| {
            tracing::warn!(error = %e, retry_in_ms = delay.as_millis(), "Database not reachable, retrying...");
        })
        .await
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Record not found")]
    NotFound,
    #[error("Stored record {0} is malformed")]
    CorruptRecord(Uuid),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence contract for hashed refresh tokens.
///
/// `delete_by_id` must be a conditional delete: it reports `StoreError::NotFound` unless
/// this call removed the row. Rotation relies on that to stay single-use under concurrency.
#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Persists a new record. The store assigns the id, the creation time and the
    /// fixed expiry window.
    async fn save(&self, subject: Uuid, token_hash: &str, ip: IpAddr) -> Result<Uuid, StoreError>;

    /// Returns every record owned by `subject`, in no particular order.
    async fn list_by_subject(&self, subject: Uuid) -> Result<Vec<RefreshTokenRecord>, StoreError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError>;

    /// Removes every record owned by `subject` and returns how many were removed.
    async fn delete_all_by_subject(&self, subject: Uuid) -> Result<u64, StoreError>;

    async fn delete_expired(&self) -> Result<u64, StoreError>;
}
