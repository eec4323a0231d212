use crate::error::AppError;
use crate::storage::CredentialStore;
use opentelemetry::{global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

#[derive(Debug)]
pub struct RefreshTokenCleanupWorker {
    store: Arc<dyn CredentialStore>,
    cleanup_interval_secs: u64,
    swept_total: Counter<u64>,
}

impl RefreshTokenCleanupWorker {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, cleanup_interval_secs: u64) -> Self {
        let swept_total = global::meter("tokenward-server")
            .u64_counter("refresh_tokens_expired_deleted_total")
            .with_description("Expired refresh tokens removed by the periodic sweep")
            .build();
        Self { store, cleanup_interval_secs, swept_total }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if self.cleanup_interval_secs == 0 {
            tracing::info!("Refresh token cleanup is disabled (interval = 0)");
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.cleanup_interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.perform_cleanup()
                        .instrument(tracing::info_span!("run_refresh_token_cleanup"))
                        .await
                    {
                        tracing::error!(error = %e, "Refresh token cleanup iteration failed");
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Refresh token cleanup loop shutting down...");
    }

    /// Deletes expired refresh tokens once.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    #[tracing::instrument(skip(self), err, fields(expired_deleted = tracing::field::Empty))]
    pub async fn perform_cleanup(&self) -> Result<u64, AppError> {
        tracing::debug!("Running refresh token cleanup...");

        let count = self.store.delete_expired().await?;
        if count > 0 {
            tracing::info!(count = %count, "Deleted expired refresh tokens");
            tracing::Span::current().record("expired_deleted", count);
            self.swept_total.add(count, &[]);
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryCredentialStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let expired = Arc::new(InMemoryCredentialStore::with_ttl(time::Duration::seconds(-1)));
        let ip = "10.0.0.1".parse().unwrap();
        expired.save(Uuid::new_v4(), "h1", ip).await.unwrap();
        expired.save(Uuid::new_v4(), "h2", ip).await.unwrap();

        let worker = RefreshTokenCleanupWorker::new(Arc::clone(&expired) as Arc<dyn CredentialStore>, 60);
        assert_eq!(worker.perform_cleanup().await.unwrap(), 2);
        assert_eq!(worker.perform_cleanup().await.unwrap(), 0);

        let live = Arc::new(InMemoryCredentialStore::new());
        live.save(Uuid::new_v4(), "h3", ip).await.unwrap();
        let worker = RefreshTokenCleanupWorker::new(Arc::clone(&live) as Arc<dyn CredentialStore>, 60);
        assert_eq!(worker.perform_cleanup().await.unwrap(), 0);
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_worker_returns_immediately() {
        let worker = RefreshTokenCleanupWorker::new(Arc::new(InMemoryCredentialStore::new()), 0);
        let (_tx, rx) = tokio::sync::watch::channel(false);
        tokio::time::timeout(Duration::from_secs(1), worker.run(rx)).await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let worker = RefreshTokenCleanupWorker::new(Arc::new(InMemoryCredentialStore::new()), 3600);
        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
