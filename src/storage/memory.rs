use crate::domain::auth::REFRESH_TOKEN_TTL;
use crate::domain::refresh_token::RefreshTokenRecord;
use crate::storage::{CredentialStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use uuid::Uuid;

/// In-process credential store used by tests and local runs.
///
/// Removal goes through `DashMap::remove`, so concurrent deletes of one id have exactly
/// one winner, matching the conditional delete of the Postgres store.
#[derive(Debug)]
pub struct InMemoryCredentialStore {
    records: DashMap<Uuid, RefreshTokenRecord>,
    ttl: time::Duration,
    fail_next_save: AtomicBool,
    fail_next_delete: AtomicBool,
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(REFRESH_TOKEN_TTL)
    }

    /// Creates a store applying `ttl` instead of the standard window. A negative `ttl`
    /// yields records that are already expired when saved.
    #[must_use]
    pub fn with_ttl(ttl: time::Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
            fail_next_save: AtomicBool::new(false),
            fail_next_delete: AtomicBool::new(false),
        }
    }

    /// Makes the next `save` call fail with `StoreError::Unavailable`.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Makes the next `delete_by_id` call fail with `StoreError::Unavailable`.
    pub fn fail_next_delete(&self) {
        self.fail_next_delete.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn injected_failure(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn save(&self, subject: Uuid, token_hash: &str, ip: IpAddr) -> Result<Uuid, StoreError> {
        Self::injected_failure(&self.fail_next_save)?;

        let id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();
        self.records.insert(
            id,
            RefreshTokenRecord {
                id,
                subject,
                token_hash: token_hash.to_string(),
                ip,
                created_at,
                expires_at: created_at + self.ttl,
            },
        );
        Ok(id)
    }

    async fn list_by_subject(&self, subject: Uuid) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        Ok(self.records.iter().filter(|entry| entry.subject == subject).map(|entry| entry.value().clone()).collect())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError> {
        Self::injected_failure(&self.fail_next_delete)?;
        self.records.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn delete_all_by_subject(&self, subject: Uuid) -> Result<u64, StoreError> {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = record.subject != subject;
            removed += u64::from(!keep);
            keep
        });
        Ok(removed)
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_expired_at(now);
            removed += u64::from(!keep);
            keep
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_save_and_list_isolated_per_subject() {
        let store = InMemoryCredentialStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.save(alice, "h1", ip("10.0.0.1")).await.unwrap();
        store.save(alice, "h2", ip("10.0.0.2")).await.unwrap();
        store.save(bob, "h3", ip("10.0.0.3")).await.unwrap();

        let records = store.list_by_subject(alice).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.subject == alice));

        let record = &records[0];
        assert_eq!(record.expires_at - record.created_at, REFRESH_TOKEN_TTL);
    }

    #[tokio::test]
    async fn test_delete_by_id_is_conditional() {
        let store = InMemoryCredentialStore::new();
        let id = store.save(Uuid::new_v4(), "h", ip("10.0.0.1")).await.unwrap();

        assert!(store.delete_by_id(id).await.is_ok());
        assert!(matches!(store.delete_by_id(id).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_all_by_subject_counts() {
        let store = InMemoryCredentialStore::new();
        let subject = Uuid::new_v4();
        store.save(subject, "h1", ip("10.0.0.1")).await.unwrap();
        store.save(subject, "h2", ip("10.0.0.1")).await.unwrap();
        store.save(Uuid::new_v4(), "h3", ip("10.0.0.1")).await.unwrap();

        assert_eq!(store.delete_all_by_subject(subject).await.unwrap(), 2);
        assert_eq!(store.delete_all_by_subject(subject).await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let store = InMemoryCredentialStore::with_ttl(time::Duration::seconds(-1));
        store.save(Uuid::new_v4(), "h", ip("10.0.0.1")).await.unwrap();

        assert_eq!(store.delete_expired().await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures_are_one_shot() {
        let store = InMemoryCredentialStore::new();
        store.fail_next_save();
        assert!(matches!(store.save(Uuid::new_v4(), "h", ip("10.0.0.1")).await, Err(StoreError::Unavailable(_))));
        assert!(store.save(Uuid::new_v4(), "h", ip("10.0.0.1")).await.is_ok());
    }
}
