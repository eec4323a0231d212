use crate::domain::auth::{Claims, TokenPair};
use crate::error::{AppError, Result};
use crate::services::notification::{SecurityAlert, SecurityNotifier};
use crate::services::opaque_token::OpaqueTokenGenerator;
use crate::services::signer::TokenSigner;
use crate::services::token_hasher::TokenHasher;
use crate::storage::{CredentialStore, StoreError};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    issued_total: Counter<u64>,
    rotated_total: Counter<u64>,
    rejected_total: Counter<u64>,
    ip_change_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("tokenward-server");
        Self {
            issued_total: meter
                .u64_counter("auth_tokens_issued_total")
                .with_description("Total number of token pairs issued")
                .build(),
            rotated_total: meter
                .u64_counter("auth_refresh_total")
                .with_description("Total number of successful token rotations")
                .build(),
            rejected_total: meter
                .u64_counter("auth_refresh_rejected_total")
                .with_description("Refresh attempts rejected, by reason")
                .build(),
            ip_change_total: meter
                .u64_counter("auth_refresh_ip_change_total")
                .with_description("Refresh tokens presented from a different IP than they were issued to")
                .build(),
        }
    }

    fn rejected(&self, reason: &'static str) {
        self.rejected_total.add(1, &[KeyValue::new("reason", reason)]);
    }
}

/// Issues token pairs and rotates refresh tokens.
///
/// A refresh token moves from active to consumed (rotation), expired (time) or deleted
/// (revoke-all); it never comes back. Rotation deletes the old record before the
/// replacement is issued, and the delete only succeeds for one caller, so a value can be
/// exchanged at most once even when presented concurrently.
#[derive(Clone, Debug)]
pub struct RotationCoordinator {
    signer: Arc<TokenSigner>,
    generator: OpaqueTokenGenerator,
    hasher: TokenHasher,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn SecurityNotifier>,
    metrics: Metrics,
}

impl RotationCoordinator {
    pub fn new(
        signer: Arc<TokenSigner>,
        hasher: TokenHasher,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn SecurityNotifier>,
    ) -> Self {
        Self { signer, generator: OpaqueTokenGenerator, hasher, store, notifier, metrics: Metrics::new() }
    }

    /// Issues a fresh access/refresh pair for `subject` bound to `ip`.
    ///
    /// # Errors
    /// Returns `AppError::Issuance` wrapping the signing, entropy, hashing or storage failure.
    /// Nothing is persisted unless the whole pair was produced.
    #[tracing::instrument(skip(self, subject), fields(user_id = %subject), err(level = "warn"))]
    pub async fn issue(&self, subject: Uuid, ip: IpAddr) -> Result<TokenPair> {
        let access_token = self.signer.issue(subject, ip).map_err(AppError::issuance)?;
        let refresh_token = self.generator.generate().map_err(AppError::issuance)?;
        let token_hash = self.hasher.hash(&refresh_token).await.map_err(AppError::issuance)?;

        let record_id = self
            .store
            .save(subject, &token_hash, ip)
            .await
            .map_err(|e| AppError::issuance(AppError::Store(e)))?;

        tracing::debug!(record_id = %record_id, "Refresh token persisted");
        self.metrics.issued_total.add(1, &[]);

        Ok(TokenPair { access_token, refresh_token })
    }

    /// Exchanges `presented` for a new pair issued to `client_ip`.
    ///
    /// # Errors
    /// - `AppError::EmptyToken` if `presented` is empty.
    /// - `AppError::NotFound` if no record of `subject` matches, including when a concurrent
    ///   rotation consumed it first.
    /// - `AppError::Expired` if the matching record is past its expiry; the record is removed.
    /// - `AppError::Store` if the consumed record cannot be deleted.
    /// - `AppError::Issuance` if the replacement pair cannot be produced.
    #[tracing::instrument(
        skip(self, subject, presented),
        fields(user_id = %subject, record_id = tracing::field::Empty),
        err(level = "warn")
    )]
    pub async fn rotate(&self, subject: Uuid, presented: &str, client_ip: IpAddr) -> Result<TokenPair> {
        if presented.is_empty() {
            self.metrics.rejected("empty");
            return Err(AppError::EmptyToken);
        }

        let candidates = self.store.list_by_subject(subject).await?;
        let Some(record) = self.hasher.find_match(presented, candidates).await? else {
            self.metrics.rejected("not_found");
            return Err(AppError::NotFound);
        };
        tracing::Span::current().record("record_id", tracing::field::display(record.id));

        if record.ip != client_ip {
            self.report_ip_change(subject, record.ip, client_ip).await;
        }

        if record.is_expired_at(OffsetDateTime::now_utc()) {
            if let Err(e) = self.store.delete_by_id(record.id).await {
                tracing::warn!(error = %e, "Failed to delete expired refresh token");
            }
            self.metrics.rejected("expired");
            return Err(AppError::Expired);
        }

        match self.store.delete_by_id(record.id).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => {
                tracing::warn!("Refresh token was consumed concurrently");
                self.metrics.rejected("consumed");
                return Err(AppError::NotFound);
            }
            Err(e) => return Err(AppError::Store(e)),
        }

        // From here on the old value is gone. If issuance fails the client has to start over.
        let pair = self.issue(subject, client_ip).await?;

        tracing::info!("Tokens rotated successfully");
        self.metrics.rotated_total.add(1, &[]);
        Ok(pair)
    }

    /// Deletes every refresh token of `subject`. Succeeds when there is nothing to delete.
    ///
    /// # Errors
    /// Returns `AppError::Store` if the store fails.
    #[tracing::instrument(skip(self, subject), fields(user_id = %subject), err)]
    pub async fn revoke_all(&self, subject: Uuid) -> Result<u64> {
        let revoked = self.store.delete_all_by_subject(subject).await?;
        tracing::info!(revoked, "Revoked refresh tokens");
        Ok(revoked)
    }

    /// # Errors
    /// Returns `AppError::InvalidToken` if the access token does not verify.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        self.signer.verify(token)
    }

    async fn report_ip_change(&self, subject: Uuid, previous_ip: IpAddr, current_ip: IpAddr) {
        tracing::warn!(previous_ip = %previous_ip, current_ip = %current_ip, "Refresh token presented from a new IP");
        self.metrics.ip_change_total.add(1, &[]);

        let alert = SecurityAlert::IpChanged { subject, previous_ip, current_ip };
        if let Err(e) = self.notifier.alert(alert).await {
            tracing::error!(error = %e, "Failed to send security alert");
        }
    }
}
