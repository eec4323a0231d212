#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod workers;

use crate::api::AppState;
use crate::api::client_ip::ClientIpExtractor;
use crate::config::Config;
use crate::services::notification::{AlertDeliveryWorker, LogNotifier, QueuedNotifier, SecurityNotifier};
use crate::services::rotation_service::RotationCoordinator;
use crate::services::signer::TokenSigner;
use crate::services::token_hasher::TokenHasher;
use crate::storage::{CredentialStore, DbPool};
use crate::workers::RefreshTokenCleanupWorker;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Background tasks owned by the application.
#[derive(Debug)]
pub struct Workers {
    pub refresh_token_cleanup: RefreshTokenCleanupWorker,
    pub alert_delivery: AlertDeliveryWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(
                self.refresh_token_cleanup
                    .run(shutdown_rx.clone())
                    .instrument(tracing::info_span!("refresh_token_cleanup_worker")),
            ),
            tokio::spawn(self.alert_delivery.run(shutdown_rx).instrument(tracing::info_span!("alert_delivery_worker"))),
        ]
    }
}

#[derive(Debug)]
pub struct App {
    pub router: axum::Router,
    pub coordinator: RotationCoordinator,
    pub workers: Workers,
}

/// Wires configuration, the credential store and the alert provider into a runnable app.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn CredentialStore>>,
    alert_provider: Option<Arc<dyn SecurityNotifier>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None, alert_provider: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets where security alerts are finally delivered. Defaults to [`LogNotifier`].
    #[must_use]
    pub fn with_alert_provider(mut self, provider: Arc<dyn SecurityNotifier>) -> Self {
        self.alert_provider = Some(provider);
        self
    }

    /// # Errors
    /// Returns an error if no store was supplied or the configuration is invalid.
    pub fn build(self) -> anyhow::Result<App> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("a credential store is required"))?;
        let provider = self.alert_provider.unwrap_or_else(|| Arc::new(LogNotifier));

        let signer = Arc::new(TokenSigner::new(self.config.auth.jwt_secret.as_bytes()));
        let hasher = TokenHasher::new(self.config.auth.hash_params()?);
        let (notifier, alert_delivery) = QueuedNotifier::new(provider, &self.config.alerts);

        let coordinator = RotationCoordinator::new(signer, hasher, Arc::clone(&store), Arc::new(notifier));

        let state = AppState {
            coordinator: coordinator.clone(),
            client_ip: ClientIpExtractor::new(self.config.server.trusted_proxies.clone()),
        };
        let router = api::app_router(&self.config, state)?;

        let workers = Workers {
            refresh_token_cleanup: RefreshTokenCleanupWorker::new(store, self.config.cleanup.interval_secs),
            alert_delivery,
        };

        Ok(App { router, coordinator, workers })
    }
}

/// Applies the embedded database migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining...");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach the configured log sink.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "Panic occurred");
    }));
}
