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

use std::net::SocketAddr;
use std::sync::Arc;
use tokenward_server::config::Config;
use tokenward_server::services::notification::LogNotifier;
use tokenward_server::storage::{self, RefreshTokenRepository};
use tokenward_server::{AppBuilder, telemetry};
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    config.validate()?;
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    tokenward_server::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (listener, app, shutdown_tx, shutdown_rx) = async {
        let pool = storage::init_pool_with_retry(&config.database_url, &config.database).await?;
        tokenward_server::run_migrations(&pool).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokenward_server::spawn_signal_handler(shutdown_tx.clone());

        let app = AppBuilder::new(config.clone())
            .with_store(Arc::new(RefreshTokenRepository::new(pool)))
            .with_alert_provider(Arc::new(LogNotifier))
            .build()?;

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        tracing::info!(address = %addr, "listening");
        let listener = tokio::net::TcpListener::bind(addr).await?;

        Ok::<_, anyhow::Error>((listener, app, shutdown_tx, shutdown_rx))
    }
    .instrument(boot_span)
    .await?;

    let worker_tasks = app.workers.spawn_all(shutdown_rx.clone());

    let mut server_rx = shutdown_rx.clone();
    let server = axum::serve(listener, app.router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = server_rx.wait_for(|&s| s).await;
        });

    if let Err(e) = server.await {
        tracing::error!(error = %e, "Server error");
    }

    let _ = shutdown_tx.send(true);
    tokio::select! {
        () = async {
            futures::future::join_all(worker_tasks).await;
        } => {
            tracing::info!("Background tasks finished.");
        }
        () = tokio::time::sleep(std::time::Duration::from_secs(config.server.shutdown_timeout_secs)) => {
            tracing::warn!("Timeout waiting for background tasks to finish.");
        }
    }

    telemetry_guard.shutdown();
    Ok(())
}
