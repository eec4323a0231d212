use super::{NotifyError, SecurityAlert, SecurityNotifier};
use crate::config::AlertConfig;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use opentelemetry::{global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Clone, Debug)]
struct Metrics {
    delivered_total: Counter<u64>,
    failed_total: Counter<u64>,
    dropped_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("tokenward-server");
        Self {
            delivered_total: meter
                .u64_counter("security_alerts_delivered_total")
                .with_description("Total number of security alerts delivered")
                .build(),
            failed_total: meter
                .u64_counter("security_alerts_failed_total")
                .with_description("Security alerts given up on after exhausting retries")
                .build(),
            dropped_total: meter
                .u64_counter("security_alerts_dropped_total")
                .with_description("Security alerts dropped because the delivery queue was full")
                .build(),
        }
    }
}

/// Front of the alert pipeline: accepts alerts without waiting and hands them to an
/// [`AlertDeliveryWorker`] through a bounded channel. When the channel is full the alert
/// is dropped.
#[derive(Clone, Debug)]
pub struct QueuedNotifier {
    tx: mpsc::Sender<SecurityAlert>,
    metrics: Metrics,
}

impl QueuedNotifier {
    /// Creates the queue and the worker that drains it into `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn SecurityNotifier>, config: &AlertConfig) -> (Self, AlertDeliveryWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let metrics = Metrics::new();

        let retry = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(config.min_backoff_ms))
            .with_max_delay(Duration::from_millis(config.max_backoff_ms))
            .with_max_times(config.max_retries);

        let worker = AlertDeliveryWorker { rx, provider, retry, metrics: metrics.clone() };
        (Self { tx, metrics }, worker)
    }
}

#[async_trait]
impl SecurityNotifier for QueuedNotifier {
    async fn alert(&self, alert: SecurityAlert) -> Result<(), NotifyError> {
        match self.tx.try_send(alert) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.dropped_total.add(1, &[]);
                Err(NotifyError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(NotifyError::QueueClosed),
        }
    }
}

#[derive(Debug)]
pub struct AlertDeliveryWorker {
    rx: mpsc::Receiver<SecurityAlert>,
    provider: Arc<dyn SecurityNotifier>,
    retry: ExponentialBuilder,
    metrics: Metrics,
}

impl AlertDeliveryWorker {
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            tokio::select! {
                msg = self.rx.recv() => {
                    let Some(alert) = msg else { break };
                    self.deliver(alert).await;
                }
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }

        // Flush whatever was accepted before shutdown.
        self.rx.close();
        while let Ok(alert) = self.rx.try_recv() {
            self.deliver(alert).await;
        }
        tracing::info!("Alert delivery worker shutting down...");
    }

    #[tracing::instrument(skip(self, alert), fields(user_id = %alert.subject()))]
    async fn deliver(&self, alert: SecurityAlert) {
        let provider = Arc::clone(&self.provider);
        let result = (|| {
            let provider = Arc::clone(&provider);
            let alert = alert.clone();
            async move { provider.alert(alert).await }
        })
        .retry(&self.retry)
        .notify(|e: &NotifyError, delay: Duration| {
            tracing::warn!(error = %e, retry_in_ms = delay.as_millis(), "Security alert delivery failed, retrying...");
        })
        .await;

        match result {
            Ok(()) => self.metrics.delivered_total.add(1, &[]),
            Err(e) => {
                self.metrics.failed_total.add(1, &[]);
                tracing::error!(error = %e, "Giving up on security alert delivery");
            }
        }
    }
}
