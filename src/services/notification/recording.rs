use super::{NotifyError, SecurityAlert, SecurityNotifier};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Notifier double that keeps every alert it receives.
///
/// `fail_times(n)` makes the next `n` deliveries fail after being recorded as attempts.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<SecurityAlert>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Alerts that were delivered successfully.
    #[must_use]
    pub fn alerts(&self) -> Vec<SecurityAlert> {
        self.alerts.lock().map(|alerts| alerts.clone()).unwrap_or_default()
    }

    /// Every call to `alert`, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecurityNotifier for RecordingNotifier {
    async fn alert(&self, alert: SecurityAlert) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail =
            self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if should_fail {
            return Err(NotifyError::Delivery(anyhow::anyhow!("simulated delivery failure")));
        }

        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
        Ok(())
    }
}
