use super::{NotifyError, SecurityAlert, SecurityNotifier};
use async_trait::async_trait;

/// Delivers alerts by writing them to the security log target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl SecurityNotifier for LogNotifier {
    async fn alert(&self, alert: SecurityAlert) -> Result<(), NotifyError> {
        tracing::warn!(target: "security", user_id = %alert.subject(), "{alert}");
        Ok(())
    }
}
