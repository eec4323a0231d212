use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

pub mod provider;
pub mod queue;
pub mod recording;

pub use provider::LogNotifier;
pub use queue::{AlertDeliveryWorker, QueuedNotifier};
pub use recording::RecordingNotifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityAlert {
    /// A refresh token was presented from a different address than it was issued to.
    IpChanged { subject: Uuid, previous_ip: IpAddr, current_ip: IpAddr },
}

impl SecurityAlert {
    #[must_use]
    pub const fn subject(&self) -> Uuid {
        match self {
            Self::IpChanged { subject, .. } => *subject,
        }
    }
}

impl fmt::Display for SecurityAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IpChanged { subject, previous_ip, current_ip } => write!(
                f,
                "IP address change detected for user {subject}. Previous IP: {previous_ip}, new IP: {current_ip}"
            ),
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Alert queue is full")]
    QueueFull,
    #[error("Alert queue is closed")]
    QueueClosed,
    #[error("Delivery failed: {0}")]
    Delivery(#[from] anyhow::Error),
}

/// Best-effort delivery of security alerts to the affected user.
#[async_trait]
pub trait SecurityNotifier: Send + Sync + fmt::Debug {
    /// # Errors
    /// Returns an error if the alert could not be accepted for delivery. Callers only log it.
    async fn alert(&self, alert: SecurityAlert) -> Result<(), NotifyError>;
}
