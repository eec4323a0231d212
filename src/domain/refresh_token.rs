use std::net::IpAddr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Persisted form of a refresh token. Records are created and deleted, never updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub subject: Uuid,
    pub token_hash: String,
    pub ip: IpAddr,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl RefreshTokenRecord {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::REFRESH_TOKEN_TTL;

    fn record(expires_at: OffsetDateTime) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: Uuid::new_v4(),
            subject: Uuid::new_v4(),
            token_hash: "hash".to_string(),
            ip: "127.0.0.1".parse().unwrap(),
            created_at: expires_at - REFRESH_TOKEN_TTL,
            expires_at,
        }
    }

    #[test]
    fn test_expiry() {
        let now = OffsetDateTime::now_utc();
        assert!(record(now - time::Duration::seconds(1)).is_expired_at(now));
        assert!(!record(now + time::Duration::seconds(1)).is_expired_at(now));
        assert!(!record(now + REFRESH_TOKEN_TTL).is_expired());
    }
}
