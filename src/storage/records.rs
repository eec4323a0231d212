use crate::domain::refresh_token::RefreshTokenRecord;
use crate::storage::StoreError;
use std::net::IpAddr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub(crate) struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    ip: String,
    created_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

impl TryFrom<RefreshTokenRow> for RefreshTokenRecord {
    type Error = StoreError;

    fn try_from(row: RefreshTokenRow) -> Result<Self, Self::Error> {
        let ip = row.ip.parse::<IpAddr>().map_err(|_| StoreError::CorruptRecord(row.id))?;
        Ok(Self {
            id: row.id,
            subject: row.user_id,
            token_hash: row.token_hash,
            ip,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ip: &str) -> RefreshTokenRow {
        let now = OffsetDateTime::now_utc();
        RefreshTokenRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "hash".to_string(),
            ip: ip.to_string(),
            created_at: now,
            expires_at: now,
        }
    }

    #[test]
    fn test_row_conversion() {
        let record = RefreshTokenRecord::try_from(row("::1")).unwrap();
        assert_eq!(record.ip, "::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_corrupt_ip_rejected() {
        let result = RefreshTokenRecord::try_from(row("not-an-ip"));
        assert!(matches!(result, Err(StoreError::CorruptRecord(_))));
    }
}
