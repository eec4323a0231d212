use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifetime of a signed access token.
pub const ACCESS_TOKEN_TTL: time::Duration = time::Duration::minutes(15);

/// Absolute lifetime of a refresh token, counted from persistence.
pub const REFRESH_TOKEN_TTL: time::Duration = time::Duration::days(7);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub ip: IpAddr,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    #[must_use]
    pub fn new(subject: Uuid, ip: IpAddr, issued_at: OffsetDateTime) -> Self {
        Self {
            sub: subject,
            ip,
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + ACCESS_TOKEN_TTL).unix_timestamp(),
        }
    }
}

/// A compact signed access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

impl AccessToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An opaque refresh token as handed to the client. Only its hash is ever stored.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshTokenValue(String);

impl RefreshTokenValue {
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for RefreshTokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshTokenValue([REDACTED])")
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshTokenValue,
}
