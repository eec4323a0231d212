use crate::domain::auth::{AccessToken, Claims};
use crate::error::{AppError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::fmt;
use std::net::IpAddr;
use time::OffsetDateTime;
use uuid::Uuid;

/// The only algorithm tokens are issued with, and the only one accepted on verification.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS512;

/// Tokens larger than this are rejected before any decoding work.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Issues and verifies HS512 access tokens bound to a subject and the issuing IP.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").field("algorithm", &SIGNING_ALGORITHM).finish_non_exhaustive()
    }
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issues a token for `subject` expiring 15 minutes from now.
    ///
    /// # Errors
    /// Returns `AppError::Signing` if the token cannot be signed.
    #[tracing::instrument(level = "debug", skip(self, subject), fields(user_id = %subject), err)]
    pub fn issue(&self, subject: Uuid, ip: IpAddr) -> Result<AccessToken> {
        self.sign(&Claims::new(subject, ip, OffsetDateTime::now_utc()))
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<AccessToken> {
        let token = encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign access token");
            AppError::Signing
        })?;

        Ok(AccessToken(token))
    }

    /// Verifies signature, algorithm and expiry, returning the embedded claims.
    ///
    /// # Errors
    /// Returns `AppError::InvalidToken` for oversized, malformed, forged, foreign-algorithm
    /// or expired tokens.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        if token.len() > MAX_TOKEN_SIZE_BYTES {
            tracing::debug!(size = token.len(), "Rejected oversized access token");
            return Err(AppError::InvalidToken);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(reason = ?e.kind(), "Access token verification failed");
            AppError::InvalidToken
        })?;

        Ok(data.claims)
    }
}
