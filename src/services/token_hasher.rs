use crate::domain::auth::RefreshTokenValue;
use crate::domain::refresh_token::RefreshTokenRecord;
use crate::error::{AppError, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;

/// Salted, deliberately slow one-way hashing of refresh tokens (Argon2id).
///
/// The cost parameters are fixed for the lifetime of the hasher and embedded in every
/// hash, so records written under older parameters still verify.
#[derive(Clone, Debug)]
pub struct TokenHasher {
    params: Params,
}

impl Default for TokenHasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl TokenHasher {
    #[must_use]
    pub const fn new(params: Params) -> Self {
        Self { params }
    }

    fn argon2(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    /// # Errors
    /// Returns `AppError::Hashing` if hashing fails or the blocking task is lost.
    #[tracing::instrument(level = "debug", skip_all, err)]
    pub async fn hash(&self, value: &RefreshTokenValue) -> Result<String> {
        let value = value.clone();
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Self::argon2(params)
                .hash_password(value.expose().as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to hash refresh token");
                    AppError::Hashing
                })
        })
        .await
        .map_err(|_| AppError::Internal)?
    }

    /// Scans `records` in order and returns the first one whose hash matches `presented`.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if the blocking task is lost.
    #[tracing::instrument(level = "debug", skip_all, fields(candidates = records.len()), err)]
    pub async fn find_match(
        &self,
        presented: &str,
        records: Vec<RefreshTokenRecord>,
    ) -> Result<Option<RefreshTokenRecord>> {
        let presented = presented.to_string();
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let argon2 = Self::argon2(params);
            records.into_iter().find(|record| {
                let Ok(parsed) = PasswordHash::new(&record.token_hash) else {
                    tracing::warn!(record_id = %record.id, "Skipping refresh token record with unparsable hash");
                    return false;
                };
                argon2.verify_password(presented.as_bytes(), &parsed).is_ok()
            })
        })
        .await
        .map_err(|_| AppError::Internal)
    }
}
