use crate::domain::auth::RefreshTokenValue;
use crate::error::{AppError, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};

/// Number of random bytes behind every refresh token (256 bits).
pub const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Clone, Copy, Debug, Default)]
pub struct OpaqueTokenGenerator;

impl OpaqueTokenGenerator {
    /// Generates a cryptographically secure random string (32 bytes -> Base64).
    ///
    /// # Errors
    /// Returns `AppError::Entropy` if the OS random source fails.
    pub fn generate(&self) -> Result<RefreshTokenValue> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
            tracing::error!(error = %e, "OS entropy source failed");
            AppError::Entropy
        })?;
        Ok(RefreshTokenValue::new(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_token_generation() {
        let generator = OpaqueTokenGenerator;
        let token1 = generator.generate().unwrap();
        let token2 = generator.generate().unwrap();

        assert_ne!(token1, token2);
        assert_eq!(token1.expose().len(), 43); // 32 bytes Base64 no pad
    }

    #[test]
    fn test_opaque_token_is_url_safe() {
        let token = OpaqueTokenGenerator.generate().unwrap();
        assert!(token.expose().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(token.expose()).unwrap();
        assert_eq!(decoded.len(), REFRESH_TOKEN_BYTES);
    }
}
