use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Keyed digest used to sign session cookies and verify admission tokens.
pub trait CryptoProvider {
    /// Lowercase hex HMAC-SHA256 of `plaintext` under `secret_key`.
    fn hmac_sha256_hex(&self, secret_key: &str, plaintext: &str) -> Result<String, CryptoError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HmacSha256Provider;

impl CryptoProvider for HmacSha256Provider {
    fn hmac_sha256_hex(&self, secret_key: &str, plaintext: &str) -> Result<String, CryptoError> {
        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|error| {
            CryptoError::InvalidKey {
                message: error.to_string(),
            }
        })?;
        mac.update(plaintext.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl<T: CryptoProvider + ?Sized> CryptoProvider for &T {
    fn hmac_sha256_hex(&self, secret_key: &str, plaintext: &str) -> Result<String, CryptoError> {
        (**self).hmac_sha256_hex(secret_key, plaintext)
    }
}
