//! Device credential sealing.
//!
//! Credentials are stored as AES-256-GCM ciphertext with a per-secret
//! nonce and unsealed only inside the inventory resolver, immediately
//! before a host descriptor is handed to the executor.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

use crate::error::CoreError;

/// Key length in bytes (AES-256).
const KEY_LEN: usize = 32;

/// Nonce length in bytes (96-bit GCM nonce).
pub const NONCE_LEN: usize = 12;

/// A sealed secret: ciphertext plus the nonce it was sealed under.
#[derive(Debug, Clone)]
pub struct SealedSecret {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Seals and unseals device credentials with a tenant-wide key.
///
/// The key is supplied by the deployment (environment), never persisted
/// next to the ciphertext.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    /// Build a vault from raw key bytes. The key must be exactly
    /// `KEY_LEN` bytes.
    pub fn new(key: &[u8]) -> Result<Self, CoreError> {
        if key.len() != KEY_LEN {
            return Err(CoreError::Internal(format!(
                "Credential key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| CoreError::Internal("Credential key rejected by cipher".to_string()))?;
        Ok(Self { cipher })
    }

    /// Build a vault from a hex-encoded key (64 hex characters).
    pub fn from_hex(hex: &str) -> Result<Self, CoreError> {
        let key = decode_hex(hex.trim())?;
        Self::new(&key)
    }

    /// Seal a plaintext secret under a freshly generated nonce.
    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, CoreError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CoreError::Internal("Credential sealing failed".to_string()))?;
        Ok(SealedSecret {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
        })
    }

    /// Unseal a stored secret. Fails if the nonce length is wrong, the
    /// ciphertext was tampered with, or it was sealed under another key.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<String, CoreError> {
        if nonce.len() != NONCE_LEN {
            return Err(CoreError::Internal(format!(
                "Credential nonce must be {NONCE_LEN} bytes, got {}",
                nonce.len()
            )));
        }
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::Internal("Credential unsealing failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| CoreError::Internal("Unsealed credential is not UTF-8".to_string()))
    }
}

/// Decode a hex string into bytes.
fn decode_hex(hex: &str) -> Result<Vec<u8>, CoreError> {
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        return Err(CoreError::Internal(
            "Hex key must be an even number of ASCII hex characters".to_string(),
        ));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| CoreError::Internal("Hex key contains non-hex characters".to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(&[7u8; KEY_LEN]).expect("valid key")
    }

    #[test]
    fn seal_open_roundtrip() {
        let vault = vault();
        let sealed = vault.seal("s3cret-enable").expect("seal");
        let opened = vault.open(&sealed.nonce, &sealed.ciphertext).expect("open");
        assert_eq!(opened, "s3cret-enable");
    }

    #[test]
    fn nonces_are_unique_per_seal() {
        let vault = vault();
        let a = vault.seal("x").expect("seal");
        let b = vault.seal("x").expect("seal");
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealed = vault().seal("secret").expect("seal");
        let other = CredentialVault::new(&[9u8; KEY_LEN]).expect("valid key");
        assert!(other.open(&sealed.nonce, &sealed.ciphertext).is_err());
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let vault = vault();
        let mut sealed = vault.seal("secret").expect("seal");
        sealed.ciphertext[0] ^= 0xff;
        assert!(vault.open(&sealed.nonce, &sealed.ciphertext).is_err());
    }

    #[test]
    fn short_key_rejected() {
        assert!(CredentialVault::new(&[0u8; 16]).is_err());
    }

    #[test]
    fn hex_key_accepted() {
        let hex = "00".repeat(KEY_LEN);
        assert!(CredentialVault::from_hex(&hex).is_ok());
    }

    #[test]
    fn bad_hex_rejected() {
        assert!(CredentialVault::from_hex("zz").is_err());
    }
}
