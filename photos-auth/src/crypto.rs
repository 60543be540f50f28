use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;

use crate::types::SessionId;

const NONCE_LEN: usize = 12;

/// Generates a new session id with 256 bits of entropy.
///
/// The id is the base64url encoding (no padding) of 32 cryptographically secure random bytes, so
/// it is safe to place directly in a cookie value.
///
/// # Examples
///
/// ```
/// use photos_auth::crypto::generate_session_id;
///
/// let id = generate_session_id();
/// assert_eq!(id.expose().len(), 43);
/// ```
pub fn generate_session_id() -> SessionId {
    let mut bytes = [0u8; 32];
    rng().fill(&mut bytes);

    SessionId::from_raw(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Symmetric protection for serialized tickets at rest.
///
/// Uses AES-256-GCM with a random 96-bit nonce per call. The output is `nonce || ciphertext`; any
/// tampering with either part makes [`TicketProtector::unprotect`] fail.
#[derive(Clone)]
pub struct TicketProtector {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TicketProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketProtector").finish_non_exhaustive()
    }
}

impl TicketProtector {
    /// Build a protector from a base64 (standard alphabet) encoded 32 byte key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not valid base64 or does not decode to exactly 32 bytes.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, anyhow::Error> {
        let key_bytes = general_purpose::STANDARD
            .decode(key_b64.trim())
            .map_err(|e| anyhow::anyhow!("Failed to decode ticket protection key: {}", e))?;

        if key_bytes.len() != 32 {
            return Err(anyhow::anyhow!(
                "Ticket protection key must be 32 bytes (256 bits), got {} bytes",
                key_bytes.len()
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes).map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;

        Ok(Self { cipher })
    }

    pub fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        let mut result = nonce_bytes.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    pub fn unprotect(&self, protected: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
        if protected.len() < NONCE_LEN {
            return Err(anyhow::anyhow!("Protected data too short"));
        }

        let (nonce_bytes, ciphertext) = protected.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow::anyhow!("Decryption failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_key() -> String {
        general_purpose::STANDARD.encode([7u8; 32])
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert_eq!(id.expose().len(), 43);
        assert!(
            id.expose()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_session_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_session_id().expose().to_string()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_protect_roundtrip() {
        let protector = TicketProtector::from_base64_key(&test_key()).unwrap();
        let protected = protector.protect(b"ticket bytes").unwrap();
        assert_ne!(&protected[NONCE_LEN..], b"ticket bytes");
        assert_eq!(protector.unprotect(&protected).unwrap(), b"ticket bytes");
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let protector = TicketProtector::from_base64_key(&test_key()).unwrap();
        let mut protected = protector.protect(b"ticket bytes").unwrap();
        let last = protected.len() - 1;
        protected[last] ^= 0x01;
        assert!(protector.unprotect(&protected).is_err());
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let protector = TicketProtector::from_base64_key(&test_key()).unwrap();
        let other = TicketProtector::from_base64_key(&general_purpose::STANDARD.encode([9u8; 32])).unwrap();
        let protected = protector.protect(b"ticket bytes").unwrap();
        assert!(other.unprotect(&protected).is_err());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(TicketProtector::from_base64_key("not base64!!").is_err());
        assert!(TicketProtector::from_base64_key(&general_purpose::STANDARD.encode([1u8; 16])).is_err());
        assert!(TicketProtector::from_base64_key("").is_err());
    }
}
