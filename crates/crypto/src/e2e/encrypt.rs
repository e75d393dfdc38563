//! Verschluesselung von Nachrichteninhalten
//!
//! Jede Nachricht bekommt eine frische Zufalls-Nonce. Bei 96 Bit Nonce und
//! einem Schluessel pro Unterhaltung ist eine Kollision praktisch
//! ausgeschlossen.

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce as AesNonce};
use chacha20poly1305::{ChaCha20Poly1305, Nonce as ChaChaNonce};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{CipherAlgorithm, EncryptedPayload, Nonce, SessionKey};

/// Verschluesselt mit dem Standard-Algorithmus (AES-256-GCM)
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> CryptoResult<EncryptedPayload> {
    encrypt_with(key, CipherAlgorithm::default(), plaintext)
}

/// Verschluesselt mit einem bestimmten AEAD-Algorithmus
pub fn encrypt_with(
    key: &SessionKey,
    algorithm: CipherAlgorithm,
    plaintext: &[u8],
) -> CryptoResult<EncryptedPayload> {
    let nonce = Nonce::random();
    let ciphertext = match algorithm {
        CipherAlgorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?
            .encrypt(AesNonce::from_slice(nonce.as_bytes()), plaintext),
        CipherAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?
            .encrypt(ChaChaNonce::from_slice(nonce.as_bytes()), plaintext),
    }
    .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    Ok(EncryptedPayload {
        algorithm,
        nonce,
        ciphertext,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KEY_LEN;

    #[test]
    fn ciphertext_enthaelt_auth_tag() {
        let key = SessionKey::new([1u8; KEY_LEN]);
        let payload = encrypt(&key, b"hallo").unwrap();
        assert_eq!(payload.ciphertext.len(), 5 + 16);
        assert_eq!(payload.algorithm, CipherAlgorithm::Aes256Gcm);
    }

    #[test]
    fn gleicher_klartext_verschiedene_ciphertexte() {
        let key = SessionKey::new([2u8; KEY_LEN]);
        let a = encrypt(&key, b"gleich").unwrap();
        let b = encrypt(&key, b"gleich").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }
}
