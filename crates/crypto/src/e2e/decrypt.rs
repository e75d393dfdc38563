//! Entschluesselung von Nachrichteninhalten
//!
//! Schlaegt geschlossen fehl: falscher Schluessel, manipulierte Nonce oder
//! manipulierter Ciphertext liefern alle `CryptoError::Entschluesselung`
//! und niemals Teil-Klartext.

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce as AesNonce};
use chacha20poly1305::{ChaCha20Poly1305, Nonce as ChaChaNonce};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{CipherAlgorithm, EncryptedPayload, SessionKey};

/// Entschluesselt einen Payload mit dem Sitzungsschluessel
pub fn decrypt(key: &SessionKey, payload: &EncryptedPayload) -> CryptoResult<Vec<u8>> {
    let nonce = payload.nonce.as_bytes();
    let ciphertext = payload.ciphertext.as_slice();
    match payload.algorithm {
        CipherAlgorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::Entschluesselung)?
            .decrypt(AesNonce::from_slice(nonce), ciphertext),
        CipherAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::Entschluesselung)?
            .decrypt(ChaChaNonce::from_slice(nonce), ciphertext),
    }
    .map_err(|_| CryptoError::Entschluesselung)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e2e::encrypt::{encrypt, encrypt_with};
    use crate::types::{Nonce, KEY_LEN};

    fn key(b: u8) -> SessionKey {
        SessionKey::new([b; KEY_LEN])
    }

    #[test]
    fn aes_round_trip() {
        let k = key(3);
        let payload = encrypt(&k, "Grüße an Bob".as_bytes()).unwrap();
        assert_eq!(decrypt(&k, &payload).unwrap(), "Grüße an Bob".as_bytes());
    }

    #[test]
    fn chacha_round_trip() {
        let k = key(4);
        let payload = encrypt_with(&k, CipherAlgorithm::ChaCha20Poly1305, b"xyz").unwrap();
        assert_eq!(payload.algorithm, CipherAlgorithm::ChaCha20Poly1305);
        assert_eq!(decrypt(&k, &payload).unwrap(), b"xyz");
    }

    #[test]
    fn leerer_klartext() {
        let k = key(5);
        let payload = encrypt(&k, b"").unwrap();
        assert!(decrypt(&k, &payload).unwrap().is_empty());
    }

    #[test]
    fn falscher_schluessel_schlaegt_fehl() {
        let payload = encrypt(&key(6), b"geheim").unwrap();
        assert!(matches!(
            decrypt(&key(7), &payload),
            Err(CryptoError::Entschluesselung)
        ));
    }

    #[test]
    fn manipulierter_ciphertext_schlaegt_fehl() {
        let k = key(8);
        let mut payload = encrypt(&k, b"geheim").unwrap();
        payload.ciphertext[0] ^= 0x01;
        assert!(decrypt(&k, &payload).is_err());
    }

    #[test]
    fn manipulierte_nonce_schlaegt_fehl() {
        let k = key(9);
        let mut payload = encrypt(&k, b"geheim").unwrap();
        let mut n = *payload.nonce.as_bytes();
        n[11] ^= 0xFF;
        payload.nonce = Nonce(n);
        assert!(decrypt(&k, &payload).is_err());
    }

    #[test]
    fn falscher_algorithmus_schlaegt_fehl() {
        let k = key(10);
        let mut payload = encrypt(&k, b"geheim").unwrap();
        payload.algorithm = CipherAlgorithm::ChaCha20Poly1305;
        assert!(decrypt(&k, &payload).is_err());
    }
}
