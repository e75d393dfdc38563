//! Ableitung des Sitzungsschluessels einer Unterhaltung
//!
//! ```text
//! dh   = X25519(lokal_privat, remote_oeffentlich)
//! key  = HKDF-SHA256(ikm = dh, salt = chat_id, info = "pulse-e2e-session-v1")
//! ```
//!
//! Beide Teilnehmer berechnen denselben Schluessel, weil DH symmetrisch ist
//! und `chat_id` reihenfolgeunabhaengig ist.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::identity::IdentityKeyPair;
use crate::types::{PublicKey, SessionKey, KEY_LEN};

/// HKDF-Info fuer Sitzungsschluessel
pub const SESSION_INFO: &[u8] = b"pulse-e2e-session-v1";

/// Leitet den Sitzungsschluessel fuer `chat_id` ab
pub fn derive_session(
    local: &IdentityKeyPair,
    remote: &PublicKey,
    chat_id: &str,
) -> CryptoResult<SessionKey> {
    let dh = local.diffie_hellman(remote)?;
    let okm = hkdf_derive(dh.as_bytes(), chat_id.as_bytes(), SESSION_INFO)?;
    Ok(SessionKey::new(okm))
}

/// HKDF-SHA256 mit 32 Byte Ausgabe
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8]) -> CryptoResult<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}
