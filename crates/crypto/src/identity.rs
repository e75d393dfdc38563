//! Langzeit-Identitaetsschluessel (X25519)
//!
//! Jeder Client besitzt ein statisches X25519-Schluessel-Paar. Der
//! oeffentliche Teil wird per `profile_update` verteilt, der private
//! verlaesst das Geraet nie.

use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{PublicKey, SecretBytes, KEY_LEN};

/// Statisches Schluessel-Paar eines Benutzers
#[derive(Clone)]
pub struct IdentityKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl IdentityKeyPair {
    /// Generiert ein neues Schluessel-Paar aus dem OS-CSPRNG
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Stellt ein Schluessel-Paar aus dem privaten Schluessel wieder her
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Privater Schluessel fuer die Persistenz
    pub fn secret_bytes(&self) -> SecretBytes {
        SecretBytes::new(self.secret.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public.to_bytes())
    }

    /// X25519 Diffie-Hellman mit einem fremden oeffentlichen Schluessel
    ///
    /// Lehnt Schluessel kleiner Ordnung ab (nicht-kontributives Ergebnis).
    pub(crate) fn diffie_hellman(&self, remote: &PublicKey) -> CryptoResult<SecretBytes> {
        let shared = self
            .secret
            .diffie_hellman(&X25519PublicKey::from(*remote.as_bytes()));
        if !shared.was_contributory() {
            return Err(CryptoError::KeyExchange(
                "Oeffentlicher Schluessel kleiner Ordnung".to_string(),
            ));
        }
        Ok(SecretBytes::new(shared.to_bytes()))
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IdentityKeyPair {{ public_key: {} }}",
            self.public_key().to_base64()
        )
    }
}
