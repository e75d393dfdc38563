//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// Laenge eines X25519-Schluessels und eines Sitzungsschluessels
pub const KEY_LEN: usize = 32;

/// Laenge der AEAD-Nonce
pub const NONCE_LEN: usize = 12;

/// Version des Nachrichten-Umschlags
pub const ENVELOPE_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Schluessel
// ---------------------------------------------------------------------------

/// Oeffentlicher X25519-Schluessel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; KEY_LEN]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Base64-Darstellung fuer `profile_update.public_key`
    pub fn to_base64(&self) -> String {
        B64.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = B64.decode(encoded)?;
        let arr: [u8; KEY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                    erwartet: KEY_LEN,
                    erhalten: bytes.len(),
                })?;
        Ok(Self(arr))
    }
}

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct SecretBytes([u8; KEY_LEN]);

impl SecretBytes {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

/// Symmetrischer Sitzungsschluessel einer Unterhaltung (256 Bit)
pub type SessionKey = SecretBytes;

// ---------------------------------------------------------------------------
// Algorithmus und Nonce
// ---------------------------------------------------------------------------

/// AEAD-Algorithmus fuer Nachrichteninhalte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    #[default]
    #[serde(rename = "aes256gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20poly1305")]
    ChaCha20Poly1305,
}

/// AEAD-Nonce (96 Bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_LEN]);

impl Nonce {
    /// Frische Zufalls-Nonce aus dem OS-CSPRNG
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; NONCE_LEN] = bytes.try_into().map_err(|_| CryptoError::UngueltigeNonce {
            erwartet: NONCE_LEN,
            erhalten: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// EncryptedPayload / Umschlag
// ---------------------------------------------------------------------------

/// Verschluesselter Inhalt (Ciphertext inkl. 16 Byte Auth-Tag)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub algorithm: CipherAlgorithm,
    pub nonce: Nonce,
    pub ciphertext: Vec<u8>,
}

/// JSON-Form des Umschlags im `content`-Feld einer Chat-Nachricht
#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u8,
    alg: CipherAlgorithm,
    nonce: String,
    ciphertext: String,
}

impl EncryptedPayload {
    /// Serialisiert zu `{"v":1,"alg":..,"nonce":b64,"ciphertext":b64}`
    pub fn to_envelope(&self) -> String {
        let envelope = Envelope {
            v: ENVELOPE_VERSION,
            alg: self.algorithm,
            nonce: B64.encode(self.nonce.0),
            ciphertext: B64.encode(&self.ciphertext),
        };
        // Serialisierung aus String-Feldern kann nicht fehlschlagen
        serde_json::to_string(&envelope).unwrap_or_default()
    }

    /// Parst einen Umschlag; alles andere (z.B. Klartext) ist ein Fehler
    pub fn from_envelope(content: &str) -> CryptoResult<Self> {
        let envelope: Envelope = serde_json::from_str(content)
            .map_err(|e| CryptoError::UngueltigerUmschlag(e.to_string()))?;
        if envelope.v != ENVELOPE_VERSION {
            return Err(CryptoError::UngueltigerUmschlag(format!(
                "Version {} nicht unterstuetzt",
                envelope.v
            )));
        }
        let nonce = Nonce::from_slice(&B64.decode(&envelope.nonce)?)?;
        let ciphertext = B64.decode(&envelope.ciphertext)?;
        Ok(Self {
            algorithm: envelope.alg,
            nonce,
            ciphertext,
        })
    }
}
