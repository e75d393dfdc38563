//! Wire-Format fuer Relay-Verbindungen
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE)                   | JSON      |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge zaehlt nur die Payload-Bytes. Frames ueber der konfigurierten
//! Maximalgroesse (Standard 1 MiB) werden beim Lesen und Schreiben abgelehnt.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frames::RelayFrame;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer `RelayFrame`s
///
/// Wird auf Relay- und Client-Seite mit `tokio_util::codec::Framed` benutzt.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Codec mit eigener maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn zu_gross(&self, laenge: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                laenge, self.max_frame_size
            ),
        )
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = RelayFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_frame_size {
            return Err(self.zu_gross(length));
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        // Unbekannte Typen und fehlende Pflichtfelder landen ebenfalls hier
        let frame = serde_json::from_slice(&payload).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Ungueltiger Frame: {}", e),
            )
        })?;

        Ok(Some(frame))
    }
}

impl Encoder<RelayFrame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: RelayFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        if json.len() > self.max_frame_size {
            return Err(self.zu_gross(json.len()));
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);
        Ok(())
    }
}
