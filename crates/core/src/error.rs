//! Fehlertypen fuer pulse-core

use thiserror::Error;

/// Result-Alias fuer pulse-core
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Fehler bei der Validierung gemeinsamer Typen
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Ungueltige Benutzer-ID: {0}")]
    UngueltigeUserId(String),
}
