//! Keyward Error Types
//!
//! Expected conditions (no key available, missing config) are not errors and are
//! signalled with `Option`/empty registries instead. These variants cover the rest.

use thiserror::Error;

/// Main error type for keyward operations
#[derive(Debug, Error)]
pub enum KeywardError {
    /// Configuration errors (unreadable file, invalid JSON, bad duration, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The usage ledger could not be read or written
    #[error("Usage ledger I/O error: {0}. Today's usage may be under-counted after a restart")]
    LedgerIo(String),

    /// The usage ledger exists but does not parse; it is left untouched
    #[error("Usage ledger is corrupt: {0}. Fix or move the file aside to resume recording")]
    LedgerCorrupt(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for KeywardError {
    fn from(err: std::io::Error) -> Self {
        KeywardError::LedgerIo(err.to_string())
    }
}

impl From<serde_json::Error> for KeywardError {
    fn from(err: serde_json::Error) -> Self {
        KeywardError::Config(format!("JSON parsing error: {}", err))
    }
}

#[cfg(feature = "python")]
impl From<KeywardError> for pyo3::PyErr {
    fn from(err: KeywardError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};

        let msg = err.to_string();
        match &err {
            KeywardError::Config(_) => PyValueError::new_err(msg),
            KeywardError::LedgerIo(_) => PyIOError::new_err(msg),
            KeywardError::LedgerCorrupt(_) => PyRuntimeError::new_err(msg),
            KeywardError::Internal(_) => PyRuntimeError::new_err(msg),
        }
    }
}

/// Result type alias for keyward operations
pub type Result<T> = std::result::Result<T, KeywardError>;
