use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A file that could not be opened, seeked, or read while fingerprinting.
///
/// Callers treat this as "skip this file": the path is reported on the
/// event channel and the session continues.
#[derive(Debug, Error)]
#[error("cannot fingerprint {path}: {source}")]
pub struct FingerprintError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Why fetching a download candidate failed.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("empty response body")]
    EmptyBody,
    #[error("request failed: {0}")]
    Request(String),
}

impl TransferError {
    /// Integrity failures mean bytes arrived but do not add up; everything
    /// else failed in transit.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            TransferError::SizeMismatch { .. } | TransferError::EmptyBody
        )
    }
}
