pub mod actions;
pub mod download;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod index;
pub mod playlist;
pub mod scanner;
pub mod utils;

use std::path::PathBuf;

pub use download::{
    Candidate, DownloadOptions, DownloadOutcome, DownloadReport, Downloader, FetchedBody, Fetcher,
    HttpFetcher,
};
pub use error::{FingerprintError, TransferError};
pub use events::EventSink;
pub use fingerprint::{fingerprint_file, Fingerprint, HashDepth};
pub use index::FingerprintIndex;
pub use scanner::Scanner;

/// An original file and a later-discovered file with the same fingerprint.
///
/// The original is whichever path entered the session index first; pairs
/// are reported in the order duplicates were discovered during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePair {
    pub original: PathBuf,
    pub duplicate: PathBuf,
}

/// Results of one duplicate scan session.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub pairs: Vec<DuplicatePair>,
    /// Files successfully fingerprinted; failed files are not counted.
    pub processed_count: usize,
}
