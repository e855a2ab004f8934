use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::events::EventSink;
use crate::fingerprint::{fingerprint_file, HashDepth};
use crate::index::FingerprintIndex;
use crate::utils::{is_audio_path, short_name, truncate_message};
use crate::{DuplicatePair, ScanReport};

/// Configuration for a duplicate scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanConfig {
    pub depth: HashDepth,
}

/// Walks directory trees and reports audio files whose fingerprints
/// collide. Read-only: deletion is a separate explicit action.
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    pub fn with_depth(depth: HashDepth) -> Self {
        Self {
            config: ScanConfig { depth },
        }
    }

    /// Scan every root with one shared index, so duplicates are detected
    /// both within and across roots. Pairs come out in traversal order and
    /// the first path seen for a fingerprint is always the pair's original.
    ///
    /// A file that fails fingerprinting is reported and skipped; it never
    /// aborts the scan and does not count toward `processed_count`.
    pub fn scan(&self, roots: &[PathBuf], events: &EventSink) -> ScanReport {
        let mut index = FingerprintIndex::new();
        let mut pairs = Vec::new();
        let mut processed = 0usize;

        for root in roots {
            if !root.is_dir() {
                events.emit(format!("Not a directory, skipping: {}", root.display()));
                continue;
            }
            for path in audio_files(root) {
                match fingerprint_file(&path, self.config.depth) {
                    Ok(fingerprint) => {
                        processed += 1;
                        if let Some(original) = index.insert_if_absent(fingerprint, path.clone()) {
                            events.emit(format!(
                                "Duplicate: {} matches {}",
                                path.display(),
                                original.display()
                            ));
                            pairs.push(DuplicatePair {
                                original,
                                duplicate: path,
                            });
                        }
                    }
                    Err(err) => {
                        events.emit(format!(
                            "Skipped: {} ({})",
                            short_name(&path),
                            truncate_message(&err.source.to_string(), 50)
                        ));
                    }
                }
            }
        }

        events.emit(format!(
            "Scan complete: {} files processed, {} duplicates",
            processed,
            pairs.len()
        ));
        ScanReport {
            pairs,
            processed_count: processed,
        }
    }

    /// Fingerprint every audio file under `root` into `index` without
    /// pairing. Seeds a download session from an existing library so new
    /// downloads can be checked against files that were never fetched.
    pub fn build_index(
        &self,
        root: &Path,
        index: &mut FingerprintIndex,
        events: &EventSink,
    ) -> usize {
        let mut added = 0usize;
        for path in audio_files(root) {
            match fingerprint_file(&path, self.config.depth) {
                Ok(fingerprint) => {
                    index.insert(fingerprint, path);
                    added += 1;
                }
                Err(err) => {
                    events.emit(format!(
                        "Couldn't fingerprint {}: {}",
                        short_name(&err.path),
                        truncate_message(&err.source.to_string(), 30)
                    ));
                }
            }
        }
        added
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// All audio files under `root`, in directory-traversal order.
fn audio_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_audio_path(path))
}
