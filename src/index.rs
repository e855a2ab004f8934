use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::fingerprint::Fingerprint;

/// Session-scoped mapping from content fingerprint to the first path seen
/// with it. Built fresh for each scan or download session and discarded at
/// the end; never persisted.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    entries: HashMap<Fingerprint, PathBuf>,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the fingerprint is already present. Returns the
    /// canonical path already holding this fingerprint, if any; the first
    /// path inserted for a fingerprint always wins.
    pub fn insert_if_absent(&mut self, fingerprint: Fingerprint, path: PathBuf) -> Option<PathBuf> {
        match self.entries.entry(fingerprint) {
            Entry::Occupied(existing) => Some(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(path);
                None
            }
        }
    }

    /// Insert, keeping any existing entry for the fingerprint.
    pub fn insert(&mut self, fingerprint: Fingerprint, path: PathBuf) {
        self.entries.entry(fingerprint).or_insert(path);
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Path> {
        self.entries.get(fingerprint).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{fingerprint_file, HashDepth};
    use std::fs;
    use tempfile::tempdir;

    fn fingerprint_of(content: &[u8]) -> Fingerprint {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.mp3");
        fs::write(&path, content).unwrap();
        fingerprint_file(&path, HashDepth::HeadTail).unwrap()
    }

    #[test]
    fn first_path_wins() {
        let fp = fingerprint_of(b"content");
        let mut index = FingerprintIndex::new();

        assert!(index
            .insert_if_absent(fp.clone(), PathBuf::from("/a/first.mp3"))
            .is_none());
        let existing = index
            .insert_if_absent(fp.clone(), PathBuf::from("/b/second.mp3"))
            .unwrap();
        assert_eq!(existing, PathBuf::from("/a/first.mp3"));
        assert_eq!(index.get(&fp).unwrap(), Path::new("/a/first.mp3"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn insert_keeps_existing_entry() {
        let fp = fingerprint_of(b"content");
        let mut index = FingerprintIndex::new();
        index.insert(fp.clone(), PathBuf::from("/a/first.mp3"));
        index.insert(fp.clone(), PathBuf::from("/b/second.mp3"));
        assert_eq!(index.get(&fp).unwrap(), Path::new("/a/first.mp3"));
    }
}
