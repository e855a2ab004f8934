use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use blake3::Hasher;

use crate::error::FingerprintError;

/// Bytes hashed from each end of the file.
const CHUNK_SIZE: usize = 64 * 1024;

/// Files at or below this size get no separate tail chunk.
const TAIL_THRESHOLD: u64 = 2 * CHUNK_SIZE as u64;

/// A 256-bit content digest in lowercase hex.
///
/// Equality of two fingerprints is the duplicate criterion. The digest is
/// derived only from file size and content, never from the filename, so
/// byte-identical files fingerprint equal regardless of name or location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How much of each file the fingerprint reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashDepth {
    /// Size plus the first 64 KiB, plus the last 64 KiB for files over
    /// 128 KiB. Cheap, and can falsely match large files that differ only
    /// in the middle; that trade-off is deliberate.
    #[default]
    HeadTail,
    /// Stream the whole file. Slower, no middle blind spot.
    Full,
}

/// Fingerprint the file at `path`.
///
/// Deterministic for unmodified content: calling it twice yields the same
/// digest. Empty files and files smaller than one chunk hash cleanly; the
/// short read simply contributes fewer bytes.
pub fn fingerprint_file(path: &Path, depth: HashDepth) -> Result<Fingerprint, FingerprintError> {
    let result = match depth {
        HashDepth::HeadTail => head_tail_fingerprint(path),
        HashDepth::Full => full_fingerprint(path),
    };
    result.map_err(|source| FingerprintError {
        path: path.to_path_buf(),
        source,
    })
}

fn head_tail_fingerprint(path: &Path) -> std::io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut hasher = Hasher::new();
    hasher.update(size.to_string().as_bytes());

    let head = read_chunk(&mut file)?;
    hasher.update(&head);

    if size > TAIL_THRESHOLD {
        file.seek(SeekFrom::End(-(CHUNK_SIZE as i64)))?;
        let tail = read_chunk(&mut file)?;
        hasher.update(&tail);
    }

    Ok(Fingerprint(hasher.finalize().to_hex().to_string()))
}

/// Hash the entire file with a small streaming buffer.
fn full_fingerprint(path: &Path) -> std::io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut hasher = Hasher::new();
    hasher.update(size.to_string().as_bytes());

    let mut buffer = vec![0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint(hasher.finalize().to_hex().to_string()))
}

/// Read up to one chunk from the current position. A short read near the
/// end of a small file is not an error.
fn read_chunk(file: &mut File) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
