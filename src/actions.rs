use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::DuplicatePair;

/// Write duplicate pairs as a two-column CSV with a header row.
pub fn export_pairs_csv(pairs: &[DuplicatePair], output: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(["Duplicate File 1", "Duplicate File 2"])?;
    for pair in pairs {
        writer.write_record([
            pair.original.to_string_lossy().as_ref(),
            pair.duplicate.to_string_lossy().as_ref(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Delete one file and return its size. Irreversible: this is a plain
/// filesystem remove, not a move to trash.
pub fn delete_file(path: &Path) -> Result<u64> {
    let size = fs::metadata(path)
        .with_context(|| format!("Failed to get metadata for {}", path.display()))?
        .len();
    fs::remove_file(path).with_context(|| format!("Failed to delete {}", path.display()))?;
    Ok(size)
}
