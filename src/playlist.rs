use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::utils::is_audio_path;

/// One playlist entry. The title falls back to the file stem when built
/// from a folder walk; tag reading lives with the metadata collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
}

/// An ordered list of audio files, saved and loaded as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub tracks: Vec<Track>,
}

impl Playlist {
    /// Collect every audio file under `folder` in traversal order.
    pub fn from_folder(folder: &Path) -> Self {
        let tracks = WalkDir::new(folder)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_audio_path(path))
            .map(|path| {
                let title = path
                    .file_stem()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .into_owned();
                Track { path, title }
            })
            .collect();
        Self { tracks }
    }

    pub fn save(&self, output: &Path) -> Result<()> {
        let file = File::create(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(input: &Path) -> Result<Self> {
        let file =
            File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
