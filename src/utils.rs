use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use humansize::{format_size, DECIMAL};

/// Extensions recognized as audio, compared case-insensitively.
pub const AUDIO_EXTENSIONS: [&str; 8] = ["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma", "aiff"];

/// True when the path's extension is in the audio allow-list.
pub fn is_audio_path(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            AUDIO_EXTENSIONS.iter().any(|allowed| *allowed == ext)
        }
        None => false,
    }
}

/// Replace filesystem-unsafe characters with underscores.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Format file size in human-readable format.
pub fn format_file_size(size: u64) -> String {
    format_size(size, DECIMAL)
}

/// Shorten text to at most `max` characters for one-line progress events.
pub fn truncate_message(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

/// The bare filename for event messages.
pub fn short_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn audio_extensions_match_case_insensitively() {
        assert!(is_audio_path(&PathBuf::from("song.mp3")));
        assert!(is_audio_path(&PathBuf::from("SONG.MP3")));
        assert!(is_audio_path(&PathBuf::from("nested/dir/take.FlAc")));
        assert!(!is_audio_path(&PathBuf::from("notes.txt")));
        assert!(!is_audio_path(&PathBuf::from("no_extension")));
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(
            sanitize_file_name(r#"AC/DC: "Thunder"?*"#),
            "AC_DC_ _Thunder___"
        );
        assert_eq!(sanitize_file_name("plain name"), "plain name");
    }

    #[test]
    fn truncate_leaves_short_text_alone() {
        assert_eq!(truncate_message("short", 30), "short");
        assert_eq!(truncate_message("abcdef", 3), "abc...");
    }
}
