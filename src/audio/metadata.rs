//! Album tag reading for output folder naming

use std::path::Path;

use lofty::{Accessor, TaggedFileExt};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Characters that are not allowed in a folder name on common filesystems
const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Artist and album of a track, already sanitized for use in a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumTags {
    pub artist: String,
    pub album: String,
}

impl Default for AlbumTags {
    fn default() -> Self {
        Self {
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
        }
    }
}

impl AlbumTags {
    /// Build sanitized tags from raw values, substituting defaults for missing ones
    pub fn from_raw(artist: Option<&str>, album: Option<&str>) -> Self {
        Self {
            artist: sanitize_or(artist, UNKNOWN_ARTIST),
            album: sanitize_or(album, UNKNOWN_ALBUM),
        }
    }

    /// Folder name for converted output, e.g. "Artist - Album MP3"
    pub fn folder_name(&self, suffix: &str) -> String {
        format!("{} - {} {}", self.artist, self.album, suffix)
    }
}

/// Strip path-hostile characters and surrounding whitespace
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .filter(|c| !INVALID_PATH_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn sanitize_or(value: Option<&str>, fallback: &str) -> String {
    match value.map(sanitize_component) {
        Some(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

/// Read artist/album from the file's tags
///
/// Looks at the primary tag first and falls back to the first tag present
/// (e.g. an ID3v2 tag on a FLAC file). Errors only when the file can't be
/// opened or parsed; missing tags resolve to the defaults.
pub fn read_album_tags(path: &Path) -> Result<AlbumTags, String> {
    let tagged_file = lofty::read_from_path(path)
        .map_err(|e| format!("Failed to read tags: {}", e))?;

    let tag = match tagged_file.primary_tag() {
        Some(tag) => Some(tag),
        None => tagged_file.first_tag(),
    };

    let Some(tag) = tag else {
        log::debug!("No tags found in {}", path.display());
        return Ok(AlbumTags::default());
    };

    let artist = tag.artist();
    let album = tag.album();
    Ok(AlbumTags::from_raw(artist.as_deref(), album.as_deref()))
}
