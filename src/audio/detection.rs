use std::path::Path;

/// Extensions (lowercase) of the source formats a job picks up
pub const CONVERTIBLE_EXTENSIONS: [&str; 2] = ["flac", "mp3"];

/// Extension of the per-track sidecar removed when `delete_auxiliary` is set
pub const CUE_EXTENSION: &str = "cue";

/// Check if a file is a convertible audio file based on its extension
pub fn is_convertible_audio(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        CONVERTIBLE_EXTENSIONS.contains(&ext.as_str())
    } else {
        false
    }
}

/// Path of the same-stem `.cue` sidecar for an audio file
pub fn cue_sidecar_path(path: &Path) -> std::path::PathBuf {
    path.with_extension(CUE_EXTENSION)
}
