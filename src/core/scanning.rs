//! Candidate file discovery
//!
//! Collects the `.flac`/`.mp3` files of a job, either from the whole tree
//! under the source directory or from its direct children only.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::audio::is_convertible_audio;

/// A discovered source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    /// Path relative to the enumeration root
    pub relative_path: PathBuf,
}

impl CandidateFile {
    fn new(root: &Path, path: PathBuf) -> Self {
        let relative_path = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        Self { path, relative_path }
    }
}

/// Find convertible audio files under `root`
///
/// Order is the directory listing order (walkdir's traversal order when
/// recursive); it is stable for the lifetime of the returned list, which is
/// all the progress reporting needs.
pub fn find_candidate_files(root: &Path, recursive: bool) -> Result<Vec<CandidateFile>, String> {
    if !root.is_dir() {
        return Err(format!("Path is not a directory: {}", root.display()));
    }

    let files = if recursive {
        WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_convertible_audio(entry.path()))
            .map(|entry| CandidateFile::new(root, entry.into_path()))
            .collect()
    } else {
        fs::read_dir(root)
            .map_err(|e| format!("Failed to read directory {}: {}", root.display(), e))?
            .filter_map(|e| e.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_convertible_audio(path))
            .map(|path| CandidateFile::new(root, path))
            .collect()
    };

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn names(files: &[CandidateFile]) -> Vec<String> {
        let mut names: Vec<String> = files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().replace('\\', "/"))
            .collect();
        names.sort();
        names
    }

    fn fixture_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Disc 2/extras")).unwrap();
        for name in [
            "01.flac",
            "02.MP3",
            "cover.jpg",
            "01.cue",
            "notes.txt",
            "Disc 2/03.flac",
            "Disc 2/03.cue",
            "Disc 2/extras/04.Mp3",
        ] {
            File::create(root.join(name)).unwrap();
        }
        temp_dir
    }

    #[test]
    fn test_flat_scan_lists_direct_children_only() {
        let temp_dir = fixture_tree();
        let files = find_candidate_files(temp_dir.path(), false).unwrap();
        assert_eq!(names(&files), vec!["01.flac", "02.MP3"]);
    }

    #[test]
    fn test_recursive_scan_walks_subtree() {
        let temp_dir = fixture_tree();
        let files = find_candidate_files(temp_dir.path(), true).unwrap();
        assert_eq!(
            names(&files),
            vec!["01.flac", "02.MP3", "Disc 2/03.flac", "Disc 2/extras/04.Mp3"]
        );
        assert!(files.iter().all(|f| f.path.starts_with(temp_dir.path())));
    }

    #[test]
    fn test_directories_named_like_audio_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("album.flac")).unwrap();
        assert!(find_candidate_files(temp_dir.path(), false).unwrap().is_empty());
        assert!(find_candidate_files(temp_dir.path(), true).unwrap().is_empty());
    }

    #[test]
    fn test_scan_is_repeatable() {
        let temp_dir = fixture_tree();
        let first = find_candidate_files(temp_dir.path(), true).unwrap();
        let second = find_candidate_files(temp_dir.path(), true).unwrap();
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn test_scan_nonexistent_directory() {
        assert!(find_candidate_files(Path::new("/nonexistent/path"), false).is_err());
        assert!(find_candidate_files(Path::new("/nonexistent/path"), true).is_err());
    }

    #[test]
    fn test_scan_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_candidate_files(temp_dir.path(), true).unwrap().is_empty());
    }
}
