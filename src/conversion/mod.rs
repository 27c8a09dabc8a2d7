//! Audio conversion module
//!
//! Handles running ffmpeg/ffprobe on behalf of a job, and the job runner
//! that drives them over a directory of source files.

pub mod events;
pub mod ffmpeg;
pub mod process;
pub mod runner;

pub use events::{ChannelSink, ConverterEvent, EventSink, JobStatus};
pub use ffmpeg::{ConversionOutcome, Transcoder};
pub use process::{CommandOutput, ProcessSlot, Termination};
pub use runner::{ConversionEngine, JobSummary};

use std::path::{Path, PathBuf};

pub const FFMPEG_ENV: &str = "AUDIO_CONVERTER_FFMPEG";
pub const FFPROBE_ENV: &str = "AUDIO_CONVERTER_FFPROBE";

/// Locations of the external tools a job runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::detect()
    }
}

impl ToolPaths {
    /// Find ffmpeg and ffprobe
    ///
    /// Checks the override environment variables, then a bundled
    /// `resources/bin/` next to the executable, and finally falls back to the
    /// bare tool name so the OS resolves it through PATH.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        Self::detect_with(|key| std::env::var(key).ok(), exe_dir.as_deref())
    }

    fn detect_with(env: impl Fn(&str) -> Option<String>, exe_dir: Option<&Path>) -> Self {
        Self {
            ffmpeg: find_tool("ffmpeg", env(FFMPEG_ENV), exe_dir),
            ffprobe: find_tool("ffprobe", env(FFPROBE_ENV), exe_dir),
        }
    }
}

fn find_tool(name: &str, env_override: Option<String>, exe_dir: Option<&Path>) -> PathBuf {
    if let Some(path) = env_override.filter(|p| !p.is_empty()) {
        log::debug!("Using {} from environment: {}", name, path);
        return PathBuf::from(path);
    }

    if let Some(exe_dir) = exe_dir {
        let candidates = [
            exe_dir.join("resources").join("bin").join(name),
            // macOS app bundle: Contents/MacOS/../Resources/bin/<tool>
            exe_dir.join("..").join("Resources").join("bin").join(name),
        ];
        for candidate in candidates {
            if candidate.is_file() {
                log::debug!("Found bundled {} at {}", name, candidate.display());
                return candidate;
            }
        }
    }

    PathBuf::from(name)
}
