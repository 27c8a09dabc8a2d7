//! Per-file planning: skip decision and output placement

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::audio::{AlbumTags, BitDepth};
use crate::core::config::{JobConfig, OutputFormat};

pub const SKIP_ALREADY_TARGET_DEPTH: &str = "already target depth";

/// Why a file is not converted, if it isn't
///
/// Only a 16-bit lossless target ever skips; `probe` is not called for a
/// lossy target.
pub fn skip_reason(format: OutputFormat, probe: impl FnOnce() -> BitDepth) -> Option<&'static str> {
    match format {
        OutputFormat::Lossy => None,
        OutputFormat::Lossless16 => match probe() {
            BitDepth::Sixteen => Some(SKIP_ALREADY_TARGET_DEPTH),
            BitDepth::TwentyFour => None,
        },
    }
}

/// Output file name: source stem plus the target extension
pub fn output_file_name(source: &Path, format: OutputFormat) -> OsString {
    let mut name = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".");
    name.push(format.extension());
    name
}

/// Destination of one converted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub directory: PathBuf,
    pub output_path: PathBuf,
    /// True when the album folder may have to be created first
    pub create_directory: bool,
}

impl OutputPlan {
    /// Where the transcoder should write
    ///
    /// Same as `output_path` unless that is the source itself (in-place
    /// conversion to the same extension), in which case a sibling working
    /// file is used and renamed over the source afterwards.
    pub fn working_path(&self, source: &Path) -> PathBuf {
        if self.output_path != source {
            return self.output_path.clone();
        }
        let mut name = source
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));
        name.push(".converting.");
        name.push(source.extension().unwrap_or_default());
        self.directory.join(name)
    }
}

/// Decide where a converted file goes
///
/// With `delete_source` the file is written next to its source. Otherwise it
/// goes to `<base>/<Artist> - <Album> <suffix>/`, where base is the output
/// subdirectory if set, else the enumeration root. `read_tags` is only called
/// in the latter case.
pub fn plan_output(config: &JobConfig, source: &Path, read_tags: impl FnOnce() -> AlbumTags) -> OutputPlan {
    let file_name = output_file_name(source, config.output_format);

    if config.delete_source {
        let directory = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.source_directory.clone());
        return OutputPlan {
            output_path: directory.join(file_name),
            directory,
            create_directory: false,
        };
    }

    let base = config
        .output_subdirectory
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(&config.source_directory);
    let tags = read_tags();
    let directory = base.join(tags.folder_name(config.output_format.folder_suffix()));

    OutputPlan {
        output_path: directory.join(file_name),
        directory,
        create_directory: true,
    }
}

/// Create the album folder (and parents) if the plan calls for it
pub fn ensure_output_dir(plan: &OutputPlan) -> Result<(), String> {
    if plan.create_directory && !plan.directory.exists() {
        std::fs::create_dir_all(&plan.directory).map_err(|e| {
            format!("Failed to create output directory {}: {}", plan.directory.display(), e)
        })?;
    }
    Ok(())
}
