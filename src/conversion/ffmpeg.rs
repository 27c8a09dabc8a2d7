//! FFmpeg subprocess handling for audio conversion

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::audio::probe::display_name;
use crate::core::JobState;

/// Result of processing one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Not converted, with the reason
    Skipped(String),
    /// Converted to the given final path
    Converted(PathBuf),
    /// Conversion attempted and failed, with diagnostic text
    Failed(String),
}

impl ConversionOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted(_))
    }
}

fn os_args(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

/// Re-encode the first audio stream to 16-bit / 44.1 kHz FLAC, keeping tags
///
/// -map 0:a:0        : First audio stream only
/// -map_metadata 0   : Copy all source metadata
/// -sample_fmt s16   : 16-bit samples
/// -ar 44100         : 44.1 kHz
pub fn lossless16_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = os_args(&["-y", "-i"]);
    args.push(input.into());
    args.extend(os_args(&[
        "-map", "0:a:0",
        "-map_metadata", "0",
        "-c:a", "flac",
        "-sample_fmt", "s16",
        "-ar", "44100",
    ]));
    args.push(output.into());
    args
}

/// Pull the embedded cover out as a single JPEG
///
/// Fails (non-zero exit or empty file) when the source has no picture.
pub fn artwork_args(input: &Path, artwork: &Path) -> Vec<OsString> {
    let mut args = os_args(&["-y", "-i"]);
    args.push(input.into());
    args.extend(os_args(&[
        "-an",
        "-vcodec", "mjpeg",
        "-vf", "format=yuv420p",
        "-frames:v", "1",
        "-f", "image2",
    ]));
    args.push(artwork.into());
    args
}

/// MP3 transcode with optional cover, ID3v2.3 plus ID3v1 tags
pub fn lossy_args(input: &Path, artwork: Option<&Path>, bitrate_kbps: u32, output: &Path) -> Vec<OsString> {
    let mut args = os_args(&["-y", "-i"]);
    args.push(input.into());
    if let Some(art) = artwork {
        args.push("-i".into());
        args.push(art.into());
    }
    args.extend(os_args(&["-map", "0:a:0"]));
    if artwork.is_some() {
        args.extend(os_args(&[
            "-map", "1:v",
            "-c:v", "copy",
            "-metadata:s:v", "title=Album cover",
            "-metadata:s:v", "comment=Cover (front)",
        ]));
    }
    let bitrate = format!("{}k", bitrate_kbps);
    args.extend(os_args(&[
        "-c:a", "libmp3lame",
        "-b:a", &bitrate,
        "-ar", "44100",
        "-ac", "2",
        "-map_metadata", "0",
        "-id3v2_version", "3",
        "-write_id3v1", "1",
    ]));
    args.push(output.into());
    args
}

/// Temporary cover file used between the two lossy phases
pub fn artwork_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}.cover.jpg", stem))
}

fn render_command(program: &Path, args: &[OsString]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Runs ffmpeg on behalf of a job
///
/// Every invocation is attached to the job's process slot so `stop()` can
/// terminate it.
pub struct Transcoder<'a> {
    ffmpeg_path: &'a Path,
    state: &'a JobState,
    log: &'a dyn Fn(&str),
}

impl<'a> Transcoder<'a> {
    pub fn new(ffmpeg_path: &'a Path, state: &'a JobState, log: &'a dyn Fn(&str)) -> Self {
        Self { ffmpeg_path, state, log }
    }

    /// Run ffmpeg; `Err` carries the diagnostic text
    fn run(&self, what: &str, args: &[OsString]) -> Result<(), String> {
        log::debug!("{} command: {}", what, render_command(self.ffmpeg_path, args));
        let output = self
            .state
            .process
            .run(Command::new(self.ffmpeg_path).args(args))?;
        log::debug!("{} return code: {:?}", what, output.status.code());

        if output.success() {
            Ok(())
        } else if !self.state.is_running() {
            Err("Conversion cancelled".to_string())
        } else {
            let stderr = output.stderr.trim();
            if stderr.is_empty() {
                Err(format!("ffmpeg exited with status {}", output.status))
            } else {
                Err(stderr.to_string())
            }
        }
    }

    /// Convert to 16-bit FLAC at `output`
    pub fn to_lossless16(&self, input: &Path, output: &Path) -> Result<(), String> {
        (self.log)(&format!("Converting {} to 16-bit FLAC...", display_name(input)));
        let result = self.run("FFmpeg", &lossless16_args(input, output));
        if result.is_err() {
            remove_partial(output);
        }
        result
    }

    /// Convert to MP3 at `output`, embedding the source's cover if it has one
    pub fn to_lossy(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> Result<(), String> {
        let name = display_name(input);
        let artwork = self.extract_artwork(input, output);

        if !self.state.is_running() {
            if let Some(art) = &artwork {
                remove_partial(art);
            }
            return Err("Conversion cancelled".to_string());
        }

        (self.log)(&format!("Converting {} to MP3 ({}k)...", name, bitrate_kbps));
        let args = lossy_args(input, artwork.as_deref(), bitrate_kbps, output);
        let result = self.run("MP3 conversion", &args);

        if let Some(art) = &artwork {
            match std::fs::remove_file(art) {
                Ok(()) => log::debug!("Deleted temporary artwork file: {}", art.display()),
                Err(e) => log::error!("Error deleting temporary artwork file {}: {}", art.display(), e),
            }
        }
        if result.is_err() {
            remove_partial(output);
        }
        result
    }

    /// Phase 1 of a lossy conversion; `None` means "no artwork"
    fn extract_artwork(&self, input: &Path, output: &Path) -> Option<PathBuf> {
        let artwork = artwork_path_for(output);
        let args = artwork_args(input, &artwork);
        log::debug!("Artwork extraction command: {}", render_command(self.ffmpeg_path, &args));

        let result = self.state.process.run(Command::new(self.ffmpeg_path).args(&args));
        let detail = match result {
            Ok(output) => {
                log::debug!("Artwork extraction return code: {:?}", output.status.code());
                let size = std::fs::metadata(&artwork).map(|m| m.len()).unwrap_or(0);
                if output.success() && size > 0 {
                    log::debug!("Artwork extracted successfully: {}", artwork.display());
                    return Some(artwork);
                }
                output.stderr.trim().to_string()
            }
            Err(e) => e,
        };

        remove_partial(&artwork);
        log::warn!(
            "No artwork or failed to extract artwork for {}. Output: {}",
            display_name(input),
            detail
        );
        None
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Failed to remove partial output {}: {}", path.display(), e);
        }
    }
}
