//! Source bit depth detection via ffprobe
//!
//! Policy: anything we can't positively identify as deeper than 16 bits is
//! treated as 16-bit. A lossless-16 job therefore skips files it can't probe.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::conversion::ProcessSlot;

/// Bit depth classification relevant to a 16-bit lossless target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    /// 16 bits or less: already at target depth
    Sixteen,
    /// More than 16 bits
    TwentyFour,
}

impl BitDepth {
    pub fn from_bits(bits: u32) -> Self {
        if bits > 16 {
            BitDepth::TwentyFour
        } else {
            BitDepth::Sixteen
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
        }
    }
}

/// Arguments asking ffprobe for the raw sample size of the first audio stream
pub fn bit_depth_args(input: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "a:0".to_string(),
        "-show_entries".to_string(),
        "stream=bits_per_raw_sample".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        input.to_string_lossy().into_owned(),
    ]
}

/// Parse ffprobe's bare numeric output; `None` for anything that isn't a
/// non-negative integer (e.g. "N/A" for lossy streams)
pub fn parse_bit_depth(output: &str) -> Option<u32> {
    let trimmed = output.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

/// Bit depth prober for one job
///
/// Checks once whether ffprobe can be executed at all, and after a failed
/// check classifies every file as 16-bit without invoking the tool again.
pub struct BitDepthProber {
    ffprobe_path: PathBuf,
    available: Option<bool>,
}

impl BitDepthProber {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self {
            ffprobe_path,
            available: None,
        }
    }

    fn check_available(&mut self, slot: &ProcessSlot, log: &dyn Fn(&str)) -> bool {
        if let Some(available) = self.available {
            return available;
        }

        let available = match slot.run(Command::new(&self.ffprobe_path).arg("-version")) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                log::error!("ffprobe -version exited with {}", output.status);
                false
            }
            Err(e) => {
                log::error!("ffprobe unavailable: {}", e);
                false
            }
        };

        if !available {
            log(
                "Error: 'ffprobe' command not found. Please ensure FFmpeg (which includes ffprobe) is installed and in your system's PATH.",
            );
        }
        self.available = Some(available);
        available
    }

    /// Classify the source's bit depth, defaulting to 16 on any failure
    pub fn probe(&mut self, input: &Path, slot: &ProcessSlot, log: &dyn Fn(&str)) -> BitDepth {
        if !self.check_available(slot, log) {
            return BitDepth::Sixteen;
        }

        let name = display_name(input);
        let args = bit_depth_args(input);
        log::debug!("FFprobe command for bit depth: {} {}", self.ffprobe_path.display(), args.join(" "));

        let output = match slot.run(Command::new(&self.ffprobe_path).args(&args)) {
            Ok(output) => output,
            Err(e) => {
                log(&format!("Unexpected error checking bit depth with FFprobe for {}: {}", name, e));
                return BitDepth::Sixteen;
            }
        };

        if !output.success() {
            log(&format!("FFprobe failed for {}. Stderr: {}", name, output.stderr.trim()));
            return BitDepth::Sixteen;
        }

        log::debug!("FFprobe raw output for bit depth: '{}'", output.stdout.trim());
        match parse_bit_depth(&output.stdout) {
            Some(bits) => {
                log(&format!("{} - Detected bit depth: {}-bit", name, bits));
                BitDepth::from_bits(bits)
            }
            None => {
                let msg = format!(
                    "Could not parse numeric bit depth from FFprobe output for {}: '{}'. Assuming 16-bit.",
                    name,
                    output.stdout.trim()
                );
                log::warn!("{}", msg);
                log(&msg);
                BitDepth::Sixteen
            }
        }
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
