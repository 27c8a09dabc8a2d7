//! Test fixtures for conversion tests
//!
//! Provides stand-in `ffmpeg`/`ffprobe` executables (small shell scripts) and
//! a recording event sink, so the engine can be exercised end to end without
//! a real transcoder.
//!
//! The fake tools decide what to do from the source file's base name:
//! - `24bit`     : ffprobe reports 24 bits per sample (otherwise 16)
//! - `nodepth`   : ffprobe prints `N/A`
//! - `slowprobe` : ffprobe hangs until killed
//! - `art`       : ffmpeg finds embedded artwork
//! - `broken`    : ffmpeg fails the transcode with a diagnostic on stderr
//! - `stubborn`  : ffmpeg ignores SIGTERM and hangs until killed
//! - `slow`      : ffmpeg hangs in the transcode until killed
//!
//! The fake tools are shell scripts and only exist on unix.

#![cfg(test)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[cfg(unix)]
use tempfile::TempDir;

#[cfg(unix)]
use crate::conversion::ToolPaths;
use crate::conversion::{EventSink, JobStatus};

#[cfg(unix)]
const FAKE_FFPROBE: &str = r#"#!/bin/sh
echo "$*" >> "__LOG__"
if [ "$1" = "-version" ]; then
    echo "ffprobe version fake"
    exit 0
fi
for arg in "$@"; do input="$arg"; done
case "${input##*/}" in
    *slowprobe*) exec sleep 30 ;;
    *24bit*) echo "24" ;;
    *nodepth*) echo "N/A" ;;
    *) echo "16" ;;
esac
exit 0
"#;

#[cfg(unix)]
const FAKE_FFMPEG: &str = r#"#!/bin/sh
echo "$*" >> "__LOG__"
input=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-i" ] && [ -z "$input" ]; then input="$arg"; fi
    prev="$arg"
    output="$arg"
done
case " $* " in
    *" -an "*)
        case "${input##*/}" in
            *art*) printf 'jpeg' > "$output"; exit 0 ;;
            *) echo "Output file does not contain any stream" >&2; exit 1 ;;
        esac
        ;;
esac
case "${input##*/}" in
    *stubborn*) trap '' TERM; while :; do sleep 0.05; done ;;
    *slow*) exec sleep 30 ;;
    *broken*) echo "$input: Invalid data found when processing input" >&2; exit 1 ;;
esac
printf 'converted' > "$output"
exit 0
"#;

/// Fake ffmpeg/ffprobe installed into a temp directory
#[cfg(unix)]
pub struct FakeTools {
    _dir: TempDir,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    ffmpeg_log: PathBuf,
    ffprobe_log: PathBuf,
}

#[cfg(unix)]
impl FakeTools {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create tools directory");
        let ffmpeg_log = dir.path().join("ffmpeg_calls.log");
        let ffprobe_log = dir.path().join("ffprobe_calls.log");
        let ffmpeg = write_script(dir.path(), "ffmpeg", FAKE_FFMPEG, &ffmpeg_log);
        let ffprobe = write_script(dir.path(), "ffprobe", FAKE_FFPROBE, &ffprobe_log);

        Self {
            _dir: dir,
            ffmpeg,
            ffprobe,
            ffmpeg_log,
            ffprobe_log,
        }
    }

    pub fn paths(&self) -> ToolPaths {
        ToolPaths {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
        }
    }

    /// Every ffmpeg invocation, one line of space-joined args each
    pub fn ffmpeg_calls(&self) -> Vec<String> {
        read_lines(&self.ffmpeg_log)
    }

    /// ffmpeg invocations that were transcodes (not artwork extraction)
    pub fn transcode_calls(&self) -> Vec<String> {
        self.ffmpeg_calls()
            .into_iter()
            .filter(|line| !format!(" {} ", line).contains(" -an "))
            .collect()
    }

    pub fn ffprobe_calls(&self) -> Vec<String> {
        read_lines(&self.ffprobe_log)
    }
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, template: &str, log_path: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let body = template.replace("__LOG__", &log_path.to_string_lossy());
    std::fs::write(&path, body).expect("Failed to write fake tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to make fake tool executable");
    path
}

#[cfg(unix)]
fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Create an (untagged) audio file stand-in
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(&path, b"not really audio").expect("Failed to write fixture file");
    path
}

/// Minimal FLAC file: STREAMINFO plus a Vorbis comment block, no audio frames
pub fn write_tagged_flac(dir: &Path, name: &str, comments: &[(&str, &str)]) -> PathBuf {
    fn block_header(last: bool, block_type: u8, len: usize) -> [u8; 4] {
        let len = len as u32;
        [
            (u8::from(last) << 7) | block_type,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ]
    }

    // 4096-sample blocks, 44.1 kHz, 2 channels, 16 bits, 0 samples, no MD5
    let mut stream_info = vec![0x10, 0x00, 0x10, 0x00, 0, 0, 0, 0, 0, 0];
    stream_info.extend_from_slice(&[0x0A, 0xC4, 0x42, 0xF0, 0, 0, 0, 0]);
    stream_info.extend_from_slice(&[0; 16]);

    let vendor = b"audio-converter tests";
    let mut vorbis = Vec::new();
    vorbis.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    vorbis.extend_from_slice(vendor);
    vorbis.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for (key, value) in comments {
        let entry = format!("{}={}", key, value);
        vorbis.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        vorbis.extend_from_slice(entry.as_bytes());
    }

    let mut bytes = b"fLaC".to_vec();
    bytes.extend_from_slice(&block_header(false, 0, stream_info.len()));
    bytes.extend_from_slice(&stream_info);
    bytes.extend_from_slice(&block_header(true, 4, vorbis.len()));
    bytes.extend_from_slice(&vorbis);

    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write FLAC fixture");
    path
}

/// Event sink that records everything it receives
#[derive(Default)]
pub struct RecordingSink {
    pub logs: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<f64>>,
    pub states: Mutex<Vec<JobStatus>>,
}

impl RecordingSink {
    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<f64> {
        self.progress.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<JobStatus> {
        self.states.lock().unwrap().clone()
    }

    pub fn has_log(&self, needle: &str) -> bool {
        self.logs().iter().any(|l| l.contains(needle))
    }

    /// Block until the sink has seen the job return to Idle
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.states().contains(&JobStatus::Idle) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl EventSink for RecordingSink {
    fn on_log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }

    fn on_progress(&self, fraction: f64) {
        self.progress.lock().unwrap().push(fraction);
    }

    fn on_state_change(&self, state: JobStatus) {
        self.states.lock().unwrap().push(state);
    }
}
