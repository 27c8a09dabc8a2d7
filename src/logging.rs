//! Logging configuration for Audio Converter
//!
//! Logs are written to both the terminal and a file at:
//! `~/.audio_converter_logs/audio_converter.log`
//!
//! The file is rotated at 10 MiB, keeping 5 older generations
//! (`audio_converter.log.1` is the most recent).

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

pub const LOG_FILE_NAME: &str = "audio_converter.log";
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_GENERATIONS: usize = 5;

/// Writer behind the file logger, kept so `clear_log` can reach it
static LOG_WRITER: OnceLock<Arc<Mutex<RotatingFile>>> = OnceLock::new();

/// Get the log directory path: `~/.audio_converter_logs/`
pub fn get_log_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".audio_converter_logs"))
}

/// Get the current log file path
pub fn get_log_file_path() -> Option<PathBuf> {
    get_log_directory().map(|d| d.join(LOG_FILE_NAME))
}

/// Append-only log file with size-bounded rotation
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    generations: usize,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, generations: usize) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            file,
            written,
            max_bytes,
            generations,
        })
    }

    fn generation_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }

    /// Shift `.1..` up by one, dropping the oldest, and start a fresh file
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.generations == 0 {
            return self.truncate();
        }

        let oldest = self.generation_path(self.generations);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.generations).rev() {
            let from = self.generation_path(n);
            if from.exists() {
                fs::rename(&from, self.generation_path(n + 1))?;
            }
        }
        fs::rename(&self.path, self.generation_path(1))?;

        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }

    /// Empty the current file; older generations are left alone
    pub fn truncate(&mut self) -> io::Result<()> {
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// `Write` handle onto a shared [`RotatingFile`]
struct SharedWriter(Arc<Mutex<RotatingFile>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

fn log_config() -> simplelog::Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off) // Don't show thread IDs
        .set_target_level(LevelFilter::Off) // Don't show module targets
        .build()
}

/// Initialize the logging system
///
/// Sets up combined logging to:
/// - Terminal (`terminal_level` and above)
/// - Rotating file (debug and above)
///
/// Returns the path to the log file on success
pub fn init_logging(terminal_level: LevelFilter) -> Option<PathBuf> {
    let log_dir = match get_log_directory() {
        Some(d) => d,
        None => {
            eprintln!("Warning: Could not determine log directory");
            init_terminal_only(terminal_level);
            return None;
        }
    };

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        init_terminal_only(terminal_level);
        return None;
    }

    let log_path = log_dir.join(LOG_FILE_NAME);
    let writer = match RotatingFile::open(&log_path, MAX_LOG_BYTES, LOG_GENERATIONS) {
        Ok(w) => Arc::new(Mutex::new(w)),
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            init_terminal_only(terminal_level);
            return None;
        }
    };
    let _ = LOG_WRITER.set(writer.clone());

    let config = log_config();
    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(terminal_level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(LevelFilter::Debug, config, SharedWriter(writer)),
    ];

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("Warning: Logger already initialized");
    }

    log::info!("=== Audio Converter session started ===");
    log::info!("Log file: {}", log_path.display());

    Some(log_path)
}

/// Initialize terminal-only logging (fallback if file logging fails)
fn init_terminal_only(level: LevelFilter) {
    let term_logger = TermLogger::new(level, log_config(), TerminalMode::Mixed, ColorChoice::Auto);
    let _ = CombinedLogger::init(vec![term_logger]);
}

/// Truncate the persisted log to empty and record that it was cleared
pub fn clear_log() -> Result<(), String> {
    match LOG_WRITER.get() {
        Some(writer) => writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .truncate()
            .map_err(|e| format!("Failed to clear log file: {}", e))?,
        None => {
            let path = get_log_file_path().ok_or("Could not determine log file path")?;
            truncate_file(&path)?;
        }
    }
    log::info!("Log file truncated by user.");
    Ok(())
}

fn truncate_file(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| format!("Failed to clear log file: {}", e))
}
