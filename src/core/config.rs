//! Job configuration types
//!
//! Contains:
//! - OutputFormat: target of a conversion run
//! - JobConfig: immutable input of one run
//! - JobSettings: last-used configuration, persisted between sessions
//! - EngineTimings: cancellation and polling intervals

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const MIN_LOSSY_BITRATE: u32 = 128;
pub const MAX_LOSSY_BITRATE: u32 = 320;
pub const LOSSY_BITRATE_STEP: u32 = 16;

/// Target format of a conversion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// FLAC at 16 bits / 44.1 kHz
    #[default]
    Lossless16,
    /// MP3 at the configured bitrate
    Lossy,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Lossless16 => "flac",
            OutputFormat::Lossy => "mp3",
        }
    }

    /// Suffix of the per-album output folder name
    pub fn folder_suffix(self) -> &'static str {
        match self {
            OutputFormat::Lossless16 => "16bit",
            OutputFormat::Lossy => "MP3",
        }
    }
}

/// Check a lossy bitrate against the 128..=320 kbps, step 16 domain
pub fn validate_lossy_bitrate(kbps: u32) -> Result<(), String> {
    if !(MIN_LOSSY_BITRATE..=MAX_LOSSY_BITRATE).contains(&kbps) || kbps % LOSSY_BITRATE_STEP != 0 {
        return Err(format!(
            "Invalid MP3 bitrate {}k: must be {}-{} in steps of {}",
            kbps, MIN_LOSSY_BITRATE, MAX_LOSSY_BITRATE, LOSSY_BITRATE_STEP
        ));
    }
    Ok(())
}

/// Input of a single conversion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub source_directory: PathBuf,
    pub output_format: OutputFormat,
    /// Only used for `OutputFormat::Lossy`
    pub lossy_bitrate_kbps: u32,
    pub recursive: bool,
    /// Convert next to the source and remove the source afterwards
    pub delete_source: bool,
    /// Remove the same-stem `.cue` sidecar after each file
    pub delete_auxiliary: bool,
    /// Base for album folders instead of the source directory (ignored with `delete_source`)
    pub output_subdirectory: Option<PathBuf>,
}

impl JobConfig {
    pub fn new(source_directory: impl Into<PathBuf>, output_format: OutputFormat) -> Self {
        Self {
            source_directory: source_directory.into(),
            output_format,
            lossy_bitrate_kbps: MAX_LOSSY_BITRATE,
            recursive: false,
            delete_source: false,
            delete_auxiliary: false,
            output_subdirectory: None,
        }
    }

    /// Validate everything that doesn't need the filesystem
    pub fn validate(&self) -> Result<(), String> {
        if self.output_format == OutputFormat::Lossy {
            validate_lossy_bitrate(self.lossy_bitrate_kbps)?;
        }
        Ok(())
    }
}

/// Last-used job configuration
///
/// Persisted to `<data dir>/Audio Converter/job_settings.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSettings {
    pub source_directory: PathBuf,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_bitrate")]
    pub lossy_bitrate_kbps: u32,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub delete_source: bool,
    #[serde(default)]
    pub delete_auxiliary: bool,
    #[serde(default)]
    pub output_subdirectory: Option<PathBuf>,
}

fn default_bitrate() -> u32 {
    MAX_LOSSY_BITRATE
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            source_directory: default_source_directory(),
            output_format: OutputFormat::Lossless16,
            lossy_bitrate_kbps: MAX_LOSSY_BITRATE,
            recursive: false,
            delete_source: false,
            delete_auxiliary: false,
            output_subdirectory: None,
        }
    }
}

/// ~/Music, falling back to ~/Downloads, then home
fn default_source_directory() -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return PathBuf::from(".");
    };
    ["Music", "Downloads"]
        .iter()
        .map(|name| home.join(name))
        .find(|dir| dir.exists())
        .unwrap_or(home)
}

impl JobSettings {
    const SETTINGS_FILE: &'static str = "job_settings.json";

    /// Get the app data directory (e.g. ~/.local/share/Audio Converter/)
    fn get_app_data_dir() -> Result<PathBuf, String> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| "Could not determine data directory".to_string())?;

        let app_dir = data_dir.join("Audio Converter");

        if !app_dir.exists() {
            std::fs::create_dir_all(&app_dir)
                .map_err(|e| format!("Failed to create app data directory: {}", e))?;
        }

        Ok(app_dir)
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(settings) => {
                log::debug!("Loaded job settings from disk");
                settings
            }
            Err(e) => {
                log::debug!("Using default job settings: {}", e);
                Self::default()
            }
        }
    }

    fn try_load() -> Result<Self, String> {
        let settings_path = Self::get_app_data_dir()?.join(Self::SETTINGS_FILE);

        if !settings_path.exists() {
            return Err("Settings file not found".to_string());
        }

        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, String> {
        serde_json::from_str(contents).map_err(|e| format!("Failed to parse settings: {}", e))
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), String> {
        let settings_path = Self::get_app_data_dir()?.join(Self::SETTINGS_FILE);

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(&settings_path, json)
            .map_err(|e| format!("Failed to write settings: {}", e))?;

        log::debug!("Saved job settings to {:?}", settings_path);
        Ok(())
    }

    pub fn to_job_config(&self) -> JobConfig {
        JobConfig {
            source_directory: self.source_directory.clone(),
            output_format: self.output_format,
            lossy_bitrate_kbps: self.lossy_bitrate_kbps,
            recursive: self.recursive,
            delete_source: self.delete_source,
            delete_auxiliary: self.delete_auxiliary,
            output_subdirectory: self.output_subdirectory.clone(),
        }
    }
}

impl From<&JobConfig> for JobSettings {
    fn from(config: &JobConfig) -> Self {
        Self {
            source_directory: config.source_directory.clone(),
            output_format: config.output_format,
            lossy_bitrate_kbps: config.lossy_bitrate_kbps,
            recursive: config.recursive,
            delete_source: config.delete_source,
            delete_auxiliary: config.delete_auxiliary,
            output_subdirectory: config.output_subdirectory.clone(),
        }
    }
}

/// Timing knobs of the job runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimings {
    /// Wait after a graceful terminate before killing the subprocess
    pub grace_period: Duration,
    /// How long `stop()` waits for the worker thread to finish
    pub join_timeout: Duration,
    /// Poll interval while waiting on a subprocess
    pub poll_interval: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
            join_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_extensions() {
        assert_eq!(OutputFormat::Lossless16.extension(), "flac");
        assert_eq!(OutputFormat::Lossy.extension(), "mp3");
        assert_eq!(OutputFormat::Lossless16.folder_suffix(), "16bit");
        assert_eq!(OutputFormat::Lossy.folder_suffix(), "MP3");
    }

    #[test]
    fn test_bitrate_domain() {
        for kbps in (128..=320).step_by(16) {
            assert!(validate_lossy_bitrate(kbps).is_ok(), "{} should be valid", kbps);
        }
        assert!(validate_lossy_bitrate(112).is_err());
        assert!(validate_lossy_bitrate(336).is_err());
        assert!(validate_lossy_bitrate(200).is_err());
        assert!(validate_lossy_bitrate(0).is_err());
    }

    #[test]
    fn test_bitrate_ignored_for_lossless() {
        let mut config = JobConfig::new("/music", OutputFormat::Lossless16);
        config.lossy_bitrate_kbps = 7;
        assert!(config.validate().is_ok());

        config.output_format = OutputFormat::Lossy;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_job_config_defaults() {
        let config = JobConfig::new("/music", OutputFormat::Lossy);
        assert_eq!(config.lossy_bitrate_kbps, 320);
        assert!(!config.recursive);
        assert!(!config.delete_source);
        assert!(!config.delete_auxiliary);
        assert!(config.output_subdirectory.is_none());
    }

    #[test]
    fn test_settings_round_trip_through_config() {
        let mut config = JobConfig::new("/music/in", OutputFormat::Lossy);
        config.lossy_bitrate_kbps = 192;
        config.recursive = true;
        config.output_subdirectory = Some(PathBuf::from("/music/out"));

        let settings = JobSettings::from(&config);
        assert_eq!(settings.to_job_config(), config);
    }

    #[test]
    fn test_settings_parse_with_missing_fields() {
        let settings = JobSettings::from_json(r#"{ "source_directory": "/srv/music" }"#).unwrap();
        assert_eq!(settings.source_directory, PathBuf::from("/srv/music"));
        assert_eq!(settings.output_format, OutputFormat::Lossless16);
        assert_eq!(settings.lossy_bitrate_kbps, 320);
        assert!(!settings.delete_source);
    }

    #[test]
    fn test_settings_parse_error() {
        assert!(JobSettings::from_json("not json").is_err());
    }

    #[test]
    fn test_engine_timings_default() {
        let timings = EngineTimings::default();
        assert_eq!(timings.grace_period, Duration::from_secs(2));
        assert_eq!(timings.join_timeout, Duration::from_secs(5));
    }
}
