//! Conversion job runner
//!
//! [`ConversionEngine`] runs at most one job at a time on a background
//! thread. The job walks its candidate files strictly in order, reporting
//! log lines, progress and state changes through an [`EventSink`].
//!
//! Stopping is cooperative between files and forced for the subprocess that
//! is running when `stop()` is called (graceful terminate, then kill).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::events::{EventSink, JobStatus};
use super::ffmpeg::{ConversionOutcome, Transcoder};
use super::process::Termination;
use super::ToolPaths;
use crate::audio::probe::display_name;
use crate::audio::{AlbumTags, BitDepthProber, cue_sidecar_path, read_album_tags};
use crate::core::{
    EngineTimings, JobConfig, JobState, OutputFormat, ensure_output_dir, find_candidate_files,
    plan_output, progress_fraction, skip_reason,
};

const ALREADY_RUNNING: &str = "Conversion already in progress.";
const INVALID_DIRECTORY: &str = "Invalid directory.";

/// Log a user-facing line to both the persisted log and the sink
fn emit(sink: &dyn EventSink, message: &str) {
    log::info!("{}", message);
    sink.on_log(message);
}

/// Report the terminal status of a job and reset it to idle
///
/// Only the first caller for a given job has any effect.
fn finish(state: &JobState, sink: &dyn EventSink, status: JobStatus) {
    if !state.mark_finished() {
        return;
    }
    match status {
        JobStatus::Completed => emit(sink, "Conversion completed."),
        JobStatus::Stopped => emit(sink, "Conversion stopped by user."),
        _ => {}
    }
    sink.on_state_change(status);
    state.cleanup();
    sink.on_state_change(JobStatus::Idle);
    state.mark_idle();
}

/// Tally of per-file outcomes for the end-of-run summary
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub started_at: DateTime<Utc>,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl JobSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            converted: 0,
            skipped: 0,
            failed: 0,
        }
    }

    pub fn record(&mut self, outcome: &ConversionOutcome) {
        match outcome {
            ConversionOutcome::Converted(_) => self.converted += 1,
            ConversionOutcome::Skipped(_) => self.skipped += 1,
            ConversionOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.converted + self.skipped + self.failed
    }

    /// One-line summary, e.g. `Converted: 3, Skipped: 1, Failed: 0 (12.4s)`
    pub fn summary_line(&self, now: DateTime<Utc>) -> String {
        let elapsed = (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        format!(
            "Converted: {}, Skipped: {}, Failed: {} ({:.1}s)",
            self.converted, self.skipped, self.failed, elapsed
        )
    }
}

impl Default for JobSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// The engine's current or most recent job
///
/// Stays in place until the job has reported `Idle`, so a new job can't
/// start while an old one is still winding down. `stop()` takes the worker
/// handle out while it waits on it.
struct ActiveJob {
    state: Arc<JobState>,
    worker: Option<JoinHandle<()>>,
}

/// Runs conversion jobs in the background
///
/// Dropping the engine stops any job it is running.
pub struct ConversionEngine {
    tools: ToolPaths,
    sink: Arc<dyn EventSink>,
    timings: EngineTimings,
    active: Mutex<Option<ActiveJob>>,
}

impl ConversionEngine {
    pub fn new(tools: ToolPaths, sink: Arc<dyn EventSink>) -> Self {
        Self::with_timings(tools, sink, EngineTimings::default())
    }

    pub fn with_timings(tools: ToolPaths, sink: Arc<dyn EventSink>, timings: EngineTimings) -> Self {
        Self {
            tools,
            sink,
            timings,
            active: Mutex::new(None),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while a job is running and has not been asked to stop
    pub fn is_running(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|job| job.state.is_running() && !job.state.is_finished())
    }

    /// Progress fraction of the current job, 0 when idle
    pub fn progress(&self) -> f64 {
        self.lock_active()
            .as_ref()
            .map(|job| job.state.progress())
            .unwrap_or(0.0)
    }

    /// Start a job in the background
    ///
    /// Returns immediately. Refused (and logged) if a job is already running,
    /// the source directory does not exist or the configuration is invalid.
    pub fn start(&self, config: JobConfig) -> Result<(), String> {
        let mut active = self.lock_active();

        if let Some(job) = active.as_ref() {
            if !job.state.is_idle() {
                emit(&*self.sink, ALREADY_RUNNING);
                return Err(ALREADY_RUNNING.to_string());
            }
        }
        if let Some(worker) = active.take().and_then(|previous| previous.worker) {
            let _ = worker.join();
        }

        if !config.source_directory.is_dir() {
            return Err(self.refuse(INVALID_DIRECTORY));
        }
        if let Err(e) = config.validate() {
            return Err(self.refuse(&e));
        }

        emit(&*self.sink, "Starting conversion...");
        log::debug!("Job configuration: {:?}", config);

        let state = Arc::new(JobState::new(self.timings.poll_interval));
        self.sink.on_state_change(JobStatus::Running);

        let worker = Worker {
            prober: BitDepthProber::new(self.tools.ffprobe.clone()),
            ffmpeg: self.tools.ffmpeg.clone(),
            config,
            state: state.clone(),
            sink: self.sink.clone(),
        };

        let handle = thread::Builder::new()
            .name("conversion-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                let message = format!("Failed to start conversion thread: {}", e);
                emit(&*self.sink, &message);
                finish(&state, &*self.sink, JobStatus::FailedToStart);
                message
            })?;

        *active = Some(ActiveJob {
            state,
            worker: Some(handle),
        });
        Ok(())
    }

    fn refuse(&self, reason: &str) -> String {
        emit(&*self.sink, reason);
        self.sink.on_state_change(JobStatus::FailedToStart);
        self.sink.on_state_change(JobStatus::Idle);
        reason.to_string()
    }

    /// Stop the running job; a no-op when idle
    ///
    /// Terminates the current subprocess (killing it after the grace period)
    /// and waits a bounded time for the worker thread before reporting the
    /// job as stopped.
    pub fn stop(&self) {
        let (state, worker) = {
            let mut active = self.lock_active();
            let Some(job) = active.as_mut() else {
                return;
            };
            (job.state.clone(), job.worker.take())
        };

        if state.is_finished() || !state.request_stop() {
            // wound down on its own, or another stop() is already on it
            if let Some(worker) = worker {
                wait_for_worker(worker, self.timings.join_timeout, self.timings.poll_interval);
            }
            return;
        }

        emit(&*self.sink, "Stopping conversion...");
        match state.process.terminate(self.timings.grace_period) {
            Termination::Terminated => emit(&*self.sink, "Terminated current process."),
            Termination::Killed => emit(&*self.sink, "Forced kill of process."),
            Termination::NotRunning => {}
        }

        let joined = worker.is_none_or(|worker| {
            wait_for_worker(worker, self.timings.join_timeout, self.timings.poll_interval)
        });
        if !joined {
            let message = "Warning: Conversion thread did not terminate cleanly.";
            log::warn!("{}", message);
            self.sink.on_log(message);
        }

        finish(&state, &*self.sink, JobStatus::Stopped);
    }
}

impl Drop for ConversionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Join the worker if it finishes within `timeout`; false if it didn't
fn wait_for_worker(worker: JoinHandle<()>, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !worker.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(poll);
    }
    if worker.join().is_err() {
        log::error!("Conversion thread panicked");
    }
    true
}

/// Everything the background thread needs for one job
struct Worker {
    config: JobConfig,
    ffmpeg: PathBuf,
    prober: BitDepthProber,
    state: Arc<JobState>,
    sink: Arc<dyn EventSink>,
}

impl Worker {
    fn log(&self, message: &str) {
        emit(&*self.sink, message);
    }

    fn run(mut self) {
        let mut summary = JobSummary::new();

        let candidates = match find_candidate_files(&self.config.source_directory, self.config.recursive) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::error!("{}", e);
                Vec::new()
            }
        };

        if candidates.is_empty() {
            self.log("No audio files found.");
            finish(&self.state, &*self.sink, JobStatus::FailedToStart);
            return;
        }

        let total = candidates.len();
        log::info!("Found {} audio files", total);

        for (index, candidate) in candidates.iter().enumerate() {
            if !self.state.is_running() {
                break;
            }

            let outcome = self.process_file(&candidate.path);
            log::debug!("{}: {:?}", candidate.relative_path.display(), outcome);
            summary.record(&outcome);

            if self.config.delete_auxiliary {
                self.delete_auxiliary(&candidate.path);
            }

            let fraction = progress_fraction(index + 1, total);
            self.state.set_progress(fraction);
            self.sink.on_progress(fraction);
        }

        self.log(&summary.summary_line(Utc::now()));

        let status = if self.state.is_running() {
            JobStatus::Completed
        } else {
            JobStatus::Stopped
        };
        finish(&self.state, &*self.sink, status);
    }

    fn process_file(&mut self, source: &Path) -> ConversionOutcome {
        let name = display_name(source);
        let format = self.config.output_format;
        let sink = self.sink.clone();
        let state = self.state.clone();
        // After a stop, tool failures are fallout of the kill, not news
        let log = move |message: &str| {
            if state.is_running() {
                emit(&*sink, message);
            } else {
                log::debug!("{}", message);
            }
        };

        let reason = skip_reason(format, || self.prober.probe(source, &self.state.process, &log));
        if !self.state.is_running() {
            log::debug!("Stopped while checking {}", name);
            return ConversionOutcome::Failed("Conversion cancelled".to_string());
        }
        if let Some(reason) = reason {
            self.log(&format!("Skipping {} (already 16-bit FLAC)", name));
            return ConversionOutcome::Skipped(reason.to_string());
        }

        let plan = plan_output(&self.config, source, || self.read_tags(source));
        if let Err(e) = ensure_output_dir(&plan) {
            self.log(&e);
            return ConversionOutcome::Failed(e);
        }

        let working_path = plan.working_path(source);
        let transcoder = Transcoder::new(&self.ffmpeg, &self.state, &log);
        let result = match format {
            OutputFormat::Lossless16 => transcoder.to_lossless16(source, &working_path),
            OutputFormat::Lossy => {
                transcoder.to_lossy(source, &working_path, self.config.lossy_bitrate_kbps)
            }
        };

        if let Err(diagnostic) = result {
            if self.state.is_running() {
                self.log(&format!("Failed to convert {}:\n{}", name, diagnostic));
            } else {
                log::debug!("Conversion of {} interrupted: {}", name, diagnostic);
            }
            return ConversionOutcome::Failed(diagnostic);
        }

        if working_path != plan.output_path {
            return self.replace_source(source, &working_path);
        }

        if self.config.delete_source {
            match std::fs::remove_file(source) {
                Ok(()) => self.log(&format!("Deleted source file: {}", name)),
                Err(e) => self.log(&format!("Error deleting source file {}: {}", name, e)),
            }
        }

        ConversionOutcome::Converted(plan.output_path)
    }

    /// Move an in-place conversion's working file over its source
    fn replace_source(&self, source: &Path, working_path: &Path) -> ConversionOutcome {
        let name = display_name(source);
        match std::fs::rename(working_path, source) {
            Ok(()) => {
                self.log(&format!("Replaced source file: {}", name));
                ConversionOutcome::Converted(source.to_path_buf())
            }
            Err(e) => {
                let message = format!("Failed to replace {} with converted file: {}", name, e);
                self.log(&message);
                let _ = std::fs::remove_file(working_path);
                ConversionOutcome::Failed(message)
            }
        }
    }

    fn read_tags(&self, source: &Path) -> AlbumTags {
        match read_album_tags(source) {
            Ok(tags) => tags,
            Err(e) => {
                self.log(&format!("Error reading metadata for {}: {}", display_name(source), e));
                AlbumTags::default()
            }
        }
    }

    fn delete_auxiliary(&self, source: &Path) {
        let cue = cue_sidecar_path(source);
        if !cue.exists() {
            return;
        }
        let name = display_name(&cue);
        match std::fs::remove_file(&cue) {
            Ok(()) => self.log(&format!("Deleted CUE file: {}", name)),
            Err(e) => self.log(&format!("Error deleting CUE file {}: {}", name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_outcomes() {
        let mut summary = JobSummary::new();
        summary.record(&ConversionOutcome::Converted(PathBuf::from("a.flac")));
        summary.record(&ConversionOutcome::Skipped("already target depth".into()));
        summary.record(&ConversionOutcome::Failed("boom".into()));
        summary.record(&ConversionOutcome::Converted(PathBuf::from("b.flac")));

        assert_eq!(summary.processed(), 4);
        let line = summary.summary_line(summary.started_at + chrono::Duration::milliseconds(2500));
        assert_eq!(line, "Converted: 2, Skipped: 1, Failed: 1 (2.5s)");
    }

    #[cfg(unix)]
    mod with_fake_tools {
        use super::super::*;
        use crate::test_fixtures::{FakeTools, RecordingSink, touch, write_tagged_flac};
        use tempfile::TempDir;

        const WAIT: Duration = Duration::from_secs(15);

        fn fast_timings() -> EngineTimings {
            EngineTimings {
                grace_period: Duration::from_millis(500),
                join_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(5),
            }
        }

        fn engine(tools: &FakeTools) -> (ConversionEngine, Arc<RecordingSink>) {
            let sink = Arc::new(RecordingSink::default());
            let engine = ConversionEngine::with_timings(tools.paths(), sink.clone(), fast_timings());
            (engine, sink)
        }

        fn run_to_end(engine: &ConversionEngine, sink: &RecordingSink, config: JobConfig) {
            engine.start(config).unwrap();
            assert!(sink.wait_for_idle(WAIT), "job never returned to idle");
        }

        fn wait_for_log(sink: &RecordingSink, needle: &str) {
            let start = Instant::now();
            while !sink.has_log(needle) {
                assert!(start.elapsed() < WAIT, "never saw log line {:?}", needle);
                thread::sleep(Duration::from_millis(5));
            }
        }

        #[test]
        fn test_invalid_directory_fails_to_start() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);

            let result = engine.start(JobConfig::new("/nonexistent/music/dir", OutputFormat::Lossy));

            assert_eq!(result, Err("Invalid directory.".to_string()));
            assert_eq!(sink.logs(), vec!["Invalid directory.".to_string()]);
            assert!(sink.progress().is_empty());
            assert_eq!(sink.states(), vec![JobStatus::FailedToStart, JobStatus::Idle]);
            assert!(!engine.is_running());
        }

        #[test]
        fn test_invalid_bitrate_is_rejected() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            let mut config = JobConfig::new(dir.path(), OutputFormat::Lossy);
            config.lossy_bitrate_kbps = 200;

            assert!(engine.start(config).is_err());
            assert!(!sink.has_log("Starting conversion..."));
            assert_eq!(sink.states(), vec![JobStatus::FailedToStart, JobStatus::Idle]);
        }

        #[test]
        fn test_no_audio_files() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "notes.txt");

            run_to_end(&engine, &sink, JobConfig::new(dir.path(), OutputFormat::Lossless16));

            assert!(sink.has_log("No audio files found."));
            assert!(!sink.has_log("Conversion completed."));
            assert!(sink.progress().is_empty());
            assert_eq!(
                sink.states(),
                vec![JobStatus::Running, JobStatus::FailedToStart, JobStatus::Idle]
            );
        }

        #[test]
        fn test_lossless_skips_16_bit_and_converts_24_bit() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "01 plain.flac");
            touch(dir.path(), "02 hires 24bit.flac");

            run_to_end(&engine, &sink, JobConfig::new(dir.path(), OutputFormat::Lossless16));

            let transcodes = tools.transcode_calls();
            assert_eq!(transcodes.len(), 1);
            assert!(transcodes[0].contains("02 hires 24bit.flac"));
            assert!(sink.has_log("Skipping 01 plain.flac (already 16-bit FLAC)"));
            assert!(sink.has_log("Converting 02 hires 24bit.flac to 16-bit FLAC..."));
            assert!(sink.has_log("Converted: 1, Skipped: 1, Failed: 0"));
            assert!(sink.has_log("Conversion completed."));

            let output = dir
                .path()
                .join("Unknown Artist - Unknown Album 16bit")
                .join("02 hires 24bit.flac");
            assert!(output.exists());

            assert_eq!(sink.progress(), vec![0.5, 1.0]);
            assert_eq!(
                sink.states(),
                vec![JobStatus::Running, JobStatus::Completed, JobStatus::Idle]
            );
            assert_eq!(engine.progress(), 0.0);
        }

        #[test]
        fn test_lossy_never_probes() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "one 24bit.flac");
            touch(dir.path(), "two.mp3");
            let mut config = JobConfig::new(dir.path(), OutputFormat::Lossy);
            config.lossy_bitrate_kbps = 192;

            run_to_end(&engine, &sink, config);

            assert!(tools.ffprobe_calls().is_empty());
            assert_eq!(tools.transcode_calls().len(), 2);
            assert!(tools.transcode_calls().iter().all(|c| c.contains("-b:a 192k")));
            let album = dir.path().join("Unknown Artist - Unknown Album MP3");
            assert!(album.join("one 24bit.mp3").exists());
            assert!(album.join("two.mp3").exists());
        }

        #[test]
        fn test_cue_deleted_even_when_conversion_fails() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "broken.mp3");
            let cue = touch(dir.path(), "broken.cue");
            let mut config = JobConfig::new(dir.path(), OutputFormat::Lossy);
            config.delete_auxiliary = true;

            run_to_end(&engine, &sink, config);

            assert!(!cue.exists());
            assert!(sink.has_log("Failed to convert broken.mp3:"));
            assert!(sink.has_log("Invalid data found"));
            assert!(sink.has_log("Deleted CUE file: broken.cue"));
            assert!(sink.has_log("Converted: 0, Skipped: 0, Failed: 1"));
            assert!(sink.has_log("Conversion completed."));
        }

        #[test]
        fn test_cue_kept_without_delete_auxiliary() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "album.mp3");
            let cue = touch(dir.path(), "album.cue");

            run_to_end(&engine, &sink, JobConfig::new(dir.path(), OutputFormat::Lossy));

            assert!(cue.exists());
            assert!(!sink.has_log("Deleted CUE file"));
        }

        #[test]
        fn test_cue_deleted_for_skipped_file() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "cd.flac");
            let cue = touch(dir.path(), "cd.cue");
            let mut config = JobConfig::new(dir.path(), OutputFormat::Lossless16);
            config.delete_auxiliary = true;

            run_to_end(&engine, &sink, config);

            assert!(sink.has_log("Skipping cd.flac"));
            assert!(!cue.exists());
        }

        #[test]
        fn test_delete_source_converts_in_place() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            let source = touch(dir.path(), "disc/track 24bit.flac");
            let mut config = JobConfig::new(dir.path(), OutputFormat::Lossy);
            config.recursive = true;
            config.delete_source = true;
            config.output_subdirectory = Some(dir.path().join("ignored"));

            run_to_end(&engine, &sink, config);

            assert!(dir.path().join("disc/track 24bit.mp3").exists());
            assert!(!source.exists());
            assert!(!dir.path().join("ignored").exists());
            assert!(sink.has_log("Deleted source file: track 24bit.flac"));
        }

        #[test]
        fn test_same_extension_in_place_replaces_source() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            let source = touch(dir.path(), "deep 24bit.flac");
            let mut config = JobConfig::new(dir.path(), OutputFormat::Lossless16);
            config.delete_source = true;

            run_to_end(&engine, &sink, config);

            assert_eq!(std::fs::read_to_string(&source).unwrap(), "converted");
            assert!(!dir.path().join("deep 24bit.converting.flac").exists());
            assert!(sink.has_log("Replaced source file: deep 24bit.flac"));
            assert!(sink.has_log("Converted: 1, Skipped: 0, Failed: 0"));
        }

        #[test]
        fn test_progress_is_exact_and_increasing() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            for name in ["a.mp3", "b.mp3", "c.mp3", "d.mp3"] {
                touch(dir.path(), name);
            }

            run_to_end(&engine, &sink, JobConfig::new(dir.path(), OutputFormat::Lossy));

            assert_eq!(sink.progress(), vec![0.25, 0.5, 0.75, 1.0]);
        }

        #[test]
        fn test_stop_mid_run_halts_before_remaining_files() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "first slow 24bit.flac");
            touch(dir.path(), "second slow 24bit.flac");

            engine.start(JobConfig::new(dir.path(), OutputFormat::Lossless16)).unwrap();
            assert!(engine.is_running());
            wait_for_log(&sink, "to 16-bit FLAC...");
            // let the fake ffmpeg get going
            thread::sleep(Duration::from_millis(200));

            let start = Instant::now();
            engine.stop();
            assert!(start.elapsed() < Duration::from_secs(10));

            // whichever file ran first, the other one is never touched
            assert_eq!(tools.transcode_calls().len(), 1);
            assert!(sink.has_log("Stopping conversion..."));
            assert!(sink.has_log("Terminated current process."));
            assert!(sink.has_log("Conversion stopped by user."));
            assert!(!sink.has_log("Conversion completed."));
            assert!(!sink.has_log("Failed to convert"));
            assert_eq!(sink.states().last(), Some(&JobStatus::Idle));
            assert_eq!(
                sink.states().iter().filter(|s| s.is_terminal()).count(),
                1,
                "terminal status reported once"
            );
            assert!(!engine.is_running());
            assert_eq!(engine.progress(), 0.0);
        }

        #[test]
        fn test_stop_when_idle_is_noop() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);

            engine.stop();

            assert!(sink.logs().is_empty());
            assert!(sink.states().is_empty());
        }

        #[test]
        fn test_stop_after_completion_is_noop() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "song.mp3");

            run_to_end(&engine, &sink, JobConfig::new(dir.path(), OutputFormat::Lossy));
            let logs_before = sink.logs().len();
            engine.stop();

            assert_eq!(sink.logs().len(), logs_before);
        }

        #[test]
        fn test_second_start_while_running_is_refused() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "long slow 24bit.flac");

            engine.start(JobConfig::new(dir.path(), OutputFormat::Lossless16)).unwrap();
            let second = engine.start(JobConfig::new(dir.path(), OutputFormat::Lossy));

            assert_eq!(second, Err("Conversion already in progress.".to_string()));
            assert!(sink.has_log("Conversion already in progress."));
            engine.stop();
            assert!(sink.has_log("Conversion stopped by user."));
        }

        #[test]
        fn test_engine_can_run_jobs_back_to_back() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "again.mp3");

            run_to_end(&engine, &sink, JobConfig::new(dir.path(), OutputFormat::Lossy));
            sink.states.lock().unwrap().clear();
            run_to_end(&engine, &sink, JobConfig::new(dir.path(), OutputFormat::Lossy));

            assert_eq!(
                sink.states(),
                vec![JobStatus::Running, JobStatus::Completed, JobStatus::Idle]
            );
        }

        #[test]
        fn test_start_refused_while_stop_in_progress() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let first = TempDir::new().unwrap();
            touch(first.path(), "first stubborn 24bit.flac");
            let second = TempDir::new().unwrap();
            touch(second.path(), "second.mp3");

            engine.start(JobConfig::new(first.path(), OutputFormat::Lossless16)).unwrap();
            wait_for_log(&sink, "to 16-bit FLAC...");
            thread::sleep(Duration::from_millis(200));

            // ffmpeg ignores SIGTERM, so stop() sits out the whole grace period
            let refused = thread::scope(|s| {
                let stopper = s.spawn(|| engine.stop());
                thread::sleep(Duration::from_millis(300));
                let refused = engine.start(JobConfig::new(second.path(), OutputFormat::Lossy));
                stopper.join().unwrap();
                refused
            });

            assert_eq!(refused, Err("Conversion already in progress.".to_string()));
            assert_eq!(tools.transcode_calls().len(), 1);
            assert!(sink.has_log("Forced kill of process."));
            assert!(sink.has_log("Conversion stopped by user."));
            assert_eq!(
                sink.states(),
                vec![JobStatus::Running, JobStatus::Stopped, JobStatus::Idle]
            );
            assert!(!engine.is_running());

            sink.states.lock().unwrap().clear();
            run_to_end(&engine, &sink, JobConfig::new(second.path(), OutputFormat::Lossy));
            assert_eq!(
                sink.states(),
                vec![JobStatus::Running, JobStatus::Completed, JobStatus::Idle]
            );
            assert!(second.path().join("Unknown Artist - Unknown Album MP3").join("second.mp3").exists());
        }

        #[test]
        fn test_stop_while_checking_bit_depth_counts_as_failed() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "hanging slowprobe.flac");

            engine.start(JobConfig::new(dir.path(), OutputFormat::Lossless16)).unwrap();
            // -version check, then the bit depth query that hangs
            let start = Instant::now();
            while tools.ffprobe_calls().len() < 2 {
                assert!(start.elapsed() < WAIT, "ffprobe never queried");
                thread::sleep(Duration::from_millis(5));
            }
            thread::sleep(Duration::from_millis(200));
            engine.stop();

            assert!(sink.has_log("Conversion stopped by user."));
            assert!(sink.has_log("Converted: 0, Skipped: 0, Failed: 1"));
            assert!(!sink.has_log("Skipping"));
            assert!(!sink.has_log("FFprobe failed"));
            assert!(tools.transcode_calls().is_empty());
            assert_eq!(sink.states().last(), Some(&JobStatus::Idle));
        }

        #[test]
        fn test_album_folder_named_from_tags() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            write_tagged_flac(
                dir.path(),
                "tagged 24bit.flac",
                &[("ARTIST", "Boards of Canada"), ("ALBUM", "Geogaddi")],
            );

            run_to_end(&engine, &sink, JobConfig::new(dir.path(), OutputFormat::Lossless16));

            assert!(sink.has_log("Converted: 1, Skipped: 0, Failed: 0"));
            let output = dir
                .path()
                .join("Boards of Canada - Geogaddi 16bit")
                .join("tagged 24bit.flac");
            assert!(output.exists());
            assert!(!dir.path().join("Unknown Artist - Unknown Album 16bit").exists());
        }

        #[test]
        fn test_drop_stops_running_job() {
            let tools = FakeTools::new();
            let (engine, sink) = engine(&tools);
            let dir = TempDir::new().unwrap();
            touch(dir.path(), "endless slow 24bit.flac");

            engine.start(JobConfig::new(dir.path(), OutputFormat::Lossless16)).unwrap();
            wait_for_log(&sink, "to 16-bit FLAC...");
            drop(engine);

            assert!(sink.has_log("Conversion stopped by user."));
            assert_eq!(sink.states().last(), Some(&JobStatus::Idle));
        }
    }
}
