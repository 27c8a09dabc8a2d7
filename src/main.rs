//! Audio Converter - command line front end
//!
//! Converts a music folder to 16-bit FLAC or MP3. Options not given on the
//! command line come from the last run's saved settings; the on/off switches
//! each have a `--no-...` form to turn a saved setting back off.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use log::LevelFilter;
use rustop::opts;
use signal_hook::consts::SIGINT;

use audio_converter::core::config::validate_lossy_bitrate;
use audio_converter::logging;
use audio_converter::{
    ChannelSink, ConversionEngine, ConverterEvent, JobSettings, JobStatus, OutputFormat, ToolPaths,
};

fn parse_format(name: &str) -> Result<OutputFormat, String> {
    match name.to_ascii_lowercase().as_str() {
        "flac" | "16bit" | "lossless" => Ok(OutputFormat::Lossless16),
        "mp3" | "lossy" => Ok(OutputFormat::Lossy),
        other => Err(format!("Unknown output format {:?}. [flac, mp3]", other)),
    }
}

/// Saved value unless overridden by `--flag` or `--no-flag`; `--no-flag` wins
fn resolve_flag(saved: bool, on: bool, off: bool) -> bool {
    if off {
        false
    } else if on {
        true
    } else {
        saved
    }
}

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Convert FLAC/MP3 files to 16-bit FLAC or MP3";
        opt format:Option<String>, desc:"Output format. [flac, mp3]";
        opt bitrate:Option<u32>, desc:"MP3 bitrate in kbps (128-320, multiple of 16).";
        opt recursive:bool=false, desc:"Include subdirectories.";
        opt no_recursive:bool=false, desc:"Only the top-level directory.";
        opt delete_source:bool=false, desc:"Convert next to the source and delete the source file.";
        opt no_delete_source:bool=false, desc:"Keep source files.";
        opt delete_cue:bool=false, desc:"Delete the matching .cue file after each file.";
        opt no_delete_cue:bool=false, desc:"Keep .cue files.";
        opt output:Option<String>, desc:"Base directory for album folders.";
        opt clear_log:bool=false, desc:"Truncate the log file and exit.";
        param directory:Option<String>, desc:"Source directory";
    }.parse_or_exit();

    // The sink events are printed below; the terminal logger only adds warnings
    let log_path = logging::init_logging(LevelFilter::Warn);

    if args.clear_log {
        return match logging::clear_log() {
            Ok(()) => {
                println!("Log file truncated.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let mut settings = JobSettings::load();
    if let Some(directory) = args.directory {
        settings.source_directory = PathBuf::from(directory);
    }
    if let Some(format) = args.format {
        match parse_format(&format) {
            Ok(format) => settings.output_format = format,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(bitrate) = args.bitrate {
        if let Err(e) = validate_lossy_bitrate(bitrate) {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
        settings.lossy_bitrate_kbps = bitrate;
    }
    if let Some(output) = args.output {
        settings.output_subdirectory = Some(PathBuf::from(output));
    }
    settings.recursive = resolve_flag(settings.recursive, args.recursive, args.no_recursive);
    settings.delete_source =
        resolve_flag(settings.delete_source, args.delete_source, args.no_delete_source);
    settings.delete_auxiliary =
        resolve_flag(settings.delete_auxiliary, args.delete_cue, args.no_delete_cue);

    if let Some(path) = log_path {
        println!("Log file: {}", path.display());
    }

    // First Ctrl-C stops the job, a second one exits immediately
    let interrupted = Arc::new(AtomicBool::new(false));
    if let Err(e) = signal_hook::flag::register_conditional_shutdown(SIGINT, 1, interrupted.clone())
        .and_then(|_| signal_hook::flag::register(SIGINT, interrupted.clone()))
    {
        log::warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let tools = ToolPaths::detect();
    log::debug!("Using ffmpeg: {}, ffprobe: {}", tools.ffmpeg.display(), tools.ffprobe.display());

    let (sink, events) = ChannelSink::new();
    let engine = ConversionEngine::new(tools, Arc::new(sink));

    let started = engine.start(settings.to_job_config());
    if started.is_ok() {
        if let Err(e) = settings.save() {
            log::warn!("Failed to save settings: {}", e);
        }
    }

    let mut outcome = JobStatus::Idle;
    let mut stop_requested = false;
    loop {
        if interrupted.load(Ordering::Relaxed) && !stop_requested {
            stop_requested = true;
            engine.stop();
        }
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(ConverterEvent::Log(message)) => println!("{}", message),
            Ok(ConverterEvent::Progress(fraction)) => {
                println!("[{:>3.0}%]", fraction * 100.0);
            }
            Ok(ConverterEvent::StateChanged(JobStatus::Idle)) => break,
            Ok(ConverterEvent::StateChanged(status)) => {
                if status.is_terminal() {
                    outcome = status;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if outcome == JobStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
