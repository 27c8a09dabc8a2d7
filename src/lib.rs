//! Audio Converter
//!
//! Batch conversion of FLAC/MP3 libraries to 16-bit FLAC or MP3 through
//! ffmpeg, run as a cancellable background job.

pub mod audio;
pub mod conversion;
pub mod core;
pub mod logging;

mod test_fixtures;

pub use crate::conversion::{ChannelSink, ConversionEngine, ConverterEvent, EventSink, JobStatus, ToolPaths};
pub use crate::core::{JobConfig, JobSettings, OutputFormat};
