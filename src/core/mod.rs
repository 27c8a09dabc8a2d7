//! Core job logic and state
//!
//! This module contains:
//! - Job configuration and persisted settings
//! - Candidate file discovery
//! - Per-file planning (skip decision, output placement)
//! - Shared job state for the worker and the stop path

pub mod config;
pub mod planner;
pub mod scanning;
pub mod state;

pub use config::{EngineTimings, JobConfig, JobSettings, OutputFormat};
pub use planner::{OutputPlan, ensure_output_dir, plan_output, skip_reason};
pub use scanning::{CandidateFile, find_candidate_files};
pub use state::{JobState, progress_fraction};
