//! Mutable state of one conversion job
//!
//! Shared between the job's worker thread and whichever thread asks the job
//! to stop. Everything here is atomic or mutex-guarded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::conversion::ProcessSlot;

pub struct JobState {
    /// Cleared by `stop()` or when the job winds down
    running: AtomicBool,
    /// Set once the terminal status has been reported
    finished: AtomicBool,
    /// Set once the return to idle has been reported
    idle: AtomicBool,
    /// f64 bits of the progress fraction
    progress: AtomicU64,
    /// Subprocess currently executing on behalf of the job
    pub process: ProcessSlot,
}

impl JobState {
    /// Fresh state for a job that is about to run
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            running: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            idle: AtomicBool::new(false),
            progress: AtomicU64::new(0f64.to_bits()),
            process: ProcessSlot::new(poll_interval),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag; returns whether it was set
    pub fn request_stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::SeqCst))
    }

    pub fn set_progress(&self, fraction: f64) {
        self.progress
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    /// Claim the right to report the job's terminal status
    ///
    /// Returns true for exactly one caller.
    pub fn mark_finished(&self) -> bool {
        !self.finished.swap(true, Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Record that listeners have been told the job is idle again
    ///
    /// Until then the job still owns its engine.
    pub fn mark_idle(&self) {
        self.idle.store(true, Ordering::SeqCst);
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    /// Reset to idle: no progress, not running
    ///
    /// The subprocess slot empties itself when its process is collected.
    pub fn cleanup(&self) {
        self.set_progress(0.0);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Progress after `processed` of `total` files
pub fn progress_fraction(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    processed as f64 / total as f64
}
