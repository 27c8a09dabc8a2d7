//! Job status and the event sink the presentation layer listens on

use std::sync::mpsc;

/// Lifecycle of a conversion job as seen by listeners
///
/// A job goes `Idle -> Running -> {Completed, Stopped}` and then back to
/// `Idle` once its state has been cleaned up. A job that is refused before
/// its file loop starts reports `FailedToStart` followed by `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running,
    Completed,
    Stopped,
    FailedToStart,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Stopped | JobStatus::FailedToStart)
    }
}

/// Receiver of log lines, progress and state changes
///
/// Called from the job's worker thread as well as from whichever thread
/// calls `start`/`stop`, so implementations must be thread-safe.
pub trait EventSink: Send + Sync {
    fn on_log(&self, message: &str);

    /// Fraction of files processed, in `[0, 1]`
    fn on_progress(&self, fraction: f64);

    fn on_state_change(&self, state: JobStatus);
}

/// Events forwarded by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConverterEvent {
    Log(String),
    Progress(f64),
    StateChanged(JobStatus),
}

/// Sink that forwards every event over an mpsc channel
///
/// Sends are fire-and-forget: a dropped receiver never stalls the job.
pub struct ChannelSink {
    tx: mpsc::Sender<ConverterEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<ConverterEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_log(&self, message: &str) {
        let _ = self.tx.send(ConverterEvent::Log(message.to_string()));
    }

    fn on_progress(&self, fraction: f64) {
        let _ = self.tx.send(ConverterEvent::Progress(fraction));
    }

    fn on_state_change(&self, state: JobStatus) {
        let _ = self.tx.send(ConverterEvent::StateChanged(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_default() {
        assert_eq!(JobStatus::default(), JobStatus::Idle);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
        assert!(JobStatus::FailedToStart.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Idle.is_terminal());
    }

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (sink, rx) = ChannelSink::new();
        sink.on_state_change(JobStatus::Running);
        sink.on_log("hello");
        sink.on_progress(0.5);

        let events: Vec<ConverterEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ConverterEvent::StateChanged(JobStatus::Running),
                ConverterEvent::Log("hello".to_string()),
                ConverterEvent::Progress(0.5),
            ]
        );
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_log("nobody listening");
    }
}
