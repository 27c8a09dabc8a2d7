//! Subprocess execution that can be terminated from another thread
//!
//! The thread that calls [`ProcessSlot::run`] owns the child: it parks the
//! `Child` in the slot while polling for exit and takes it back out to collect
//! the status. Other threads only ever signal the child through
//! [`ProcessSlot::terminate`], and they do so while holding the slot lock, so
//! the pid they signal can't have been reaped (and recycled) underneath them.
//!
//! A terminated slot stays closed: anything started on it afterwards is
//! killed as soon as it is spawned.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Captured result of an external tool invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// What a termination request ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No subprocess was attached
    NotRunning,
    /// The subprocess exited within the grace period
    Terminated,
    /// The grace period elapsed and the subprocess was killed
    Killed,
}

/// Holder for the in-flight subprocess of a job
pub struct ProcessSlot {
    child: Mutex<Option<Child>>,
    /// Set by `terminate`, only ever under the `child` lock
    closed: AtomicBool,
    poll_interval: Duration,
}

impl ProcessSlot {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            child: Mutex::new(None),
            closed: AtomicBool::new(false),
            poll_interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while a subprocess is attached
    pub fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }

    /// Run a command to completion, capturing stdout/stderr as text
    ///
    /// Blocks until the process exits, whether on its own or because
    /// another thread called [`terminate`](Self::terminate).
    pub fn run(&self, cmd: &mut Command) -> Result<CommandOutput, String> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("Failed to spawn {:?}: {}", cmd.get_program(), e))?;

        // Drain both pipes on their own threads so a chatty process can't
        // block on a full pipe while we poll for its exit.
        let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
        let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

        {
            let mut guard = self.lock();
            if self.closed.load(Ordering::SeqCst) {
                drop(guard);
                let _ = child.kill();
                let _ = child.wait();
                join_pipe_reader(stdout_reader);
                join_pipe_reader(stderr_reader);
                return Err("Subprocess cancelled".to_string());
            }
            *guard = Some(child);
        }
        let status = self.wait_for_exit();

        let stdout = join_pipe_reader(stdout_reader);
        let stderr = join_pipe_reader(stderr_reader);

        Ok(CommandOutput {
            status: status?,
            stdout,
            stderr,
        })
    }

    fn wait_for_exit(&self) -> Result<ExitStatus, String> {
        loop {
            {
                let mut guard = self.lock();
                let Some(child) = guard.as_mut() else {
                    return Err("Subprocess handle vanished while waiting".to_string());
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        guard.take();
                        return Ok(status);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        if let Some(mut child) = guard.take() {
                            let _ = child.kill();
                            let _ = child.wait();
                        }
                        return Err(format!("Failed to wait for subprocess: {}", e));
                    }
                }
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Ask the attached subprocess to exit, escalating to a kill after `grace`
    ///
    /// Never collects the exit status; the running thread does that. Closes
    /// the slot whether or not anything was running.
    pub fn terminate(&self, grace: Duration) -> Termination {
        {
            let mut guard = self.lock();
            self.closed.store(true, Ordering::SeqCst);
            let Some(child) = guard.as_mut() else {
                return Termination::NotRunning;
            };
            request_exit(child);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_occupied() {
                return Termination::Terminated;
            }
            thread::sleep(self.poll_interval);
        }

        let mut guard = self.lock();
        match guard.as_mut() {
            Some(child) => {
                if let Err(e) = child.kill() {
                    log::warn!("Failed to kill subprocess {}: {}", child.id(), e);
                }
                Termination::Killed
            }
            None => Termination::Terminated,
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    let Ok(pid) = i32::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: the child has not been reaped (we hold the slot lock and only
    // the owning thread reaps under that lock), so `pid` still names it.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        log::debug!("SIGTERM to {} failed: {}", pid, std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    // No graceful signal available; TerminateProcess is the only option
    let _ = child.kill();
}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_pipe_reader(reader: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
