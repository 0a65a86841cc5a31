//! Cancellation of the in-flight ffmpeg process.
//!
//! A cancel first asks ffmpeg to stop (`q` on stdin, then a terminate signal)
//! and arms a grace timer; if the process is still alive when the timer fires
//! it is killed. A forced cancel, or a polite request that could not be
//! delivered at all, kills immediately.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

/// Time ffmpeg gets to exit after a polite stop before it is killed
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(1500);

/// The single process a runner currently owns
#[derive(Debug)]
pub(crate) struct ActiveProcess {
    pub run_id: Uuid,
    pub output_path: PathBuf,
    pub cancelled: bool,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl ActiveProcess {
    pub fn new(run_id: Uuid, mut child: Child, output_path: PathBuf) -> Self {
        let stdin = child.stdin.take();
        Self {
            run_id,
            output_path,
            cancelled: false,
            child,
            stdin,
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Ask ffmpeg to quit; true if any stop request reached the process
    fn request_stop(&mut self) -> bool {
        let quit_sent = match self.stdin.take() {
            Some(mut stdin) => stdin.write_all(b"q").and_then(|_| stdin.flush()).is_ok(),
            None => false,
        };
        let term_sent = send_terminate(self.pid());
        debug!(pid = self.pid(), quit_sent, term_sent, "polite stop requested");
        quit_sent || term_sent
    }

    /// Unconditional kill; does nothing once an exit status is available
    fn kill_now(&mut self) {
        if self.has_exited() {
            debug!(pid = self.pid(), "process already exited, skipping kill");
            return;
        }
        let pid = self.pid();
        if kill_tree(pid) {
            info!(pid, "ffmpeg process tree killed");
            return;
        }
        match self.child.kill() {
            Ok(()) => info!(pid, "ffmpeg process killed"),
            Err(e) => warn!(pid, error = %e, "failed to kill ffmpeg process"),
        }
    }
}

/// Holder of the at-most-one active process, shared between a runner and its cancel handles
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<Option<ActiveProcess>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveProcess>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn register(&self, process: ActiveProcess) {
        let mut guard = self.lock();
        if let Some(previous) = guard.as_ref() {
            warn!(
                previous = %previous.run_id,
                next = %process.run_id,
                "replacing an active conversion; only one run should be active at a time"
            );
        }
        *guard = Some(process);
    }

    /// Exit status of the registered run, without blocking
    pub(crate) fn poll_exit(&self, run_id: Uuid) -> io::Result<Option<ExitStatus>> {
        match self.lock().as_mut() {
            Some(active) if active.run_id == run_id => active.child.try_wait(),
            _ => Err(io::Error::other("conversion process is no longer registered")),
        }
    }

    /// Clear the active marker for a finished run and hand back its record
    pub(crate) fn release(&self, run_id: Uuid) -> Option<ActiveProcess> {
        let mut guard = self.lock();
        match guard.as_ref() {
            Some(active) if active.run_id == run_id => guard.take(),
            _ => None,
        }
    }

    fn cancel(&self, force: bool, grace: Duration) -> bool {
        let mut guard = self.lock();
        let Some(active) = guard.as_mut() else {
            debug!("cancel requested with no active conversion");
            return false;
        };

        active.cancelled = true;
        info!(
            run_id = %active.run_id,
            pid = active.pid(),
            output = %active.output_path.display(),
            force,
            "cancelling conversion"
        );

        let delivered = active.request_stop();
        if force || !delivered {
            active.kill_now();
            return true;
        }

        let run_id = active.run_id;
        drop(guard);

        let registry = self.clone();
        let timer = thread::Builder::new()
            .name("cancel-grace".to_string())
            .spawn(move || {
                thread::sleep(grace);
                registry.escalate(run_id);
            });
        if let Err(e) = timer {
            warn!(error = %e, "could not arm cancel grace timer, killing now");
            self.escalate(run_id);
        }
        true
    }

    fn escalate(&self, run_id: Uuid) {
        if let Some(active) = self.lock().as_mut().filter(|a| a.run_id == run_id) {
            debug!(run_id = %run_id, "grace period over, escalating");
            active.kill_now();
        }
    }
}

/// Cloneable handle that cancels whatever run its registry currently holds
#[derive(Debug, Clone)]
pub struct CancelHandle {
    registry: ProcessRegistry,
    grace: Duration,
}

impl CancelHandle {
    pub fn new(registry: ProcessRegistry, grace: Duration) -> Self {
        Self { registry, grace }
    }

    /// Cancel the active run. Returns false (and does nothing) when no run is active.
    pub fn cancel(&self, force: bool) -> bool {
        self.registry.cancel(force, self.grace)
    }

    pub fn is_active(&self) -> bool {
        self.registry.is_active()
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .output()
        .is_ok_and(|o| o.status.success())
}

#[cfg(windows)]
fn send_terminate(pid: u32) -> bool {
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .output()
        .is_ok_and(|o| o.status.success())
}

#[cfg(not(any(unix, windows)))]
fn send_terminate(_pid: u32) -> bool {
    false
}

/// Windows needs the whole tree killed by pid; elsewhere `Child::kill` is enough
#[cfg(windows)]
fn kill_tree(pid: u32) -> bool {
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .is_ok_and(|o| o.status.success())
}

#[cfg(not(windows))]
fn kill_tree(_pid: u32) -> bool {
    false
}
