//! Background process tracking and guaranteed teardown
//!
//! Every long-lived child the session spawns (dev server, log stream) is
//! registered here the moment it exists. Cleanup terminates the full
//! descendant tree of each tracked process -- a dev-server command is
//! commonly a shell wrapper around a deeper tool chain, and killing only the
//! shell leaves orphans -- in reverse registration order, exactly once, no
//! matter how many exit paths race to trigger it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::Child;
use tokio::sync::{oneshot, Mutex, Notify};

use devdroid_core::prelude::*;

/// Upper bound on waiting for a killed child to be reaped. Cleanup must
/// never hang behind a wedged process.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// One-way lifecycle: the first trigger to observe `Active` performs the
/// teardown; everyone else sees `CleaningUp`/`Done` and returns immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Active,
    CleaningUp,
    Done,
}

/// Registration record for one tracked background process.
///
/// The `Child` itself lives in a dedicated wait task (which captures the
/// real exit status); the record keeps what teardown needs.
struct TrackedProcess {
    label: String,
    pid: Option<u32>,
    /// Tells the wait task to force-kill the child. Consumed on first use
    /// (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
}

/// Lets the pipeline await a tracked process without owning it.
#[derive(Clone, Debug)]
pub struct WaitHandle {
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
}

impl WaitHandle {
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Wait until the process exits.
    ///
    /// The notified future is created before the exit check, so a
    /// notification firing between the check and the await cannot be missed.
    pub async fn wait(&self) {
        loop {
            let notified = self.exit_notify.notified();
            if self.has_exited() {
                return;
            }
            notified.await;
        }
    }
}

struct Inner {
    state: SupervisorState,
    tracked: Vec<TrackedProcess>,
}

/// Tracks every background process of the session and tears them all down
/// exactly once.
pub struct ProcessSupervisor {
    inner: Mutex<Inner>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SupervisorState::Active,
                tracked: Vec::new(),
            }),
        }
    }

    /// Register a freshly spawned child.
    ///
    /// Must be called before any fallible operation that follows the spawn,
    /// so cleanup can always find the process. The child is moved into a
    /// wait task; the returned handle observes its exit.
    pub async fn track(&self, label: impl Into<String>, mut child: Child) -> Result<WaitHandle> {
        let label = label.into();
        let pid = child.id();
        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        let mut inner = self.inner.lock().await;
        if inner.state != SupervisorState::Active {
            // No registrations once cleanup has started. Don't leak the
            // child either.
            let _ = child.start_kill();
            return Err(Error::process_spawn(format!(
                "shutdown in progress, refusing to track {label}"
            )));
        }

        debug!("Tracking {} (pid {:?})", label, pid);
        tokio::spawn(wait_for_exit(
            child,
            kill_rx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
            label.clone(),
        ));
        inner.tracked.push(TrackedProcess {
            label,
            pid,
            kill_tx: Some(kill_tx),
            exited: Arc::clone(&exited),
            exit_notify: Arc::clone(&exit_notify),
        });

        Ok(WaitHandle {
            exited,
            exit_notify,
        })
    }

    /// Terminate every tracked process, most recently started first.
    ///
    /// Idempotent and safe to invoke from multiple triggers: only the first
    /// caller does any work, and re-entrant calls return immediately.
    /// Returns the labels of the processes it terminated, in order.
    pub async fn cleanup(&self) -> Vec<String> {
        let tracked = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SupervisorState::Active => inner.state = SupervisorState::CleaningUp,
                SupervisorState::CleaningUp | SupervisorState::Done => return Vec::new(),
            }
            std::mem::take(&mut inner.tracked)
        };

        let mut terminated = Vec::new();
        // Reverse registration order: a process depending on an earlier one
        // (log stream on the launched app) goes down ahead of its dependency.
        for mut process in tracked.into_iter().rev() {
            if process.exited.load(Ordering::Acquire) {
                debug!("{} already exited", process.label);
                continue;
            }

            info!("Stopping {}", process.label);
            let tree_killed = process
                .pid
                .map(kill_process_tree)
                .unwrap_or(false);
            if !tree_killed {
                // Fall back to killing the direct child via its wait task.
                if let Some(tx) = process.kill_tx.take() {
                    let _ = tx.send(());
                }
            }

            let notified = process.exit_notify.notified();
            if !process.exited.load(Ordering::Acquire) {
                if tokio::time::timeout(REAP_TIMEOUT, notified).await.is_err() {
                    warn!("{} did not exit within {:?}", process.label, REAP_TIMEOUT);
                }
            }
            terminated.push(process.label);
        }

        self.inner.lock().await.state = SupervisorState::Done;
        restore_terminal();
        terminated
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task: owns the child, waits for it to exit, records the exit.
///
/// Two ways the task can end: the process exits naturally, or `kill_rx`
/// fires (sent by cleanup, or dropped with the registration record) and the
/// child is killed first.
async fn wait_for_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
    label: String,
) {
    tokio::select! {
        result = child.wait() => {
            match result {
                Ok(status) => debug!("{} exited with status {:?}", label, status.code()),
                Err(e) => error!("Error waiting for {}: {}", label, e),
            }
        }
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                error!("Failed to kill {}: {}", label, e);
            }
            match child.wait().await {
                Ok(status) => debug!("{} killed, exit status {:?}", label, status.code()),
                Err(e) => error!("Error waiting after killing {}: {}", label, e),
            }
        }
    }

    // Order matters: waiters must observe has_exited() == true when woken.
    exited.store(true, Ordering::Release);
    exit_notify.notify_waiters();
}

/// Forcefully terminate a process and all of its descendants.
///
/// Descendants are collected breadth-first from the live process table and
/// killed deepest-first, the root last. Returns `false` when the root is
/// already gone or could not be signalled, letting the caller fall back to
/// direct child termination.
fn kill_process_tree(root: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let root_pid = Pid::from_u32(root);
    if sys.process(root_pid).is_none() {
        return false;
    }

    let mut order = vec![root_pid];
    let mut index = 0;
    while index < order.len() {
        let parent = order[index];
        for (pid, process) in sys.processes() {
            if process.parent() == Some(parent) && !order.contains(pid) {
                order.push(*pid);
            }
        }
        index += 1;
    }

    let mut root_killed = false;
    for pid in order.iter().rev() {
        if let Some(process) = sys.process(*pid) {
            let killed = process.kill();
            trace!("kill {} -> {}", pid, killed);
            if *pid == root_pid {
                root_killed = killed;
            }
        }
    }
    root_killed
}

/// Best-effort restoration of the terminal's input processing mode.
///
/// A killed child can leave raw mode enabled, making the terminal unable to
/// accept interrupt keystrokes. Idempotent.
fn restore_terminal() {
    if crossterm::terminal::is_raw_mode_enabled().unwrap_or(false) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    /// A child that stays alive until killed.
    fn sleeper() -> Child {
        Command::new("sh")
            .args(["-c", "sleep 60"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("sh must be available in test environment")
    }

    /// A child that exits immediately.
    fn short_lived() -> Child {
        Command::new("sh")
            .args(["-c", "true"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("sh must be available in test environment")
    }

    #[tokio::test]
    async fn test_cleanup_terminates_in_reverse_registration_order() {
        let supervisor = ProcessSupervisor::new();
        supervisor.track("a", sleeper()).await.unwrap();
        supervisor.track("b", sleeper()).await.unwrap();
        supervisor.track("c", sleeper()).await.unwrap();

        let terminated = supervisor.cleanup().await;
        assert_eq!(terminated, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let supervisor = ProcessSupervisor::new();
        supervisor.track("dev server", sleeper()).await.unwrap();

        let first = supervisor.cleanup().await;
        let second = supervisor.cleanup().await;
        assert_eq!(first, vec!["dev server"]);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_cleanup_runs_once() {
        let supervisor = Arc::new(ProcessSupervisor::new());
        supervisor.track("x", sleeper()).await.unwrap();

        let (first, second) = tokio::join!(supervisor.cleanup(), supervisor.cleanup());
        // whichever trigger won did the work; the other observed the state
        // flag and did nothing
        assert_eq!(first.len() + second.len(), 1);
    }

    #[tokio::test]
    async fn test_track_after_cleanup_is_rejected() {
        let supervisor = ProcessSupervisor::new();
        supervisor.cleanup().await;

        let err = supervisor.track("late", sleeper()).await.unwrap_err();
        assert!(matches!(err, Error::ProcessSpawn { .. }));
    }

    #[tokio::test]
    async fn test_wait_handle_observes_exit() {
        let supervisor = ProcessSupervisor::new();
        let handle = supervisor.track("quick", short_lived()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("process should exit promptly");
        assert!(handle.has_exited());
    }

    #[tokio::test]
    async fn test_cleanup_skips_already_exited_processes() {
        let supervisor = ProcessSupervisor::new();
        let handle = supervisor.track("quick", short_lived()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("process should exit promptly");

        let terminated = supervisor.cleanup().await;
        assert!(terminated.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_kills_descendant_tree() {
        // sh spawns a grandchild sleep; killing only sh would orphan it
        let child = Command::new("sh")
            .args(["-c", "sleep 60 & wait"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("sh must be available in test environment");

        let supervisor = ProcessSupervisor::new();
        let handle = supervisor.track("wrapper", child).await.unwrap();

        let terminated = supervisor.cleanup().await;
        assert_eq!(terminated, vec!["wrapper"]);
        assert!(handle.has_exited());
    }
}
