// Background task that owns one live quest process.

use super::{LifecycleMonitor, LifecycleState};
use crate::logging::ENGINE_TARGET;
use crate::metrics::Metrics;
use crate::services::console::{ConsoleInput, pump_lines};
use crate::services::launcher::QuestProcessHandle;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at};

/// Everything a live run holds on to: the child, its input, and the tasks
/// draining its output.
///
/// [`release`](Self::release) tears it all down and is safe to call more
/// than once.
pub(super) struct ProcessResources {
    pid: u32,
    child: Child,
    input: ConsoleInput,
    readers: Vec<JoinHandle<usize>>,
    released: bool,
}

impl ProcessResources {
    /// Take over a spawned process and start draining its output streams.
    pub(super) fn new(
        mut handle: QuestProcessHandle,
        input: ConsoleInput,
        output_tx: mpsc::UnboundedSender<String>,
        metrics: &Arc<Metrics>,
    ) -> Self {
        let pid = handle.pid();
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = handle.stdout.take() {
            let metrics = Arc::clone(metrics);
            readers.push(tokio::spawn(pump_lines(stdout, move |line| {
                metrics.record_output_line();
                // Keep draining even when nobody reads the output anymore
                let _ = output_tx.send(line);
            })));
        }

        if let Some(stderr) = handle.stderr.take() {
            readers.push(tokio::spawn(pump_lines(stderr, move |line| {
                tracing::warn!(target: ENGINE_TARGET, "[pid {}] {}", pid, line);
            })));
        }

        Self {
            pid,
            child: handle.child,
            input,
            readers,
            released: false,
        }
    }

    /// Wait until the process exits or a stop is requested.
    ///
    /// Returns the exit status (if the OS reported one) and whether the run
    /// ended because of a stop request.
    async fn wait_or_stop(
        &mut self,
        stop_rx: &mut watch::Receiver<bool>,
        grace: Duration,
    ) -> (Option<ExitStatus>, bool) {
        if !*stop_rx.borrow_and_update() {
            tokio::select! {
                status = self.child.wait() => {
                    let status = status
                        .map_err(|e| tracing::warn!("Failed to wait for pid {}: {}", self.pid, e))
                        .ok();
                    return (status, false);
                }
                _ = stop_signalled(stop_rx) => {}
            }
        }

        (self.terminate(grace).await, true)
    }

    async fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        tracing::info!("Asking quest (pid {}) to exit", self.pid);
        self.request_graceful_exit();

        match timeout(grace, self.child.wait()).await {
            Ok(status) => status.ok(),
            Err(_) => {
                tracing::warn!(
                    "Quest (pid {}) still alive {:?} after stop request, killing it",
                    self.pid,
                    grace
                );
                if let Err(e) = self.child.kill().await {
                    tracing::warn!("Failed to kill pid {}: {}", self.pid, e);
                }
                self.child.wait().await.ok()
            }
        }
    }

    #[cfg(unix)]
    fn request_graceful_exit(&mut self) {
        // id() is None once the child has been reaped
        let Some(pid) = self.child.id() else {
            return;
        };
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            tracing::debug!("SIGTERM to pid {} failed: {}", pid, err);
        }
    }

    #[cfg(not(unix))]
    fn request_graceful_exit(&mut self) {
        // No polite termination signal here; go straight to a forced stop
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("Failed to stop pid {}: {}", self.pid, e);
        }
    }

    /// Close the input and wait for the output readers to flush.
    ///
    /// A console write stuck on a full pipe is cancelled. Readers share one
    /// `grace` deadline; those still blocked after it (a grandchild holding
    /// the pipe open) are aborted.
    pub(super) async fn release(&mut self, grace: Duration) {
        if self.released {
            return;
        }
        self.released = true;

        if !self.input.close(grace).await {
            tracing::warn!("Input of pid {} still busy after exit, abandoning it", self.pid);
        }

        let deadline = tokio::time::Instant::now() + grace;
        for reader in self.readers.drain(..) {
            let abort = reader.abort_handle();
            match timeout_at(deadline, reader).await {
                Ok(Ok(lines)) => {
                    tracing::debug!("Output reader for pid {} finished after {} lines", self.pid, lines);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Output reader for pid {} failed: {}", self.pid, e);
                }
                Err(_) => {
                    tracing::warn!("Output of pid {} still open after exit, abandoning it", self.pid);
                    abort.abort();
                }
            }
        }
    }
}

async fn stop_signalled(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        if stop_rx.changed().await.is_err() {
            // Sender gone: no stop can arrive anymore
            std::future::pending::<()>().await;
        }
        if *stop_rx.borrow_and_update() {
            return;
        }
    }
}

/// Supervise one run from `Running` to its terminal state.
///
/// The terminal event is published only after the process is confirmed dead
/// and its output has been flushed to the run's [`ConsoleOutput`](crate::services::console::ConsoleOutput).
pub(super) async fn supervise(
    monitor: LifecycleMonitor,
    mut resources: ProcessResources,
    mut stop_rx: watch::Receiver<bool>,
) {
    let grace = monitor.grace_period();
    let started = Instant::now();

    let (status, stopped) = resources.wait_or_stop(&mut stop_rx, grace).await;
    resources.release(grace).await;

    let elapsed = started.elapsed();
    monitor.metrics.record_run_time(elapsed);

    let terminal = if stopped {
        monitor.metrics.record_killed();
        LifecycleState::Killed
    } else {
        let code = status.and_then(|s| s.code()).unwrap_or(-1);
        monitor.metrics.record_exit(code);
        LifecycleState::Exited { code }
    };

    tracing::info!(
        "Quest (pid {}) {} after {:.2}s",
        resources.pid,
        terminal,
        elapsed.as_secs_f32()
    );

    monitor.finish(terminal);
}
