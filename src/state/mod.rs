// Lifecycle monitor
//
// Owns the single active quest process and tracks it through an explicit
// state machine, broadcasting every transition so callers never poll.

mod supervisor;

use crate::metrics::Metrics;
use crate::services::console::{ConsoleInput, ConsoleOutput};
use crate::services::launcher::QuestProcessHandle;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

/// Default time a quest gets to exit after a graceful stop request
pub const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Where a quest run currently stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// No run in progress; ready for a new one
    Idle,

    /// Run accepted, engine being spawned
    Launching,

    /// Engine process alive
    Running { pid: u32 },

    /// Process ended on its own. `-1` when the OS gave no exit code.
    Exited { code: i32 },

    /// Process ended after a stop request
    Killed,

    /// Engine could not be started; no process exists
    LaunchFailed { reason: String },
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Exited { .. } | LifecycleState::Killed | LifecycleState::LaunchFailed { .. }
        )
    }

    /// Launching or running: a new run would be rejected
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Launching | LifecycleState::Running { .. })
    }

    /// Whether the state machine allows moving from `self` to `to`
    pub fn can_transition_to(&self, to: &LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, to) {
            (Idle, Launching) => true,
            (Launching, Running { .. }) | (Launching, LaunchFailed { .. }) => true,
            (Running { .. }, Exited { .. }) | (Running { .. }, Killed) => true,
            (from, Idle) => from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::Launching => write!(f, "launching"),
            LifecycleState::Running { pid } => write!(f, "running (pid {})", pid),
            LifecycleState::Exited { code } => write!(f, "exited with code {}", code),
            LifecycleState::Killed => write!(f, "killed"),
            LifecycleState::LaunchFailed { reason } => write!(f, "launch failed: {}", reason),
        }
    }
}

/// Emitted on every lifecycle transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub previous: LifecycleState,
    pub current: LifecycleState,
}

/// Errors raised by the monitor itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("a quest is already running")]
    AlreadyRunning,

    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// Per-run control data, present from `begin_launch` until teardown
struct RunSlot {
    stop_tx: watch::Sender<bool>,
    input: Option<ConsoleInput>,
}

struct MonitorInner {
    state: LifecycleState,
    run: Option<RunSlot>,
}

/// Tracks the launcher's single quest process from launch to termination.
///
/// The monitor is the only owner of the live process: [`attach`](Self::attach)
/// consumes the [`QuestProcessHandle`] and hands the child to a background
/// supervisor task. Clones share the same state, so the console bridge and
/// the runner can each hold one.
///
/// # Usage
///
/// - [`subscribe()`](Self::subscribe) for lifecycle events
/// - [`stop()`](Self::stop) to end the run (no-op when nothing runs)
/// - [`acknowledge()`](Self::acknowledge) to return to `Idle` after a run ended
#[derive(Clone)]
pub struct LifecycleMonitor {
    inner: Arc<RwLock<MonitorInner>>,

    /// Broadcast channel for lifecycle events
    event_tx: broadcast::Sender<LifecycleEvent>,

    grace_period: Duration,

    metrics: Arc<Metrics>,
}

impl LifecycleMonitor {
    /// Create an idle monitor
    ///
    /// # Arguments
    /// * `grace_period` - How long a stopped quest may take to exit before it is killed
    /// * `metrics` - Shared counters for run outcomes
    pub fn new(grace_period: Duration, metrics: Arc<Metrics>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(RwLock::new(MonitorInner {
                state: LifecycleState::Idle,
                run: None,
            })),
            event_tx,
            grace_period,
            metrics,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.read_inner().state.clone()
    }

    /// Subscribe to lifecycle events
    ///
    /// Returns a receiver that gets every transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Input of the running quest, if one is running
    pub fn console_input(&self) -> Option<ConsoleInput> {
        let inner = self.read_inner();
        match inner.state {
            LifecycleState::Running { .. } => inner.run.as_ref().and_then(|run| run.input.clone()),
            _ => None,
        }
    }

    /// Reserve the monitor for a new run and enter `Launching`.
    ///
    /// A terminal state left over from the previous run is acknowledged
    /// first. Fails with [`MonitorError::AlreadyRunning`] while a run is
    /// launching or running.
    pub fn begin_launch(&self) -> Result<(), MonitorError> {
        let mut inner = self.write_inner();

        if inner.state.is_active() {
            tracing::warn!("Run rejected: quest already {}", inner.state);
            return Err(MonitorError::AlreadyRunning);
        }
        if inner.state.is_terminal() {
            self.apply(&mut inner, LifecycleState::Idle)?;
        }

        self.apply(&mut inner, LifecycleState::Launching)?;
        let (stop_tx, _) = watch::channel(false);
        inner.run = Some(RunSlot { stop_tx, input: None });
        Ok(())
    }

    /// Record that the engine could not be started.
    pub fn fail_launch(&self, reason: impl Into<String>) -> Result<(), MonitorError> {
        let mut inner = self.write_inner();
        self.apply(
            &mut inner,
            LifecycleState::LaunchFailed {
                reason: reason.into(),
            },
        )?;
        inner.run = None;
        self.metrics.record_launch_failed();
        Ok(())
    }

    /// Take ownership of a freshly spawned process and enter `Running`.
    ///
    /// Starts the supervisor task (which drains output and waits for exit)
    /// and returns the run's output stream. Must be called from within a
    /// tokio runtime.
    pub fn attach(&self, mut handle: QuestProcessHandle) -> Result<ConsoleOutput, MonitorError> {
        let pid = handle.pid();
        let (stop_rx, input) = {
            let mut inner = self.write_inner();
            if let Err(e) = self.apply(&mut inner, LifecycleState::Running { pid }) {
                drop(inner);
                tracing::error!("Refusing to supervise pid {}: {}", pid, e);
                discard_process(handle);
                return Err(e);
            }

            let input = ConsoleInput::new(handle.stdin.take());
            let run = inner
                .run
                .get_or_insert_with(|| RunSlot {
                    stop_tx: watch::channel(false).0,
                    input: None,
                });
            run.input = Some(input.clone());
            (run.stop_tx.subscribe(), input)
        };

        self.metrics.record_run_started();

        let (output_tx, output) = ConsoleOutput::channel();
        let resources = supervisor::ProcessResources::new(handle, input, output_tx, &self.metrics);
        tokio::spawn(supervisor::supervise(self.clone(), resources, stop_rx));

        Ok(output)
    }

    /// Stop the running quest.
    ///
    /// Asks the process to terminate, escalates to a kill after the grace
    /// period, and returns once the terminal state has been published. A stop
    /// during `Launching` takes effect as soon as the process is attached.
    /// In any other state this is a no-op returning the unchanged state.
    pub async fn stop(&self) -> LifecycleState {
        // Subscribe before looking at the state so the terminal event cannot be missed
        let mut events = self.subscribe();
        {
            let inner = self.read_inner();
            if !inner.state.is_active() {
                tracing::debug!("Stop ignored: quest is {}", inner.state);
                return inner.state.clone();
            }
            if let Some(run) = &inner.run {
                run.stop_tx.send_replace(true);
            }
        }
        tracing::info!("Stop requested");

        loop {
            match events.recv().await {
                Ok(event) if event.current.is_terminal() => return event.current,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Stop waiter lagged by {} events", skipped);
                    let state = self.state();
                    if !state.is_active() {
                        return state;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return self.state(),
            }
        }
    }

    /// Return to `Idle` after a terminal state. Returns whether anything changed.
    pub fn acknowledge(&self) -> bool {
        let mut inner = self.write_inner();
        if !inner.state.is_terminal() {
            return false;
        }
        self.apply(&mut inner, LifecycleState::Idle).is_ok()
    }

    /// Publish the terminal state of a supervised run and drop its slot.
    pub(crate) fn finish(&self, terminal: LifecycleState) {
        let mut inner = self.write_inner();
        if let Err(e) = self.apply(&mut inner, terminal) {
            tracing::error!("Failed to record end of run: {}", e);
        }
        inner.run = None;
    }

    fn apply(&self, inner: &mut MonitorInner, to: LifecycleState) -> Result<(), MonitorError> {
        if !inner.state.can_transition_to(&to) {
            return Err(MonitorError::InvalidTransition {
                from: inner.state.clone(),
                to,
            });
        }

        let previous = std::mem::replace(&mut inner.state, to);
        tracing::debug!("Lifecycle: {} -> {}", previous, inner.state);

        let event = LifecycleEvent {
            previous,
            current: inner.state.clone(),
        };
        // Ignore send errors - it's OK if no one is listening
        let _ = self.event_tx.send(event);
        Ok(())
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, MonitorInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, MonitorInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Kill a process nobody will supervise and reap it in the background.
fn discard_process(handle: QuestProcessHandle) {
    let pid = handle.pid();
    let mut child = handle.child;
    if let Err(e) = child.start_kill() {
        tracing::warn!("Failed to kill pid {}: {}", pid, e);
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = child.wait().await {
            tracing::warn!("Failed to wait for pid {}: {}", pid, e);
        }
    });
}

impl Default for LifecycleMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_GRACE_PERIOD, Arc::new(Metrics::new()))
    }
}
