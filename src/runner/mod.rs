// Quest runner - coordinates the locator, launcher, lifecycle monitor and
// console bridge for the front-end.
//
// Flow of a run request:
// 1. Reject early if a quest is already launching or running
// 2. Validate the quest path (QuestLocator)
// 3. Reserve the monitor (Idle -> Launching)
// 4. Spawn the engine (ProcessLauncher); failure -> LaunchFailed
// 5. Hand the process to the monitor (Launching -> Running)

use crate::metrics::Metrics;
use crate::models::{ConsoleCommand, LauncherSettings, QuestDescriptor, RunConfiguration};
use crate::services::{
    ConsoleBridge, ConsoleError, ConsoleOutput, LaunchError, LocatorError, ProcessLauncher,
    QuestLocator,
};
use crate::state::{LifecycleEvent, LifecycleMonitor, LifecycleState, MonitorError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors returned to the caller of [`QuestRunner::run_quest`]
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    NotAQuest(#[from] LocatorError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("a quest is already running; stop it first")]
    AlreadyRunning,

    #[error(transparent)]
    Lifecycle(MonitorError),
}

impl From<MonitorError> for RunError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::AlreadyRunning => RunError::AlreadyRunning,
            other => RunError::Lifecycle(other),
        }
    }
}

/// A quest that was successfully started
#[derive(Debug)]
pub struct StartedQuest {
    pub descriptor: QuestDescriptor,
    pub pid: u32,

    /// Lines printed by the quest, until it exits
    pub output: ConsoleOutput,
}

/// Runs one quest at a time on the external engine.
///
/// This is the entry point for front-ends. It owns the four runner components
/// and keeps them pointed at the same [`LifecycleMonitor`].
///
/// # Example
/// ```ignore
/// let runner = QuestRunner::new(&user_config.launcher_settings);
/// let mut events = runner.subscribe();
///
/// let run = RunConfiguration::from_settings("quests/zsdx", &user_config.launcher_settings);
/// let mut quest = runner.run_quest(run).await?;
///
/// runner.send("print(sol.main.get_quest_version())").await?;
/// while let Some(line) = quest.output.next_line().await {
///     println!("{}", line);
/// }
/// ```
pub struct QuestRunner {
    locator: QuestLocator,
    launcher: ProcessLauncher,
    monitor: LifecycleMonitor,
    console: ConsoleBridge,
    metrics: Arc<Metrics>,
}

impl QuestRunner {
    /// Create a runner from the user's launcher settings
    pub fn new(settings: &LauncherSettings) -> Self {
        Self::with_metrics(settings, Arc::new(Metrics::new()))
    }

    /// Create a runner that records into shared metrics
    pub fn with_metrics(settings: &LauncherSettings, metrics: Arc<Metrics>) -> Self {
        let monitor = LifecycleMonitor::new(settings.stop_grace_period(), Arc::clone(&metrics));
        let console = ConsoleBridge::new(monitor.clone(), Arc::clone(&metrics));

        Self {
            locator: QuestLocator::new(),
            launcher: ProcessLauncher::new(settings.engine_exe.as_str()),
            monitor,
            console,
            metrics,
        }
    }

    /// Validate and start a quest.
    ///
    /// # Errors
    ///
    /// - [`RunError::AlreadyRunning`] while another quest is launching or
    ///   running; the running quest is not affected
    /// - [`RunError::NotAQuest`] if the path holds no quest; the lifecycle
    ///   state is left untouched
    /// - [`RunError::Launch`] if the engine could not be started; the
    ///   monitor records `LaunchFailed`
    pub async fn run_quest(&self, run: RunConfiguration) -> Result<StartedQuest, RunError> {
        if self.monitor.state().is_active() {
            tracing::warn!("Run of {} rejected: a quest is already running", run.quest_path);
            return Err(RunError::AlreadyRunning);
        }

        let descriptor = self.locator.validate(&run.quest_path)?;
        tracing::info!(
            "Starting quest '{}' ({}) from {}",
            descriptor.title(),
            descriptor.version(),
            descriptor.root()
        );

        self.monitor.begin_launch()?;

        let handle = match self.launcher.launch(&descriptor, &run) {
            Ok(handle) => handle,
            Err(e) => {
                self.monitor.fail_launch(e.to_string())?;
                return Err(e.into());
            }
        };

        let pid = handle.pid();
        let output = self.monitor.attach(handle)?;

        Ok(StartedQuest {
            descriptor,
            pid,
            output,
        })
    }

    /// Send a console command to the running quest
    pub async fn send(&self, command: impl Into<ConsoleCommand>) -> Result<(), ConsoleError> {
        self.console.send(command).await
    }

    /// Stop the running quest; no-op when none is running.
    ///
    /// Returns the state after the stop completed.
    pub async fn stop(&self) -> LifecycleState {
        self.monitor.stop().await
    }

    /// Return to `Idle` after a run ended
    pub fn acknowledge(&self) -> bool {
        self.monitor.acknowledge()
    }

    pub fn state(&self) -> LifecycleState {
        self.monitor.state()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.monitor.subscribe()
    }

    pub fn locator(&self) -> &QuestLocator {
        &self.locator
    }

    pub fn console(&self) -> &ConsoleBridge {
        &self.console
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn quest_dir() -> (TempDir, camino::Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::write(root.join("quest.dat"), "quest{ title = \"Test\" }").unwrap();
        (temp_dir, root)
    }

    #[tokio::test]
    async fn test_missing_program_never_spawns() {
        let (_temp_dir, root) = quest_dir();
        let runner = QuestRunner::new(&LauncherSettings::default());
        let mut rx = runner.subscribe();

        let result = runner.run_quest(RunConfiguration::new(root)).await;

        assert!(matches!(result, Err(RunError::Launch(LaunchError::MissingProgram))));
        assert_eq!(rx.try_recv().unwrap().current, LifecycleState::Launching);
        assert_eq!(
            rx.try_recv().unwrap().current,
            LifecycleState::LaunchFailed {
                reason: "no program name".to_string()
            }
        );
        assert_eq!(runner.metrics().runs_started.load(Ordering::Relaxed), 0);
        assert_eq!(runner.metrics().launch_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_not_a_quest_leaves_state_idle() {
        let temp_dir = TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let runner = QuestRunner::new(&LauncherSettings::default());

        let result = runner.run_quest(RunConfiguration::new(root)).await;

        assert!(matches!(result, Err(RunError::NotAQuest(_))));
        assert_eq!(runner.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_send_and_stop_without_quest() {
        let runner = QuestRunner::new(&LauncherSettings::default());

        assert!(matches!(runner.send("x = 1").await, Err(ConsoleError::NotRunning)));
        assert_eq!(runner.stop().await, LifecycleState::Idle);
        assert!(!runner.acknowledge());
    }

    #[test]
    fn test_monitor_error_mapping() {
        assert!(matches!(
            RunError::from(MonitorError::AlreadyRunning),
            RunError::AlreadyRunning
        ));
        let invalid = MonitorError::InvalidTransition {
            from: LifecycleState::Idle,
            to: LifecycleState::Killed,
        };
        assert!(matches!(RunError::from(invalid), RunError::Lifecycle(_)));
    }
}
