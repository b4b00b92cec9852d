// Run metrics module
//
// Provides lightweight counters for quest runs and console traffic

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Launcher-wide run metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// The supervisor and console tasks update these from tokio workers; the
/// binary logs a summary on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Number of quest processes that reached `Running`
    pub runs_started: AtomicUsize,

    /// Runs that exited on their own with code 0
    pub clean_exits: AtomicUsize,

    /// Runs that exited on their own with a nonzero code
    pub crashes: AtomicUsize,

    /// Runs ended by a stop request
    pub kills: AtomicUsize,

    /// Run requests where the engine could not be started
    pub launch_failures: AtomicUsize,

    /// Console commands written to a quest
    pub commands_sent: AtomicU64,

    /// Output lines relayed from quests
    pub output_lines: AtomicU64,

    /// Total time quests spent running, in milliseconds
    pub total_run_time_ms: AtomicU64,

    /// Launcher start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            runs_started: AtomicUsize::new(0),
            clean_exits: AtomicUsize::new(0),
            crashes: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
            launch_failures: AtomicUsize::new(0),
            commands_sent: AtomicU64::new(0),
            output_lines: AtomicU64::new(0),
            total_run_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a process exit, classifying it by exit code
    pub fn record_exit(&self, code: i32) {
        if code == 0 {
            self.clean_exits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.crashes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_killed(&self) {
        self.kills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_launch_failed(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_output_line(&self) {
        self.output_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long a run lasted
    pub fn record_run_time(&self, duration: Duration) {
        self.total_run_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Number of runs that have ended, whatever the outcome
    pub fn finished_runs(&self) -> usize {
        self.clean_exits.load(Ordering::Relaxed)
            + self.crashes.load(Ordering::Relaxed)
            + self.kills.load(Ordering::Relaxed)
    }

    /// Get average run time in milliseconds
    pub fn avg_run_time_ms(&self) -> f64 {
        let total = self.total_run_time_ms.load(Ordering::Relaxed);
        let count = self.finished_runs();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Launcher Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Runs: {} started, {} clean exits, {} crashes, {} stopped, {} failed to launch",
            self.runs_started.load(Ordering::Relaxed),
            self.clean_exits.load(Ordering::Relaxed),
            self.crashes.load(Ordering::Relaxed),
            self.kills.load(Ordering::Relaxed),
            self.launch_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total run time: {:.2}s (avg: {:.2}ms per run)",
            self.total_run_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_run_time_ms()
        );
        tracing::info!(
            "Console: {} commands sent, {} output lines",
            self.commands_sent.load(Ordering::Relaxed),
            self.output_lines.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
