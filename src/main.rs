//! Quest Launcher - runs a quest on the external engine from a terminal.
//!
//! # Usage
//!
//! ```text
//! quest-launcher <quest-path> [--config-dir DIR]
//! ```
//!
//! # Overview
//!
//! This binary is a headless front-end over [`QuestRunner`]. It initializes:
//! - Configuration loading ([`ConfigManager`], `Launcher Data/` by default)
//! - Logging infrastructure (file rotation + console output on stderr)
//! - Tokio async runtime (multi-thread, for the process supervisor and pipes)
//!
//! While the quest runs:
//! - every line typed on stdin is sent to the quest as a console command
//! - every line the quest prints is written to stdout
//! - lifecycle transitions are logged
//! - Ctrl-C stops the quest (graceful, then forced after the grace period)
//!
//! The process exits with the quest's exit code, or 130 if it was stopped.

use anyhow::{Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use quest_launcher::services::ConsoleError;
use quest_launcher::{
    APP_NAME, ConfigManager, LifecycleState, QuestRunner, RunConfiguration, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

const DEFAULT_CONFIG_DIR: &str = "Launcher Data";

/// Exit code reported when the quest was stopped rather than exiting itself
const STOPPED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "quest-launcher", version = VERSION)]
#[command(about = "Run a quest on the external engine from a terminal")]
struct CliArgs {
    /// Quest directory or archive to run
    #[arg(value_name = "QUEST_PATH")]
    quest_path: Utf8PathBuf,

    /// Directory holding `Launcher Config.yaml`
    #[arg(long, value_name = "DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: Utf8PathBuf,
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Config comes first so debug mode can pick the log level
    let config_manager = ConfigManager::new(&args.config_dir)?;
    let user_config = config_manager.load_user_config()?;
    let settings = user_config.launcher_settings;

    let log_guard = quest_launcher::logging::setup_logging(
        Utf8Path::new("logs"),
        "quest-launcher",
        settings.debug_mode,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Using config from {}", config_manager.config_dir());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("quest-launcher-worker")
        .build()?;

    let runner = Arc::new(QuestRunner::new(&settings));
    let run = RunConfiguration::from_settings(args.quest_path, &settings);

    let result = runtime.block_on(run_to_completion(Arc::clone(&runner), run));

    // The stdin reader may still be parked on a blocking read
    runtime.shutdown_timeout(Duration::from_secs(1));

    runner.metrics().log_summary();
    tracing::info!("Launcher shutdown complete");

    let code = result.inspect_err(|e| tracing::error!("Run failed: {:#}", e))?;

    // process::exit skips destructors; flush the log writer first
    drop(log_guard);
    std::process::exit(code);
}

/// Start the quest and relay its console until it has ended.
async fn run_to_completion(runner: Arc<QuestRunner>, run: RunConfiguration) -> Result<i32> {
    let mut events = runner.subscribe();
    let mut quest = runner.run_quest(run).await?;

    tracing::info!(
        "Quest '{}' by {} running as pid {}",
        quest.descriptor.title(),
        quest.descriptor.author(),
        quest.pid
    );

    let forwarder = tokio::spawn(forward_stdin(Arc::clone(&runner)));

    let mut output_open = true;
    let terminal = loop {
        tokio::select! {
            line = quest.output.next_line(), if output_open => match line {
                Some(line) => println!("{}", line),
                None => output_open = false,
            },
            event = events.recv() => match event {
                Ok(event) => {
                    tracing::info!("Quest {} -> {}", event.previous, event.current);
                    if event.current.is_terminal() {
                        break event.current;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} lifecycle events", skipped);
                }
                Err(RecvError::Closed) => break runner.state(),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping quest");
                runner.stop().await;
            }
        }
    };

    forwarder.abort();

    // Output is fully flushed before the terminal event is published
    for line in quest.output.collect_remaining().await {
        println!("{}", line);
    }

    runner.acknowledge();

    match terminal {
        LifecycleState::Exited { code } => Ok(code),
        LifecycleState::Killed => Ok(STOPPED_EXIT_CODE),
        other => bail!("Quest ended in unexpected state: {}", other),
    }
}

/// Send each stdin line to the quest until stdin closes or the quest is gone.
async fn forward_stdin(runner: Arc<QuestRunner>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        match runner.send(line).await {
            Ok(()) => {}
            Err(ConsoleError::NotRunning) => break,
            Err(e) => tracing::warn!("Failed to send console command: {}", e),
        }
    }

    tracing::debug!("Console input forwarding finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once(APP_NAME).chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_quest_path_only() {
        let args = parse(&["quests/zsdx"]).unwrap();
        assert_eq!(args.quest_path, "quests/zsdx");
        assert_eq!(args.config_dir, DEFAULT_CONFIG_DIR);
    }

    #[test]
    fn test_parse_config_dir() {
        let args = parse(&["--config-dir", "/tmp/cfg", "quests/zsdx"]).unwrap();
        assert_eq!(args.quest_path, "quests/zsdx");
        assert_eq!(args.config_dir, "/tmp/cfg");

        let args = parse(&["quests/zsdx", "--config-dir=/tmp/other"]).unwrap();
        assert_eq!(args.config_dir, "/tmp/other");
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["a", "b"]).is_err());
        assert!(parse(&["a", "--config-dir"]).is_err());
        assert!(parse(&["a", "--fullscreen"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }
}
