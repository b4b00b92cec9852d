//! Data models for the quest launcher.
//!
//! - [`QuestDescriptor`]: a validated quest, produced by the locator
//! - [`RunConfiguration`]: per-run engine options derived from the settings
//! - [`ConsoleCommand`]: one line of script for the running quest
//! - [`UserConfig`]: user preferences loaded from `Launcher Config.yaml`

pub mod config;
pub mod quest;
pub mod run_config;

pub use config::{LauncherSettings, UserConfig};
pub use quest::{QuestDataSource, QuestDescriptor};
pub use run_config::{ConsoleCommand, MAX_VOLUME, RunConfiguration, VideoFilter, ZoomLevel};

