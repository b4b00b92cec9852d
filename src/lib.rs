// Quest Launcher - runs quests on an external game engine
//
// This is the library crate containing the runner components and data structures.
// The binary crate (main.rs) provides a headless terminal front-end.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod runner;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{
    ConsoleCommand, LauncherSettings, QuestDescriptor, RunConfiguration, UserConfig, VideoFilter,
    ZoomLevel,
};
pub use runner::{QuestRunner, RunError, StartedQuest};
pub use state::{LifecycleEvent, LifecycleMonitor, LifecycleState};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
