//! Services module - the pieces of the quest runner that do the actual work.
//!
//! These services have no UI dependencies, so any front-end (the window UI, the
//! headless binary, tests) can drive them.
//!
//! # Components
//!
//! - [`QuestLocator`]: decides whether a path holds a runnable quest and reads
//!   its `quest.dat` manifest. Handles:
//!   - plain quest directories (`quest.dat` at the root or under `data/`)
//!   - `data.solarus` / `data.solarus.zip` archives inside a quest directory
//!   - a quest given directly as an archive file
//!
//! - [`ProcessLauncher`]: builds the engine argument vector from a
//!   [`RunConfiguration`](crate::models::RunConfiguration) and spawns the engine
//!   with all three standard streams captured.
//!
//! - [`ConsoleBridge`]: writes console commands into the running quest and
//!   frames its output into lines ([`LineFramer`], [`ConsoleOutput`]).
//!
//! Process ownership and lifecycle tracking live in
//! [`crate::state::LifecycleMonitor`].
//!
//! # Engine Invocation
//!
//! ```text
//! <engine> <quest_path> [--fullscreen] [--zoom=N] [--video-mode=NAME]
//!          [--software-rendering] [--no-audio | --sound-volume=V --music-volume=V] [extra...]
//! ```

pub mod console;
pub mod launcher;
pub mod quest_locator;

pub use console::{ConsoleBridge, ConsoleError, ConsoleInput, ConsoleOutput, LineFramer};
pub use launcher::{LaunchError, ProcessLauncher, QuestProcessHandle, build_arguments};
pub use quest_locator::{LocatorError, MANIFEST_FILE, QuestLocator};
