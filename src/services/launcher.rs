use crate::models::{MAX_VOLUME, QuestDescriptor, RunConfiguration, VideoFilter, ZoomLevel};
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// Engine command-line flags.
///
/// The spelling belongs to the engine runtime; the launcher only decides
/// order and presence (see [`build_arguments`]).
pub mod flags {
    pub const FULLSCREEN: &str = "--fullscreen";
    pub const ZOOM: &str = "--zoom";
    pub const VIDEO_MODE: &str = "--video-mode";
    pub const SOFTWARE_RENDERING: &str = "--software-rendering";
    pub const NO_AUDIO: &str = "--no-audio";
    pub const SOUND_VOLUME: &str = "--sound-volume";
    pub const MUSIC_VOLUME: &str = "--music-volume";
}

/// Errors that can occur while starting the engine
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("no program name")]
    MissingProgram,

    #[error("spawn failed: {program}: {source}")]
    SpawnFailed {
        program: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Build the engine argument vector for one run.
///
/// Order is fixed:
///
/// ```text
/// <quest_path> [--fullscreen] [--zoom=N] [--video-mode=NAME] [--software-rendering]
///              [--no-audio | --sound-volume=V --music-volume=V] [extra...]
/// ```
///
/// `--zoom` is left out for [`ZoomLevel::X1`], the engine default, and
/// `--video-mode` for [`VideoFilter::None`]. Volumes are clamped to 100.
pub fn build_arguments(quest_path: &Utf8Path, run: &RunConfiguration) -> Vec<String> {
    let mut args = vec![quest_path.to_string()];

    if run.fullscreen {
        args.push(flags::FULLSCREEN.to_string());
    }

    if run.zoom != ZoomLevel::X1 {
        args.push(format!("{}={}", flags::ZOOM, run.zoom.factor()));
    }

    if run.video_filter != VideoFilter::None {
        args.push(format!("{}={}", flags::VIDEO_MODE, run.video_filter.mode_name()));
    }

    if run.software_rendering {
        args.push(flags::SOFTWARE_RENDERING.to_string());
    }

    if run.mute {
        args.push(flags::NO_AUDIO.to_string());
    } else {
        args.push(format!("{}={}", flags::SOUND_VOLUME, run.sound_volume.min(MAX_VOLUME)));
        args.push(format!("{}={}", flags::MUSIC_VOLUME, run.music_volume.min(MAX_VOLUME)));
    }

    args.extend(run.extra_arguments.iter().cloned());
    args
}

/// A freshly spawned engine process and its captured standard streams.
///
/// Produced by [`ProcessLauncher::launch`] and handed to the
/// [`LifecycleMonitor`](crate::state::LifecycleMonitor), which becomes its
/// only owner. The stream fields are `Option`s so the monitor can move each
/// one to the task that serves it.
#[derive(Debug)]
pub struct QuestProcessHandle {
    pid: u32,
    pub(crate) child: Child,
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) stdout: Option<ChildStdout>,
    pub(crate) stderr: Option<ChildStderr>,
}

impl QuestProcessHandle {
    /// OS process identifier
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Spawns the engine runtime for validated quests.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    engine_exe: Utf8PathBuf,
}

impl ProcessLauncher {
    pub fn new(engine_exe: impl Into<Utf8PathBuf>) -> Self {
        Self {
            engine_exe: engine_exe.into(),
        }
    }

    pub fn engine_exe(&self) -> &Utf8Path {
        &self.engine_exe
    }

    /// Start the engine on `descriptor` with the options from `run`.
    ///
    /// The engine path is checked before anything is spawned. Must be called
    /// from within a tokio runtime.
    pub fn launch(
        &self,
        descriptor: &QuestDescriptor,
        run: &RunConfiguration,
    ) -> Result<QuestProcessHandle, LaunchError> {
        if self.engine_exe.as_str().trim().is_empty() {
            tracing::error!("Cannot launch '{}': engine executable not configured", descriptor.title());
            return Err(LaunchError::MissingProgram);
        }

        let args = build_arguments(descriptor.root(), run);
        tracing::info!("Launching: {} {}", self.engine_exe, args.join(" "));

        let mut child = Command::new(self.engine_exe.as_std_path())
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                tracing::error!("Failed to spawn {}: {}", self.engine_exe, source);
                LaunchError::SpawnFailed {
                    program: self.engine_exe.clone(),
                    source,
                }
            })?;

        // id() is only None once the child has been reaped
        let pid = child.id().unwrap_or_default();
        tracing::info!("Quest '{}' started with pid {}", descriptor.title(), pid);

        Ok(QuestProcessHandle {
            pid,
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
        })
    }
}
