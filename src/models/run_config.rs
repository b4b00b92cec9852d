use crate::models::config::LauncherSettings;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest accepted value for the sound and music volumes.
pub const MAX_VOLUME: u8 = 100;

/// Window zoom factor passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ZoomLevel {
    #[serde(rename = "x1")]
    X1,
    #[default]
    #[serde(rename = "x2")]
    X2,
    #[serde(rename = "x3")]
    X3,
    #[serde(rename = "x4")]
    X4,
}

impl ZoomLevel {
    pub const ALL: [ZoomLevel; 4] = [ZoomLevel::X1, ZoomLevel::X2, ZoomLevel::X3, ZoomLevel::X4];

    /// Integer zoom factor (1 to 4)
    pub fn factor(self) -> u8 {
        match self {
            ZoomLevel::X1 => 1,
            ZoomLevel::X2 => 2,
            ZoomLevel::X3 => 3,
            ZoomLevel::X4 => 4,
        }
    }
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.factor())
    }
}

/// Pixel filter the engine applies when scaling the quest screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFilter {
    /// Engine's `normal` mode
    #[default]
    None,
    Scale2x,
    Hq2x,
    Hq3x,
    Hq4x,
}

impl VideoFilter {
    pub const ALL: [VideoFilter; 5] = [
        VideoFilter::None,
        VideoFilter::Scale2x,
        VideoFilter::Hq2x,
        VideoFilter::Hq3x,
        VideoFilter::Hq4x,
    ];

    /// Video mode name understood by the engine
    pub fn mode_name(self) -> &'static str {
        match self {
            VideoFilter::None => "normal",
            VideoFilter::Scale2x => "scale2x",
            VideoFilter::Hq2x => "hq2x",
            VideoFilter::Hq3x => "hq3x",
            VideoFilter::Hq4x => "hq4x",
        }
    }
}

impl fmt::Display for VideoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoFilter::None => write!(f, "none"),
            other => write!(f, "{}", other.mode_name()),
        }
    }
}

/// Everything the launcher needs to start one quest run.
///
/// Built fresh for every run request from the current [`LauncherSettings`]
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    /// Path of the quest, as given to the locator
    pub quest_path: Utf8PathBuf,
    pub fullscreen: bool,
    pub zoom: ZoomLevel,
    pub video_filter: VideoFilter,
    pub software_rendering: bool,
    pub mute: bool,
    /// Sound effects volume, 0 to [`MAX_VOLUME`]
    pub sound_volume: u8,
    /// Music volume, 0 to [`MAX_VOLUME`]
    pub music_volume: u8,
    /// User supplied arguments appended after the documented flags
    pub extra_arguments: Vec<String>,
}

impl RunConfiguration {
    /// Create a configuration with engine defaults for the given quest
    pub fn new(quest_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            quest_path: quest_path.into(),
            fullscreen: false,
            zoom: ZoomLevel::default(),
            video_filter: VideoFilter::default(),
            software_rendering: false,
            mute: false,
            sound_volume: MAX_VOLUME,
            music_volume: MAX_VOLUME,
            extra_arguments: Vec::new(),
        }
    }

    /// Snapshot the user's settings into a run configuration.
    ///
    /// Volumes above [`MAX_VOLUME`] are clamped.
    pub fn from_settings(quest_path: impl Into<Utf8PathBuf>, settings: &LauncherSettings) -> Self {
        Self {
            quest_path: quest_path.into(),
            fullscreen: settings.fullscreen,
            zoom: settings.zoom,
            video_filter: settings.video_filter,
            software_rendering: settings.software_rendering,
            mute: settings.mute,
            sound_volume: settings.sound_volume.min(MAX_VOLUME),
            music_volume: settings.music_volume.min(MAX_VOLUME),
            extra_arguments: settings.extra_arguments.clone(),
        }
    }
}

/// One line of script text typed by the user for the running quest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleCommand {
    text: String,
}

impl ConsoleCommand {
    /// Wrap a line of script. Trailing `\r`/`\n` are dropped; the bridge
    /// appends its own terminator.
    pub fn new(text: impl Into<String>) -> Self {
        let mut text = text.into();
        let trimmed_len = text.trim_end_matches(['\r', '\n']).len();
        text.truncate(trimmed_len);
        Self { text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bytes written to the engine's standard input
    pub fn to_wire(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.text.len() + 1);
        bytes.extend_from_slice(self.text.as_bytes());
        bytes.push(b'\n');
        bytes
    }
}

impl From<&str> for ConsoleCommand {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for ConsoleCommand {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
