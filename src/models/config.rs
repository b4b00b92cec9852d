use crate::models::run_config::{VideoFilter, ZoomLevel};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User configuration from Launcher Config.yaml
///
/// Contains the engine location and the video/audio preferences used to
/// build each [`RunConfiguration`](crate::models::RunConfiguration).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "Launcher_Settings", default)]
    pub launcher_settings: LauncherSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherSettings {
    #[serde(rename = "Engine EXE", default)]
    pub engine_exe: String,

    #[serde(rename = "Fullscreen", default)]
    pub fullscreen: bool,

    #[serde(rename = "Zoom", default)]
    pub zoom: ZoomLevel,

    #[serde(rename = "Video Filter", default)]
    pub video_filter: VideoFilter,

    #[serde(rename = "Software Rendering", default)]
    pub software_rendering: bool,

    #[serde(rename = "Mute", default)]
    pub mute: bool,

    #[serde(rename = "Sound Volume", default = "default_volume")]
    pub sound_volume: u8,

    #[serde(rename = "Music Volume", default = "default_volume")]
    pub music_volume: u8,

    /// Milliseconds a quest gets to exit after a stop request
    #[serde(rename = "Stop Grace Period", default = "default_stop_grace_period")]
    pub stop_grace_period: u64,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,

    #[serde(rename = "Extra Arguments", default)]
    pub extra_arguments: Vec<String>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            engine_exe: String::new(),
            fullscreen: false,
            zoom: ZoomLevel::default(),
            video_filter: VideoFilter::default(),
            software_rendering: false,
            mute: false,
            sound_volume: default_volume(),
            music_volume: default_volume(),
            stop_grace_period: default_stop_grace_period(),
            debug_mode: false,
            extra_arguments: Vec::new(),
        }
    }
}

impl LauncherSettings {
    /// Time a quest gets to exit after a graceful stop request
    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period)
    }
}

fn default_volume() -> u8 {
    100
}

fn default_stop_grace_period() -> u64 {
    3000
}
