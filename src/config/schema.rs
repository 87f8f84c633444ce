use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/tracklane/config.toml` or `~/.config/tracklane/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `TRACKLANE__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub library: LibrarySettings,
    pub conversion: ConversionSettings,
    pub playback: PlaybackSettings,
    pub fallback: FallbackSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Playlist directory. Defaults to `$XDG_DATA_HOME/tracklane/playlist`.
    pub dir: Option<PathBuf>,
}

/// How compressed uploads are turned into WAV.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Encoder binary, looked up on `PATH`.
    pub encoder: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample width of the signed little-endian PCM output (16, 24 or 32).
    pub bit_depth: u16,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            encoder: "ffmpeg".to_string(),
            sample_rate: 44_100,
            channels: 2,
            bit_depth: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Initial volume (0.0 - 1.0).
    pub volume: f32,
    /// How often the tracker polls the backend position (milliseconds).
    pub tracker_interval_ms: u64,
    /// Upper bound on waiting for the tracker to exit (milliseconds).
    pub tracker_join_timeout_ms: u64,
    /// Grace period before an external player is force-killed (milliseconds).
    pub process_kill_timeout_ms: u64,
    /// Substring of the preferred MIDI output port name.
    pub midi_port: Option<String>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            tracker_interval_ms: 100,
            tracker_join_timeout_ms: 500,
            process_kill_timeout_ms: 2000,
            midi_port: None,
        }
    }
}

impl PlaybackSettings {
    pub fn tracker_interval(&self) -> Duration {
        Duration::from_millis(self.tracker_interval_ms)
    }

    pub fn tracker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.tracker_join_timeout_ms)
    }

    pub fn process_kill_timeout(&self) -> Duration {
        Duration::from_millis(self.process_kill_timeout_ms)
    }
}

/// External media player used when native decode of a compressed file fails.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackSettings {
    pub program: String,
    /// Arguments placed before the file path.
    pub args: Vec<String>,
    /// Flag taking a start offset in seconds, if the player has one.
    pub offset_arg: Option<String>,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self {
                program: "afplay".to_string(),
                args: Vec::new(),
                offset_arg: None,
            }
        } else {
            Self {
                program: "ffplay".to_string(),
                args: vec![
                    "-nodisp".into(),
                    "-autoexit".into(),
                    "-loglevel".into(),
                    "quiet".into(),
                ],
                offset_arg: Some("-ss".to_string()),
            }
        }
    }
}
