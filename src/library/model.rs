use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use super::display::{format_clock, format_size};

/// Format family of a track file, derived from its extension.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TrackFormat {
    /// Uncompressed PCM; the canonical format.
    Wav,
    /// Standard MIDI file.
    Midi,
    /// Compressed but played as-is.
    Mp3,
    /// Compressed formats transcoded to WAV on upload.
    Ogg,
    Flac,
    M4a,
    Aac,
    Opus,
}

impl TrackFormat {
    /// Map a file extension (case-insensitive, without dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" => Some(Self::Wav),
            "mid" | "midi" => Some(Self::Midi),
            "mp3" => Some(Self::Mp3),
            "ogg" => Some(Self::Ogg),
            "flac" => Some(Self::Flac),
            "m4a" => Some(Self::M4a),
            "aac" => Some(Self::Aac),
            "opus" => Some(Self::Opus),
            _ => None,
        }
    }

    /// Whether uploads of this format are transcoded to WAV.
    pub fn needs_conversion(self) -> bool {
        matches!(
            self,
            Self::Ogg | Self::Flac | Self::M4a | Self::Aac | Self::Opus
        )
    }
}

/// One playlist entry backed by a `{NNN}_{name}.{ext}` file.
///
/// Equality and hashing use the absolute path and the ordinal only; the
/// transient `position`/`playing` fields are written by the playback engine.
#[derive(Debug, Clone)]
pub struct Track {
    pub path: PathBuf,
    pub ordinal: u32,
    pub display_name: String,
    pub format: TrackFormat,
    pub duration: Option<Duration>,
    pub position: Duration,
    pub playing: bool,
}

impl Track {
    pub fn new(path: PathBuf, ordinal: u32, display_name: String, format: TrackFormat) -> Self {
        Self {
            path,
            ordinal,
            display_name,
            format,
            duration: None,
            position: Duration::ZERO,
            playing: false,
        }
    }

    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Size on disk; 0 when the file cannot be read.
    pub fn file_size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn formatted_size(&self) -> String {
        format_size(self.file_size())
    }

    pub fn formatted_ordinal(&self) -> String {
        format!("{:03}", self.ordinal)
    }

    pub fn formatted_duration(&self) -> String {
        match self.duration {
            Some(d) if !d.is_zero() => format_clock(d),
            _ => "--:--".to_string(),
        }
    }

    pub fn formatted_position(&self) -> String {
        format_clock(self.position)
    }

    /// Fraction of the track played, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        match self.duration {
            Some(d) if !d.is_zero() => {
                (self.position.as_secs_f64() / d.as_secs_f64()).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// "007. name (mm:ss)"
    pub fn display_string(&self) -> String {
        format!(
            "{}. {} ({})",
            self.formatted_ordinal(),
            self.display_name,
            self.formatted_duration()
        )
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal == other.ordinal && self.path == other.path
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.ordinal.hash(state);
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03} {} [{}]",
            self.ordinal,
            self.display_name,
            self.file_name()
        )
    }
}
