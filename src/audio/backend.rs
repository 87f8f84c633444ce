//! The playback strategy interface and the factory that picks a strategy per track.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lofty::prelude::AudioFile;
use tracing::{debug, warn};

use crate::config::{FallbackSettings, PlaybackSettings, Settings};
use crate::error::{PlaybackError, PlaybackResult};
use crate::library::{Track, TrackFormat};

use super::external::ProcessBackend;
use super::midi::MidiBackend;
use super::pcm::PcmBackend;

/// Read-only position source the tracker can poll from its own thread.
pub trait PositionProbe: Send + Sync {
    fn position(&self) -> Option<Duration>;
}

/// One playback strategy bound to one native or process resource.
///
/// A backend is opened by a [`BackendFactory`] in a paused state; dropping it
/// must release everything it holds.
pub trait Backend {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Begin producing audio at `from`.
    fn start(&mut self, from: Duration) -> PlaybackResult<()>;

    /// Stop producing audio. Returns the offset reached when the backend knows it.
    fn pause(&mut self) -> Option<Duration>;

    /// Restart production at `at`. `Ok(false)` means the backend cannot resume there.
    fn resume(&mut self, at: Duration) -> PlaybackResult<bool>;

    /// Reposition to `to`; production continues afterwards only when `playing`.
    /// `Ok(false)` means the backend cannot seek.
    fn seek(&mut self, to: Duration, playing: bool) -> PlaybackResult<bool>;

    /// Backend-reported position, `None` when it can only be approximated.
    fn position(&self) -> Option<Duration>;

    fn duration(&self) -> Option<Duration>;

    fn set_gain(&mut self, gain: f32);

    /// Whether the stream reached its end on its own.
    fn finished(&mut self) -> bool;

    fn probe(&self) -> Arc<dyn PositionProbe>;

    /// Release every resource. Must be safe to call more than once.
    fn close(&mut self);
}

/// Chooses and opens the backend for a track.
pub trait BackendFactory {
    /// Open a backend for `track` with `gain` applied. `PlaybackError::NoBackend`
    /// means nothing on this system can play the format.
    fn open(&self, track: &Track, gain: f32) -> PlaybackResult<Box<dyn Backend>>;
}

/// Production factory: rodio for PCM and compressed audio, midir for MIDI,
/// and an external player when native decode fails.
#[derive(Debug, Clone)]
pub struct NativeBackends {
    playback: PlaybackSettings,
    fallback: FallbackSettings,
}

impl NativeBackends {
    pub fn new(playback: PlaybackSettings, fallback: FallbackSettings) -> Self {
        Self { playback, fallback }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.playback.clone(), settings.fallback.clone())
    }

    fn open_compressed(&self, path: &Path, gain: f32) -> PlaybackResult<Box<dyn Backend>> {
        match PcmBackend::open(path, gain) {
            Ok(b) => Ok(Box::new(b)),
            Err(PlaybackError::Decode { reason, .. }) => {
                warn!(file = %path.display(), %reason, player = %self.fallback.program, "native decode failed, using external player");
                let b = ProcessBackend::open(
                    path,
                    self.fallback.clone(),
                    self.playback.process_kill_timeout(),
                )?;
                Ok(Box::new(b))
            }
            Err(e) => Err(e),
        }
    }
}

impl BackendFactory for NativeBackends {
    fn open(&self, track: &Track, gain: f32) -> PlaybackResult<Box<dyn Backend>> {
        debug!(track = %track, format = ?track.format, "opening backend");
        match track.format {
            TrackFormat::Wav => Ok(Box::new(PcmBackend::open(&track.path, gain)?)),
            TrackFormat::Midi => Ok(Box::new(MidiBackend::open(
                &track.path,
                gain,
                self.playback.midi_port.as_deref(),
            )?)),
            _ => self.open_compressed(&track.path, gain),
        }
    }
}

/// Duration from container metadata, for backends whose decoder cannot tell.
pub(crate) fn probe_duration(path: &Path) -> Option<Duration> {
    match lofty::read_from_path(path) {
        Ok(tagged) => Some(tagged.properties().duration()).filter(|d| !d.is_zero()),
        Err(e) => {
            debug!(file = %path.display(), error = %e, "no duration metadata");
            None
        }
    }
}
