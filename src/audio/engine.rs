use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{PlaybackSettings, Settings};
use crate::error::{PlaybackError, PlaybackResult};
use crate::library::Track;

use super::backend::{Backend, BackendFactory, NativeBackends};
use super::tracker::Tracker;
use super::types::{PlaybackState, Volume, lock};

/// Plays one track at a time through whichever backend suits its format.
///
/// All transitions run on the caller's thread. The only background work is
/// the position tracker (and, for MIDI, the sequencer), neither of which
/// changes state. Call [`tick`](Self::tick) from the caller's loop to notice
/// the end of a track.
pub struct PlaybackEngine {
    factory: Box<dyn BackendFactory>,
    playback: PlaybackSettings,
    state: PlaybackState,
    current: Option<Arc<Mutex<Track>>>,
    backend: Option<Box<dyn Backend>>,
    tracker: Option<Tracker>,
    /// Offset to resume from while paused.
    offset: Duration,
    volume: Volume,
}

impl PlaybackEngine {
    pub fn new(settings: &Settings) -> Self {
        Self::with_factory(
            NativeBackends::from_settings(settings),
            settings.playback.clone(),
        )
    }

    pub fn with_factory(factory: impl BackendFactory + 'static, playback: PlaybackSettings) -> Self {
        let volume = Volume::new(playback.volume);
        Self {
            factory: Box::new(factory),
            playback,
            state: PlaybackState::Stopped,
            current: None,
            backend: None,
            tracker: None,
            offset: Duration::ZERO,
            volume,
        }
    }

    /// Start `track` from the beginning, or resume it if it is the paused track.
    ///
    /// `Ok(false)` means nothing on this system can play the format.
    pub fn play(&mut self, track: &Track) -> PlaybackResult<bool> {
        if self.state == PlaybackState::Paused && self.is_current(track) {
            return Ok(self.resume());
        }

        self.stop();
        self.current = None;

        if !track.path.exists() {
            return Err(PlaybackError::MissingFile(track.path.clone()));
        }

        let mut backend = match self.factory.open(track, self.volume.gain()) {
            Ok(b) => b,
            Err(PlaybackError::NoBackend(reason)) => {
                info!(track = %track, %reason, "no backend can play this track");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = backend.start(Duration::ZERO) {
            backend.close();
            return match e {
                PlaybackError::NoBackend(reason) => {
                    info!(track = %track, %reason, "no backend can play this track");
                    Ok(false)
                }
                e => Err(e),
            };
        }

        let mut playing = track.clone();
        playing.duration = backend.duration().or(track.duration);
        playing.position = Duration::ZERO;
        playing.playing = true;

        info!(track = %playing, backend = backend.name(), "playing");
        self.current = Some(Arc::new(Mutex::new(playing)));
        self.backend = Some(backend);
        self.offset = Duration::ZERO;
        self.state = PlaybackState::Playing;
        self.start_tracker();
        Ok(true)
    }

    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            debug!(state = ?self.state, "pause ignored");
            return false;
        }
        self.stop_tracker();

        let reported = self.backend.as_mut().and_then(|b| b.pause());
        let Some(track) = &self.current else {
            return false;
        };
        let mut t = lock(track);
        // Backends without a position of their own fall back to the tracker's.
        let offset = reported.unwrap_or(t.position);
        t.position = offset;
        t.playing = false;
        drop(t);

        self.offset = offset;
        self.state = PlaybackState::Paused;
        info!(offset_ms = offset.as_millis() as u64, "paused");
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != PlaybackState::Paused {
            debug!(state = ?self.state, "resume ignored");
            return false;
        }
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };

        match backend.resume(self.offset) {
            Ok(true) => {}
            Ok(false) => {
                debug!(backend = backend.name(), "backend cannot resume at this offset");
                return false;
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "resume failed");
                return false;
            }
        }

        if let Some(track) = &self.current {
            let mut t = lock(track);
            t.position = self.offset;
            t.playing = true;
        }
        self.state = PlaybackState::Playing;
        self.start_tracker();
        info!(offset_ms = self.offset.as_millis() as u64, "resumed");
        true
    }

    /// Release the backend and return to `Stopped`. Safe in any state.
    pub fn stop(&mut self) {
        self.stop_tracker();
        if let Some(mut backend) = self.backend.take() {
            backend.close();
        }
        self.offset = Duration::ZERO;
        if let Some(track) = &self.current {
            let mut t = lock(track);
            t.playing = false;
            t.position = Duration::ZERO;
        }
        if self.state != PlaybackState::Stopped {
            info!("stopped");
        }
        self.state = PlaybackState::Stopped;
    }

    /// Move to `offset_ms`, clamped to the track. Keeps the current state.
    pub fn seek(&mut self, offset_ms: i64) -> bool {
        if self.state == PlaybackState::Stopped {
            debug!("seek ignored while stopped");
            return false;
        }
        let mut to = Duration::from_millis(offset_ms.max(0) as u64);
        if let Some(d) = self.duration() {
            to = to.min(d);
        }

        let playing = self.state == PlaybackState::Playing;
        if playing {
            self.stop_tracker();
        }
        let moved = match self.backend.as_mut() {
            Some(b) => match b.seek(to, playing) {
                Ok(moved) => moved,
                Err(e) => {
                    warn!(backend = b.name(), error = %e, "seek failed");
                    false
                }
            },
            None => false,
        };
        // A paused backend is repositioned again on resume, so the stored
        // offset is authoritative there even if the backend declined.
        let accepted = moved || !playing;
        if accepted {
            self.offset = to;
            if let Some(track) = &self.current {
                lock(track).position = to;
            }
            debug!(to_ms = to.as_millis() as u64, "seeked");
        }
        if playing {
            self.start_tracker();
        }
        accepted
    }

    pub fn set_volume(&mut self, level: f32) {
        self.volume.set_level(level);
        self.apply_gain();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.volume.set_muted(muted);
        self.apply_gain();
    }

    /// Stop if the playing track reached its end. Returns whether it did.
    pub fn tick(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        let finished = self.backend.as_mut().is_some_and(|b| b.finished());
        if finished {
            info!("track finished");
            self.stop();
        }
        finished
    }

    /// Snapshot of the current track, including the last tracked position.
    pub fn current_track(&self) -> Option<Track> {
        self.current.as_ref().map(|t| lock(t).clone())
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position(&self) -> Duration {
        match self.state {
            PlaybackState::Stopped => Duration::ZERO,
            PlaybackState::Paused => self.offset,
            PlaybackState::Playing => self
                .backend
                .as_ref()
                .and_then(|b| b.position())
                .or_else(|| self.current.as_ref().map(|t| lock(t).position))
                .unwrap_or_default(),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.current.as_ref().and_then(|t| lock(t).duration)
    }

    pub fn volume(&self) -> f32 {
        self.volume.level()
    }

    pub fn is_muted(&self) -> bool {
        self.volume.is_muted()
    }

    /// Fraction of the track played, 0.0 when the duration is unknown.
    pub fn progress(&self) -> f64 {
        match self.duration() {
            Some(d) if !d.is_zero() => {
                (self.position().as_secs_f64() / d.as_secs_f64()).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state == PlaybackState::Stopped
    }

    fn is_current(&self, track: &Track) -> bool {
        self.current.as_ref().is_some_and(|t| *lock(t) == *track)
    }

    fn apply_gain(&mut self) {
        let gain = self.volume.gain();
        if let Some(b) = self.backend.as_mut() {
            b.set_gain(gain);
        }
    }

    fn start_tracker(&mut self) {
        let (Some(track), Some(backend)) = (&self.current, &self.backend) else {
            return;
        };
        match Tracker::spawn(
            track.clone(),
            backend.probe(),
            self.playback.tracker_interval(),
        ) {
            Ok(t) => self.tracker = Some(t),
            Err(e) => warn!(error = %e, "cannot start position tracker"),
        }
    }

    fn stop_tracker(&mut self) {
        if let Some(t) = self.tracker.take() {
            t.stop(self.playback.tracker_join_timeout());
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
