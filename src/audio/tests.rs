use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use super::types::lock;
use super::*;
use crate::config::PlaybackSettings;
use crate::error::{PlaybackError, PlaybackResult};
use crate::library::{Track, TrackFormat};

type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct FakeProbe(Mutex<Duration>);

impl PositionProbe for FakeProbe {
    fn position(&self) -> Option<Duration> {
        Some(*lock(&self.0))
    }
}

/// Knobs shared between a test and the backends its factory opens.
#[derive(Clone)]
struct Script {
    journal: Journal,
    probe: Arc<FakeProbe>,
    finished: Arc<AtomicBool>,
    duration: Option<Duration>,
    /// Whether `pause` reports an offset (false mimics the process backend).
    reports_position: bool,
    resumable: bool,
    seekable: bool,
    outcome: Outcome,
}

#[derive(Clone, Copy, PartialEq)]
enum Outcome {
    Open,
    NoBackend,
    DeviceFailure,
}

impl Script {
    fn new() -> Self {
        Self {
            journal: Arc::default(),
            probe: Arc::default(),
            finished: Arc::default(),
            duration: Some(Duration::from_secs(10)),
            reports_position: true,
            resumable: true,
            seekable: true,
            outcome: Outcome::Open,
        }
    }

    fn entries(&self) -> Vec<String> {
        lock(&self.journal).clone()
    }

    fn set_position(&self, d: Duration) {
        *lock(&self.probe.0) = d;
    }
}

struct FakeBackend {
    label: String,
    script: Script,
}

impl FakeBackend {
    fn log(&self, what: String) {
        lock(&self.script.journal).push(format!("{} {}", what, self.label));
    }
}

impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn start(&mut self, from: Duration) -> PlaybackResult<()> {
        self.log(format!("start@{}", from.as_millis()));
        Ok(())
    }

    fn pause(&mut self) -> Option<Duration> {
        self.log("pause".to_string());
        if self.script.reports_position {
            self.script.probe.position()
        } else {
            None
        }
    }

    fn resume(&mut self, at: Duration) -> PlaybackResult<bool> {
        self.log(format!("resume@{}", at.as_millis()));
        Ok(self.script.resumable)
    }

    fn seek(&mut self, to: Duration, playing: bool) -> PlaybackResult<bool> {
        self.log(format!("seek@{}:{}", to.as_millis(), playing));
        if self.script.seekable {
            self.script.set_position(to);
        }
        Ok(self.script.seekable)
    }

    fn position(&self) -> Option<Duration> {
        if self.script.reports_position {
            self.script.probe.position()
        } else {
            None
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.script.duration
    }

    fn set_gain(&mut self, gain: f32) {
        self.log(format!("gain={gain}"));
    }

    fn finished(&mut self) -> bool {
        self.script.finished.load(Ordering::SeqCst)
    }

    fn probe(&self) -> Arc<dyn PositionProbe> {
        self.script.probe.clone()
    }

    fn close(&mut self) {
        self.log("close".to_string());
    }
}

struct FakeFactory(Script);

impl BackendFactory for FakeFactory {
    fn open(&self, track: &Track, gain: f32) -> PlaybackResult<Box<dyn Backend>> {
        let label = track.display_name.clone();
        lock(&self.0.journal).push(format!("open {label} gain={gain}"));
        match self.0.outcome {
            Outcome::Open => Ok(Box::new(FakeBackend {
                label,
                script: self.0.clone(),
            })),
            Outcome::NoBackend => Err(PlaybackError::NoBackend("fake".to_string())),
            Outcome::DeviceFailure => Err(PlaybackError::Device("fake device".to_string())),
        }
    }
}

fn settings() -> PlaybackSettings {
    PlaybackSettings {
        tracker_interval_ms: 5,
        ..PlaybackSettings::default()
    }
}

fn engine(script: &Script) -> PlaybackEngine {
    PlaybackEngine::with_factory(FakeFactory(script.clone()), settings())
}

fn track(dir: &Path, ordinal: u32, name: &str) -> Track {
    let path = dir.join(format!("{ordinal:03}_{name}.wav"));
    fs::write(&path, b"RIFF").unwrap();
    Track::new(path, ordinal, name.to_string(), TrackFormat::Wav)
}

fn fixture() -> (TempDir, Track, Track) {
    let dir = tempfile::tempdir().unwrap();
    let a = track(dir.path(), 1, "a");
    let b = track(dir.path(), 2, "b");
    (dir, a, b)
}

#[test]
fn play_opens_and_starts_from_zero() {
    let (_dir, a, _) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    assert!(e.play(&a).unwrap());
    assert!(e.is_playing());
    let current = e.current_track().unwrap();
    assert_eq!(current, a);
    assert!(current.playing);
    assert_eq!(e.duration(), Some(Duration::from_secs(10)));
    assert_eq!(script.entries(), vec!["open a gain=1", "start@0 a"]);
}

#[test]
fn playing_another_track_releases_the_first_before_opening() {
    let (_dir, a, b) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    e.play(&a).unwrap();
    e.play(&b).unwrap();
    assert_eq!(
        script.entries(),
        vec!["open a gain=1", "start@0 a", "close a", "open b gain=1", "start@0 b"]
    );
    assert_eq!(e.current_track().unwrap(), b);
}

#[test]
fn pause_then_resume_continues_from_reported_offset() {
    let (_dir, a, _) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    e.play(&a).unwrap();
    script.set_position(Duration::from_millis(2300));
    assert!(e.pause());
    assert!(e.is_paused());
    assert_eq!(e.position(), Duration::from_millis(2300));
    assert!(!e.current_track().unwrap().playing);

    assert!(e.resume());
    assert!(e.is_playing());
    assert!(script.entries().contains(&"resume@2300 a".to_string()));
}

#[test]
fn play_of_the_paused_track_resumes_without_reopening() {
    let (_dir, a, _) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    e.play(&a).unwrap();
    e.pause();
    assert!(e.play(&a).unwrap());
    assert!(e.is_playing());
    let opens = script.entries().iter().filter(|l| l.starts_with("open")).count();
    assert_eq!(opens, 1);
}

#[test]
fn invalid_transitions_are_refused() {
    let (_dir, a, _) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    assert!(!e.pause());
    assert!(!e.resume());
    assert!(!e.seek(1000));
    assert!(e.is_stopped());

    e.play(&a).unwrap();
    assert!(!e.resume());
    assert!(e.is_playing());
}

#[test]
fn stop_is_idempotent_and_keeps_the_track_readable() {
    let (_dir, a, _) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    e.stop();
    e.play(&a).unwrap();
    script.set_position(Duration::from_secs(4));
    e.stop();
    e.stop();

    assert!(e.is_stopped());
    assert_eq!(e.position(), Duration::ZERO);
    let current = e.current_track().unwrap();
    assert_eq!(current, a);
    assert!(!current.playing);
    assert_eq!(current.position, Duration::ZERO);
    let closes = script.entries().iter().filter(|l| l.starts_with("close")).count();
    assert_eq!(closes, 1);
}

#[test]
fn seek_clamps_to_the_track_and_keeps_state() {
    let (_dir, a, _) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    e.play(&a).unwrap();
    assert!(e.seek(-500));
    assert!(e.is_playing());
    assert!(e.seek(60_000));
    assert!(script.entries().contains(&"seek@0:true a".to_string()));
    assert!(script.entries().contains(&"seek@10000:true a".to_string()));

    e.pause();
    assert!(e.seek(3_000));
    assert!(e.is_paused());
    assert_eq!(e.position(), Duration::from_secs(3));
    assert_eq!(e.current_track().unwrap().position, Duration::from_secs(3));
    assert!(script.entries().contains(&"seek@3000:false a".to_string()));
}

#[test]
fn seek_without_known_duration_is_not_clamped_above() {
    let (_dir, a, _) = fixture();
    let mut script = Script::new();
    script.duration = None;
    let mut e = engine(&script);

    e.play(&a).unwrap();
    e.pause();
    assert!(e.seek(90_000));
    assert_eq!(e.position(), Duration::from_secs(90));
}

#[test]
fn paused_seek_stores_offset_even_when_backend_declines() {
    let (_dir, a, _) = fixture();
    let mut script = Script::new();
    script.seekable = false;
    let mut e = engine(&script);

    e.play(&a).unwrap();
    assert!(!e.seek(2_000));
    assert_eq!(e.current_track().unwrap().position, Duration::ZERO);

    e.pause();
    assert!(e.seek(3_000));
    assert!(e.is_paused());
    assert_eq!(e.position(), Duration::from_secs(3));
    assert_eq!(e.current_track().unwrap().position, Duration::from_secs(3));

    assert!(e.resume());
    assert!(script.entries().contains(&"resume@3000 a".to_string()));
}

#[test]
fn no_backend_is_not_an_error() {
    let (_dir, a, _) = fixture();
    let mut script = Script::new();
    script.outcome = Outcome::NoBackend;
    let mut e = engine(&script);

    assert!(!e.play(&a).unwrap());
    assert!(e.is_stopped());
    assert!(e.current_track().is_none());
}

#[test]
fn backend_failure_is_an_error() {
    let (_dir, a, _) = fixture();
    let mut script = Script::new();
    script.outcome = Outcome::DeviceFailure;
    let mut e = engine(&script);

    assert!(matches!(e.play(&a), Err(PlaybackError::Device(_))));
    assert!(e.is_stopped());
    assert!(e.current_track().is_none());
}

#[test]
fn missing_file_fails_before_opening() {
    let (_dir, a, _) = fixture();
    fs::remove_file(&a.path).unwrap();
    let script = Script::new();
    let mut e = engine(&script);

    assert!(matches!(e.play(&a), Err(PlaybackError::MissingFile(_))));
    assert!(script.entries().is_empty());
    assert!(e.is_stopped());
}

#[test]
fn tick_stops_at_end_of_track() {
    let (_dir, a, _) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    e.play(&a).unwrap();
    assert!(!e.tick());
    script.finished.store(true, Ordering::SeqCst);
    assert!(e.tick());
    assert!(e.is_stopped());
    assert!(!e.tick());
    assert_eq!(script.entries().last().unwrap(), "close a");
}

#[test]
fn volume_is_clamped_and_applied_to_open_and_next_backend() {
    let (_dir, a, b) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    e.set_volume(1.5);
    assert_eq!(e.volume(), 1.0);
    e.set_volume(0.25);
    e.play(&a).unwrap();
    e.set_muted(true);
    assert!(e.is_muted());
    assert_eq!(e.volume(), 0.25);
    e.play(&b).unwrap();

    let entries = script.entries();
    assert_eq!(entries[0], "open a gain=0.25");
    assert!(entries.contains(&"gain=0 a".to_string()));
    assert!(entries.contains(&"open b gain=0".to_string()));
}

#[test]
fn resume_refused_by_backend_stays_paused() {
    let (_dir, a, _) = fixture();
    let mut script = Script::new();
    script.resumable = false;
    let mut e = engine(&script);

    e.play(&a).unwrap();
    e.pause();
    assert!(!e.resume());
    assert!(e.is_paused());
}

#[test]
fn pause_falls_back_to_tracked_position() {
    let (_dir, a, _) = fixture();
    let mut script = Script::new();
    script.reports_position = false;
    let mut e = engine(&script);

    e.play(&a).unwrap();
    script.set_position(Duration::from_millis(1500));
    let deadline = Instant::now() + Duration::from_secs(2);
    while e.current_track().unwrap().position != Duration::from_millis(1500)
        && Instant::now() < deadline
    {
        thread::sleep(Duration::from_millis(5));
    }

    assert!(e.pause());
    assert_eq!(e.position(), Duration::from_millis(1500));
}

#[test]
fn tracker_updates_position_and_goes_quiet_after_stop() {
    let (_dir, a, _) = fixture();
    let script = Script::new();
    let mut e = engine(&script);

    e.play(&a).unwrap();
    script.set_position(Duration::from_secs(4));
    let deadline = Instant::now() + Duration::from_secs(2);
    while e.current_track().unwrap().position.is_zero() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(e.current_track().unwrap().position, Duration::from_secs(4));
    assert!((e.progress() - 0.4).abs() < 1e-9);

    e.stop();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(e.current_track().unwrap().position, Duration::ZERO);
}

#[test]
fn dropping_the_engine_closes_the_backend() {
    let (_dir, a, _) = fixture();
    let script = Script::new();
    {
        let mut e = engine(&script);
        e.play(&a).unwrap();
    }
    assert_eq!(script.entries().last().unwrap(), "close a");
}

#[test]
fn volume_model_mutes_to_zero_gain() {
    let mut v = Volume::new(f32::NAN);
    assert_eq!(v.level(), 0.0);
    v.set_level(0.6);
    v.set_muted(true);
    assert_eq!(v.gain(), 0.0);
    v.set_muted(false);
    assert_eq!(v.gain(), 0.6);
}
