//! MIDI playback: a flattened SMF timeline played by a sequencer thread into
//! a MIDI output port.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use midir::{MidiOutput, MidiOutputConnection};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::{debug, warn};

use crate::error::{PlaybackError, PlaybackResult};

use super::backend::{Backend, PositionProbe};
use super::clock::PlayClock;
use super::types::lock;

/// Tempo assumed until the first Set Tempo event (120 bpm).
const DEFAULT_TEMPO_US: u64 = 500_000;
const CC_VOLUME: u8 = 7;
const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

/// A channel message scheduled at an absolute time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    pub at: Duration,
    pub bytes: Vec<u8>,
}

/// All tracks of a standard MIDI file merged onto one time axis.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    events: Vec<TimedEvent>,
    duration: Duration,
}

enum Item {
    Tempo(u32),
    Message(Vec<u8>),
    End,
}

impl Sequence {
    pub fn parse(data: &[u8]) -> PlaybackResult<Self> {
        let smf = Smf::parse(data).map_err(|e| PlaybackError::Midi(e.to_string()))?;

        // (tick, item) in file order; sequential files play their tracks back to back.
        let mut merged: Vec<(u64, Item)> = Vec::new();
        let mut track_start = 0u64;
        for track in &smf.tracks {
            let mut tick = track_start;
            for event in track {
                tick += u64::from(event.delta.as_int());
                let item = match event.kind {
                    TrackEventKind::Midi { channel, message } => {
                        Item::Message(encode(channel.as_int(), message))
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(t)) => Item::Tempo(t.as_int()),
                    TrackEventKind::Meta(MetaMessage::EndOfTrack) => Item::End,
                    _ => continue,
                };
                merged.push((tick, item));
            }
            if smf.header.format == Format::Sequential {
                track_start = tick;
            }
        }
        merged.sort_by_key(|(tick, _)| *tick);

        let mut events = Vec::new();
        let mut duration = Duration::ZERO;
        let mut tempo_us = DEFAULT_TEMPO_US;
        let mut last_tick = 0u64;
        let mut now_us = 0u64;

        for (tick, item) in merged {
            let delta = tick - last_tick;
            last_tick = tick;
            now_us += match smf.header.timing {
                Timing::Metrical(tpq) => delta * tempo_us / u64::from(tpq.as_int().max(1)),
                Timing::Timecode(fps, sub) => {
                    let ticks_per_sec = f64::from(fps.as_f32()) * f64::from(sub.max(1));
                    (delta as f64 * 1_000_000.0 / ticks_per_sec) as u64
                }
            };
            let at = Duration::from_micros(now_us);
            match item {
                Item::Tempo(t) => tempo_us = u64::from(t),
                Item::Message(bytes) => events.push(TimedEvent { at, bytes }),
                Item::End => {}
            }
            duration = duration.max(at);
        }

        Ok(Self { events, duration })
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Index of the first event at or after `offset`.
    pub fn index_at(&self, offset: Duration) -> usize {
        self.events.partition_point(|e| e.at < offset)
    }
}

/// Raw wire bytes of a channel message.
pub fn encode(channel: u8, message: MidiMessage) -> Vec<u8> {
    let ch = channel & 0x0f;
    match message {
        MidiMessage::NoteOff { key, vel } => vec![0x80 | ch, key.as_int(), vel.as_int()],
        MidiMessage::NoteOn { key, vel } => vec![0x90 | ch, key.as_int(), vel.as_int()],
        MidiMessage::Aftertouch { key, vel } => vec![0xA0 | ch, key.as_int(), vel.as_int()],
        MidiMessage::Controller { controller, value } => {
            vec![0xB0 | ch, controller.as_int(), value.as_int()]
        }
        MidiMessage::ProgramChange { program } => vec![0xC0 | ch, program.as_int()],
        MidiMessage::ChannelAftertouch { vel } => vec![0xD0 | ch, vel.as_int()],
        MidiMessage::PitchBend { bend } => {
            let v = bend.0.as_int();
            vec![0xE0 | ch, (v & 0x7f) as u8, (v >> 7) as u8]
        }
    }
}

/// Destination for raw MIDI bytes.
pub trait MidiOut: Send {
    fn emit(&mut self, message: &[u8]) -> Result<(), String>;
}

impl MidiOut for MidiOutputConnection {
    fn emit(&mut self, message: &[u8]) -> Result<(), String> {
        self.send(message).map_err(|e| e.to_string())
    }
}

/// Connect to the first output port whose name contains `hint`, or the first port.
pub fn connect_output(hint: Option<&str>) -> PlaybackResult<MidiOutputConnection> {
    let out = MidiOutput::new("tracklane").map_err(|e| PlaybackError::Midi(e.to_string()))?;
    let ports = out.ports();

    let preferred = hint.and_then(|h| {
        ports.iter().find(|p| {
            out.port_name(p)
                .map(|name| name.contains(h))
                .unwrap_or(false)
        })
    });
    let port = preferred
        .or_else(|| ports.first())
        .cloned()
        .ok_or_else(|| PlaybackError::NoBackend("no MIDI output port available".to_string()))?;

    let name = out.port_name(&port).unwrap_or_else(|_| "Unknown".to_string());
    let conn = out
        .connect(&port, "tracklane-playback")
        .map_err(|e| PlaybackError::Midi(e.to_string()))?;
    debug!(port = %name, "connected MIDI output");
    Ok(conn)
}

type SharedOut = Arc<Mutex<Box<dyn MidiOut>>>;

fn emit(out: &SharedOut, message: &[u8]) {
    if let Err(e) = lock(out).emit(message) {
        warn!(error = %e, "MIDI send failed");
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Plays a `Sequence` from an offset on its own thread.
pub struct Sequencer {
    sequence: Arc<Sequence>,
    out: SharedOut,
    clock: Arc<PlayClock>,
    done: Arc<AtomicBool>,
    worker: Option<Worker>,
}

impl Sequencer {
    pub fn new(sequence: Sequence, out: Box<dyn MidiOut>) -> Self {
        let clock = Arc::new(PlayClock::new(Some(sequence.duration())));
        Self {
            sequence: Arc::new(sequence),
            out: Arc::new(Mutex::new(out)),
            clock,
            done: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn play_from(&mut self, offset: Duration) -> PlaybackResult<()> {
        self.halt();
        self.done.store(false, Ordering::SeqCst);
        self.clock.run_from(offset);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let sequence = self.sequence.clone();
        let out = self.out.clone();
        let done = self.done.clone();

        let handle = thread::Builder::new()
            .name("tracklane-sequencer".into())
            .spawn(move || {
                let started = Instant::now();
                for event in &sequence.events()[sequence.index_at(offset)..] {
                    let due = event.at.saturating_sub(offset);
                    loop {
                        let elapsed = started.elapsed();
                        if elapsed >= due {
                            match stop_rx.try_recv() {
                                Err(TryRecvError::Empty) => break,
                                _ => return,
                            }
                        }
                        match stop_rx.recv_timeout(due - elapsed) {
                            Err(RecvTimeoutError::Timeout) => continue,
                            _ => return,
                        }
                    }
                    emit(&out, &event.bytes);
                }
                done.store(true, Ordering::SeqCst);
            })
            .map_err(|e| PlaybackError::Midi(format!("cannot start sequencer: {e}")))?;

        self.worker = Some(Worker {
            stop: stop_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the sequencer thread, silence every channel and return the offset reached.
    pub fn halt(&mut self) -> Duration {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop.send(());
            if worker.handle.join().is_err() {
                warn!("sequencer thread panicked");
            }
            self.silence();
        }
        self.clock.halt()
    }

    pub fn set_position(&self, at: Duration) {
        self.clock.set(at);
    }

    pub fn set_gain(&self, gain: f32) {
        let value = (gain.clamp(0.0, 1.0) * 127.0).round() as u8;
        for ch in 0..16u8 {
            emit(&self.out, &[0xB0 | ch, CC_VOLUME, value]);
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn clock(&self) -> Arc<PlayClock> {
        self.clock.clone()
    }

    pub fn duration(&self) -> Duration {
        self.sequence.duration()
    }

    fn silence(&self) {
        for ch in 0..16u8 {
            emit(&self.out, &[0xB0 | ch, CC_ALL_SOUND_OFF, 0]);
            emit(&self.out, &[0xB0 | ch, CC_ALL_NOTES_OFF, 0]);
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Standard MIDI files sequenced into a MIDI output port.
pub struct MidiBackend {
    sequencer: Sequencer,
}

impl MidiBackend {
    pub fn open(path: &Path, gain: f32, port_hint: Option<&str>) -> PlaybackResult<Self> {
        let data = fs::read(path).map_err(|source| PlaybackError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let sequence = Sequence::parse(&data)?;
        let conn = connect_output(port_hint)?;
        debug!(file = %path.display(), events = sequence.events().len(), duration = ?sequence.duration(), "midi backend open");
        Ok(Self::with_output(sequence, Box::new(conn), gain))
    }

    pub fn with_output(sequence: Sequence, out: Box<dyn MidiOut>, gain: f32) -> Self {
        let sequencer = Sequencer::new(sequence, out);
        sequencer.set_gain(gain);
        Self { sequencer }
    }
}

impl Backend for MidiBackend {
    fn name(&self) -> &'static str {
        "midi"
    }

    fn start(&mut self, from: Duration) -> PlaybackResult<()> {
        self.sequencer.play_from(from)
    }

    fn pause(&mut self) -> Option<Duration> {
        Some(self.sequencer.halt())
    }

    fn resume(&mut self, at: Duration) -> PlaybackResult<bool> {
        self.sequencer.play_from(at)?;
        Ok(true)
    }

    fn seek(&mut self, to: Duration, playing: bool) -> PlaybackResult<bool> {
        if playing {
            self.sequencer.halt();
            self.sequencer.play_from(to)?;
        } else {
            self.sequencer.set_position(to);
        }
        Ok(true)
    }

    fn position(&self) -> Option<Duration> {
        Some(self.sequencer.clock().now())
    }

    fn duration(&self) -> Option<Duration> {
        Some(self.sequencer.duration())
    }

    fn set_gain(&mut self, gain: f32) {
        self.sequencer.set_gain(gain);
    }

    fn finished(&mut self) -> bool {
        self.sequencer.is_done()
    }

    fn probe(&self) -> Arc<dyn PositionProbe> {
        self.sequencer.clock()
    }

    fn close(&mut self) {
        self.sequencer.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u15, u24, u28};
    use midly::{Header, TrackEvent};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Vec<u8>>>>);

    impl MidiOut for Recorder {
        fn emit(&mut self, message: &[u8]) -> Result<(), String> {
            lock(&self.0).push(message.to_vec());
            Ok(())
        }
    }

    impl Recorder {
        fn notes(&self) -> Vec<Vec<u8>> {
            lock(&self.0)
                .iter()
                .filter(|m| m[0] & 0xF0 == 0x90)
                .cloned()
                .collect()
        }
    }

    fn note_on(delta: u32, key: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(100),
                },
            },
        }
    }

    fn meta(delta: u32, m: MetaMessage<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Meta(m),
        }
    }

    fn smf_bytes(format: Format, tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let smf = Smf {
            header: Header::new(format, Timing::Metrical(u15::new(480))),
            tracks,
        };
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        buf
    }

    #[test]
    fn parse_applies_tempo_changes() {
        let bytes = smf_bytes(
            Format::SingleTrack,
            vec![vec![
                note_on(0, 60),
                // 480 ticks at 120 bpm = 500 ms
                note_on(480, 62),
                // 4x faster from here: 480 ticks = 125 ms
                meta(0, MetaMessage::Tempo(u24::new(125_000))),
                note_on(480, 64),
                meta(0, MetaMessage::EndOfTrack),
            ]],
        );
        let seq = Sequence::parse(&bytes).unwrap();
        let times: Vec<u128> = seq.events().iter().map(|e| e.at.as_millis()).collect();
        assert_eq!(times, vec![0, 500, 625]);
        assert_eq!(seq.duration(), Duration::from_millis(625));
        assert_eq!(seq.events()[1].bytes, vec![0x90, 62, 100]);
    }

    #[test]
    fn parallel_tracks_are_merged_and_sequential_tracks_chained() {
        let tracks = || {
            vec![
                vec![note_on(480, 60), meta(0, MetaMessage::EndOfTrack)],
                vec![note_on(240, 72), meta(0, MetaMessage::EndOfTrack)],
            ]
        };

        let parallel = Sequence::parse(&smf_bytes(Format::Parallel, tracks())).unwrap();
        let keys: Vec<u8> = parallel.events().iter().map(|e| e.bytes[1]).collect();
        assert_eq!(keys, vec![72, 60]);
        assert_eq!(parallel.duration(), Duration::from_millis(500));

        let sequential = Sequence::parse(&smf_bytes(Format::Sequential, tracks())).unwrap();
        let times: Vec<u128> = sequential.events().iter().map(|e| e.at.as_millis()).collect();
        assert_eq!(times, vec![500, 750]);
    }

    #[test]
    fn index_at_finds_first_event_not_before_offset() {
        let seq = Sequence::parse(&smf_bytes(
            Format::SingleTrack,
            vec![vec![note_on(0, 1), note_on(480, 2), note_on(480, 3)]],
        ))
        .unwrap();
        assert_eq!(seq.index_at(Duration::ZERO), 0);
        assert_eq!(seq.index_at(Duration::from_millis(1)), 1);
        assert_eq!(seq.index_at(Duration::from_millis(500)), 1);
        assert_eq!(seq.index_at(Duration::from_secs(5)), 3);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            Sequence::parse(b"not a midi file"),
            Err(PlaybackError::Midi(_))
        ));
    }

    #[test]
    fn encode_builds_status_bytes() {
        assert_eq!(
            encode(
                3,
                MidiMessage::Controller {
                    controller: u7::new(7),
                    value: u7::new(90)
                }
            ),
            vec![0xB3, 7, 90]
        );
        assert_eq!(
            encode(
                0,
                MidiMessage::ProgramChange {
                    program: u7::new(5)
                }
            ),
            vec![0xC0, 5]
        );
    }

    #[test]
    fn sequencer_plays_to_the_end_and_silences_on_halt() {
        // 480 ticks = 10 ms at this tempo.
        let bytes = smf_bytes(
            Format::SingleTrack,
            vec![vec![
                meta(0, MetaMessage::Tempo(u24::new(10_000))),
                note_on(0, 60),
                note_on(480, 62),
                note_on(480, 64),
            ]],
        );
        let rec = Recorder::default();
        let mut backend =
            MidiBackend::with_output(Sequence::parse(&bytes).unwrap(), Box::new(rec.clone()), 1.0);

        backend.start(Duration::ZERO).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !backend.finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(backend.finished());
        assert_eq!(rec.notes().len(), 3);

        backend.close();
        let all = lock(&rec.0).clone();
        assert!(all.contains(&vec![0xB0, CC_ALL_NOTES_OFF, 0]));
        assert!(all.contains(&vec![0xBF, CC_VOLUME, 127]));
    }

    #[test]
    fn sequencer_resumes_from_offset() {
        // One note per second; resuming at 1.5 s skips the first two.
        let bytes = smf_bytes(
            Format::SingleTrack,
            vec![vec![
                meta(0, MetaMessage::Tempo(u24::new(1_000_000))),
                note_on(0, 60),
                note_on(480, 61),
                note_on(480, 62),
            ]],
        );
        let rec = Recorder::default();
        let mut backend =
            MidiBackend::with_output(Sequence::parse(&bytes).unwrap(), Box::new(rec.clone()), 0.5);

        assert!(backend.seek(Duration::from_millis(1500), false).unwrap());
        assert_eq!(backend.position(), Some(Duration::from_millis(1500)));
        assert!(backend.resume(Duration::from_millis(1500)).unwrap());
        thread::sleep(Duration::from_millis(50));
        let at = backend.pause().unwrap();
        assert!(at >= Duration::from_millis(1500));
        assert!(rec.notes().is_empty());
        assert!(!backend.finished());
    }
}
