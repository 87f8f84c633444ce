use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::warn;

use tracklane::library::format_clock;
use tracklane::{PlaybackEngine, Track};

const TICK: Duration = Duration::from_millis(200);

/// One line typed at the `play` prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Pause,
    Resume,
    Stop,
    Next,
    Prev,
    Seek(i64),
    Volume(f32),
    Mute,
    Status,
    Quit,
}

impl Control {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Some(Self::Status);
        };
        let ctl = match word {
            "p" | "pause" => Self::Pause,
            "r" | "resume" => Self::Resume,
            "s" | "stop" => Self::Stop,
            "n" | "next" => Self::Next,
            "b" | "back" | "prev" => Self::Prev,
            "seek" => {
                let secs: f64 = words.next()?.parse().ok()?;
                Self::Seek((secs * 1000.0).round() as i64)
            }
            "vol" | "volume" => {
                let pct: f32 = words.next()?.parse().ok()?;
                Self::Volume(pct / 100.0)
            }
            "mute" | "m" => Self::Mute,
            "q" | "quit" => Self::Quit,
            _ => return None,
        };
        Some(ctl)
    }
}

/// Plays through `tracks` starting at `index`, reading controls from stdin.
pub struct Session {
    engine: PlaybackEngine,
    tracks: Vec<Track>,
    index: usize,
}

impl Session {
    pub fn new(engine: PlaybackEngine, tracks: Vec<Track>, index: usize) -> Self {
        Self {
            engine,
            tracks,
            index,
        }
    }

    pub fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        println!("controls: p r s n b | seek <secs> | vol <0-100> | mute | q");
        self.play_current();

        let input = spawn_stdin_reader();
        loop {
            match input.recv_timeout(TICK) {
                Ok(line) => {
                    let Some(ctl) = Control::parse(line.trim()) else {
                        println!("? {}", line.trim());
                        continue;
                    };
                    if ctl == Control::Quit {
                        break;
                    }
                    self.apply(ctl);
                    self.print_status();
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.engine.tick() && !self.advance(1) {
                        println!("end of playlist");
                    }
                }
                // stdin closed: keep playing until the playlist ends.
                Err(RecvTimeoutError::Disconnected) => {
                    if !self.engine.is_playing() {
                        break;
                    }
                    thread::sleep(TICK);
                    if self.engine.tick() && !self.advance(1) {
                        break;
                    }
                }
            }
        }

        self.engine.stop();
        Ok(())
    }

    fn apply(&mut self, ctl: Control) {
        match ctl {
            Control::Pause => {
                self.engine.pause();
            }
            Control::Resume => {
                if !self.engine.resume() && self.engine.is_stopped() {
                    self.play_current();
                }
            }
            Control::Stop => self.engine.stop(),
            Control::Next => {
                self.advance(1);
            }
            Control::Prev => {
                self.advance(-1);
            }
            Control::Seek(ms) => {
                if !self.engine.seek(ms) {
                    println!("cannot seek here");
                }
            }
            Control::Volume(level) => self.engine.set_volume(level),
            Control::Mute => {
                let muted = self.engine.is_muted();
                self.engine.set_muted(!muted);
            }
            Control::Status | Control::Quit => {}
        }
    }

    /// Move `step` tracks and play. Returns `false` when that leaves the playlist.
    fn advance(&mut self, step: isize) -> bool {
        let Some(next) = self.index.checked_add_signed(step) else {
            return false;
        };
        if next >= self.tracks.len() {
            return false;
        }
        self.index = next;
        self.play_current();
        true
    }

    fn play_current(&mut self) {
        let Some(track) = self.tracks.get(self.index) else {
            return;
        };
        match self.engine.play(track) {
            Ok(true) => println!("> {}", track.display_string()),
            Ok(false) => println!("cannot play {}: no backend for .{}", track, track.extension()),
            Err(e) => {
                warn!(track = %track, error = %e, "playback failed");
                println!("cannot play {track}: {e}");
            }
        }
    }

    fn print_status(&self) {
        let Some(track) = self.engine.current_track() else {
            println!("[{:?}]", self.engine.state());
            return;
        };
        let total = self
            .engine
            .duration()
            .map(format_clock)
            .unwrap_or_else(|| "--:--".to_string());
        println!(
            "[{:?}] {} {}/{} vol {:.0}%{}",
            self.engine.state(),
            track,
            format_clock(self.engine.position()),
            total,
            self.engine.volume() * 100.0,
            if self.engine.is_muted() { " (muted)" } else { "" }
        );
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_controls() {
        assert_eq!(Control::parse("p"), Some(Control::Pause));
        assert_eq!(Control::parse("seek 12.5"), Some(Control::Seek(12_500)));
        assert_eq!(Control::parse("vol 40"), Some(Control::Volume(0.4)));
        assert_eq!(Control::parse(""), Some(Control::Status));
        assert_eq!(Control::parse("   "), Some(Control::Status));
        assert_eq!(Control::parse("seek"), None);
        assert_eq!(Control::parse("dance"), None);
    }
}
