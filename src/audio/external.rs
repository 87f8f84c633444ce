//! Playback through an external media player process.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::FallbackSettings;
use crate::error::{PlaybackError, PlaybackResult};
use crate::process::ManagedProcess;

use super::backend::{Backend, PositionProbe, probe_duration};
use super::clock::PlayClock;

pub struct ProcessBackend {
    path: PathBuf,
    player: FallbackSettings,
    kill_timeout: Duration,
    child: Option<ManagedProcess>,
    clock: Arc<PlayClock>,
    duration: Option<Duration>,
}

impl ProcessBackend {
    /// Check the file is readable. The player itself is spawned on `start`.
    pub fn open(
        path: &Path,
        player: FallbackSettings,
        kill_timeout: Duration,
    ) -> PlaybackResult<Self> {
        std::fs::metadata(path).map_err(|source| PlaybackError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let duration = probe_duration(path);
        Ok(Self {
            path: path.to_path_buf(),
            player,
            kill_timeout,
            child: None,
            clock: Arc::new(PlayClock::new(duration)),
            duration,
        })
    }

    pub fn supports_offset(&self) -> bool {
        self.player.offset_arg.is_some()
    }

    fn command(&self, at: Duration) -> Command {
        let mut cmd = Command::new(&self.player.program);
        cmd.args(&self.player.args);
        match &self.player.offset_arg {
            Some(flag) if !at.is_zero() => {
                cmd.arg(flag).arg(format!("{:.3}", at.as_secs_f64()));
            }
            _ => {}
        }
        cmd.arg(&self.path);
        cmd
    }

    /// Replace any running player with one starting at `at`. `Ok(false)` when
    /// the player cannot start anywhere but the beginning.
    fn spawn_at(&mut self, at: Duration) -> PlaybackResult<bool> {
        if !at.is_zero() && !self.supports_offset() {
            debug!(player = %self.player.program, "player has no start offset");
            return Ok(false);
        }
        self.kill();

        let process = ManagedProcess::spawn(&mut self.command(at), self.kill_timeout).map_err(
            |source| match source.kind() {
                io::ErrorKind::NotFound => {
                    PlaybackError::NoBackend(format!("{} not found", self.player.program))
                }
                _ => PlaybackError::Spawn {
                    program: self.player.program.clone(),
                    source,
                },
            },
        )?;
        self.child = Some(process);
        self.clock.run_from(at);
        Ok(true)
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            child.terminate();
        }
    }
}

impl Backend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    fn start(&mut self, from: Duration) -> PlaybackResult<()> {
        if self.spawn_at(from)? {
            Ok(())
        } else {
            Err(PlaybackError::NoBackend(format!(
                "{} cannot start at an offset",
                self.player.program
            )))
        }
    }

    fn pause(&mut self) -> Option<Duration> {
        self.kill();
        self.clock.halt();
        None
    }

    fn resume(&mut self, at: Duration) -> PlaybackResult<bool> {
        self.spawn_at(at)
    }

    fn seek(&mut self, to: Duration, playing: bool) -> PlaybackResult<bool> {
        if playing {
            return self.spawn_at(to);
        }
        if !to.is_zero() && !self.supports_offset() {
            return Ok(false);
        }
        self.clock.set(to);
        Ok(true)
    }

    fn position(&self) -> Option<Duration> {
        None
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn set_gain(&mut self, gain: f32) {
        debug!(player = %self.player.program, gain, "external player volume is not adjustable");
    }

    fn finished(&mut self) -> bool {
        self.child.as_mut().is_some_and(|c| c.has_exited())
    }

    fn probe(&self) -> Arc<dyn PositionProbe> {
        self.clock.clone()
    }

    fn close(&mut self) {
        self.kill();
        self.clock.halt();
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        self.close();
    }
}
