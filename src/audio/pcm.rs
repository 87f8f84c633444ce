//! Native output through a `rodio` sink on the default device.
//!
//! Used for WAV and for compressed formats the bundled decoders understand.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use tracing::debug;

use crate::error::{PlaybackError, PlaybackResult};

use super::backend::{Backend, PositionProbe, probe_duration};
use super::types::lock;

/// The live sink plus the offset it was rebuilt at (see `rebuild_at`).
struct PcmOutput {
    sink: Mutex<Sink>,
    base: Mutex<Duration>,
}

impl PositionProbe for PcmOutput {
    fn position(&self) -> Option<Duration> {
        let base = *lock(&self.base);
        Some(base + lock(&self.sink).get_pos())
    }
}

pub struct PcmBackend {
    path: PathBuf,
    output: Arc<PcmOutput>,
    duration: Option<Duration>,
    gain: f32,
    // Declared last so the sink is torn down before the device stream.
    stream: Option<OutputStream>,
}

impl PcmBackend {
    /// Decode `path` and attach it, paused, to a fresh output stream.
    pub fn open(path: &Path, gain: f32) -> PlaybackResult<Self> {
        let source = decode(path)?;
        let duration = source.total_duration().or_else(|| probe_duration(path));

        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        // rodio logs to stderr when OutputStream is dropped.
        stream.log_on_drop(false);

        let sink = Sink::connect_new(stream.mixer());
        sink.pause();
        sink.set_volume(gain);
        sink.append(source);

        debug!(file = %path.display(), ?duration, "pcm backend open");
        Ok(Self {
            path: path.to_path_buf(),
            output: Arc::new(PcmOutput {
                sink: Mutex::new(sink),
                base: Mutex::new(Duration::ZERO),
            }),
            duration,
            gain,
            stream: Some(stream),
        })
    }

    fn reposition(&mut self, to: Duration) -> PlaybackResult<()> {
        let seeked = lock(&self.output.sink).try_seek(to);
        match seeked {
            Ok(()) => {
                *lock(&self.output.base) = Duration::ZERO;
                Ok(())
            }
            Err(e) => {
                debug!(file = %self.path.display(), error = %e, "seek unsupported, rebuilding source");
                self.rebuild_at(to)
            }
        }
    }

    /// Replace the sink with a paused one whose source skips to `to`.
    ///
    /// `Source::skip_duration` works for every decoder, seekable or not; the
    /// new sink counts from zero so the skipped span is kept in `base`.
    fn rebuild_at(&mut self, to: Duration) -> PlaybackResult<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| PlaybackError::Device("output stream closed".to_string()))?;
        let source = decode(&self.path)?.skip_duration(to);

        let sink = Sink::connect_new(stream.mixer());
        sink.pause();
        sink.set_volume(self.gain);
        sink.append(source);

        let old = std::mem::replace(&mut *lock(&self.output.sink), sink);
        old.stop();
        *lock(&self.output.base) = to;
        Ok(())
    }
}

fn decode(path: &Path) -> PlaybackResult<Decoder<BufReader<File>>> {
    let file = File::open(path).map_err(|source| PlaybackError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Decoder::new(BufReader::new(file)).map_err(|e| PlaybackError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Hold `sink` paused around `f` when `playing`, restarting it even if `f` fails.
///
/// `f` may swap the sink inside the mutex; whichever sink is current afterwards
/// is the one restarted.
fn paused_during<T>(
    sink: &Mutex<Sink>,
    playing: bool,
    f: impl FnOnce() -> PlaybackResult<T>,
) -> PlaybackResult<T> {
    if playing {
        lock(sink).pause();
    }
    let result = f();
    if playing {
        lock(sink).play();
    }
    result
}

impl Backend for PcmBackend {
    fn name(&self) -> &'static str {
        "pcm"
    }

    fn start(&mut self, from: Duration) -> PlaybackResult<()> {
        if !from.is_zero() {
            self.reposition(from)?;
        }
        lock(&self.output.sink).play();
        Ok(())
    }

    fn pause(&mut self) -> Option<Duration> {
        lock(&self.output.sink).pause();
        self.output.position()
    }

    fn resume(&mut self, at: Duration) -> PlaybackResult<bool> {
        self.reposition(at)?;
        lock(&self.output.sink).play();
        Ok(true)
    }

    fn seek(&mut self, to: Duration, playing: bool) -> PlaybackResult<bool> {
        let output = self.output.clone();
        paused_during(&output.sink, playing, || self.reposition(to))?;
        Ok(true)
    }

    fn position(&self) -> Option<Duration> {
        self.output.position()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        lock(&self.output.sink).set_volume(gain);
    }

    fn finished(&mut self) -> bool {
        lock(&self.output.sink).empty()
    }

    fn probe(&self) -> Arc<dyn PositionProbe> {
        self.output.clone()
    }

    fn close(&mut self) {
        lock(&self.output.sink).stop();
        if self.stream.take().is_some() {
            debug!(file = %self.path.display(), "pcm backend closed");
        }
    }
}

impl Drop for PcmBackend {
    fn drop(&mut self) {
        self.close();
    }
}
