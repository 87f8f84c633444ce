use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::library::Track;

use super::backend::PositionProbe;
use super::types::lock;

/// Background task copying the backend position into the current track.
///
/// Exists only while the engine is `Playing`. It never changes playback
/// state; end of stream is noticed by the engine's `tick`.
pub(crate) struct Tracker {
    cancelled: Arc<AtomicBool>,
    wake: Sender<()>,
    track: Arc<Mutex<Track>>,
    handle: JoinHandle<()>,
}

impl Tracker {
    pub(crate) fn spawn(
        track: Arc<Mutex<Track>>,
        probe: Arc<dyn PositionProbe>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (wake, rx) = mpsc::channel::<()>();

        let flag = cancelled.clone();
        let shared = track.clone();
        let handle = thread::Builder::new()
            .name("tracklane-tracker".into())
            .spawn(move || {
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    let Some(pos) = probe.position() else {
                        continue;
                    };
                    let mut t = lock(&shared);
                    // Checked under the lock so no write lands after `stop` returns.
                    if flag.load(Ordering::SeqCst) {
                        break;
                    }
                    t.position = pos;
                }
            })?;

        debug!(interval_ms = interval.as_millis() as u64, "tracker started");
        Ok(Self {
            cancelled,
            wake,
            track,
            handle,
        })
    }

    /// Cancel and join, waiting at most `wait`.
    ///
    /// Once this returns the thread can no longer modify the track, even if
    /// it had to be detached.
    pub(crate) fn stop(self, wait: Duration) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.wake.send(());
        // Barrier: a write in progress finishes before we continue, and any
        // later one sees the flag.
        drop(lock(&self.track));

        let deadline = Instant::now() + wait;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("tracker did not exit in time, detaching");
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        if self.handle.join().is_err() {
            warn!("tracker thread panicked");
        }
        debug!("tracker stopped");
    }
}
