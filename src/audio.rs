//! Playback: the engine state machine and its backends.

mod backend;
mod clock;
mod engine;
mod external;
pub mod midi;
mod pcm;
mod tracker;
mod types;

pub use backend::{Backend, BackendFactory, NativeBackends, PositionProbe};
pub use clock::PlayClock;
pub use engine::PlaybackEngine;
pub use external::ProcessBackend;
pub use midi::MidiBackend;
pub use pcm::PcmBackend;
pub use types::{PlaybackState, Volume};

#[cfg(test)]
mod tests;
