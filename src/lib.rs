//! A numbered local playlist directory and a playback engine that plays its
//! tracks through rodio, a MIDI output port, or an external player.

pub mod audio;
pub mod config;
pub mod error;
pub mod library;
pub mod process;

pub use audio::{PlaybackEngine, PlaybackState};
pub use config::Settings;
pub use error::{LibraryError, PlaybackError};
pub use library::{Track, TrackFormat, TrackRepository};
