//! Error types shared by the playlist repository and the playback engine.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors raised by playlist directory operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Directory or file operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Upload extension is outside the allow-list.
    #[error("Unsupported audio format: {0:?}")]
    UnsupportedFormat(String),

    /// The encoder binary could not be run.
    #[error("Encoder `{encoder}` is not available. {hint}")]
    ConversionUnavailable { encoder: String, hint: String },

    /// The encoder ran but did not produce a usable file.
    #[error("Conversion failed ({status}): {output}")]
    ConversionFailed { status: String, output: String },

    /// No three-digit ordinal is left.
    #[error("Playlist is full ({0} tracks)")]
    PlaylistFull(u32),

    /// A reorder list does not name exactly the tracks on disk.
    #[error("Reorder list does not match the playlist: expected {expected} tracks, found {found}")]
    ReorderMismatch { expected: usize, found: usize },

    /// A file name could not be turned into a track name.
    #[error("Invalid track file name: {0:?}")]
    InvalidName(String),
}

impl LibraryError {
    pub(crate) fn conversion_failed(status: Option<ExitStatus>, output: String) -> Self {
        let status = match status {
            Some(s) => s.to_string(),
            None => "not run".to_string(),
        };
        Self::ConversionFailed { status, output }
    }
}

/// Errors raised while opening or driving a playback backend.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No backend handles this format.
    #[error("No playback backend for {0:?}")]
    NoBackend(String),

    /// The track's file is gone.
    #[error("Track file does not exist: {0}")]
    MissingFile(PathBuf),

    /// The file could not be opened.
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The native decoder rejected the file.
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// The audio output device could not be opened or driven.
    #[error("Audio device error: {0}")]
    Device(String),

    /// MIDI parsing or output failed.
    #[error("MIDI error: {0}")]
    Midi(String),

    /// The external player could not be started.
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

pub type LibraryResult<T> = std::result::Result<T, LibraryError>;
pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;
