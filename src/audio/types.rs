//! Audio-related small types and helpers.
//!
//! This module defines the playback state machine's states, the volume
//! model shared by all backends, and a poison-tolerant lock helper.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing is producing audio. Initial and resting state.
    #[default]
    Stopped,
    /// A backend is producing audio and the tracker is running.
    Playing,
    /// A backend is open (or resumable) at a stored offset.
    Paused,
}

/// Desired output level, applied to whichever backend is open.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Volume {
    level: f32,
    muted: bool,
}

impl Volume {
    pub fn new(level: f32) -> Self {
        Self {
            level: clamp_level(level),
            muted: false,
        }
    }

    pub fn set_level(&mut self, level: f32) {
        self.level = clamp_level(level);
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Linear gain to apply: 0.0 while muted, otherwise the level.
    pub fn gain(&self) -> f32 {
        if self.muted { 0.0 } else { self.level }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn clamp_level(level: f32) -> f32 {
    if level.is_nan() {
        return 0.0;
    }
    level.clamp(0.0, 1.0)
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
