//! The on-disk playlist: track model, naming convention, upload conversion
//! and the repository that keeps ordinals dense.

mod convert;
mod display;
mod model;
pub mod naming;
mod repository;

pub use convert::{Converter, install_hint};
pub use display::{format_clock, format_size};
pub use model::{Track, TrackFormat};
pub use repository::TrackRepository;
