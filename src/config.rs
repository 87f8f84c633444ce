//! Configuration loader and schema types.
//!
//! This module exposes the configuration schema used to drive the
//! repository and engine, plus helpers to load it from disk.

mod load;
mod schema;

pub use load::{default_config_path, default_playlist_dir, resolve_config_path};
pub use schema::*;
