//! The `{NNN}_{display name}.{ext}` file naming convention.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::model::TrackFormat;

/// Largest ordinal that fits the three-digit prefix.
pub const MAX_ORDINAL: u32 = 999;

static TRACK_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{3})_(.+)\.([A-Za-z0-9]+)$").expect("track name pattern is valid")
});

/// Parsed pieces of a conforming file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackName {
    pub ordinal: u32,
    pub display_name: String,
    pub extension: String,
    pub format: TrackFormat,
}

/// Parse a file name. Returns `None` for names that do not follow the
/// convention, have ordinal 0, or carry an extension outside the allow-list.
pub fn parse(file_name: &str) -> Option<TrackName> {
    let caps = TRACK_NAME.captures(file_name)?;
    let ordinal: u32 = caps[1].parse().ok()?;
    if ordinal == 0 {
        return None;
    }
    let extension = caps[3].to_string();
    let format = TrackFormat::from_extension(&extension)?;
    Some(TrackName {
        ordinal,
        display_name: caps[2].to_string(),
        extension,
        format,
    })
}

pub fn parse_path(path: &Path) -> Option<TrackName> {
    path.file_name().and_then(|s| s.to_str()).and_then(parse)
}

pub fn file_name(ordinal: u32, display_name: &str, extension: &str) -> String {
    format!("{ordinal:03}_{display_name}.{extension}")
}

/// Hidden scratch name used while renaming; never matches the convention.
pub(crate) fn scratch_name(batch: u128, index: usize) -> String {
    format!(".tracklane-rename-{}-{batch:x}-{index}.tmp", std::process::id())
}
