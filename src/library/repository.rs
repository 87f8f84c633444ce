use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{ConversionSettings, Settings};
use crate::error::{LibraryError, LibraryResult};

use super::convert::Converter;
use super::display::format_size;
use super::model::{Track, TrackFormat};
use super::naming::{self, MAX_ORDINAL};

/// Owns the playlist directory and keeps its ordinals dense (`1..N`).
#[derive(Debug)]
pub struct TrackRepository {
    dir: PathBuf,
    converter: Converter,
}

impl TrackRepository {
    /// Open (creating if needed) the playlist directory at `dir`.
    pub fn open(dir: impl Into<PathBuf>, conversion: ConversionSettings) -> LibraryResult<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(dir = %dir.display(), "created playlist directory");
        }
        let dir = dir.canonicalize()?;
        Ok(Self {
            dir,
            converter: Converter::new(conversion),
        })
    }

    pub fn from_settings(settings: &Settings) -> LibraryResult<Self> {
        let dir = settings.playlist_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no playlist directory configured and HOME is unset")
        })?;
        Self::open(dir, settings.conversion.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List conforming track files sorted by ordinal.
    ///
    /// Entries that cannot be read or do not follow the naming convention are skipped.
    pub fn scan(&self) -> Vec<Track> {
        let mut tracks: Vec<Track> = Vec::new();

        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| match e {
                Ok(e) => Some(e),
                Err(err) => {
                    debug!(error = %err, "skipping unreadable entry");
                    None
                }
            })
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            match naming::parse_path(path) {
                Some(name) => tracks.push(Track::new(
                    path.to_path_buf(),
                    name.ordinal,
                    name.display_name,
                    name.format,
                )),
                None => debug!(file = %path.display(), "ignoring non-track file"),
            }
        }

        tracks.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.path.cmp(&b.path)));
        tracks
    }

    pub fn next_ordinal(&self) -> u32 {
        self.scan().iter().map(|t| t.ordinal).max().unwrap_or(0) + 1
    }

    /// Add `source` to the end of the playlist, transcoding compressed formats to WAV.
    pub fn upload(&self, source: &Path) -> LibraryResult<Track> {
        let meta = fs::metadata(source)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a regular file: {}", source.display()),
            )
            .into());
        }

        let ext = source
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let format = TrackFormat::from_extension(&ext)
            .ok_or_else(|| LibraryError::UnsupportedFormat(ext.clone()))?;

        let display_name = source
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LibraryError::InvalidName(source.display().to_string()))?
            .to_string();

        let ordinal = self.next_ordinal();
        if ordinal > MAX_ORDINAL {
            return Err(LibraryError::PlaylistFull(MAX_ORDINAL));
        }

        let track = if format.needs_conversion() {
            let dest = self.dir.join(naming::file_name(ordinal, &display_name, "wav"));
            self.converter.convert(source, &dest)?;
            Track::new(dest, ordinal, display_name, TrackFormat::Wav)
        } else {
            let dest = self.dir.join(naming::file_name(ordinal, &display_name, &ext));
            if let Err(e) = fs::copy(source, &dest) {
                let _ = fs::remove_file(&dest);
                return Err(e.into());
            }
            Track::new(dest, ordinal, display_name, format)
        };

        info!(source = %source.display(), dest = %track.file_name(), "uploaded track");
        Ok(track)
    }

    /// Remove `track` and shift every later track down by one.
    ///
    /// Returns `Ok(false)` when the file was already gone.
    pub fn delete(&self, track: &Track) -> LibraryResult<bool> {
        match fs::remove_file(&track.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        info!(track = %track, "deleted track");

        let plan: Vec<(PathBuf, PathBuf)> = self
            .scan()
            .into_iter()
            .filter(|t| t.ordinal > track.ordinal)
            .map(|t| {
                let to = self.target_path(&t, t.ordinal - 1);
                (t.path, to)
            })
            .collect();
        self.rename_all(&plan)?;
        Ok(true)
    }

    /// Rewrite ordinals to follow `order`, which must name exactly the tracks on disk.
    pub fn reorder(&self, order: &[Track]) -> LibraryResult<Vec<Track>> {
        let current = self.scan();
        let on_disk: HashSet<&Path> = current.iter().map(|t| t.path.as_path()).collect();
        let requested: HashSet<&Path> = order.iter().map(|t| t.path.as_path()).collect();

        if order.len() != current.len() || requested.len() != order.len() || requested != on_disk {
            return Err(LibraryError::ReorderMismatch {
                expected: current.len(),
                found: order.len(),
            });
        }

        let mut plan = Vec::with_capacity(order.len());
        let mut reordered = Vec::with_capacity(order.len());
        for (i, track) in order.iter().enumerate() {
            let ordinal = i as u32 + 1;
            let to = self.target_path(track, ordinal);
            plan.push((track.path.clone(), to.clone()));

            let mut t = Track::new(to, ordinal, track.display_name.clone(), track.format);
            t.duration = track.duration;
            reordered.push(t);
        }

        self.rename_all(&plan)?;
        info!(tracks = reordered.len(), "reordered playlist");
        Ok(reordered)
    }

    /// Best-effort removal of every track. Returns `false` if any file survived.
    pub fn clear_all(&self) -> bool {
        let mut all_deleted = true;
        for track in self.scan() {
            if let Err(e) = fs::remove_file(&track.path) {
                all_deleted = false;
                warn!(file = %track.file_name(), error = %e, "failed to delete");
            }
        }
        all_deleted
    }

    pub fn track_count(&self) -> usize {
        self.scan().len()
    }

    pub fn total_size(&self) -> u64 {
        self.scan().iter().map(Track::file_size).sum()
    }

    pub fn directory_info(&self) -> String {
        let mut info = format!("Playlist directory: {}\n", self.dir.display());
        info.push_str(&format!("Exists: {}\n", self.dir.exists()));
        if self.dir.exists() {
            info.push_str(&format!("Track count: {}\n", self.track_count()));
            info.push_str(&format!("Total size: {}\n", format_size(self.total_size())));
        }
        info
    }

    fn target_path(&self, track: &Track, ordinal: u32) -> PathBuf {
        let ext = naming::parse_path(&track.path)
            .map(|n| n.extension)
            .unwrap_or_else(|| track.extension().to_string());
        self.dir
            .join(naming::file_name(ordinal, &track.display_name, &ext))
    }

    /// Two-phase rename: every source goes to a hidden scratch name first, then
    /// to its final name, so no rename lands on a name still held by another track.
    fn rename_all(&self, plan: &[(PathBuf, PathBuf)]) -> LibraryResult<()> {
        let plan: Vec<&(PathBuf, PathBuf)> = plan.iter().filter(|(from, to)| from != to).collect();
        if plan.is_empty() {
            return Ok(());
        }

        let batch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut staged: Vec<(PathBuf, &Path, &Path)> = Vec::with_capacity(plan.len());
        for (i, (from, to)) in plan.iter().enumerate() {
            let scratch = self.dir.join(naming::scratch_name(batch, i));
            if let Err(e) = fs::rename(from, &scratch) {
                for (scratch, from, _) in staged.iter().rev() {
                    if let Err(undo) = fs::rename(scratch, from) {
                        error!(file = %from.display(), error = %undo, "failed to restore after rename error");
                    }
                }
                return Err(e.into());
            }
            staged.push((scratch, from.as_path(), to.as_path()));
        }

        for (done, (scratch, from, to)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(scratch, to) {
                error!(from = %from.display(), to = %to.display(), error = %e, "rename failed, restoring unfinished tracks");
                restore_unfinished(&staged[done..]);
                return Err(e.into());
            }
            debug!(from = %from.display(), to = %to.display(), "renamed");
        }
        Ok(())
    }
}

/// Move staged scratch files back to their original names when those are free.
fn restore_unfinished(staged: &[(PathBuf, &Path, &Path)]) {
    for (scratch, from, _) in staged {
        if from.exists() {
            error!(file = %from.display(), scratch = %scratch.display(), "original name is taken, track left under scratch name");
            continue;
        }
        if let Err(e) = fs::rename(scratch, from) {
            error!(file = %from.display(), error = %e, "failed to restore after rename error");
        }
    }
}
