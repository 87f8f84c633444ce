//! Upload-time transcoding to WAV through an external encoder.
//!
//! Conversion is a synchronous blocking call in the caller's context and
//! cannot be cancelled.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::config::ConversionSettings;
use crate::error::{LibraryError, LibraryResult};

#[derive(Debug, Clone)]
pub struct Converter {
    settings: ConversionSettings,
}

impl Converter {
    pub fn new(settings: ConversionSettings) -> Self {
        Self { settings }
    }

    /// Check that the encoder can be run (`<encoder> -version` exits 0).
    pub fn probe(&self) -> LibraryResult<()> {
        let status = Command::new(&self.settings.encoder)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(s) if s.success() => Ok(()),
            Ok(s) => {
                debug!(encoder = %self.settings.encoder, %s, "encoder probe failed");
                Err(self.unavailable())
            }
            Err(e) => {
                debug!(encoder = %self.settings.encoder, error = %e, "encoder not found");
                Err(self.unavailable())
            }
        }
    }

    /// Transcode `input` into a WAV file at `output`.
    ///
    /// Any failure removes whatever the encoder left at `output`.
    pub fn convert(&self, input: &Path, output: &Path) -> LibraryResult<()> {
        self.probe()?;

        let args = self.arguments(input, output);
        info!(encoder = %self.settings.encoder, input = %input.display(), output = %output.display(), "converting");

        let result = Command::new(&self.settings.encoder)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                remove_partial(output);
                return Err(LibraryError::conversion_failed(None, e.to_string()));
            }
        };

        let produced = fs::metadata(output).map(|m| m.len() > 0).unwrap_or(false);
        if out.status.success() && produced {
            return Ok(());
        }

        remove_partial(output);
        let mut captured = String::from_utf8_lossy(&out.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&out.stdout);
        if !stdout.trim().is_empty() {
            if !captured.is_empty() {
                captured.push('\n');
            }
            captured.push_str(stdout.trim());
        }
        if captured.is_empty() && out.status.success() {
            captured = "encoder produced no output file".to_string();
        }
        Err(LibraryError::conversion_failed(Some(out.status), captured))
    }

    /// Fixed argument vector: input, rate, channels, sample format, overwrite, output.
    pub fn arguments(&self, input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        let s = &self.settings;
        vec![
            "-hide_banner".into(),
            "-i".into(),
            input.as_os_str().to_os_string(),
            "-ar".into(),
            s.sample_rate.to_string().into(),
            "-ac".into(),
            s.channels.to_string().into(),
            "-c:a".into(),
            format!("pcm_s{}le", s.bit_depth).into(),
            "-y".into(),
            output.as_os_str().to_os_string(),
        ]
    }

    fn unavailable(&self) -> LibraryError {
        LibraryError::ConversionUnavailable {
            encoder: self.settings.encoder.clone(),
            hint: install_hint(&self.settings.encoder),
        }
    }
}

fn remove_partial(output: &Path) {
    if output.exists() {
        let _ = fs::remove_file(output);
    }
}

/// Platform-specific remediation text for a missing encoder.
pub fn install_hint(encoder: &str) -> String {
    if cfg!(target_os = "macos") {
        format!("Install it with `brew install {encoder}` and make sure it is on PATH.")
    } else if cfg!(target_os = "windows") {
        format!(
            "Install it with `winget install {encoder}` (or `choco install {encoder}`) and restart the shell so PATH is refreshed."
        )
    } else {
        format!(
            "Install it with your package manager, e.g. `sudo apt install {encoder}` or `sudo dnf install {encoder}`."
        )
    }
}
