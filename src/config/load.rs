use std::{env, path::PathBuf};

use super::schema::Settings;

/// Configuration loading helpers.
///
/// `Settings::load` reads an optional config file, then lets environment
/// variables (prefix `TRACKLANE__`) override it, and falls back to struct defaults.
impl Settings {
    /// Load settings from an optional config file and the environment.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let config_path = resolve_config_path();

        let mut builder = ::config::Config::builder();

        if let Some(path) = &config_path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("TRACKLANE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }

    /// Perform basic validation checks on loaded settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.playback.tracker_interval_ms == 0 {
            return Err("playback.tracker_interval_ms must be >= 1".to_string());
        }
        if self.conversion.sample_rate == 0 {
            return Err("conversion.sample_rate must be >= 1".to_string());
        }
        if self.conversion.channels == 0 {
            return Err("conversion.channels must be >= 1".to_string());
        }
        if !matches!(self.conversion.bit_depth, 16 | 24 | 32) {
            return Err(format!(
                "conversion.bit_depth must be 16, 24 or 32 (got {})",
                self.conversion.bit_depth
            ));
        }
        if self.conversion.encoder.trim().is_empty() {
            return Err("conversion.encoder must not be empty".to_string());
        }
        if self.fallback.program.trim().is_empty() {
            return Err("fallback.program must not be empty".to_string());
        }
        Ok(())
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Playlist directory from settings, or the platform default.
    pub fn playlist_dir(&self) -> Option<PathBuf> {
        self.library.dir.clone().or_else(default_playlist_dir)
    }
}

/// Resolve the config path from `TRACKLANE_CONFIG_PATH` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("TRACKLANE_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    default_config_path()
}

/// Compute the default config path under `$XDG_CONFIG_HOME/tracklane/config.toml`
/// or `~/.config/tracklane/config.toml` when `XDG_CONFIG_HOME` is not set.
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    };

    config_home.map(|d| d.join("tracklane").join("config.toml"))
}

/// Default playlist directory under `$XDG_DATA_HOME/tracklane/playlist`
/// or `~/.local/share/tracklane/playlist`.
pub fn default_playlist_dir() -> Option<PathBuf> {
    let data_home = if let Some(xdg) = env::var_os("XDG_DATA_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("share"))
    };

    data_home.map(|d| d.join("tracklane").join("playlist"))
}
