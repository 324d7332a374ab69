//! Persisted settings.
//!
//! Stored as JSON at `<config dir>/seqgif/settings.json`. A missing file means
//! defaults; a broken one is reported and replaced by defaults the next time
//! settings are saved. Command-line flags override whatever is loaded here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoder::{common_install_dirs, FfmpegEncoder, DEFAULT_ENCODER_BINARY};
use crate::progress::DEFAULT_PROGRESS_CAPACITY;
use crate::sequence::{SequenceMatcher, DEFAULT_FRAME_EXTENSION};

pub const APP_DIR: &str = "seqgif";
pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_OUTPUT_EXTENSION: &str = "gif";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration directory on this system")]
    NoConfigDir,

    #[error("Cannot access settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid settings file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Binary name looked up on PATH, or a full path.
    pub binary: String,
    /// Tried in order when the binary is not on PATH.
    pub search_dirs: Vec<PathBuf>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_ENCODER_BINARY.to_string(),
            search_dirs: common_install_dirs(),
        }
    }
}

impl EncoderSettings {
    pub fn encoder(&self) -> FfmpegEncoder {
        FfmpegEncoder::new(self.binary.clone()).with_search_dirs(self.search_dirs.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionDefaults {
    pub framerate: u32,
    pub width: u32,
    pub loop_forever: bool,
}

impl Default for ConversionDefaults {
    fn default() -> Self {
        Self {
            framerate: 10,
            width: 480,
            loop_forever: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub frame_extension: String,
    pub output_extension: String,
    pub encoder: EncoderSettings,
    pub defaults: ConversionDefaults,
    pub progress_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_extension: DEFAULT_FRAME_EXTENSION.to_string(),
            output_extension: DEFAULT_OUTPUT_EXTENSION.to_string(),
            encoder: EncoderSettings::default(),
            defaults: ConversionDefaults::default(),
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

/// `<config dir>/seqgif/settings.json`, if the platform has a config dir.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
}

impl Settings {
    /// Settings from the user's config file, or defaults.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            debug!("No config directory, using default settings");
            return Self::default();
        };
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_error)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn matcher(&self) -> SequenceMatcher {
        SequenceMatcher::new(self.frame_extension.clone())
    }
}
