//! Settings for batch runs, the image fetcher and the relay

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::placer::DEFAULT_GAP;
use crate::table::Placeholder;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("error reading settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("gap must be a finite, non-negative number, got {0}")]
    InvalidGap(f64),
}

fn check_gap(gap: f64) -> Result<(), SettingsError> {
    if !gap.is_finite() || gap < 0.0 {
        return Err(SettingsError::InvalidGap(gap));
    }
    Ok(())
}

/// Runtime settings, loadable from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Vertical space between consecutive instances
    pub gap: f64,

    /// What text layers receive for missing values
    pub placeholder: Placeholder,

    /// Relay endpoint images are fetched through
    pub proxy_endpoint: String,

    pub fetch_timeout_secs: u64,

    /// Port the relay listens on
    pub relay_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gap: DEFAULT_GAP,
            placeholder: Placeholder::Empty,
            proxy_endpoint: "http://localhost:3000/image".to_string(),
            fetch_timeout_secs: 30,
            relay_port: 3000,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from TOML text; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        check_gap(self.gap)
    }

    /// Set the gap between instances; rejects negative and non-finite values
    pub fn with_gap(mut self, gap: f64) -> Result<Self, SettingsError> {
        check_gap(gap)?;
        self.gap = gap;
        Ok(self)
    }

    pub fn with_placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
