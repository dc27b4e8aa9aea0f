use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use thiserror::Error;

use crate::history::LaunchSite;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid interval: {0}")]
    Interval(String),
    #[error("invalid launch site {0:?}: expected \"lat,lon\" within range")]
    LaunchSite(String),
}

/// Which channels the schedule cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Restrict {
    /// Rotate between both channels (the default).
    #[default]
    Both,
    PrimaryOnly,
    SecondaryOnly,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Own station's call sign, without SSID.
    pub call_sign: String,
    #[serde(default = "default_primary_hz")]
    pub primary_hz: u32,
    #[serde(default = "default_secondary_hz")]
    pub secondary_hz: u32,
    /// Secondary beacon repeat interval, e.g. "250s".
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default)]
    pub restrict: Restrict,
    /// Optional explicit launch coordinate "lat,lon". When unset, the first
    /// own-station fix is assumed to be the launch site.
    #[serde(default)]
    pub launch_site: Option<String>,
    #[serde(default = "default_ledger")]
    pub ledger: PathBuf,
    #[serde(default = "default_track")]
    pub track: PathBuf,
}

fn default_primary_hz() -> u32 {
    144_390_000
}

fn default_secondary_hz() -> u32 {
    432_560_000
}

fn default_interval() -> String {
    "250s".to_string()
}

fn default_ledger() -> PathBuf {
    PathBuf::from("messages.csv")
}

fn default_track() -> PathBuf {
    PathBuf::from("aprs.kml")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(self.interval.trim())
            .map_err(|e| ConfigError::Interval(e.to_string()))
            .and_then(|d| Duration::from_std(d).map_err(|e| ConfigError::Interval(e.to_string())))
    }

    pub fn launch_site(&self) -> Result<Option<LaunchSite>, ConfigError> {
        let Some(raw) = &self.launch_site else {
            return Ok(None);
        };
        let bad = || ConfigError::LaunchSite(raw.clone());
        let (lat, lon) = raw.split_once(',').ok_or_else(bad)?;
        let latitude_d: f64 = lat.trim().parse().map_err(|_| bad())?;
        let longitude_d: f64 = lon.trim().parse().map_err(|_| bad())?;
        if !(-90.0..=90.0).contains(&latitude_d) || !(-180.0..=180.0).contains(&longitude_d) {
            return Err(bad());
        }
        Ok(Some(LaunchSite {
            latitude_d,
            longitude_d,
        }))
    }

    /// The channel rotation implied by the restriction mode.
    pub fn frequencies(&self) -> Vec<u32> {
        match self.restrict {
            Restrict::Both => vec![self.primary_hz, self.secondary_hz],
            Restrict::PrimaryOnly => vec![self.primary_hz],
            Restrict::SecondaryOnly => vec![self.secondary_hz],
        }
    }

    /// The secondary frequency, when the rotation visits it at all.
    pub fn secondary(&self) -> Option<u32> {
        match self.restrict {
            Restrict::PrimaryOnly => None,
            Restrict::Both | Restrict::SecondaryOnly => Some(self.secondary_hz),
        }
    }
}
