//! `FocusConfig`
//!
//! Every tunable in one RON file shared by the three binaries. Missing fields
//! take their defaults, and a missing file is the same as an empty one.
//! Command line flags are applied on top by each binary.

use crate::beta_power::ExtractorConfig;
use crate::clock::Seconds;
use crate::focus_scorer::ResetPolicy;
use crate::race::RaceConfig;
use crate::readiness::{READY_DURATION, READY_THRESHOLD};
use crate::transport::{
    HoldPolicy, DEFAULT_COMMAND_PORT, DEFAULT_DASHBOARD_PORT, DEFAULT_GAME_PORT,
};

use log::info;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, fs, io, path::Path};

/// Errors from loading or saving a [`FocusConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// Returned when reading or writing the file fails.
    IoError(io::Error),
    /// Returned when serialization fails.
    RonError(ron::Error),
    /// Returned when the file is not valid RON for [`FocusConfig`].
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Self::IoError(error) => Cow::from(format!("io error: {}", error)),
            Self::RonError(error) => Cow::from(format!("ron error: {}", error)),
            Self::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

/// Where the processes find each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Host the consumers run on.
    pub host: String,
    /// UDP port the race listens for scores on.
    pub game_port: u16,
    /// UDP port the dashboard listens for scores on.
    pub dashboard_port: u16,
    /// UDP port the race listens for dashboard commands on.
    pub command_port: u16,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            game_port: DEFAULT_GAME_PORT,
            dashboard_port: DEFAULT_DASHBOARD_PORT,
            command_port: DEFAULT_COMMAND_PORT,
        }
    }
}

/// The producer's ready rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Score at or above which focus counts.
    pub threshold: f64,
    /// Seconds of unbroken focus before READY.
    pub duration: Seconds,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            threshold: READY_THRESHOLD,
            duration: READY_DURATION,
        }
    }
}

/// Dashboard display and ready-window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Attention (0..100) that counts as focused when no flag is sent.
    pub focus_threshold: f64,
    /// Seconds of focus needed before the window turns READY.
    pub ready_seconds: Seconds,
    /// Seconds READY is held once reached.
    pub ready_hold: Seconds,
    /// Seconds without a message before the held score is stale.
    pub stale_after: Seconds,
    /// Score a stale value drifts to.
    pub neutral: f64,
    /// Drift per second toward `neutral` once stale; `None` snaps.
    pub decay_per_sec: Option<f64>,
    /// Weight of the newest score in the displayed average.
    pub smoothing_alpha: f64,
    /// Redraws per second.
    pub update_hz: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            focus_threshold: 70.0,
            ready_seconds: 8.0,
            ready_hold: 4.0,
            stale_after: 2.0,
            neutral: 0.5,
            decay_per_sec: Some(0.05),
            smoothing_alpha: 0.15,
            update_hz: 10.0,
        }
    }
}

impl DashboardConfig {
    /// The consumer-side hold rule built from these settings.
    pub fn hold_policy(&self) -> HoldPolicy {
        HoldPolicy {
            stale_after: self.stale_after,
            neutral: self.neutral,
            decay_per_sec: self.decay_per_sec,
        }
    }
}

/// Everything the three binaries read from a RON file.
///
/// Every field has a default, so a file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    /// Beta band, filter and history settings.
    pub extractor: ExtractorConfig,
    /// Raw beta-power threshold handed to the scorer.
    pub threshold: f64,
    /// What a score reset keeps.
    pub reset_policy: ResetPolicy,
    /// Seconds between producer ticks.
    pub update_interval: Seconds,
    /// Samples requested from the source per tick.
    pub block_size: usize,
    /// Addresses and ports.
    pub net: NetConfig,
    /// The producer's ready rule.
    pub readiness: ReadinessConfig,
    /// Dashboard settings.
    pub dashboard: DashboardConfig,
    /// Race settings.
    pub race: RaceConfig,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            threshold: 70.0,
            reset_policy: ResetPolicy::default(),
            update_interval: 0.016,
            block_size: 250,
            net: NetConfig::default(),
            readiness: ReadinessConfig::default(),
            dashboard: DashboardConfig::default(),
            race: RaceConfig::default(),
        }
    }
}

impl FocusConfig {
    /// Reads `path`, or returns the defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        ron::de::from_bytes(&bytes).map_err(ConfigError::RonSpannedError)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Writes the config to `path` as pretty RON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ConfigError::RonError)?;
        fs::write(path, text)?;
        Ok(())
    }
}
