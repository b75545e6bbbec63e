use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LoadError};
use crate::events::{self, Channel};
use crate::timing::ReleasePolicy;

/// When records are resolved, converted and encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScheduleMode {
    /// Everything is scheduled before playback starts.
    #[default]
    Precomputed,
    /// Each record is scheduled just before its tick.
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub channel: Channel,
    /// Sleep between polls of the clock. Lower means tighter timing and more CPU.
    pub poll_interval_us: u64,
    pub release: ReleasePolicy,
    pub mode: ScheduleMode,
    /// Substring of the output port name to connect to.
    pub port: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            poll_interval_us: 1_000,
            release: ReleasePolicy::EmitOnce,
            mode: ScheduleMode::Precomputed,
            port: None,
        }
    }
}

impl PlaybackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        events::validate_channel(self.channel)?;
        if self.poll_interval_us == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if let ReleasePolicy::AutoRelease { hold_ms: 0 } = self.release {
            return Err(ConfigError::ZeroHold);
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ron_string = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PlaybackConfig = ron::from_str(&ron_string).map_err(LoadError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(LoadError::from)?;
        fs::write(path, ron_string).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
