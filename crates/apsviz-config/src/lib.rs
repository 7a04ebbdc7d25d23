// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! apsviz-config: loads the per-stage job templates and poll intervals.
//!
//! Configuration is read once at startup from a TOML file into an immutable
//! [`Config`] value and handed to the rest of the process by reference.
//! Parsing failures are fatal; malformed config is never silently defaulted.

mod error;
mod template;

pub use error::ConfigError;
pub use template::StageTemplate;

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration: one template per stage plus the poll intervals.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seconds to sleep between ticks while runs are actively transitioning.
    pub poll_short_sleep_secs: u64,
    /// Seconds to sleep between ticks once the loop has gone idle.
    pub poll_long_sleep_secs: u64,
    /// Stage template key (e.g. `"staging"`, `"obs-mod"`) to its job template.
    pub stages: IndexMap<String, StageTemplate>,
}

impl Config {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse configuration from a file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })?;
        Self::from_toml_str(&text)
    }

    /// Look up the template for a stage's template key.
    pub fn stage_template(&self, template_key: &str) -> Result<&StageTemplate, ConfigError> {
        self.stages
            .get(template_key)
            .ok_or_else(|| ConfigError::MissingStage(template_key.to_string()))
    }

    pub fn poll_short_sleep(&self) -> Duration {
        Duration::from_secs(self.poll_short_sleep_secs)
    }

    pub fn poll_long_sleep(&self) -> Duration {
        Duration::from_secs(self.poll_long_sleep_secs)
    }

    /// Every stage that the engine's stage catalog will look up must be
    /// present, or the process should fail fast at startup rather than
    /// panic mid-tick on the first run that reaches an unconfigured stage.
    fn validate(&self) -> Result<(), ConfigError> {
        const REQUIRED: &[&str] = &[
            "staging",
            "obs-mod",
            "run-geo-tiff",
            "compute-mbtiles-0-9",
            "load-geo-server",
            "final-staging",
        ];
        for key in REQUIRED {
            if !self.stages.contains_key(*key) {
                return Err(ConfigError::MissingStage((*key).to_string()));
            }
        }
        Ok(())
    }
}
