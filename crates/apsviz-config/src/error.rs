// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Configuration loading is fail-fast: any of these aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no template configured for stage key '{0}'")]
    MissingStage(String),
}
