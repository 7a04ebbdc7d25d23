// SPDX-License-Identifier: MIT

use apsviz_adapters::{ClusterDriverError, NotifyError, StateStoreError};
use apsviz_config::ConfigError;
use apsviz_core::Stage;
use thiserror::Error;

/// Top-level engine error aggregating every adapter's error without losing
/// its variant.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cluster driver error: {0}")]
    Cluster(#[from] ClusterDriverError),

    #[error("state store error: {0}")]
    StateStore(#[from] StateStoreError),

    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("pseudo-stage {0:?} has no job template")]
    PseudoStageHasNoTemplate(Stage),

    #[error("run in stage_status Running has no job binding")]
    MissingJobBinding,
}
