// SPDX-License-Identifier: MIT

use clap::Parser;
use std::path::PathBuf;

/// APSViz Supervisor: drives geospatial post-processing runs through their
/// containerized pipeline stages.
#[derive(Debug, Parser)]
#[command(name = "apsviz-supervisor", version, about)]
pub struct Cli {
    /// Path to the stage-template config TOML file.
    #[arg(long, env = "APSVIZ_CONFIG")]
    pub config: PathBuf,

    /// Log level override (e.g. "info", "debug", "apsviz_engine=trace").
    /// Defaults to the `RUST_LOG` environment variable, falling back to "info".
    #[arg(long, env = "APSVIZ_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Directory to write rolling log files to, in addition to stderr.
    /// Created if it does not already exist.
    #[arg(long, env = "APSVIZ_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Kubernetes namespace the cluster driver operates in.
    #[arg(long, env = "APSVIZ_K8S_NAMESPACE", default_value = "default")]
    pub k8s_namespace: String,

    /// Base URL of the catalog/state-store REST API.
    #[arg(long, env = "APSVIZ_STATE_STORE_URL")]
    pub state_store_url: String,

    /// Slack-compatible incoming webhook URL for operator notifications.
    #[arg(long, env = "APSVIZ_NOTIFY_WEBHOOK_URL")]
    pub notify_webhook_url: String,
}
