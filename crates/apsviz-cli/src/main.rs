// SPDX-License-Identifier: MIT

mod cli;
mod logging;

use apsviz_adapters::{HttpStateStore, KubernetesClusterDriver, WebhookNotifyAdapter};
use apsviz_config::Config;
use apsviz_core::SystemClock;
use apsviz_engine::ReconciliationLoop;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let _log_guard = logging::init(args.log_level.as_deref(), args.log_dir.as_deref())?;

    tracing::info!(config = %args.config.display(), namespace = %args.k8s_namespace, "starting apsviz-supervisor");

    let config = Config::load(&args.config)?;

    let kube_client = kube::Client::try_default().await?;
    let cluster = KubernetesClusterDriver::new(kube_client, args.k8s_namespace.clone());

    let http_client = reqwest::Client::builder().build()?;
    let store = HttpStateStore::new(http_client.clone(), args.state_store_url.clone());
    let notify = WebhookNotifyAdapter::new(http_client, args.notify_webhook_url.clone());

    let mut reconciliation_loop =
        ReconciliationLoop::new(cluster, store, notify, SystemClock, config);

    reconciliation_loop.run_forever().await
}
