// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use thiserror::Error;

/// Errors from notify operations.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Adapter for sending operator notifications. Fire-and-forget: failures
/// are never allowed to block run progression.
#[async_trait]
pub trait NotifyAdapter: Clone + Send + Sync + 'static {
    /// Send a notification line for `run_id`, with an optional instance name
    /// folded into the message prefix.
    async fn notify(
        &self,
        run_id: &str,
        message: &str,
        instance_name: Option<&str>,
    ) -> Result<(), NotifyError>;
}

/// Build the standard `"APSViz Supervisor - [Instance name: <n>, ]Run ID: <id> <message>"` line.
pub fn format_line(run_id: &str, message: &str, instance_name: Option<&str>) -> String {
    match instance_name {
        Some(name) if !name.is_empty() => {
            format!("APSViz Supervisor - Instance name: {name}, Run ID: {run_id} {message}")
        }
        _ => format!("APSViz Supervisor - Run ID: {run_id} {message}"),
    }
}

/// Production notification adapter: posts the constructed line to a
/// Slack-compatible incoming webhook.
#[derive(Clone)]
pub struct WebhookNotifyAdapter {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifyAdapter {
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self { client, webhook_url: webhook_url.into() }
    }
}

#[async_trait]
impl NotifyAdapter for WebhookNotifyAdapter {
    async fn notify(
        &self,
        run_id: &str,
        message: &str,
        instance_name: Option<&str>,
    ) -> Result<(), NotifyError> {
        let line = format_line(run_id, message, instance_name);
        let body = serde_json::json!({ "text": line });
        match self.client.post(&self.webhook_url).json(&body).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                tracing::warn!(status = %response.status(), %line, "notification webhook rejected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, %line, "notification webhook failed");
                Ok(())
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{format_line, NotifyAdapter, NotifyError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded notification.
    #[derive(Debug, Clone)]
    pub struct NotifyCall {
        pub run_id: String,
        pub line: String,
    }

    #[derive(Default)]
    struct FakeNotifyState {
        calls: Vec<NotifyCall>,
    }

    /// Fake notification adapter for testing.
    #[derive(Clone, Default)]
    pub struct FakeNotifyAdapter {
        inner: Arc<Mutex<FakeNotifyState>>,
    }

    impl FakeNotifyAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Get all recorded notifications.
        pub fn calls(&self) -> Vec<NotifyCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl NotifyAdapter for FakeNotifyAdapter {
        async fn notify(
            &self,
            run_id: &str,
            message: &str,
            instance_name: Option<&str>,
        ) -> Result<(), NotifyError> {
            let line = format_line(run_id, message, instance_name);
            self.inner.lock().calls.push(NotifyCall { run_id: run_id.to_string(), line });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifyAdapter, NotifyCall};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_line_without_instance_name() {
        let line = format_line("42", "accepted", None);
        assert_eq!(line, "APSViz Supervisor - Run ID: 42 accepted");
    }

    #[test]
    fn format_line_with_instance_name() {
        let line = format_line("42", "accepted", Some("nowcast"));
        assert_eq!(line, "APSViz Supervisor - Instance name: nowcast, Run ID: 42 accepted");
    }

    #[tokio::test]
    async fn fake_adapter_records_calls() {
        let adapter = FakeNotifyAdapter::new();
        adapter.notify("7", "failed in Staging", None).await.unwrap();
        let calls = adapter.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].run_id, "7");
        assert!(calls[0].line.contains("failed in Staging"));
    }
}
