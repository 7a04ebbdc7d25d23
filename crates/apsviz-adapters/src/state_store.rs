// SPDX-License-Identifier: MIT

//! State Store Adapter: the catalog of admitted runs and their status.

use apsviz_core::RunId;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state store http error: {0}")]
    Http(String),
    #[error("state store response decode error: {0}")]
    Decode(String),
    #[error("state store backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// One admitted-run record as returned by `list_admitted`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdmittedRun {
    pub run_id: RunId,
    pub run_data: HashMap<String, String>,
}

impl AdmittedRun {
    pub const REQUIRED_KEYS: [&'static str; 3] =
        ["downloadurl", "adcirc.gridname", "instancename"];

    /// Whether `run_data` carries all keys required for admission.
    pub fn has_required_keys(&self) -> bool {
        Self::REQUIRED_KEYS.iter().all(|k| self.run_data.contains_key(*k))
    }
}

#[async_trait]
pub trait StateStoreAdapter: Clone + Send + Sync + 'static {
    async fn list_admitted(&self) -> Result<Vec<AdmittedRun>, StateStoreError>;
    async fn update_status(
        &self,
        run_id: &RunId,
        provenance_text: &str,
    ) -> Result<(), StateStoreError>;
}

/// Production implementation: an HTTP client against the catalog's REST
/// endpoints, with typed DTOs and classified errors.
#[derive(Clone)]
pub struct HttpStateStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStateStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[async_trait]
impl StateStoreAdapter for HttpStateStore {
    async fn list_admitted(&self) -> Result<Vec<AdmittedRun>, StateStoreError> {
        let url = format!("{}/runs/admitted", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StateStoreError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StateStoreError::BackendUnavailable(format!(
                "list_admitted returned status {}",
                response.status()
            )));
        }

        response
            .json::<Vec<AdmittedRun>>()
            .await
            .map_err(|e| StateStoreError::Decode(e.to_string()))
    }

    async fn update_status(
        &self,
        run_id: &RunId,
        provenance_text: &str,
    ) -> Result<(), StateStoreError> {
        let url = format!("{}/runs/{}/status", self.base_url, run_id.as_str());
        let body = serde_json::json!({ "status": provenance_text });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StateStoreError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StateStoreError::BackendUnavailable(format!(
                "update_status returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{AdmittedRun, StateStoreAdapter, StateStoreError};
    use apsviz_core::RunId;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct StatusUpdate {
        pub run_id: RunId,
        pub provenance_text: String,
    }

    #[derive(Default)]
    struct FakeState {
        admitted: Vec<AdmittedRun>,
        updates: Vec<StatusUpdate>,
    }

    /// In-memory state store: test code seeds admitted runs via
    /// [`FakeStateStore::seed_admitted`] and inspects [`FakeStateStore::updates`]
    /// to assert on the provenance written by the engine.
    #[derive(Clone, Default)]
    pub struct FakeStateStore {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeStateStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed_admitted(&self, run: AdmittedRun) {
            self.inner.lock().admitted.push(run);
        }

        /// Remove all currently queued admitted runs, simulating a catalog
        /// that doesn't repeat acknowledged runs on the next poll.
        pub fn drain_admitted(&self) -> Vec<AdmittedRun> {
            std::mem::take(&mut self.inner.lock().admitted)
        }

        pub fn updates(&self) -> Vec<StatusUpdate> {
            self.inner.lock().updates.clone()
        }
    }

    #[async_trait::async_trait]
    impl StateStoreAdapter for FakeStateStore {
        async fn list_admitted(&self) -> Result<Vec<AdmittedRun>, StateStoreError> {
            Ok(self.inner.lock().admitted.clone())
        }

        async fn update_status(
            &self,
            run_id: &RunId,
            provenance_text: &str,
        ) -> Result<(), StateStoreError> {
            self.inner.lock().updates.push(StatusUpdate {
                run_id: run_id.clone(),
                provenance_text: provenance_text.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeStateStore, StatusUpdate};
