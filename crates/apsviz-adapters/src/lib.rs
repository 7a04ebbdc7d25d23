// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for the three external collaborators: the cluster job scheduler,
//! the catalog/state store, and the notification sink. Each is a narrow
//! `async_trait` with a production implementation and, behind `test-support`,
//! an in-memory fake.

pub mod cluster;
pub mod notify;
pub mod state_store;

pub use cluster::{ClusterDriverAdapter, ClusterDriverError, JobFinalStatus, JobHandle, JobInspection, JobSpec, KubernetesClusterDriver};
pub use notify::{NotifyAdapter, NotifyError, WebhookNotifyAdapter};
pub use state_store::{AdmittedRun, HttpStateStore, StateStoreAdapter, StateStoreError};

#[cfg(any(test, feature = "test-support"))]
pub use cluster::FakeClusterDriver;
#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeNotifyAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use state_store::FakeStateStore;
