// SPDX-License-Identifier: MIT

//! Cluster Driver Adapter: create/inspect/delete batch jobs.
//!
//! The adapter has no knowledge of stages; it only ever sees a fully bound
//! [`JobSpec`]. Production implementation talks to Kubernetes via `kube`
//! against `batch/v1::Job`, mirroring the pod-lifecycle shape this codebase
//! already uses for its own containerized workloads (builder function +
//! `Api::create`/`Api::get`/`Api::delete`, status-condition inspection).

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec as K8sJobSpec};
use k8s_openapi::api::core::v1::{
    Container, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::Client;
use thiserror::Error;

/// Errors from cluster driver operations.
#[derive(Debug, Error)]
pub enum ClusterDriverError {
    #[error("cluster backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// A fully bound job, ready to submit. Produced by the Job Template Binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub job_name: String,
    pub image: String,
    pub command_line: Vec<String>,
    pub data_volume_name: String,
    pub ssh_volume_name: String,
    pub data_mount_path: String,
}

/// Opaque handle to a submitted job, persisted on the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self(job_name.into())
    }

    pub fn job_name(&self) -> &str {
        &self.0
    }
}

/// Inspection result: whether the job is still active, and its most recent
/// pod's condition text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInspection {
    pub job_active: bool,
    pub pod_condition: String,
}

/// Terminal descriptor returned by a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFinalStatus {
    Deleted,
    /// Deleting an unknown handle is not an error; the job was already gone.
    NotFound,
}

#[async_trait]
pub trait ClusterDriverAdapter: Clone + Send + Sync + 'static {
    async fn create(&self, spec: JobSpec) -> Result<JobHandle, ClusterDriverError>;
    async fn inspect(&self, handle: &JobHandle) -> Result<JobInspection, ClusterDriverError>;
    async fn delete(&self, handle: &JobHandle) -> Result<JobFinalStatus, ClusterDriverError>;
}

/// Production implementation: a `kube::Api<Job>` in a configured namespace.
#[derive(Clone)]
pub struct KubernetesClusterDriver {
    client: Client,
    namespace: String,
}

impl KubernetesClusterDriver {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self { client, namespace: namespace.into() }
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pods(&self) -> Api<k8s_openapi::api::core::v1::Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn build_job(spec: &JobSpec) -> Job {
        Job {
            metadata: ObjectMeta { name: Some(spec.job_name.clone()), ..Default::default() },
            spec: Some(K8sJobSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(
                            [("job-name".to_string(), spec.job_name.clone())].into_iter().collect(),
                        ),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "supervisor-job".to_string(),
                            image: Some(spec.image.clone()),
                            command: Some(spec.command_line.clone()),
                            volume_mounts: Some(vec![VolumeMount {
                                name: spec.data_volume_name.clone(),
                                mount_path: spec.data_mount_path.clone(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        volumes: Some(vec![
                            Volume { name: spec.data_volume_name.clone(), ..Default::default() },
                            Volume { name: spec.ssh_volume_name.clone(), ..Default::default() },
                        ]),
                        restart_policy: Some("Never".to_string()),
                        ..Default::default()
                    }),
                },
                backoff_limit: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Pod condition text for the most recently created pod owned by this
    /// job's selector, falling back to `"Unknown"` when none exists yet.
    async fn pod_condition(&self, job_name: &str) -> Result<String, ClusterDriverError> {
        let lp = ListParams::default().labels(&format!("job-name={job_name}"));
        let pods = self
            .pods()
            .list(&lp)
            .await
            .map_err(|e| ClusterDriverError::BackendUnavailable(e.to_string()))?;

        let latest = pods.items.into_iter().max_by_key(|p| {
            p.metadata.creation_timestamp.as_ref().map(|t| t.0).map(|dt| dt.timestamp())
        });

        let Some(pod) = latest else {
            return Ok("Unknown".to_string());
        };

        let condition = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        Ok(condition)
    }
}

#[async_trait]
impl ClusterDriverAdapter for KubernetesClusterDriver {
    async fn create(&self, spec: JobSpec) -> Result<JobHandle, ClusterDriverError> {
        let job = Self::build_job(&spec);
        let pp = PostParams::default();
        tracing::info!(job_name = %spec.job_name, "creating cluster job");
        self.jobs()
            .create(&pp, &job)
            .await
            .map_err(|e| ClusterDriverError::BackendUnavailable(e.to_string()))?;
        Ok(JobHandle::new(spec.job_name))
    }

    async fn inspect(&self, handle: &JobHandle) -> Result<JobInspection, ClusterDriverError> {
        let job = self
            .jobs()
            .get(handle.job_name())
            .await
            .map_err(|e| ClusterDriverError::BackendUnavailable(e.to_string()))?;

        let status = job.status.unwrap_or_default();
        let job_active = status.active.unwrap_or(0) > 0;
        let pod_condition = if status.failed.unwrap_or(0) > 0 {
            "Failed".to_string()
        } else {
            self.pod_condition(handle.job_name()).await?
        };
        Ok(JobInspection { job_active, pod_condition })
    }

    async fn delete(&self, handle: &JobHandle) -> Result<JobFinalStatus, ClusterDriverError> {
        let dp = DeleteParams::background();
        match self.jobs().delete(handle.job_name(), &dp).await {
            Ok(_) => Ok(JobFinalStatus::Deleted),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(JobFinalStatus::NotFound),
            Err(e) => Err(ClusterDriverError::BackendUnavailable(e.to_string())),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{ClusterDriverAdapter, ClusterDriverError, JobFinalStatus, JobHandle, JobInspection, JobSpec};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct FakeJobState {
        spec: JobSpec,
        active: bool,
        pod_condition: String,
        deleted: bool,
    }

    /// In-memory cluster driver for tests: jobs start active, and their
    /// lifecycle is advanced by test code via [`FakeClusterDriver::set_job_active`]
    /// and [`FakeClusterDriver::set_pod_condition`].
    #[derive(Clone, Default)]
    pub struct FakeClusterDriver {
        jobs: Arc<Mutex<HashMap<String, FakeJobState>>>,
        fail_create_for: Arc<Mutex<Option<String>>>,
    }

    impl FakeClusterDriver {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `create` for this job name fail with `BackendUnavailable`.
        pub fn fail_next_create_for(&self, job_name: impl Into<String>) {
            *self.fail_create_for.lock() = Some(job_name.into());
        }

        pub fn set_job_active(&self, job_name: &str, active: bool) {
            if let Some(job) = self.jobs.lock().get_mut(job_name) {
                job.active = active;
            }
        }

        pub fn set_pod_condition(&self, job_name: &str, condition: impl Into<String>) {
            if let Some(job) = self.jobs.lock().get_mut(job_name) {
                job.pod_condition = condition.into();
            }
        }

        pub fn is_deleted(&self, job_name: &str) -> bool {
            self.jobs.lock().get(job_name).map(|j| j.deleted).unwrap_or(false)
        }

        pub fn created_job_names(&self) -> Vec<String> {
            self.jobs.lock().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl ClusterDriverAdapter for FakeClusterDriver {
        async fn create(&self, spec: JobSpec) -> Result<JobHandle, ClusterDriverError> {
            let mut fail_for = self.fail_create_for.lock();
            if fail_for.as_deref() == Some(spec.job_name.as_str()) {
                *fail_for = None;
                return Err(ClusterDriverError::BackendUnavailable(
                    "fake backend unavailable".to_string(),
                ));
            }
            drop(fail_for);

            let handle = JobHandle::new(spec.job_name.clone());
            self.jobs.lock().insert(
                spec.job_name.clone(),
                FakeJobState {
                    spec,
                    active: true,
                    pod_condition: "Running".to_string(),
                    deleted: false,
                },
            );
            Ok(handle)
        }

        async fn inspect(&self, handle: &JobHandle) -> Result<JobInspection, ClusterDriverError> {
            let jobs = self.jobs.lock();
            let job = jobs.get(handle.job_name()).ok_or_else(|| {
                ClusterDriverError::BackendUnavailable(format!(
                    "unknown job handle {}",
                    handle.job_name()
                ))
            })?;
            Ok(JobInspection { job_active: job.active, pod_condition: job.pod_condition.clone() })
        }

        async fn delete(&self, handle: &JobHandle) -> Result<JobFinalStatus, ClusterDriverError> {
            let mut jobs = self.jobs.lock();
            match jobs.get_mut(handle.job_name()) {
                Some(job) => {
                    job.deleted = true;
                    job.active = false;
                    Ok(JobFinalStatus::Deleted)
                }
                None => Ok(JobFinalStatus::NotFound),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeClusterDriver;
