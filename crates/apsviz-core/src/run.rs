// SPDX-License-Identifier: MIT

//! The `Run`: the unit of work tracked by the reconciliation loop.

use crate::stage::{Stage, StageStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, catalog-assigned run identifier.
///
/// The catalog may use numeric-looking ids; the controller treats them as
/// opaque text throughout (no arithmetic is ever performed on a `RunId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercased form used to suffix job and volume names.
    pub fn to_lowercase(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Immutable-at-admission context bound from the catalog's `run_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub download_url: String,
    pub grid_name: String,
    pub instance_name: String,
}

/// Stage-local record created when a stage enters `Running`.
///
/// Holds the scheduler-assigned job handle and the materialized command
/// line, so a crash-and-restart (or the handler-error guard) can attempt a
/// best-effort delete without re-deriving the job spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobBinding {
    pub job_name: String,
    pub command_line: Vec<String>,
}

/// A single end-to-end processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub stage: Stage,
    pub stage_status: StageStatus,
    /// Append-only, comma-space-separated provenance fragments.
    pub provenance: String,
    pub context: RunContext,
    pub job_binding: Option<JobBinding>,
}

impl Run {
    /// Construct a freshly admitted run: `Staging/New`, provenance seeded
    /// with the initial fragment.
    pub fn admit(id: RunId, context: RunContext) -> Self {
        Self {
            id,
            stage: Stage::Staging,
            stage_status: StageStatus::New,
            provenance: "New, Run accepted".to_string(),
            context,
            job_binding: None,
        }
    }

    /// Append a provenance fragment. Provenance is append-only: this is the
    /// only way callers are expected to mutate `provenance`.
    pub fn append_provenance(&mut self, fragment: impl AsRef<str>) {
        self.provenance.push_str(", ");
        self.provenance.push_str(fragment.as_ref());
    }

    /// Whether the provenance contains the `Error` substring, which
    /// classifies the run as unsuccessful for notification purposes.
    pub fn has_error(&self) -> bool {
        self.provenance.contains("Error")
    }

    /// A run is active (held in the reconciliation table) iff its stage is
    /// not `Complete`.
    pub fn is_active(&self) -> bool {
        self.stage != Stage::Complete
    }
}
