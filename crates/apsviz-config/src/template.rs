// SPDX-License-Identifier: MIT

use serde::Deserialize;

/// A stage's job template: everything the Job Template Binder needs to
/// materialize a concrete cluster job spec for one run.
///
/// `job_name`, `data_volume_name`, and `ssh_volume_name` are name *prefixes*;
/// the binder suffixes them with the run id (lowercased) to produce unique
/// per-run resource names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StageTemplate {
    pub job_name: String,
    pub data_volume_name: String,
    pub ssh_volume_name: String,
    pub command_line: Vec<String>,
    pub data_mount_path: String,
    pub sub_path: String,
    pub additional_path: String,
    pub image: String,
}
