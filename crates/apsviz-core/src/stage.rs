// SPDX-License-Identifier: MIT

//! The fixed stage pipeline a run moves through.

use serde::{Deserialize, Serialize};

/// One step in the fixed processing pipeline, plus the two pseudo-stages
/// `Complete` and `Error` that terminate or redirect a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Staging,
    ObsMod,
    GeoTiff,
    Mbtiles0_9,
    Mbtiles10,
    Mbtiles11,
    Mbtiles12,
    LoadGeoServer,
    FinalStaging,
    /// Terminal sentinel. A run in this stage is removed from the active table.
    Complete,
    /// Pseudo-stage: the next tick unconditionally redirects to FinalStaging/New.
    Error,
}

impl Stage {
    /// The config/template key used to look up this stage's job template.
    ///
    /// Matches the job-type string values used by the stage-template config.
    pub fn template_key(self) -> &'static str {
        match self {
            Stage::Staging => "staging",
            Stage::ObsMod => "obs-mod",
            Stage::GeoTiff => "run-geo-tiff",
            Stage::Mbtiles0_9 => "compute-mbtiles-0-9",
            Stage::Mbtiles10 => "compute-mbtiles-10",
            Stage::Mbtiles11 => "compute-mbtiles-11",
            Stage::Mbtiles12 => "compute-mbtiles-12",
            Stage::LoadGeoServer => "load-geo-server",
            Stage::FinalStaging => "final-staging",
            Stage::Complete => "complete",
            Stage::Error => "error",
        }
    }

    /// Human-readable name used in provenance fragments and notifications.
    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Staging => "Staging",
            Stage::ObsMod => "Obs/Mod",
            Stage::GeoTiff => "Geo tiff",
            Stage::Mbtiles0_9 => "Compute mbtiles zoom 0-9",
            Stage::Mbtiles10 => "Compute mbtiles zoom 10",
            Stage::Mbtiles11 => "Compute mbtiles zoom 11",
            Stage::Mbtiles12 => "Compute mbtiles zoom 12",
            Stage::LoadGeoServer => "Load geo server",
            Stage::FinalStaging => "Final staging",
            Stage::Complete => "Complete",
            Stage::Error => "Error",
        }
    }

    /// Whether this stage's sub-path gets further qualified with the run id
    /// and an extra output-directory argument appended to the command line.
    pub fn extend_output_path(self) -> bool {
        matches!(self, Stage::Staging)
    }

    /// The default (unconditional) successor on a successful completion.
    ///
    /// Mbtiles10/11/12 are not reachable via this default chain. They are
    /// alternative post-GeoTiff branches selected by configuration, not by
    /// this table. See DESIGN.md for the resolved Open Question.
    pub fn default_successor(self) -> Stage {
        match self {
            Stage::Staging => Stage::ObsMod,
            Stage::ObsMod => Stage::GeoTiff,
            Stage::GeoTiff => Stage::Mbtiles0_9,
            Stage::Mbtiles0_9 | Stage::Mbtiles10 | Stage::Mbtiles11 | Stage::Mbtiles12 => {
                Stage::LoadGeoServer
            }
            Stage::LoadGeoServer => Stage::FinalStaging,
            Stage::FinalStaging => Stage::Complete,
            Stage::Complete | Stage::Error => self,
        }
    }
}

/// Status of the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet submitted to the cluster driver.
    New,
    /// Job submitted; awaiting completion.
    Running,
    /// Terminal within the failed branch; the run has been redirected to Error.
    Failed,
}
