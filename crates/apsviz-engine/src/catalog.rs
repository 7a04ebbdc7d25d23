// SPDX-License-Identifier: MIT

//! Stage Catalog: the static table of stages, their provenance markers, and
//! their parameter builders.
//!
//! One closure per stage here rather than one branch per stage in the loop.
//! The stage handler in [`crate::state_machine`] is a single generic function
//! parameterized by [`StageDef`].

use apsviz_config::StageTemplate;
use apsviz_core::Stage;

/// Everything needed to run one stage, looked up by [`Stage`].
pub struct StageDef {
    pub stage: Stage,
    /// Appended to provenance when the stage transitions New → Running.
    pub running_marker: &'static str,
    /// Appended to provenance when the stage's job completes successfully.
    pub complete_marker: &'static str,
    /// Pure function from (run id, download url, grid name, template) to the
    /// stage-specific command-line parameters.
    pub build_params: fn(&ParamContext<'_>) -> Vec<String>,
}

/// Run-scoped values a parameter builder needs, bundled to keep the builder
/// signatures uniform across stages.
pub struct ParamContext<'a> {
    pub id: &'a str,
    pub download_url: &'a str,
    pub grid_name: &'a str,
    pub template: &'a StageTemplate,
}

fn staging_params(ctx: &ParamContext<'_>) -> Vec<String> {
    vec!["--inputURL".to_string(), ctx.download_url.to_string(), "--outputDir".to_string()]
}

/// The download URL is rewritten for OPeNDAP (`dodsC`) access before use.
fn obs_mod_params(ctx: &ParamContext<'_>) -> Vec<String> {
    let rewritten = format!("{}/fort.63.nc", ctx.download_url).replace("fileServer", "dodsC");
    let t = ctx.template;
    vec![
        "--instanceId".to_string(),
        ctx.id.to_string(),
        "--inputURL".to_string(),
        rewritten,
        "--grid".to_string(),
        ctx.grid_name.to_string(),
        "--outputDIR".to_string(),
        format!("{}/{}{}{}", t.data_mount_path, ctx.id, t.sub_path, t.additional_path),
        "--finalDIR".to_string(),
        format!("{}/{}/final{}", t.data_mount_path, ctx.id, t.additional_path),
    ]
}

/// Shared shape for GeoTiff and the Mbtiles zoom-level variants.
fn tiling_params(ctx: &ParamContext<'_>) -> Vec<String> {
    let t = ctx.template;
    vec![
        "--outputDIR".to_string(),
        format!("{}/{}{}", t.data_mount_path, ctx.id, t.sub_path),
        "--finalDIR".to_string(),
        format!("{}/{}/final{}", t.data_mount_path, ctx.id, t.sub_path),
        "--inputFile".to_string(),
    ]
}

fn load_geo_server_params(ctx: &ParamContext<'_>) -> Vec<String> {
    vec!["--instanceId".to_string(), ctx.id.to_string()]
}

/// Reads from the per-run path but writes to a shared top-level output path,
/// so (unlike the other stages) the sub-path is not further qualified with
/// the run id.
fn final_staging_params(ctx: &ParamContext<'_>) -> Vec<String> {
    let t = ctx.template;
    vec![
        "--inputDir".to_string(),
        format!("{}/{}{}", t.data_mount_path, ctx.id, t.sub_path),
        "--outputDir".to_string(),
        format!("{}{}", t.data_mount_path, t.sub_path),
        "--tarMeta".to_string(),
        ctx.id.to_string(),
    ]
}

/// Look up the static definition for a concrete (non-pseudo) stage.
///
/// `Complete` and `Error` are pseudo-stages handled directly by the run state
/// machine's dispatcher and have no catalog entry.
pub fn stage_def(stage: Stage) -> Option<StageDef> {
    let def = match stage {
        Stage::Staging => StageDef {
            stage,
            running_marker: "Staging running",
            complete_marker: "Staging complete",
            build_params: staging_params,
        },
        Stage::ObsMod => StageDef {
            stage,
            running_marker: "Obs/Mod running",
            complete_marker: "Obs/Mod complete",
            build_params: obs_mod_params,
        },
        Stage::GeoTiff => StageDef {
            stage,
            running_marker: "Geo tiff running",
            complete_marker: "Geo tiff complete",
            build_params: tiling_params,
        },
        Stage::Mbtiles0_9 => StageDef {
            stage,
            running_marker: "Compute mbtiles zoom 0-9 running",
            complete_marker: "Compute mbtiles zoom 0-9 complete",
            build_params: tiling_params,
        },
        Stage::Mbtiles10 => StageDef {
            stage,
            running_marker: "Compute mbtiles zoom 10 running",
            complete_marker: "Compute mbtiles zoom 10 complete",
            build_params: tiling_params,
        },
        Stage::Mbtiles11 => StageDef {
            stage,
            running_marker: "Compute mbtiles zoom 11 running",
            complete_marker: "Compute mbtiles zoom 11 complete",
            build_params: tiling_params,
        },
        Stage::Mbtiles12 => StageDef {
            stage,
            running_marker: "Compute mbtiles zoom 12 running",
            complete_marker: "Compute mbtiles zoom 12 complete",
            build_params: tiling_params,
        },
        Stage::LoadGeoServer => StageDef {
            stage,
            running_marker: "Load geo server running",
            complete_marker: "Load geo server complete",
            build_params: load_geo_server_params,
        },
        Stage::FinalStaging => StageDef {
            stage,
            running_marker: "Final staging running",
            complete_marker: "Final staging complete",
            build_params: final_staging_params,
        },
        Stage::Complete | Stage::Error => return None,
    };
    Some(def)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> StageTemplate {
        StageTemplate {
            job_name: "obs-mod-job-".to_string(),
            data_volume_name: "obs-mod-data-".to_string(),
            ssh_volume_name: "obs-mod-ssh-".to_string(),
            command_line: vec!["python".to_string(), "obs_mod.py".to_string()],
            data_mount_path: "/data".to_string(),
            sub_path: "/obs-mod".to_string(),
            additional_path: "/adcirc".to_string(),
            image: "apsviz/obs-mod:latest".to_string(),
        }
    }

    #[test]
    fn obs_mod_rewrites_url_for_opendap() {
        let t = template();
        let ctx = ParamContext {
            id: "42",
            download_url: "https://example.org/thredds/fileServer/foo",
            grid_name: "grid1",
            template: &t,
        };
        let params = (stage_def(Stage::ObsMod).unwrap().build_params)(&ctx);
        let input_url_idx = params.iter().position(|p| p == "--inputURL").unwrap();
        assert_eq!(
            params[input_url_idx + 1],
            "https://example.org/thredds/dodsC/foo/fort.63.nc"
        );
    }

    #[test]
    fn final_staging_does_not_embed_run_id_in_output_dir() {
        let t = template();
        let ctx =
            ParamContext { id: "42", download_url: "http://x", grid_name: "g", template: &t };
        let params = (stage_def(Stage::FinalStaging).unwrap().build_params)(&ctx);
        let output_dir_idx = params.iter().position(|p| p == "--outputDir").unwrap();
        assert_eq!(params[output_dir_idx + 1], "/data/obs-mod");
    }

    #[test]
    fn complete_and_error_have_no_catalog_entry() {
        assert!(stage_def(Stage::Complete).is_none());
        assert!(stage_def(Stage::Error).is_none());
    }
}
