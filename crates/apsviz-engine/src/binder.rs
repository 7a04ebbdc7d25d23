// SPDX-License-Identifier: MIT

//! Job Template Binder: materializes a concrete job spec from a stage
//! template and a run.

use crate::catalog::{stage_def, ParamContext};
use crate::error::EngineError;
use apsviz_adapters::JobSpec;
use apsviz_config::Config;
use apsviz_core::{JobBinding, Run};

/// Clone the stage's template, suffix its names with the (lowercased) run
/// id, extend the command line with the stage's computed parameters, and,
/// when the stage extends its output path, append the run-scoped output
/// directory as a final argument.
pub fn bind(run: &Run, config: &Config) -> Result<(JobSpec, JobBinding), EngineError> {
    let def = stage_def(run.stage).ok_or(EngineError::PseudoStageHasNoTemplate(run.stage))?;
    let template = config.stage_template(run.stage.template_key())?;

    let suffix = run.id.to_lowercase();
    let job_name = format!("{}{}", template.job_name, suffix);
    let data_volume_name = format!("{}{}", template.data_volume_name, suffix);
    let ssh_volume_name = format!("{}{}", template.ssh_volume_name, suffix);

    let ctx = ParamContext {
        id: run.id.as_str(),
        download_url: &run.context.download_url,
        grid_name: &run.context.grid_name,
        template,
    };
    let mut params = (def.build_params)(&ctx);
    if run.stage.extend_output_path() {
        params.push(format!(
            "{}/{}{}{}",
            template.data_mount_path, run.id, template.sub_path, template.additional_path
        ));
    }

    let mut command_line = template.command_line.clone();
    command_line.extend(params);

    let job_spec = JobSpec {
        job_name: job_name.clone(),
        image: template.image.clone(),
        command_line: command_line.clone(),
        data_volume_name,
        ssh_volume_name,
        data_mount_path: template.data_mount_path.clone(),
    };
    let job_binding = JobBinding { job_name, command_line };

    Ok((job_spec, job_binding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apsviz_core::{RunContext, RunId, Stage};

    fn config() -> Config {
        config_with_staging_additional_path("")
    }

    fn config_with_staging_additional_path(additional_path: &str) -> Config {
        Config::from_toml_str(&format!(
            r#"
            poll_short_sleep_secs = 1
            poll_long_sleep_secs = 2

            [stages.staging]
            job_name = "staging-job-"
            data_volume_name = "staging-data-"
            ssh_volume_name = "staging-ssh-"
            command_line = ["python", "staging.py"]
            data_mount_path = "/data"
            sub_path = "/staging"
            additional_path = "{additional_path}"
            image = "apsviz/staging:latest"

            [stages.obs-mod]
            job_name = "obs-mod-job-"
            data_volume_name = "obs-mod-data-"
            ssh_volume_name = "obs-mod-ssh-"
            command_line = ["python", "obs_mod.py"]
            data_mount_path = "/data"
            sub_path = "/obs-mod"
            additional_path = ""
            image = "apsviz/obs-mod:latest"

            [stages.run-geo-tiff]
            job_name = "geo-tiff-job-"
            data_volume_name = "geo-tiff-data-"
            ssh_volume_name = "geo-tiff-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/geo-tiff"
            additional_path = ""
            image = "apsviz/geo-tiff:latest"

            [stages.compute-mbtiles-0-9]
            job_name = "mbtiles-job-"
            data_volume_name = "mbtiles-data-"
            ssh_volume_name = "mbtiles-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/mbtiles"
            additional_path = ""
            image = "apsviz/mbtiles:latest"

            [stages.load-geo-server]
            job_name = "load-geo-server-job-"
            data_volume_name = "load-geo-server-data-"
            ssh_volume_name = "load-geo-server-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/load-geo-server"
            additional_path = ""
            image = "apsviz/load-geo-server:latest"

            [stages.final-staging]
            job_name = "final-staging-job-"
            data_volume_name = "final-staging-data-"
            ssh_volume_name = "final-staging-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/final-staging"
            additional_path = ""
            image = "apsviz/final-staging:latest"
            "#
        ))
        .unwrap()
    }

    fn run() -> Run {
        let mut run = Run::admit(
            RunId::new("RUN-42"),
            RunContext {
                download_url: "http://x/f".to_string(),
                grid_name: "g1".to_string(),
                instance_name: "inst-A".to_string(),
            },
        );
        run.stage = Stage::Staging;
        run
    }

    #[test]
    fn staging_binds_suffixed_names_and_appends_output_dir() {
        let cfg = config();
        let (spec, binding) = bind(&run(), &cfg).unwrap();
        assert_eq!(spec.job_name, "staging-job-run-42");
        assert_eq!(spec.data_volume_name, "staging-data-run-42");
        assert_eq!(spec.ssh_volume_name, "staging-ssh-run-42");
        assert_eq!(
            spec.command_line,
            vec![
                "python",
                "staging.py",
                "--inputURL",
                "http://x/f",
                "--outputDir",
                "/data/RUN-42/staging"
            ]
        );
        assert_eq!(binding.job_name, spec.job_name);
    }

    #[test]
    fn staging_output_dir_includes_additional_path() {
        let cfg = config_with_staging_additional_path("/extra");
        let (spec, _binding) = bind(&run(), &cfg).unwrap();
        assert_eq!(
            spec.command_line,
            vec![
                "python",
                "staging.py",
                "--inputURL",
                "http://x/f",
                "--outputDir",
                "/data/RUN-42/staging/extra"
            ]
        );
    }

    #[test]
    fn non_extending_stage_does_not_append_output_dir() {
        let cfg = config();
        let mut r = run();
        r.stage = Stage::LoadGeoServer;
        let (spec, _binding) = bind(&r, &cfg).unwrap();
        assert_eq!(spec.command_line, vec!["python", "--instanceId", "RUN-42"]);
    }
}
