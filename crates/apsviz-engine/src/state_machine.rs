// SPDX-License-Identifier: MIT

//! Run State Machine: per-run transition logic.
//!
//! Two entry points mirror the two independent guards the reconciliation
//! loop wraps them in (see [`crate::reconcile`]):
//! [`dispatch_pseudo_stage`] for the `Complete`/`Error` pseudo-stages, and
//! [`dispatch_stage`] for every real stage's New/Running branches.

use crate::binder::bind;
use crate::catalog::stage_def;
use crate::error::EngineError;
use apsviz_adapters::{ClusterDriverAdapter, JobHandle, NotifyAdapter, StateStoreAdapter};
use apsviz_config::Config;
use apsviz_core::{Run, Stage, StageStatus};

/// Outcome of handling a run for one tick.
pub struct TickOutcome {
    /// Whether this run changed state (feeds the loop's idle-backoff counter).
    pub activity: bool,
    /// Whether the run should be dropped from the active table after this tick.
    pub remove: bool,
}

impl TickOutcome {
    fn active(remove: bool) -> Self {
        Self { activity: true, remove }
    }

    fn idle() -> Self {
        Self { activity: false, remove: false }
    }
}

/// Handle `stage == Complete` or `stage == Error`.
///
/// `Complete`: appends "Run complete", notifies success or failure, persists
/// status, and signals removal from the active table.
/// `Error`: appends "Error detected", persists, and redirects to
/// `FinalStaging`/`New`, a guaranteed cleanup executed on the next tick.
pub async fn dispatch_pseudo_stage<S, N>(
    run: &mut Run,
    store: &S,
    notify: &N,
) -> Result<TickOutcome, EngineError>
where
    S: StateStoreAdapter,
    N: NotifyAdapter,
{
    match run.stage {
        Stage::Complete => {
            run.append_provenance("Run complete");
            if run.has_error() {
                let message = format!(
                    "*completed unsuccessfully*.\nRun provenance: {}.",
                    run.provenance
                );
                let _ = notify
                    .notify(run.id.as_str(), &message, Some(&run.context.instance_name))
                    .await;
            } else {
                let _ = notify
                    .notify(
                        run.id.as_str(),
                        "*completed successfully*.",
                        Some(&run.context.instance_name),
                    )
                    .await;
            }
            store.update_status(&run.id, &run.provenance).await?;
            Ok(TickOutcome::active(true))
        }
        Stage::Error => {
            run.append_provenance("Error detected");
            store.update_status(&run.id, &run.provenance).await?;
            run.stage = Stage::FinalStaging;
            run.stage_status = StageStatus::New;
            run.job_binding = None;
            Ok(TickOutcome::active(false))
        }
        other => unreachable!("dispatch_pseudo_stage called for real stage {other:?}"),
    }
}

/// Handle any real (non-pseudo) stage's New/Running branches.
///
/// A failed pod condition normally redirects to `Error`. `FinalStaging` is
/// the exception: it's already the cleanup stage, so a failure there routes
/// straight to `Complete` instead, to avoid an Error/FinalStaging cycle that
/// never terminates. The operator notification carries a warning that
/// intermediate files may not have been removed.
pub async fn dispatch_stage<C, S, N>(
    run: &mut Run,
    cluster: &C,
    store: &S,
    notify: &N,
    config: &Config,
) -> Result<TickOutcome, EngineError>
where
    C: ClusterDriverAdapter,
    S: StateStoreAdapter,
    N: NotifyAdapter,
{
    let def = stage_def(run.stage).ok_or(EngineError::PseudoStageHasNoTemplate(run.stage))?;

    match run.stage_status {
        StageStatus::New => {
            let (job_spec, job_binding) = bind(run, config)?;
            cluster.create(job_spec).await?;
            run.job_binding = Some(job_binding);
            run.stage_status = StageStatus::Running;
            run.append_provenance(def.running_marker);
            store.update_status(&run.id, &run.provenance).await?;
            Ok(TickOutcome::active(false))
        }
        StageStatus::Running => {
            let job_name = run
                .job_binding
                .as_ref()
                .ok_or(EngineError::MissingJobBinding)?
                .job_name
                .clone();
            let handle = JobHandle::new(job_name);
            let inspection = cluster.inspect(&handle).await?;

            if inspection.pod_condition.starts_with("Failed") {
                cluster.delete(&handle).await?;
                let _ = notify
                    .notify(
                        run.id.as_str(),
                        &format!("failed in {}.", def.stage.template_key()),
                        Some(&run.context.instance_name),
                    )
                    .await;

                if run.stage == Stage::FinalStaging {
                    let _ = notify
                        .notify(
                            run.id.as_str(),
                            "*Warning: Intermediate files may not have been removed.*",
                            Some(&run.context.instance_name),
                        )
                        .await;
                    run.append_provenance(def.complete_marker);
                    run.stage = Stage::Complete;
                    run.stage_status = StageStatus::New;
                    run.job_binding = None;
                    store.update_status(&run.id, &run.provenance).await?;
                    return Ok(TickOutcome::active(false));
                }

                run.stage = Stage::Error;
                run.stage_status = StageStatus::Failed;
                run.job_binding = None;
                return Ok(TickOutcome::active(false));
            }

            if !inspection.job_active {
                cluster.delete(&handle).await?;
                run.stage = run.stage.default_successor();
                run.stage_status = StageStatus::New;
                run.job_binding = None;
                run.append_provenance(def.complete_marker);
                store.update_status(&run.id, &run.provenance).await?;
                return Ok(TickOutcome::active(false));
            }

            Ok(TickOutcome::idle())
        }
        StageStatus::Failed => Ok(TickOutcome::idle()),
    }
}

/// Best-effort cleanup applied by the loop's second exception guard when a
/// stage handler returns `Err`: delete the job if one was bound, mark the
/// run `Error`/`Failed`, and record the incident in provenance.
///
/// Never itself returns an error. The cluster delete's outcome is best
/// effort, logged but not propagated, since the run is already being routed
/// to the guaranteed-cleanup path.
pub async fn recover_from_handler_error<C>(run: &mut Run, cluster: &C)
where
    C: ClusterDriverAdapter,
{
    if let Some(binding) = run.job_binding.take() {
        let handle = JobHandle::new(binding.job_name);
        if let Err(e) = cluster.delete(&handle).await {
            tracing::warn!(run_id = %run.id, error = %e, "best-effort job delete failed during handler-error recovery");
        }
    }
    run.append_provenance("Run handler error detected");
    run.stage = Stage::Error;
    run.stage_status = StageStatus::Failed;
}
